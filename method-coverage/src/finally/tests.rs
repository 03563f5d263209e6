// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use anyhow::Result;
use method_flow::{LabelFlow, MethodBuilder, MethodEvent};
use pretty_assertions::assert_eq;

use super::*;
use crate::filter::NoFilter;
use crate::graph::FlowBuilder;
use crate::test::{insert_probes, println, try_catch_finally};

fn build(events: &[MethodEvent]) -> Result<FlowGraph> {
    let labels = LabelFlow::analyze(events)?;
    let mut builder = FlowBuilder::new(&labels, ProbeData::new(None), NoFilter);

    for event in events {
        builder.visit(event);
    }

    Ok(builder.finish())
}

#[test]
fn test_copies_of_finally_block_are_found() -> Result<()> {
    let (events, l) = try_catch_finally();
    let (events, _) = insert_probes(&events);
    let graph = build(&events)?;

    let groups = duplicate_groups(&graph, &FinallyShape::default());

    assert_eq!(groups.len(), 1);
    assert!(groups.contains(l[0]));
    assert_eq!(groups.get(l[0]), Some(&[l[4], l[3], l[5]][..]));

    Ok(())
}

#[test]
fn test_duplicates_are_disabled() -> Result<()> {
    let (events, _) = try_catch_finally();
    let (events, _) = insert_probes(&events);
    let mut graph = build(&events)?;

    let shape = FinallyShape::default();
    let ends = FinallyResolver::new(&mut graph, ProbeData::new(None), &shape).resolve();

    assert_eq!(
        ends,
        vec![FinallyBlockEnd {
            primary: InsnId(17),
            others: vec![InsnId(11), InsnId(20)],
        }]
    );

    let enabled: Vec<usize> = graph
        .insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| insn.is_coverage_enabled())
        .map(|(index, _)| index)
        .collect();

    // The catch handler copy (8 to 11) and the no-exception copy (18 to 20)
    // are folded into the catch-all copy (13 to 17).
    assert_eq!(
        enabled,
        vec![0, 1, 2, 3, 4, 5, 6, 7, 12, 13, 14, 15, 16, 17]
    );

    Ok(())
}

#[test]
fn test_try_without_finally_is_ignored() -> Result<()> {
    let mut method = MethodBuilder::new();
    let l: Vec<Label> = (0..4).map(|_| method.new_label()).collect();

    method
        .try_catch(l[0], l[1], l[2], Some("java/lang/Exception"))
        .label(l[0])
        .insn(Opcode::NOP)
        .label(l[1])
        .jump(Opcode::GOTO, l[3])
        .label(l[2])
        .insn(Opcode::ASTORE)
        .label(l[3])
        .insn(Opcode::RETURN);

    let (events, _) = insert_probes(&method.build());
    let graph = build(&events)?;

    assert!(duplicate_groups(&graph, &FinallyShape::default()).is_empty());

    Ok(())
}

#[test]
fn test_synchronized_block_is_ignored() -> Result<()> {
    let mut method = MethodBuilder::new();
    let l: Vec<Label> = (0..4).map(|_| method.new_label()).collect();

    method
        .try_catch(l[0], l[1], l[2], None)
        .label(l[0])
        .insns(&[Opcode::NOP, Opcode::ALOAD, Opcode::MONITOREXIT])
        .label(l[1])
        .jump(Opcode::GOTO, l[3])
        .label(l[2])
        .insns(&[
            Opcode::ASTORE,
            Opcode::ALOAD,
            Opcode::MONITOREXIT,
            Opcode::ALOAD,
            Opcode::ATHROW,
        ])
        .label(l[3])
        .insn(Opcode::RETURN);

    let (events, _) = insert_probes(&method.build());
    let mut graph = build(&events)?;

    assert!(duplicate_groups(&graph, &FinallyShape::default()).is_empty());

    let shape = FinallyShape::default();
    let ends = FinallyResolver::new(&mut graph, ProbeData::new(None), &shape).resolve();
    assert!(ends.is_empty());
    assert!(graph.insns.iter().all(|insn| insn.is_coverage_enabled()));

    Ok(())
}

/// `try { a(); } catch (RuntimeException e) { b(); throw e; } finally { c(); }`
///
/// The catch handler rethrows, so no copy of the finally block follows it.
fn try_rethrow_finally() -> (Vec<MethodEvent>, Vec<Label>) {
    let mut method = MethodBuilder::new();
    let l: Vec<Label> = (0..8).map(|_| method.new_label()).collect();

    method
        .try_catch(l[0], l[1], l[2], Some("java/lang/RuntimeException"))
        .try_catch(l[0], l[3], l[4], None)
        .label(l[0]);
    println(&mut method).label(l[1]).jump(Opcode::GOTO, l[5]);

    method.label(l[2]).insn(Opcode::ASTORE);
    println(&mut method)
        .insns(&[Opcode::ALOAD, Opcode::ATHROW])
        .label(l[3]);

    method.label(l[4]).insn(Opcode::ASTORE).label(l[6]);
    println(&mut method).insns(&[Opcode::ALOAD, Opcode::ATHROW]);

    method.label(l[5]);
    println(&mut method).label(l[7]).insn(Opcode::RETURN);

    (method.build(), l)
}

#[test]
fn test_rethrowing_catch_handler_has_no_copy() -> Result<()> {
    let (events, l) = try_rethrow_finally();
    let graph = build(&events)?;

    let groups = duplicate_groups(&graph, &FinallyShape::default());
    assert_eq!(groups.get(l[0]), Some(&[l[4], l[5]][..]));

    // Without a look-behind the end of the catch range counts as a copy.
    let shape = FinallyShape {
        athrow_lookbehind: 0,
        ..FinallyShape::default()
    };
    let groups = duplicate_groups(&graph, &shape);
    assert_eq!(groups.get(l[0]), Some(&[l[4], l[3], l[5]][..]));

    Ok(())
}

/// Labels of [`nested_finally`].
struct Nested {
    outer: Label,
    outer_end: Label,
    outer_handler: Label,

    // Inner try statement in the no-exception copy of the outer finally.
    normal_start: Label,
    normal_end: Label,
    normal_handler: Label,

    // Inner try statement in the catch-all copy of the outer finally.
    primary_start: Label,
    primary_end: Label,
    primary_handler: Label,
}

/// `try { a(); } finally { try { b(); } finally { c(); } }`
fn nested_finally() -> (Vec<MethodEvent>, Nested) {
    let mut method = MethodBuilder::new();
    let mut label = || method.new_label();

    let n = Nested {
        outer: label(),
        outer_end: label(),
        outer_handler: label(),
        normal_start: label(),
        normal_end: label(),
        normal_handler: label(),
        primary_start: label(),
        primary_end: label(),
        primary_handler: label(),
    };
    let outer_stored = label();
    let normal_stored = label();
    let normal_done = label();
    let primary_stored = label();
    let primary_done = label();
    let exit = label();

    method
        .try_catch(n.outer, n.outer_end, n.outer_handler, None)
        .try_catch(n.normal_start, n.normal_end, n.normal_handler, None)
        .try_catch(n.primary_start, n.primary_end, n.primary_handler, None)
        .label(n.outer)
        .insn(Opcode::INVOKESTATIC)
        .label(n.outer_end);

    // No-exception copy of the outer finally block.
    method
        .label(n.normal_start)
        .insn(Opcode::INVOKESTATIC)
        .label(n.normal_end)
        .insn(Opcode::INVOKESTATIC)
        .jump(Opcode::GOTO, normal_done)
        .label(n.normal_handler)
        .insn(Opcode::ASTORE)
        .label(normal_stored)
        .insns(&[Opcode::INVOKESTATIC, Opcode::ALOAD, Opcode::ATHROW])
        .label(normal_done)
        .jump(Opcode::GOTO, exit);

    // Catch-all copy of the outer finally block.
    method
        .label(n.outer_handler)
        .insn(Opcode::ASTORE)
        .label(outer_stored)
        .label(n.primary_start)
        .insn(Opcode::INVOKESTATIC)
        .label(n.primary_end)
        .insn(Opcode::INVOKESTATIC)
        .jump(Opcode::GOTO, primary_done)
        .label(n.primary_handler)
        .insn(Opcode::ASTORE)
        .label(primary_stored)
        .insns(&[Opcode::INVOKESTATIC, Opcode::ALOAD, Opcode::ATHROW])
        .label(primary_done)
        .insns(&[Opcode::ALOAD, Opcode::ATHROW]);

    method.label(exit).insn(Opcode::RETURN);

    (method.build(), n)
}

#[test]
fn test_nested_finally_groups_are_found() -> Result<()> {
    let (events, n) = nested_finally();
    let graph = build(&events)?;

    let groups = duplicate_groups(&graph, &FinallyShape::default());

    assert_eq!(groups.len(), 3);
    assert_eq!(groups.get(n.outer), Some(&[n.outer_handler, n.outer_end][..]));
    assert_eq!(
        groups.get(n.normal_start),
        Some(&[n.normal_handler, n.normal_end][..])
    );
    assert_eq!(
        groups.get(n.primary_start),
        Some(&[n.primary_handler, n.primary_end][..])
    );

    Ok(())
}

#[test]
fn test_nested_finally_groups_collapse() -> Result<()> {
    let (events, n) = nested_finally();
    let mut graph = build(&events)?;

    let shape = FinallyShape::default();
    let mut groups = duplicate_groups(&graph, &shape);
    assert_eq!(groups.pop_front().map(|(key, _)| key), Some(n.outer));

    let cursors = [
        graph.atoms.position(n.primary_start),
        graph.atoms.position(n.normal_start),
    ];
    let cursors: Vec<isize> = cursors.into_iter().flatten().collect();
    assert_eq!(cursors.len(), 2);

    FinallyResolver::new(&mut graph, ProbeData::new(None), &shape)
        .collapse_nested(&cursors, &mut groups);

    // One group, keyed by the inner try statement of the catch-all copy.
    assert_eq!(groups.len(), 1);
    assert!(!groups.contains(n.normal_start));
    assert_eq!(
        groups.get(n.primary_start),
        Some(
            &[
                n.primary_handler,
                n.primary_end,
                n.normal_handler,
                n.normal_end
            ][..]
        )
    );

    Ok(())
}

#[test]
fn test_nested_finally_copies_are_disabled() -> Result<()> {
    let (events, _) = nested_finally();
    let mut graph = build(&events)?;

    let shape = FinallyShape::default();
    let ends = FinallyResolver::new(&mut graph, ProbeData::new(None), &shape).resolve();

    // The outer block closes on its rethrow. The merged inner group does not
    // line up and is left as is.
    assert_eq!(
        ends,
        vec![FinallyBlockEnd {
            primary: InsnId(18),
            others: vec![InsnId(7)],
        }]
    );

    let disabled: Vec<usize> = graph
        .insns
        .iter()
        .enumerate()
        .filter(|(_, insn)| !insn.is_coverage_enabled())
        .map(|(index, _)| index)
        .collect();

    // The inner try statement of the no-exception copy (1 to 7) is folded
    // into the one of the catch-all copy (10 to 16).
    assert_eq!(disabled, vec![1, 2, 3, 4, 5, 6, 7]);

    Ok(())
}

#[test]
fn test_extreme_shapes_leave_copies_unmerged() -> Result<()> {
    let (events, _) = try_catch_finally();
    let (events, _) = insert_probes(&events);

    let shapes = [
        FinallyShape {
            region_entry_skip: isize::MAX,
            ..FinallyShape::default()
        },
        FinallyShape {
            catch_all_extra_skip: isize::MAX,
            ..FinallyShape::default()
        },
        FinallyShape {
            region_entry_skip: isize::MIN,
            ..FinallyShape::default()
        },
    ];

    for shape in &shapes {
        let mut graph = build(&events)?;
        let ends = FinallyResolver::new(&mut graph, ProbeData::new(None), shape).resolve();

        assert!(ends.is_empty(), "{:?}", shape);
        assert!(
            graph.insns.iter().all(|insn| insn.is_coverage_enabled()),
            "{:?}",
            shape
        );
    }

    Ok(())
}

#[test]
fn test_extreme_windows_do_not_panic() -> Result<()> {
    let (events, _) = try_catch_finally();
    let (events, _) = insert_probes(&events);

    let shapes = [
        FinallyShape {
            athrow_lookbehind: isize::MAX,
            goto_lookbehind: isize::MIN,
            goto_lookahead: isize::MAX,
            handler_adjacency: isize::MAX,
            ..FinallyShape::default()
        },
        FinallyShape {
            athrow_lookbehind: isize::MIN,
            goto_lookbehind: isize::MAX,
            goto_lookahead: isize::MIN,
            handler_adjacency: isize::MIN,
            ..FinallyShape::default()
        },
        FinallyShape {
            probe_tail_primary_advance: isize::MAX,
            tail_duplicate_advance: isize::MIN,
            end_search_min: isize::MIN,
            end_search_max: isize::MAX,
            ..FinallyShape::default()
        },
    ];

    for shape in &shapes {
        let mut graph = build(&events)?;
        let ends = FinallyResolver::new(&mut graph, ProbeData::new(None), shape).resolve();

        assert!(ends.len() <= 1, "{:?}", shape);
    }

    Ok(())
}
