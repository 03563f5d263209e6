// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Merging of compiler-duplicated `finally` blocks.
//!
//! `javac` inlines the body of a `finally` block once per exit of the try
//! statement: after the try body, after each catch handler, and in a
//! catch-all handler that rethrows. For a try statement
//!
//! ```text
//! try { a(); } catch (E e) { b(); } finally { c(); }
//! ```
//!
//! the method body holds three copies of `c()`. Each copy carries its own
//! probes, so a line of `c()` would be reported as partly covered whenever
//! only some exits were taken. The resolver finds the copies, walks them in
//! lock-step, and keeps the catch-all copy (the *primary*) as the one that is
//! reported, folding the coverage of the other copies into it.

use method_flow::{Label, Opcode};

use crate::atom::AtomKind;
use crate::graph::FlowGraph;
use crate::instruction::InsnId;
use crate::options::FinallyShape;
use crate::probes::ProbeData;
use crate::try_catch::TryGroup;

/// Closing instructions of the copies of one `finally` block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FinallyBlockEnd {
    /// Last instruction of the catch-all copy.
    pub primary: InsnId,

    /// Last instruction of every other copy.
    pub others: Vec<InsnId>,
}

/// Entry labels of the copies of `finally` blocks, keyed by the start label
/// of the try block they belong to.
///
/// The first entry label of every group is the catch-all handler.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DuplicateGroups {
    groups: Vec<(Label, Vec<Label>)>,
}

impl DuplicateGroups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: Label) -> Option<&[Label]> {
        self.groups
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, regions)| regions.as_slice())
    }

    pub fn contains(&self, key: Label) -> bool {
        self.get(key).is_some()
    }

    fn push(&mut self, key: Label, regions: Vec<Label>) {
        self.groups.push((key, regions));
    }

    fn remove(&mut self, key: Label) -> Option<Vec<Label>> {
        let index = self.groups.iter().position(|(k, _)| *k == key)?;
        Some(self.groups.remove(index).1)
    }

    fn pop_front(&mut self) -> Option<(Label, Vec<Label>)> {
        if self.groups.is_empty() {
            None
        } else {
            Some(self.groups.remove(0))
        }
    }
}

/// Locate the copies of every `finally` block of the method.
pub fn duplicate_groups(graph: &FlowGraph, shape: &FinallyShape) -> DuplicateGroups {
    let mut groups = DuplicateGroups::default();

    for group in graph.try_catch.groups() {
        if !group.has_finally() {
            continue;
        }

        match group_regions(graph, shape, group) {
            Some(regions) if regions.len() > 1 => groups.push(group.start, regions),
            Some(_) => {}
            None => debug!("try block at {}: no finally layout found", group.start),
        }
    }

    groups
}

fn group_regions(graph: &FlowGraph, shape: &FinallyShape, group: &TryGroup) -> Option<Vec<Label>> {
    let atoms = &graph.atoms;
    let opcode_at = |pos: isize| atoms.insn(pos).map(|id| graph.insns[id].opcode);

    // The catch-all handlers of the try block itself.
    let mut regions: Vec<Label> = group
        .blocks
        .iter()
        .filter(|b| b.is_finally() && b.start == group.start)
        .map(|b| b.handler)
        .collect();

    // The copies inlined at the end of each catch handler.
    if let Some(catch_end) = group.catch_end() {
        for block in group.blocks.iter().filter(|b| b.is_finally()) {
            if block.end == catch_end {
                continue;
            }

            let Some(end) = atoms.position(block.end) else {
                trace!("finally range end {} is not placed", block.end);
                continue;
            };

            let rethrows = atoms
                .window(end.saturating_sub(shape.athrow_lookbehind), end - 1)
                .any(|pos| opcode_at(pos) == Some(Opcode::ATHROW));

            if !rethrows && !regions.contains(&block.end) {
                regions.push(block.end);
            }
        }
    }

    // The copy run when the try body completes normally.
    let first = group.blocks.first()?;
    let first_end = atoms.position(first.end)?;

    if opcode_at(first_end - 1) == Some(Opcode::MONITOREXIT) {
        // Synchronized blocks release the monitor in their own handler.
        trace!("try block at {} guards a monitor", group.start);
        return Some(vec![]);
    }

    let mut goto = None;
    let search = atoms.window(
        first_end.saturating_sub(shape.goto_lookbehind),
        first_end.saturating_add(shape.goto_lookahead),
    );
    for pos in search {
        if let Some(id) = atoms.insn(pos) {
            if graph.insns[id].opcode == Opcode::GOTO {
                goto = Some(id);
                break;
            }

            if pos >= first_end {
                break;
            }
        }
    }

    let no_exception = match goto {
        Some(id) => graph.jump_target(id),
        None => {
            let adjacent = atoms
                .position(first.handler)
                .map_or(false, |handler| {
                    handler.checked_add(shape.handler_adjacency) == Some(first_end)
                });

            if adjacent {
                None
            } else {
                Some(first.end)
            }
        }
    };

    regions.extend(no_exception);

    Some(regions)
}

/// Aligns the copies of each `finally` block and merges their coverage.
pub struct FinallyResolver<'g, 'p> {
    graph: &'g mut FlowGraph,
    probes: ProbeData<'p>,
    shape: &'g FinallyShape,
}

impl<'g, 'p> FinallyResolver<'g, 'p> {
    pub fn new(graph: &'g mut FlowGraph, probes: ProbeData<'p>, shape: &'g FinallyShape) -> Self {
        Self {
            graph,
            probes,
            shape,
        }
    }

    /// Disable the duplicated instructions and return the closing
    /// instructions of every merged block.
    ///
    /// Executed probes of duplicates are recorded as executed for the primary
    /// copy, so this must run before probe coverage is propagated.
    pub fn resolve(mut self) -> Vec<FinallyBlockEnd> {
        let mut groups = duplicate_groups(self.graph, self.shape);
        let mut ends = vec![];

        while let Some((start, regions)) = groups.pop_front() {
            debug!(
                "try block at {}: aligning {} copies of its finally block",
                start,
                regions.len()
            );

            match self.align(&regions, &mut groups) {
                Some(end) => ends.push(end),
                None => debug!("try block at {}: finally block ends not found", start),
            }
        }

        ends
    }

    fn align(&mut self, regions: &[Label], groups: &mut DuplicateGroups) -> Option<FinallyBlockEnd> {
        let shape = self.shape;

        let mut cursors = regions
            .iter()
            .map(|label| {
                let pos = self.graph.atoms.position(*label)?;
                pos.checked_add(shape.region_entry_skip)
            })
            .collect::<Option<Vec<isize>>>()?;

        if cursors.len() < 2 {
            return None;
        }

        // The catch-all copy starts by storing the exception it rethrows.
        cursors[0] = cursors[0].checked_add(shape.catch_all_extra_skip)?;

        let mut aligned = cursors.clone();

        while let Some(kind) = self.graph.atoms.common_kind(&cursors) {
            match kind {
                AtomKind::Probe => self.merge_probes(&cursors),
                AtomKind::Label => self.collapse_nested(&cursors, groups),
                AtomKind::Insn => {
                    if !self.same_opcodes(&cursors) {
                        break;
                    }

                    self.disable_duplicates(&cursors);
                    aligned.copy_from_slice(&cursors);
                }
            }

            for cursor in cursors.iter_mut() {
                *cursor += 1;
            }

            if !cursors.iter().all(|pos| self.graph.atoms.contains(*pos)) {
                break;
            }
        }

        trace!("last aligned atoms: {:?}", aligned);

        let ends = self.block_ends(aligned)?;
        trace!("closing atoms: {:?}", ends);

        let atoms = &self.graph.atoms;
        let primary = atoms.insn(ends[0])?;
        let others = ends[1..]
            .iter()
            .map(|pos| atoms.insn(*pos))
            .collect::<Option<Vec<InsnId>>>()?;

        self.disable_duplicates(&ends);

        Some(FinallyBlockEnd { primary, others })
    }

    /// Move from the last aligned instructions to the closing instruction of
    /// every copy.
    ///
    /// The catch-all copy ends with its rethrow. The catch handler copies end
    /// with the jump past the try statement, and the no-exception copy with
    /// its last instruction.
    fn block_ends(&mut self, mut ends: Vec<isize>) -> Option<Vec<isize>> {
        let shape = self.shape;
        let last = ends.len() - 1;

        let after = ends[0].checked_add(1)?;
        if self.graph.atoms.is_probe(after) {
            // The copies close on a probe. Copies other than the catch-all
            // place a label before theirs.
            ends[0] = after;
            for end in ends[1..].iter_mut() {
                *end = end.checked_add(1)?;
                if !self.graph.atoms.is_probe(*end) {
                    *end = end.checked_add(1)?;
                }
            }

            if self.graph.atoms.common_kind(&ends) == Some(AtomKind::Probe) {
                self.merge_probes(&ends);
            }

            ends[0] = ends[0].checked_add(shape.probe_tail_primary_advance)?;
            for end in ends[1..last].iter_mut() {
                *end = end.checked_add(1)?;
            }

            let next = ends[last].checked_add(1)?;
            ends[last] = if self.graph.atoms.is_insn(next) {
                next
            } else {
                ends[last].checked_sub(1)?
            };
        } else {
            let primary = ends[0];
            let found = self
                .graph
                .atoms
                .window(
                    primary.saturating_add(shape.end_search_min),
                    primary.saturating_add(shape.end_search_max),
                )
                .find(|pos| self.graph.atoms.is_insn(*pos));

            if let Some(pos) = found {
                ends[0] = pos;
            }

            for end in ends[1..last].iter_mut() {
                *end = end.checked_add(shape.tail_duplicate_advance)?;
            }
        }

        Some(ends)
    }

    /// Credit the probe of the catch-all copy when the probe of any other copy
    /// fired.
    fn merge_probes(&mut self, cursors: &[isize]) {
        let atoms = &self.graph.atoms;

        let duplicate_executed = cursors[1..]
            .iter()
            .filter_map(|pos| atoms.probe(*pos))
            .any(|probe| self.probes.executed(probe));

        if !duplicate_executed {
            return;
        }

        let Some(primary) = atoms.probe(cursors[0]) else {
            return;
        };

        if self.probes.executed(primary) {
            return;
        }

        if let Some(insn) = self.graph.probe_insn(primary) {
            trace!("probe {} covered by a duplicate", primary);
            self.graph.covered_probes.push(insn);
        }
    }

    /// Fold groups of nested `finally` blocks whose copies start at these
    /// labels into one group, queued after the others.
    fn collapse_nested(&self, cursors: &[isize], groups: &mut DuplicateGroups) {
        let mut key = None;
        let mut merged = vec![];

        for pos in cursors {
            let Some(label) = self.graph.atoms.label(*pos) else {
                continue;
            };

            if let Some(regions) = groups.remove(label) {
                key.get_or_insert(label);
                merged.extend(regions);
            }
        }

        if let Some(key) = key {
            trace!("nested finally copies merged into group {}", key);
            groups.push(key, merged);
        }
    }

    fn same_opcodes(&self, cursors: &[isize]) -> bool {
        let mut opcodes = cursors
            .iter()
            .filter_map(|pos| self.graph.atoms.insn(*pos))
            .map(|id| self.graph.insns[id].opcode);

        match opcodes.next() {
            Some(first) => opcodes.all(|opcode| opcode == first),
            None => false,
        }
    }

    fn disable_duplicates(&mut self, cursors: &[isize]) {
        for pos in &cursors[1..] {
            if let Some(id) = self.graph.atoms.insn(*pos) {
                self.graph.insns.disable(id);
            }
        }
    }
}

#[cfg(test)]
mod tests;
