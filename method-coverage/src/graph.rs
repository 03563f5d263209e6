// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, HashSet};

use method_flow::{Label, LabelFlow, MethodEvent, Opcode, ProbeId, SwitchTarget};

use crate::atom::{Atoms, MethodAtom};
use crate::filter::CoverageFilter;
use crate::finally::FinallyBlockEnd;
use crate::instruction::{InsnId, Instruction, Instructions};
use crate::probes::ProbeData;
use crate::try_catch::TryCatchIndex;

/// Control transfer from an instruction to a label.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Jump {
    pub source: InsnId,
    pub target: Label,
}

/// Builds the instruction graph of one method from its event stream.
pub struct FlowBuilder<'l, 'p, F> {
    labels: &'l LabelFlow,
    probes: ProbeData<'p>,
    filter: F,

    insns: Instructions,
    atoms: Atoms,
    try_catch: TryCatchIndex,

    label_insns: HashMap<Label, InsnId>,
    pending_labels: Vec<Label>,
    last_insn: Option<InsnId>,

    current_line: Option<u32>,
    first_line: Option<u32>,
    last_line: Option<u32>,

    // Edges still to be wired once every label is placed.
    jumps: Vec<Jump>,

    // Edges measured by their own probe.
    probed_jumps: Vec<Jump>,

    probe_insns: HashMap<ProbeId, InsnId>,
    covered_probes: Vec<InsnId>,
    disabled_probes: Vec<InsnId>,
}

impl<'l, 'p, F: CoverageFilter> FlowBuilder<'l, 'p, F> {
    pub fn new(labels: &'l LabelFlow, probes: ProbeData<'p>, filter: F) -> Self {
        Self {
            labels,
            probes,
            filter,
            insns: Instructions::default(),
            atoms: Atoms::default(),
            try_catch: TryCatchIndex::default(),
            label_insns: HashMap::new(),
            pending_labels: vec![],
            last_insn: None,
            current_line: None,
            first_line: None,
            last_line: None,
            jumps: vec![],
            probed_jumps: vec![],
            probe_insns: HashMap::new(),
            covered_probes: vec![],
            disabled_probes: vec![],
        }
    }

    pub fn visit(&mut self, event: &MethodEvent) {
        self.filter.visit(event);

        match event {
            MethodEvent::Label { label } => self.visit_label(*label),
            MethodEvent::LineNumber { line, .. } => self.visit_line(*line),
            MethodEvent::Insn { opcode } => {
                self.visit_insn(*opcode);
            }
            MethodEvent::InsnWithProbe { opcode, probe } => {
                self.add_probe_atom(*probe);
                self.visit_insn(*opcode);
                self.add_probe(*probe);
            }
            MethodEvent::Jump { opcode, target } => {
                let source = self.visit_insn(*opcode);
                self.jumps.push(Jump {
                    source,
                    target: *target,
                });
            }
            MethodEvent::JumpWithProbe {
                opcode,
                target,
                probe,
            } => {
                self.add_probe_atom(*probe);
                let source = self.visit_insn(*opcode);
                self.probed_jumps.push(Jump {
                    source,
                    target: *target,
                });
                self.add_probe(*probe);
            }
            MethodEvent::TableSwitch {
                default, targets, ..
            } => self.visit_switch(Opcode::TABLESWITCH, *default, targets),
            MethodEvent::LookupSwitch {
                default, targets, ..
            } => self.visit_switch(Opcode::LOOKUPSWITCH, *default, targets),
            MethodEvent::TableSwitchWithProbes {
                default, targets, ..
            } => self.visit_switch_with_probes(Opcode::TABLESWITCH, default, targets),
            MethodEvent::LookupSwitchWithProbes {
                default, targets, ..
            } => self.visit_switch_with_probes(Opcode::LOOKUPSWITCH, default, targets),
            MethodEvent::TryCatch(block) => self.try_catch.insert(block.clone()),
            MethodEvent::Probe { probe } => {
                self.add_probe(*probe);
                self.add_probe_atom(*probe);
                self.last_insn = None;
            }
        }
    }

    /// Wire the pending jumps and hand over the finished graph.
    pub fn finish(mut self) -> FlowGraph {
        for jump in &self.jumps {
            match self.label_insns.get(&jump.target) {
                Some(target) => self.insns.set_predecessor(*target, jump.source),
                None => debug!(
                    "dropping jump from {} to {}: no instruction follows the label",
                    jump.source, jump.target
                ),
            }
        }

        let mut jumps = self.probed_jumps;
        jumps.extend(self.jumps);

        FlowGraph {
            insns: self.insns,
            atoms: self.atoms,
            try_catch: self.try_catch,
            jumps,
            probe_insns: self.probe_insns,
            covered_probes: self.covered_probes,
            disabled_probes: self.disabled_probes,
            first_line: self.first_line,
            last_line: self.last_line,
        }
    }

    fn visit_label(&mut self, label: Label) {
        self.atoms.push(MethodAtom::Label(label));
        self.pending_labels.push(label);

        if !self.labels.is_successor(label) {
            self.last_insn = None;
        }
    }

    fn visit_line(&mut self, line: u32) {
        self.current_line = Some(line);
        self.first_line = Some(self.first_line.map_or(line, |first| first.min(line)));
        self.last_line = Some(self.last_line.map_or(line, |last| last.max(line)));
    }

    fn visit_insn(&mut self, opcode: Opcode) -> InsnId {
        let insn = Instruction::new(opcode, self.current_line, self.filter.enabled());
        let id = self.insns.push(insn);
        self.atoms.push(MethodAtom::Insn(id));

        if let Some(last) = self.last_insn {
            self.insns.set_predecessor(id, last);
        }

        for label in self.pending_labels.drain(..) {
            self.label_insns.entry(label).or_insert(id);
        }

        self.last_insn = Some(id);
        id
    }

    fn visit_switch(&mut self, opcode: Opcode, default: Label, targets: &[Label]) {
        let source = self.visit_insn(opcode);

        // Cases sharing a label are one branch at runtime.
        let mut done = HashSet::new();
        for target in std::iter::once(&default).chain(targets) {
            if done.insert(*target) {
                self.jumps.push(Jump {
                    source,
                    target: *target,
                });
            }
        }
    }

    fn visit_switch_with_probes(
        &mut self,
        opcode: Opcode,
        default: &SwitchTarget,
        targets: &[SwitchTarget],
    ) {
        let source = self.visit_insn(opcode);

        let mut done = HashSet::new();
        for target in std::iter::once(default).chain(targets) {
            if !done.insert(target.label) {
                continue;
            }

            match target.probe {
                Some(probe) => {
                    self.add_probe(probe);
                    self.add_probe_atom(probe);
                }
                None => self.jumps.push(Jump {
                    source,
                    target: target.label,
                }),
            }
        }
    }

    fn add_probe_atom(&mut self, probe: ProbeId) {
        if self.last_insn.is_some() {
            self.atoms.push(MethodAtom::Probe(probe));
        }
    }

    fn add_probe(&mut self, probe: ProbeId) {
        let Some(last) = self.last_insn else {
            trace!("probe {} has no preceding instruction", probe);
            return;
        };

        self.probe_insns.insert(probe, last);
        self.insns.add_branch(last);

        if self.probes.executed(probe) {
            self.covered_probes.push(last);
        }

        if !self.insns[last].is_coverage_enabled() {
            self.disabled_probes.push(last);
        }
    }
}

/// Instruction graph of one method, with the bookkeeping needed to merge
/// `finally` duplicates and to propagate probe coverage.
#[derive(Clone, Debug, Default)]
pub struct FlowGraph {
    pub insns: Instructions,
    pub atoms: Atoms,
    pub try_catch: TryCatchIndex,

    /// Every jump, probed ones first, in emission order within each kind.
    pub jumps: Vec<Jump>,

    pub probe_insns: HashMap<ProbeId, InsnId>,

    /// Instructions preceding an executed probe, once per probe.
    pub covered_probes: Vec<InsnId>,

    /// Instructions preceding a probe whose coverage is disabled.
    pub disabled_probes: Vec<InsnId>,

    pub first_line: Option<u32>,
    pub last_line: Option<u32>,
}

impl FlowGraph {
    /// Label targeted by the first jump leaving `source`.
    pub fn jump_target(&self, source: InsnId) -> Option<Label> {
        self.jumps
            .iter()
            .find(|jump| jump.source == source)
            .map(|jump| jump.target)
    }

    /// Instruction whose branch is measured by `probe`.
    pub fn probe_insn(&self, probe: ProbeId) -> Option<InsnId> {
        self.probe_insns.get(&probe).copied()
    }

    /// Spread executed probes backward along the predecessor chains, then
    /// withdraw the branches measured by disabled probes.
    pub fn propagate_probes(&mut self) {
        for id in &self.covered_probes {
            self.insns.set_covered(*id);
        }

        for id in &self.disabled_probes {
            self.insns.set_disabled(*id);
        }
    }

    /// Credit the last instruction of the catch-all copy of a `finally`
    /// block when any other copy of it ran to completion.
    pub fn merge_finally_ends(&mut self, ends: &[FinallyBlockEnd]) {
        for end in ends {
            if self.insns[end.primary].is_covered() {
                continue;
            }

            if end.others.iter().any(|id| self.insns[*id].is_covered()) {
                self.insns.set_covered(end.primary);
            }
        }
    }
}
