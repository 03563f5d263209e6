// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::ops::Index;

use method_flow::Opcode;

/// Index of an instruction within the method's [`Instructions`] arena.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InsnId(pub usize);

impl fmt::Display for InsnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coverage state of a single bytecode instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,

    /// Source line, if the method carries line numbers for it.
    pub line: Option<u32>,

    coverage_enabled: bool,
    branches: u32,
    covered_branches: u32,
    predecessor: Option<InsnId>,
}

impl Instruction {
    pub fn new(opcode: Opcode, line: Option<u32>, coverage_enabled: bool) -> Self {
        Self {
            opcode,
            line,
            coverage_enabled,
            branches: 0,
            covered_branches: 0,
            predecessor: None,
        }
    }

    /// Number of outgoing edges: fall-through, jumps and probes.
    pub fn branches(&self) -> u32 {
        self.branches
    }

    /// Number of outgoing edges known to be executed.
    pub fn covered_branches(&self) -> u32 {
        self.covered_branches
    }

    pub fn is_covered(&self) -> bool {
        self.covered_branches > 0
    }

    pub fn is_coverage_enabled(&self) -> bool {
        self.coverage_enabled
    }

    pub fn predecessor(&self) -> Option<InsnId> {
        self.predecessor
    }
}

/// Arena owning every instruction of one method.
///
/// Predecessor links are arena indices, so they may form cycles without any
/// ownership concerns. Walks along them stop before revisiting a node.
#[derive(Clone, Debug, Default)]
pub struct Instructions {
    insns: Vec<Instruction>,
}

impl Instructions {
    pub fn push(&mut self, insn: Instruction) -> InsnId {
        let id = InsnId(self.insns.len());
        self.insns.push(insn);
        id
    }

    pub fn get(&self, id: InsnId) -> Option<&Instruction> {
        self.insns.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.insns.iter()
    }

    pub fn add_branch(&mut self, id: InsnId) {
        let insn = &mut self.insns[id.0];
        insn.branches = insn.branches.saturating_add(1);
    }

    /// Link `id` to the instruction control reaches it from.
    ///
    /// Every call adds an outgoing branch to `predecessor`, but only the first
    /// link is kept for coverage propagation.
    pub fn set_predecessor(&mut self, id: InsnId, predecessor: InsnId) {
        self.add_branch(predecessor);

        let insn = &mut self.insns[id.0];
        if insn.predecessor.is_none() {
            insn.predecessor = Some(predecessor);
        }
    }

    /// Mark one outgoing branch of `id` as executed.
    ///
    /// The first covered branch of an instruction proves that the instruction
    /// itself ran, which in turn covers the edge from its predecessor.
    pub fn set_covered(&mut self, id: InsnId) {
        let mut next = Some(id);

        while let Some(id) = next {
            let insn = &mut self.insns[id.0];
            let first = insn.covered_branches == 0;
            insn.covered_branches = insn.covered_branches.saturating_add(1);

            if !first {
                break;
            }

            next = insn.predecessor;
        }
    }

    /// Withdraw a branch measured by a disabled probe.
    ///
    /// The branch is taken from the nearest enabled instruction on the
    /// predecessor chain, as long as that leaves it with at least one branch.
    pub fn set_disabled(&mut self, id: InsnId) {
        let limit = self.insns.len();
        let mut next = Some(id);
        let mut steps = 0;

        while let Some(id) = next {
            let insn = &mut self.insns[id.0];

            if insn.coverage_enabled {
                if insn.branches > 1 {
                    insn.branches -= 1;
                }
                break;
            }

            // Disabled predecessor chains may loop back on themselves.
            steps += 1;
            if steps > limit {
                break;
            }

            next = insn.predecessor;
        }
    }

    /// Exclude `id` from reported coverage.
    pub fn disable(&mut self, id: InsnId) {
        self.insns[id.0].coverage_enabled = false;
    }
}

impl Index<InsnId> for Instructions {
    type Output = Instruction;

    fn index(&self, id: InsnId) -> &Instruction {
        &self.insns[id.0]
    }
}
