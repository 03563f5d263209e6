// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::{Deserialize, Serialize};

use crate::counter::{Counter, CoverageStatus};
use crate::instruction::{Instruction, Instructions};

/// Coverage of a single method.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MethodCoverage {
    pub name: String,
    pub desc: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    pub first_line: Option<u32>,
    pub last_line: Option<u32>,

    /// One entry per line in `first_line..=last_line`.
    pub lines: Vec<LineCoverage>,

    pub counters: MethodCounters,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct MethodCounters {
    pub instructions: Counter,
    pub branches: Counter,
    pub lines: Counter,

    /// Cyclomatic complexity.
    pub complexity: Counter,

    /// Whether the method ran at all.
    pub method: Counter,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct LineCoverage {
    pub instructions: Counter,
    pub branches: Counter,
}

impl LineCoverage {
    pub fn status(&self) -> CoverageStatus {
        self.instructions
            .status()
            .combine(self.branches.status())
    }
}

impl MethodCoverage {
    pub fn new(name: impl Into<String>, desc: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            signature,
            ..Self::default()
        }
    }

    /// Coverage of source line `line`. Lines without instructions are empty.
    pub fn line(&self, line: u32) -> LineCoverage {
        self.line_index(line)
            .and_then(|index| self.lines.get(index))
            .copied()
            .unwrap_or_default()
    }

    /// Lines in ascending order, with their line numbers.
    pub fn iter_lines(&self) -> impl Iterator<Item = (u32, &LineCoverage)> {
        let first = self.first_line.unwrap_or(0);
        (first..).zip(&self.lines)
    }

    /// Account the final state of every instruction of the method.
    pub fn report(&mut self, first_line: Option<u32>, last_line: Option<u32>, insns: &Instructions) {
        self.first_line = first_line;
        self.last_line = last_line;

        if let (Some(first), Some(last)) = (first_line, last_line) {
            let len = last.saturating_sub(first) as usize + 1;
            self.lines = vec![LineCoverage::default(); len];
        }

        for insn in insns.iter() {
            let (instructions, branches) = insn_counters(insn);
            self.increment(instructions, branches, insn.line);
        }

        self.counters.lines = self
            .lines
            .iter()
            .filter(|line| !line.instructions.is_empty())
            .map(|line| {
                if line.instructions.covered > 0 {
                    Counter::COVERED
                } else {
                    Counter::MISSED
                }
            })
            .sum();

        let method = if self.counters.instructions.covered == 0 {
            Counter::MISSED
        } else {
            Counter::COVERED
        };

        self.counters.method += method;
        self.counters.complexity += method;
    }

    fn increment(&mut self, instructions: Counter, branches: Counter, line: Option<u32>) {
        if let Some(line) = line.and_then(|line| self.line_index(line)) {
            if let Some(entry) = self.lines.get_mut(line) {
                entry.instructions += instructions;
                entry.branches += branches;
            }
        }

        self.counters.instructions += instructions;
        self.counters.branches += branches;

        // Every decision adds one to the complexity of the method.
        if branches.total() > 1 {
            let covered = branches.covered.saturating_sub(1);
            let missed = branches.total().saturating_sub(covered + 1);
            self.counters.complexity += Counter::new(missed, covered);
        }
    }

    fn line_index(&self, line: u32) -> Option<usize> {
        let first = self.first_line?;
        let last = self.last_line?;

        if (first..=last).contains(&line) {
            Some((line - first) as usize)
        } else {
            None
        }
    }
}

fn insn_counters(insn: &Instruction) -> (Counter, Counter) {
    if !insn.is_coverage_enabled() {
        return (Counter::EMPTY, Counter::EMPTY);
    }

    let instructions = if insn.is_covered() {
        Counter::COVERED
    } else {
        Counter::MISSED
    };

    let total = insn.branches();
    let branches = if total > 1 {
        let covered = insn.covered_branches().min(total);
        Counter::new(total - covered, covered)
    } else {
        Counter::EMPTY
    };

    (instructions, branches)
}
