// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashSet;

use method_flow::{Label, MethodEvent};

/// Decides whether the coverage of an instruction should be reported.
///
/// The analyzer shows every event to the filter before processing it, and
/// queries [`CoverageFilter::enabled`] once for every instruction it creates.
pub trait CoverageFilter {
    fn visit(&mut self, _event: &MethodEvent) {}

    fn enabled(&self) -> bool;
}

/// Reports the coverage of every instruction.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFilter;

impl CoverageFilter for NoFilter {
    fn enabled(&self) -> bool {
        true
    }
}

/// Hides catch-all handlers from their entry label up to their rethrow, which
/// removes the exception exit of `synchronized` blocks from the report.
///
/// The catch-all copies of `finally` blocks are hidden as well, so merging of
/// finally duplicates has nothing left to credit for them.
#[derive(Clone, Debug)]
pub struct SynchronizedFilter {
    handlers: HashSet<Label>,
    enabled: bool,

    // A probed rethrow is itself hidden; coverage resumes after it.
    resume: bool,
}

impl Default for SynchronizedFilter {
    fn default() -> Self {
        Self {
            handlers: HashSet::new(),
            enabled: true,
            resume: false,
        }
    }
}

impl SynchronizedFilter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CoverageFilter for SynchronizedFilter {
    fn visit(&mut self, event: &MethodEvent) {
        if self.resume {
            self.enabled = true;
            self.resume = false;
        }

        match event {
            MethodEvent::TryCatch(block) if block.is_finally() => {
                self.handlers.insert(block.handler);
            }
            MethodEvent::Label { label } if self.handlers.contains(label) => {
                self.enabled = false;
            }
            MethodEvent::Insn { opcode } if opcode.is_throw() => {
                self.enabled = true;
            }
            MethodEvent::InsnWithProbe { opcode, .. } if opcode.is_throw() && !self.enabled => {
                self.resume = true;
            }
            _ => {}
        }
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}

impl<F: CoverageFilter + ?Sized> CoverageFilter for &mut F {
    fn visit(&mut self, event: &MethodEvent) {
        (**self).visit(event)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}

impl<F: CoverageFilter + ?Sized> CoverageFilter for Box<F> {
    fn visit(&mut self, event: &MethodEvent) {
        (**self).visit(event)
    }

    fn enabled(&self) -> bool {
        (**self).enabled()
    }
}
