// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeSet, HashMap};

use fixedbitset::FixedBitSet;

use crate::error::FlowError;
use crate::event::{Label, MethodEvent};

/// Control-flow properties of the labels of one method body.
///
/// A label is a *target* if some instruction or exception handler entry can
/// transfer control to it, and a *successor* if the instruction emitted before
/// it can fall through to it. A label that is reachable along more than one
/// path is a *multi-target*.
///
/// Label ids need not be dense: every label is given a slot in the order it is
/// first seen, and the flags are kept per slot.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LabelFlow {
    slots: HashMap<Label, usize>,
    targets: FixedBitSet,
    successors: FixedBitSet,
    multi_targets: FixedBitSet,
}

impl LabelFlow {
    /// Mark the labels of a complete method body.
    pub fn analyze(events: &[MethodEvent]) -> Result<Self, FlowError> {
        let mut flow = Self::default();

        // Control falls into the first placed label from the method entry.
        let mut first = true;
        let mut successor = false;

        for event in events {
            match event {
                MethodEvent::TryCatch(block) => {
                    flow.set_target(block.start);
                    flow.set_target(block.handler);
                }
                MethodEvent::Label { label } => {
                    if first {
                        flow.set_target(*label);
                    }

                    if successor {
                        flow.set_successor(*label);
                    }
                }
                MethodEvent::Jump { opcode, target }
                | MethodEvent::JumpWithProbe { opcode, target, .. } => {
                    if opcode.is_subroutine() {
                        return Err(FlowError::Subroutine { opcode: *opcode });
                    }

                    flow.set_target(*target);
                    successor = !opcode.is_goto();
                    first = false;
                }
                MethodEvent::Insn { opcode } | MethodEvent::InsnWithProbe { opcode, .. } => {
                    if opcode.is_subroutine() {
                        return Err(FlowError::Subroutine { opcode: *opcode });
                    }

                    successor = !opcode.ends_flow();
                    first = false;
                }
                MethodEvent::TableSwitch { .. }
                | MethodEvent::TableSwitchWithProbes { .. }
                | MethodEvent::LookupSwitch { .. }
                | MethodEvent::LookupSwitchWithProbes { .. } => {
                    let distinct: BTreeSet<Label> =
                        event.switch_labels().into_iter().flatten().collect();

                    for label in distinct {
                        flow.set_target(label);
                    }

                    successor = false;
                    first = false;
                }
                MethodEvent::LineNumber { .. } | MethodEvent::Probe { .. } => {}
            }
        }

        debug!(
            "label flow: {} targets, {} successors, {} multi-targets",
            flow.targets.count_ones(..),
            flow.successors.count_ones(..),
            flow.multi_targets.count_ones(..),
        );

        Ok(flow)
    }

    pub fn is_target(&self, label: Label) -> bool {
        self.flag(&self.targets, label)
    }

    pub fn is_successor(&self, label: Label) -> bool {
        self.flag(&self.successors, label)
    }

    pub fn is_multi_target(&self, label: Label) -> bool {
        self.flag(&self.multi_targets, label)
    }

    fn flag(&self, set: &FixedBitSet, label: Label) -> bool {
        self.slots
            .get(&label)
            .map_or(false, |slot| set.contains(*slot))
    }

    fn set_target(&mut self, label: Label) {
        let slot = self.slot(label);

        if self.targets.contains(slot) || self.successors.contains(slot) {
            self.multi_targets.insert(slot);
        } else {
            self.targets.insert(slot);
        }
    }

    fn set_successor(&mut self, label: Label) {
        let slot = self.slot(label);
        self.successors.insert(slot);

        if self.targets.contains(slot) {
            self.multi_targets.insert(slot);
        }
    }

    fn slot(&mut self, label: Label) -> usize {
        let next = self.slots.len();
        let slot = *self.slots.entry(label).or_insert(next);

        if slot >= self.targets.len() {
            for set in [&mut self.targets, &mut self.successors, &mut self.multi_targets] {
                set.grow(slot + 1);
            }
        }

        slot
    }
}
