// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::opcode::Opcode;

/// Opaque position marker within a method body.
///
/// Labels are compared by identity only. A label may be referenced (as a jump
/// target or try-block bound) before it is placed in the event stream.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Label(pub u32);

impl Label {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{:02}", self.0)
    }
}

/// Index of an instrumentation point in the class-wide probe array.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ProbeId(pub u32);

impl ProbeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ProbeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Outgoing edge of a switch instruction that may be measured by its own probe.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SwitchTarget {
    pub label: Label,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeId>,
}

impl SwitchTarget {
    pub fn new(label: Label) -> Self {
        Self { label, probe: None }
    }

    pub fn with_probe(label: Label, probe: ProbeId) -> Self {
        Self {
            label,
            probe: Some(probe),
        }
    }
}

/// Exception handler range, as declared in the method's exception table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TryCatchBlock {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// Internal name of the caught exception type. `None` marks a catch-all
    /// handler, as emitted for `finally` blocks.
    #[serde(default)]
    pub catch_type: Option<String>,
}

impl TryCatchBlock {
    pub fn new(start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> Self {
        Self {
            start,
            end,
            handler,
            catch_type: catch_type.map(str::to_owned),
        }
    }

    pub fn is_finally(&self) -> bool {
        self.catch_type.is_none()
    }
}

/// One structural event of a method body, in emission order.
///
/// The `*WithProbe(s)` variants are produced by the probe-insertion pass for
/// edges it decided to measure directly.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodEvent {
    Label {
        label: Label,
    },
    LineNumber {
        line: u32,
        start: Label,
    },
    Insn {
        opcode: Opcode,
    },
    InsnWithProbe {
        opcode: Opcode,
        probe: ProbeId,
    },
    Jump {
        opcode: Opcode,
        target: Label,
    },
    JumpWithProbe {
        opcode: Opcode,
        target: Label,
        probe: ProbeId,
    },
    TableSwitch {
        min: i32,
        max: i32,
        default: Label,
        targets: Vec<Label>,
    },
    TableSwitchWithProbes {
        min: i32,
        max: i32,
        default: SwitchTarget,
        targets: Vec<SwitchTarget>,
    },
    LookupSwitch {
        default: Label,
        keys: Vec<i32>,
        targets: Vec<Label>,
    },
    LookupSwitchWithProbes {
        default: SwitchTarget,
        keys: Vec<i32>,
        targets: Vec<SwitchTarget>,
    },
    TryCatch(TryCatchBlock),
    Probe {
        probe: ProbeId,
    },
}

impl MethodEvent {
    /// Opcode of the instruction this event emits, if any.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Self::Insn { opcode }
            | Self::InsnWithProbe { opcode, .. }
            | Self::Jump { opcode, .. }
            | Self::JumpWithProbe { opcode, .. } => Some(*opcode),
            Self::TableSwitch { .. } | Self::TableSwitchWithProbes { .. } => {
                Some(Opcode::TABLESWITCH)
            }
            Self::LookupSwitch { .. } | Self::LookupSwitchWithProbes { .. } => {
                Some(Opcode::LOOKUPSWITCH)
            }
            Self::Label { .. } | Self::LineNumber { .. } | Self::TryCatch(_) | Self::Probe { .. } => {
                None
            }
        }
    }

    /// Labels a switch event may branch to: the default first, then the
    /// case targets in declaration order, repeats included.
    pub fn switch_labels(&self) -> Option<Vec<Label>> {
        match self {
            Self::TableSwitch {
                default, targets, ..
            }
            | Self::LookupSwitch {
                default, targets, ..
            } => Some(std::iter::once(*default).chain(targets.iter().copied()).collect()),
            Self::TableSwitchWithProbes {
                default, targets, ..
            }
            | Self::LookupSwitchWithProbes {
                default, targets, ..
            } => Some(
                std::iter::once(default.label)
                    .chain(targets.iter().map(|t| t.label))
                    .collect(),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_event_json_shape() -> Result<(), serde_json::Error> {
        let events = vec![
            MethodEvent::Label { label: Label(0) },
            MethodEvent::LineNumber {
                line: 1001,
                start: Label(0),
            },
            MethodEvent::JumpWithProbe {
                opcode: Opcode::IFEQ,
                target: Label(1),
                probe: ProbeId(0),
            },
            MethodEvent::TryCatch(TryCatchBlock::new(Label(0), Label(1), Label(2), None)),
            MethodEvent::TableSwitchWithProbes {
                min: 1,
                max: 2,
                default: SwitchTarget::new(Label(3)),
                targets: vec![
                    SwitchTarget::with_probe(Label(4), ProbeId(1)),
                    SwitchTarget::new(Label(3)),
                ],
            },
        ];

        let text = serde_json::to_value(&events)?;
        assert_eq!(
            text,
            json!([
                { "kind": "label", "label": 0 },
                { "kind": "line_number", "line": 1001, "start": 0 },
                { "kind": "jump_with_probe", "opcode": 153, "target": 1, "probe": 0 },
                { "kind": "try_catch", "start": 0, "end": 1, "handler": 2, "catch_type": null },
                {
                    "kind": "table_switch_with_probes",
                    "min": 1,
                    "max": 2,
                    "default": { "label": 3 },
                    "targets": [ { "label": 4, "probe": 1 }, { "label": 3 } ],
                },
            ])
        );

        let de: Vec<MethodEvent> = serde_json::from_value(text)?;
        assert_eq!(de, events);

        Ok(())
    }

    #[test]
    fn test_event_opcode() {
        assert_eq!(MethodEvent::Insn { opcode: Opcode::NOP }.opcode(), Some(Opcode::NOP));
        assert_eq!(
            MethodEvent::LookupSwitch {
                default: Label(0),
                keys: vec![],
                targets: vec![],
            }
            .opcode(),
            Some(Opcode::LOOKUPSWITCH)
        );
        assert_eq!(MethodEvent::Probe { probe: ProbeId(3) }.opcode(), None);
    }

    #[test]
    fn test_switch_labels_keep_repeats() {
        let event = MethodEvent::TableSwitch {
            min: 1,
            max: 3,
            default: Label(3),
            targets: vec![Label(1), Label(2), Label(1)],
        };

        assert_eq!(
            event.switch_labels(),
            Some(vec![Label(3), Label(1), Label(2), Label(1)])
        );
    }
}
