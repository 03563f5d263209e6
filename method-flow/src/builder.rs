// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::event::{Label, MethodEvent, ProbeId, SwitchTarget, TryCatchBlock};
use crate::opcode::Opcode;

/// Records the event stream of one method body.
///
/// Labels are allocated by the builder so that they stay unique within the
/// method; they may be referenced before they are placed.
#[derive(Clone, Debug, Default)]
pub struct MethodBuilder {
    events: Vec<MethodEvent>,
    next_label: u32,
}

impl MethodBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    /// Place `label` before the next instruction.
    pub fn label(&mut self, label: Label) -> &mut Self {
        self.push(MethodEvent::Label { label })
    }

    /// Start source line `line` at a fresh label that is never placed.
    pub fn line(&mut self, line: u32) -> &mut Self {
        let start = self.new_label();
        self.line_at(line, start)
    }

    pub fn line_at(&mut self, line: u32, start: Label) -> &mut Self {
        self.push(MethodEvent::LineNumber { line, start })
    }

    pub fn insn(&mut self, opcode: Opcode) -> &mut Self {
        self.push(MethodEvent::Insn { opcode })
    }

    pub fn insns(&mut self, opcodes: &[Opcode]) -> &mut Self {
        for opcode in opcodes {
            self.insn(*opcode);
        }
        self
    }

    pub fn insn_with_probe(&mut self, opcode: Opcode, probe: ProbeId) -> &mut Self {
        self.push(MethodEvent::InsnWithProbe { opcode, probe })
    }

    pub fn jump(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        self.push(MethodEvent::Jump { opcode, target })
    }

    pub fn jump_with_probe(&mut self, opcode: Opcode, target: Label, probe: ProbeId) -> &mut Self {
        self.push(MethodEvent::JumpWithProbe {
            opcode,
            target,
            probe,
        })
    }

    pub fn table_switch(&mut self, min: i32, max: i32, default: Label, targets: &[Label]) -> &mut Self {
        self.push(MethodEvent::TableSwitch {
            min,
            max,
            default,
            targets: targets.to_vec(),
        })
    }

    pub fn table_switch_with_probes(
        &mut self,
        min: i32,
        max: i32,
        default: SwitchTarget,
        targets: &[SwitchTarget],
    ) -> &mut Self {
        self.push(MethodEvent::TableSwitchWithProbes {
            min,
            max,
            default,
            targets: targets.to_vec(),
        })
    }

    pub fn lookup_switch(&mut self, default: Label, keys: &[i32], targets: &[Label]) -> &mut Self {
        self.push(MethodEvent::LookupSwitch {
            default,
            keys: keys.to_vec(),
            targets: targets.to_vec(),
        })
    }

    pub fn lookup_switch_with_probes(
        &mut self,
        default: SwitchTarget,
        keys: &[i32],
        targets: &[SwitchTarget],
    ) -> &mut Self {
        self.push(MethodEvent::LookupSwitchWithProbes {
            default,
            keys: keys.to_vec(),
            targets: targets.to_vec(),
        })
    }

    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&str>,
    ) -> &mut Self {
        self.push(MethodEvent::TryCatch(TryCatchBlock::new(
            start, end, handler, catch_type,
        )))
    }

    pub fn probe(&mut self, probe: ProbeId) -> &mut Self {
        self.push(MethodEvent::Probe { probe })
    }

    pub fn events(&self) -> &[MethodEvent] {
        &self.events
    }

    pub fn build(self) -> Vec<MethodEvent> {
        self.events
    }

    fn push(&mut self, event: MethodEvent) -> &mut Self {
        self.events.push(event);
        self
    }
}
