// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#[macro_use]
extern crate log;

pub mod builder;
pub mod error;
pub mod event;
pub mod flow;
pub mod opcode;

pub use builder::MethodBuilder;
pub use error::FlowError;
pub use event::{Label, MethodEvent, ProbeId, SwitchTarget, TryCatchBlock};
pub use flow::LabelFlow;
pub use opcode::Opcode;
