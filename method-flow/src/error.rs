// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::opcode::Opcode;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum FlowError {
    #[error("subroutine instruction {opcode} is not supported")]
    Subroutine { opcode: Opcode },
}
