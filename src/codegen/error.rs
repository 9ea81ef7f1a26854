use thiserror::Error;

use crate::ast::Op;
use crate::types::{Type, TypeError};

/// Failures while emitting assembly. Most of these indicate an internal
/// inconsistency (a tree shape the parser never builds); the I/O and type
/// variants surface real conditions.
#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("failed to write assembly: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Type(#[from] TypeError),
    #[error("out of registers")]
    OutOfRegisters,
    #[error("freeing register {0} which is not in use")]
    FreeUnusedRegister(usize),
    #[error("missing operand for {0:?} node")]
    MissingOperand(Op),
    #[error("missing payload on {0:?} node")]
    BadPayload(Op),
    #[error("missing symbol on {0:?} node")]
    MissingSymbol(Op),
    #[error("cannot assign through {0:?} node")]
    BadAssignmentTarget(Op),
    #[error("'{0}' is not a function")]
    BadFunctionSymbol(String),
    #[error("no jump target for condition under {0:?}")]
    MissingJumpTarget(Op),
    #[error("cannot align a member of type {0}")]
    UnsupportedAlignment(Type),
    #[error("cannot generate code for {0:?} node")]
    UnexpectedNode(Op),
}
