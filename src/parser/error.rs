use thiserror::Error;

use crate::codegen::CodegenError;
use crate::lexer::LexError;
use crate::types::{Type, TypeError};

/// Everything that can stop a parse. Code generation runs inside the
/// parse (functions are generated as soon as they complete), so its
/// failures surface here too.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("{source} on line {line}")]
    Type { source: TypeError, line: usize },
    #[error("expected {what} on line {line}")]
    Expected { what: &'static str, line: usize },
    #[error("unexpected {found} on line {line}")]
    UnexpectedToken { found: String, line: usize },
    #[error("{found} is not a binary operator (line {line})")]
    NotAnOperator { found: String, line: usize },
    #[error("incompatible types {left} and {right} on line {line}")]
    IncompatibleTypes { left: Type, right: Type, line: usize },
    #[error("cannot assign {value} to {target} on line {line}")]
    IncompatibleAssignment { value: Type, target: Type, line: usize },
    #[error("cannot return {found} from a function returning {expected} (line {line})")]
    BadReturnType { found: Type, expected: Type, line: usize },
    #[error("return from a void function on line {line}")]
    ReturnFromVoid { line: usize },
    #[error("'return' outside of a function on line {line}")]
    ReturnOutsideFunction { line: usize },
    #[error("invalid redeclaration of '{name}' on line {line}")]
    Redeclaration { name: String, line: usize },
    #[error("unknown variable '{name}' on line {line}")]
    UnknownVariable { name: String, line: usize },
    #[error("call of undeclared function '{name}' on line {line}")]
    UndeclaredFunction { name: String, line: usize },
    #[error("'{name}' is not an array (line {line})")]
    UndeclaredArray { name: String, line: usize },
    #[error("unknown struct '{name}' on line {line}")]
    UnknownStruct { name: String, line: usize },
    #[error("redefinition of struct '{name}' on line {line}")]
    RedefinedStruct { name: String, line: usize },
    #[error("array index must be an integer (line {line})")]
    ArrayIndexNotInteger { line: usize },
    #[error("local arrays are not supported (line {line})")]
    LocalArraysUnsupported { line: usize },
    #[error("parameter {index} does not match the prototype (line {line})")]
    ParameterTypeMismatch { index: usize, line: usize },
    #[error("definition of '{name}' disagrees with its prototype's parameter count (line {line})")]
    PrototypeArityMismatch { name: String, line: usize },
    #[error("non-void function '{name}' does not end in a return (line {line})")]
    MissingReturn { name: String, line: usize },
    #[error("'{op}' requires an identifier operand (line {line})")]
    PrefixNeedsIdentifier { op: &'static str, line: usize },
    #[error("'*' requires an identifier or another dereference (line {line})")]
    DereferenceNeedsIdentifier { line: usize },
}
