//! A single-pass compiler for the Garnet language.
//!
//! Source text is tokenized and parsed with a precedence-climbing parser;
//! each function is handed to the code generator as soon as its body has
//! been parsed, so the only intermediate form is the syntax tree itself.
//! The output is textual x86-64 assembly.

/// Syntax tree nodes and operations.
pub mod ast;
/// Assembly emission, register allocation and stack frames.
pub mod codegen;
/// The command line interface and per-file driver.
pub mod compiler;
/// Top-level error type and diagnostic reporting.
pub mod error;
/// The tokenizer.
pub mod lexer;
/// Verbose output helper.
pub mod logger;
/// Declarations, statements and expressions.
pub mod parser;
/// The symbol table.
pub mod symbols;
/// Type encoding and implicit conversions.
pub mod types;
