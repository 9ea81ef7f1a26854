//! The top-level error type and CLI diagnostics.

use thiserror::Error;

use crate::codegen::CodegenError;
use crate::parser::ParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("command '{command}' exited with status {status}")]
    Toolchain { command: String, status: i32 },
}

/// One diagnostic to show the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub msg: String,
    pub path: Option<String>,
}

impl Report {
    pub fn new(msg: String, path: Option<String>) -> Report {
        Report { msg, path }
    }
}

/// Print a diagnostic to stderr.
pub fn report(diagnostic: &Report) {
    eprintln!("\x1b[31mError\x1b[0m: {}", diagnostic.msg);
    if let Some(path) = &diagnostic.path {
        eprintln!("  --> {}", path);
    }
}
