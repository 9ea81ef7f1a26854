use std::process::exit;

use clap::Parser;

use garnet::compiler::{Cli, Compiler};
use garnet::error::report;

fn main() {
    let cli = Cli::parse();
    let mut compiler = Compiler::new(cli);
    if let Err(error) = compiler.run() {
        for diagnostic in &error.reports {
            report(diagnostic);
        }
        exit(1);
    }
}
