//! The command line interface and per-file driver.
//!
//! Each input file is compiled to a sibling `.s` file, assembled with
//! `as`, and the objects linked with `cc`; `-S` and `-c` stop the
//! pipeline early. A file that fails to compile leaves no partial
//! assembly behind.

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::Command;

use clap::Parser as ClapParser;

use crate::codegen::CodeGen;
use crate::error::{Error, Report};
use crate::logger::Logger;
use crate::parser::Parser;

#[derive(ClapParser, Debug, Default)]
#[command(version, about = "A compiler for the Garnet language")]
pub struct Cli {
    /// Source files to compile
    #[arg(required = true)]
    pub input_files: Vec<PathBuf>,

    /// Name of the linked executable
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Compile and assemble, but do not link
    #[arg(short = 'c')]
    pub assemble_only: bool,

    /// Emit assembly only
    #[arg(short = 'S')]
    pub emit_assembly: bool,

    /// Dump each function's syntax tree to stderr
    #[arg(short = 'T', long)]
    pub dump_tree: bool,

    /// Show progress messages
    #[arg(short, long)]
    pub verbose: bool,
}

/// Diagnostics gathered by a failed run.
#[derive(Debug)]
pub struct CompilerError {
    pub reports: Vec<Report>,
}

pub struct Compiler {
    cli: Cli,
    logger: Logger,
}

impl Compiler {
    pub fn new(cli: Cli) -> Compiler {
        let logger = Logger::new(cli.verbose);
        Compiler { cli, logger }
    }

    /// Drive every input file through compile/assemble/link according to
    /// the flags.
    pub fn run(&mut self) -> Result<(), CompilerError> {
        let mut objects = Vec::new();
        for input in self.cli.input_files.clone() {
            let assembly = self.compile(&input).map_err(|e| CompilerError {
                reports: vec![Report::new(e.to_string(), Some(input.display().to_string()))],
            })?;
            if self.cli.emit_assembly {
                continue;
            }
            let object = self.assemble(&assembly).map_err(|e| CompilerError {
                reports: vec![Report::new(e.to_string(), Some(assembly.display().to_string()))],
            })?;
            let _ = fs::remove_file(&assembly);
            objects.push(object);
        }
        if self.cli.emit_assembly || self.cli.assemble_only {
            return Ok(());
        }
        self.link(&objects).map_err(|e| CompilerError {
            reports: vec![Report::new(e.to_string(), None)],
        })?;
        for object in &objects {
            let _ = fs::remove_file(object);
        }
        Ok(())
    }

    /// Compile one source file to assembly and return the `.s` path. On
    /// failure the partial output is removed before the error propagates.
    pub fn compile(&self, input: &Path) -> Result<PathBuf, Error> {
        let output = input.with_extension("s");
        self.logger.log(&format!("compiling {}", input.display()));
        let source = fs::read_to_string(input)?;
        let writer = BufWriter::new(File::create(&output)?);

        let result = (|| -> Result<(), Error> {
            let mut parser = Parser::new(&source, CodeGen::new(writer))?;
            parser.dump_tree = self.cli.dump_tree;
            parser.run()?;
            Ok(())
        })();

        if let Err(error) = result {
            let _ = fs::remove_file(&output);
            return Err(error);
        }
        Ok(output)
    }

    fn assemble(&self, assembly: &Path) -> Result<PathBuf, Error> {
        let object = assembly.with_extension("o");
        self.logger
            .log(&format!("assembling {} -> {}", assembly.display(), object.display()));
        let status = Command::new("as")
            .arg("-o")
            .arg(&object)
            .arg(assembly)
            .status()?;
        if !status.success() {
            return Err(Error::Toolchain {
                command: format!("as -o {}", object.display()),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(object)
    }

    fn link(&self, objects: &[PathBuf]) -> Result<(), Error> {
        let output = self
            .cli
            .output_file
            .clone()
            .unwrap_or_else(|| PathBuf::from("a.out"));
        self.logger.log(&format!("linking {}", output.display()));
        let status = Command::new("cc")
            .arg("-o")
            .arg(&output)
            .args(objects)
            .status()?;
        if !status.success() {
            return Err(Error::Toolchain {
                command: format!("cc -o {}", output.display()),
                status: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }
}

/// Compile a source buffer straight to assembly text (test entry point).
pub fn compile_to_assembly(source: &str) -> Result<String, Error> {
    let mut parser = Parser::new(source, CodeGen::new(Vec::new()))?;
    parser.run()?;
    let bytes = parser.into_output();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
