use std::fs;

use tempfile::tempdir;

use garnet::compiler::{Cli, Compiler};

fn compiler() -> Compiler {
    Compiler::new(Cli::default())
}

#[test]
fn compile_writes_a_sibling_assembly_file() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("program.ga");
    fs::write(
        &source,
        r#"
        main :: int() {
            return(0);
        }
        "#,
    )
    .unwrap();

    let assembly = compiler().compile(&source).unwrap();
    assert_eq!(assembly, dir.path().join("program.s"));
    let text = fs::read_to_string(&assembly).unwrap();
    assert!(text.contains("main:"));
    assert!(text.contains("\tret"));
}

#[test]
fn a_failed_compile_leaves_no_partial_output() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("broken.ga");
    fs::write(
        &source,
        r#"
        main :: int() {
            return(undefined);
        }
        "#,
    )
    .unwrap();

    let result = compiler().compile(&source);
    assert!(result.is_err());
    assert!(!dir.path().join("broken.s").exists());
}

#[test]
fn missing_input_files_are_reported() {
    let dir = tempdir().unwrap();
    let result = compiler().compile(&dir.path().join("nonexistent.ga"));
    assert!(result.is_err());
}
