mod common;
use common::{compile, compile_err, count};

use garnet::codegen::CodeGen;
use garnet::parser::Parser;
use garnet::symbols::Structure;

/// Parse a whole program and hand back the parser so its symbol table can
/// be inspected.
fn parse(source: &str) -> Parser<'_, Vec<u8>> {
    let mut parser = Parser::new(source, CodeGen::new(Vec::new())).expect("tokenise");
    parser.run().expect("program should compile");
    parser
}

#[test]
fn member_offsets_align_to_four_except_chars() {
    let parser = parse("struct vec { char a, int b, long c };");
    let definition = parser.table.find_struct("vec").expect("vec should be defined");
    let offsets: Vec<i32> = parser
        .table
        .get(definition)
        .members
        .iter()
        .map(|&member| match parser.table.get(member).structure {
            Structure::Variable { offset } => offset,
            _ => panic!("members are variables"),
        })
        .collect();
    assert_eq!(offsets, vec![0, 4, 8]);
    assert_eq!(
        parser.table.get(definition).structure,
        Structure::Composite { size: 16 }
    );
}

#[test]
fn adjacent_chars_pack_tight() {
    let parser = parse("struct s { char a, char b, int c };");
    let definition = parser.table.find_struct("s").unwrap();
    let offsets: Vec<i32> = parser
        .table
        .get(definition)
        .members
        .iter()
        .map(|&member| match parser.table.get(member).structure {
            Structure::Variable { offset } => offset,
            _ => panic!("members are variables"),
        })
        .collect();
    assert_eq!(offsets, vec![0, 1, 4]);
}

#[test]
fn struct_globals_reserve_their_full_size() {
    let assembly = compile(
        r#"
        struct vec { char a, int b, long c };
        struct vec v;
        "#,
    );
    assert!(assembly.contains("\t.globl\tv"));
    assert_eq!(count(&assembly, "\t.byte\t0"), 16);
}

#[test]
fn array_globals_reserve_element_count_times_size() {
    let assembly = compile("long arr[3];");
    assert_eq!(count(&assembly, "\t.byte\t0"), 24);
}

#[test]
fn struct_redefinition_is_refused() {
    let error = compile_err(
        r#"
        struct s { int a };
        struct s { int b };
        "#,
    );
    assert!(error.to_string().contains("redefinition of struct 's'"));
}

#[test]
fn unknown_struct_references_are_refused() {
    let error = compile_err("struct nope x;");
    assert!(error.to_string().contains("unknown struct 'nope'"));
}

#[test]
fn duplicate_member_names_are_refused() {
    let error = compile_err("struct s { int a, char a };");
    assert!(error.to_string().contains("'a'"));
}

#[test]
fn struct_pointers_are_ordinary_globals() {
    let assembly = compile(
        r#"
        struct vec { int a, int b };
        struct vec* p;
        "#,
    );
    assert!(assembly.contains("p:\n\t.quad\t0"));
}
