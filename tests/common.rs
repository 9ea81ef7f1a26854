use garnet::compiler::compile_to_assembly;
use garnet::error::Error;

/// Compile a source buffer and return the generated assembly text.
#[allow(dead_code)]
pub fn compile(source: &str) -> String {
    compile_to_assembly(source).expect("program should compile")
}

/// Compile a source buffer that is expected to fail and return the error.
#[allow(dead_code)]
pub fn compile_err(source: &str) -> Error {
    match compile_to_assembly(source) {
        Ok(_) => panic!("program should not compile"),
        Err(error) => error,
    }
}

/// Count non-overlapping occurrences of `needle`.
#[allow(dead_code)]
pub fn count(haystack: &str, needle: &str) -> usize {
    haystack.matches(needle).count()
}
