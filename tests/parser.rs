mod common;
use common::{compile, compile_err};

#[test]
fn duplicate_global_names_the_offender() {
    let error = compile_err(
        r#"
        int a;
        long a;
        "#,
    );
    let message = error.to_string();
    assert!(message.contains("'a'"), "got: {}", message);
    assert!(message.contains("redeclaration"), "got: {}", message);
}

#[test]
fn a_local_may_shadow_a_global() {
    compile(
        r#"
        int a;

        main :: int() {
            int a;
            a = 7;
            return(a);
        }
        "#,
    );
}

#[test]
fn duplicate_locals_are_refused() {
    let error = compile_err(
        r#"
        main :: int() {
            int x;
            int x;
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("'x'"));
}

#[test]
fn undeclared_variables_are_reported_with_their_line() {
    let error = compile_err("main :: int() {\n    return(z);\n}");
    let message = error.to_string();
    assert!(message.contains("'z'"), "got: {}", message);
    assert!(message.contains("line 2"), "got: {}", message);
}

#[test]
fn calling_an_undeclared_function_fails() {
    let error = compile_err(
        r#"
        main :: int() {
            print missing();
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("'missing'"));
}

#[test]
fn non_void_functions_must_end_in_a_return() {
    let error = compile_err(
        r#"
        f :: int() {
            print 5;
        }
        "#,
    );
    assert!(error.to_string().contains("does not end in a return"));
}

#[test]
fn void_functions_need_no_return() {
    compile(
        r#"
        shout :: void() {
            print 1;
        }

        main :: int() {
            return(0);
        }
        "#,
    );
}

#[test]
fn prototypes_allow_a_later_definition() {
    compile(
        r#"
        f :: int(int x);

        main :: int() {
            return(f(3));
        }

        f :: int(int x) {
            return(x);
        }
        "#,
    );
}

#[test]
fn prototype_parameter_types_must_match_positionally() {
    let error = compile_err(
        r#"
        f :: int(int x);

        f :: int(char x) {
            return(1);
        }
        "#,
    );
    assert!(error.to_string().contains("parameter 1"));
}

#[test]
fn prototype_parameter_counts_must_match() {
    let error = compile_err(
        r#"
        f :: int(int x);

        f :: int(int x, int y) {
            return(x);
        }
        "#,
    );
    assert!(error.to_string().contains("parameter count"));
}

#[test]
fn narrowing_assignments_are_refused() {
    let error = compile_err(
        r#"
        char c;
        long l;

        main :: int() {
            c = l;
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("cannot assign long to char"));
}

#[test]
fn mismatched_pointer_assignment_is_refused() {
    let error = compile_err(
        r#"
        int* p;
        char* q;

        main :: int() {
            p = q;
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("cannot assign char* to int*"));
}

#[test]
fn returning_the_wrong_type_is_refused() {
    let error = compile_err(
        r#"
        long l;

        f :: char() {
            return(l);
        }
        "#,
    );
    assert!(error.to_string().contains("cannot return long"));
}

#[test]
fn return_inside_a_void_function_is_refused() {
    let error = compile_err(
        r#"
        f :: void() {
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("void"));
}

#[test]
fn dereferencing_a_non_pointer_is_refused() {
    let error = compile_err(
        r#"
        int x;

        main :: int() {
            return(*x);
        }
        "#,
    );
    assert!(error.to_string().contains("dereference of non-pointer type int"));
}

#[test]
fn address_of_requires_an_identifier() {
    let error = compile_err(
        r#"
        main :: int() {
            return(&5);
        }
        "#,
    );
    assert!(error.to_string().contains("'&'"));
}

#[test]
fn fifteen_levels_of_indirection_is_the_ceiling() {
    compile(
        r#"
        int*************** deep;

        main :: int() {
            return(0);
        }
        "#,
    );
    let error = compile_err(
        r#"
        int**************** toodeep;

        main :: int() {
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("too many levels of indirection"));
}

#[test]
fn local_arrays_are_not_supported() {
    let error = compile_err(
        r#"
        main :: int() {
            int a[3];
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("local arrays"));
}

#[test]
fn array_indexes_must_be_integers() {
    let error = compile_err(
        r#"
        long arr[4];

        main :: int() {
            return(arr["one"]);
        }
        "#,
    );
    assert!(error.to_string().contains("index must be an integer"));
}

#[test]
fn assignment_to_a_literal_is_refused() {
    let error = compile_err(
        r#"
        main :: int() {
            5 = 1;
            return(0);
        }
        "#,
    );
    assert!(error.to_string().contains("cannot assign through"));
}

#[test]
fn stray_tokens_at_the_top_level_are_reported() {
    let error = compile_err(";");
    assert!(error.to_string().contains("unexpected ';'"));
}
