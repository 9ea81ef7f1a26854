mod common;
use common::{compile, count};

#[test]
fn function_definition_and_call_site() {
    let assembly = compile(
        r#"
        x :: int() {
            return(5);
        }

        main :: int() {
            print x();
            return(0);
        }
        "#,
    );
    // One labelled definition of x, its constant, and exactly one call.
    assert_eq!(count(&assembly, "\nx:"), 1);
    assert!(assembly.contains("\tmovq\t$5, "));
    assert_eq!(count(&assembly, "\tcall\tx"), 1);
    assert!(assembly.contains("\t.globl\tx"));
    assert!(assembly.contains("\tcall\tPrintInteger"));
}

#[test]
fn for_loop_emits_one_backward_and_one_forward_jump() {
    let assembly = compile(
        r#"
        int i;

        main :: int() {
            for (i = 0; i < 3; i++) {
                print i;
            }
            return(0);
        }
        "#,
    );
    // The failed comparison jumps forward past the loop, exactly once.
    assert_eq!(count(&assembly, "\tjge\t"), 1);

    // Of the unconditional jumps, exactly one targets an earlier label
    // (the loop back-edge); the return's exit jump goes forward.
    let mut backward = 0;
    for (pos, _) in assembly.match_indices("\tjmp\tL") {
        let target: String = assembly[pos + 5..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        let label = format!("\n{}:", target);
        if assembly.find(&label).is_some_and(|def| def < pos) {
            backward += 1;
        }
    }
    assert_eq!(backward, 1);
}

#[test]
fn store_through_pointer_uses_the_pointee_width() {
    let assembly = compile(
        r#"
        int x;
        int* p;
        char c;
        char* q;

        main :: int() {
            p = &x;
            *p = 12;
            q = &c;
            *q = 7;
            return(0);
        }
        "#,
    );
    // int through int*: 32-bit store; char through char*: 8-bit store.
    assert!(assembly.contains("\tmovl\t%r10d, (%r11)"));
    assert!(assembly.contains("\tmovb\t%r10b, (%r11)"));
}

#[test]
fn comparison_under_if_fuses_into_an_inverse_jump() {
    let assembly = compile(
        r#"
        int a;

        main :: int() {
            a = 1;
            if (a =? 1) {
                print 1;
            } else {
                print 2;
            }
            return(0);
        }
        "#,
    );
    assert!(assembly.contains("\tcmpq\t"));
    assert!(assembly.contains("\tjne\tL"));
    // No materialised 0/1 for a fused comparison.
    assert!(!assembly.contains("\tsete\t"));
}

#[test]
fn non_comparison_condition_is_collapsed_to_a_truth_value() {
    let assembly = compile(
        r#"
        int a;

        main :: int() {
            while (a) {
                a = a - 1;
            }
            return(0);
        }
        "#,
    );
    assert!(assembly.contains("\ttest\t"));
    assert!(assembly.contains("\tje\tL"));
}

#[test]
fn comparison_as_a_value_materialises_a_flag() {
    let assembly = compile(
        r#"
        int a;
        int b;

        main :: int() {
            b = a < 10;
            return(b);
        }
        "#,
    );
    assert!(assembly.contains("\tsetl\t"));
    assert!(assembly.contains("\tmovzbq\t"));
}

#[test]
fn array_indexing_scales_by_a_shift() {
    let assembly = compile(
        r#"
        long arr[3];

        main :: int() {
            print arr[2];
            return(0);
        }
        "#,
    );
    assert!(assembly.contains("\tleaq\tarr(%rip)"));
    // Element size 8 becomes a shift by 3.
    assert!(assembly.contains("\tsalq\t$3, "));
}

#[test]
fn fifth_argument_is_pushed_and_popped() {
    let assembly = compile(
        r#"
        sum :: long(long a, long b, long c, long d, long e) {
            return(a + b + c + d + e);
        }

        main :: int() {
            print sum(1, 2, 3, 4, 5);
            return(0);
        }
        "#,
    );
    assert_eq!(count(&assembly, "\tpushq\t%r10"), 1);
    assert!(assembly.contains("\taddq\t$8, %rsp"));
    // The fifth parameter is read from above the saved frame pointer.
    assert!(assembly.contains("16(%rbp)"));
    // The first four land in the argument registers.
    for reg in ["%rcx", "%rdx", "%r8", "%r9"] {
        assert!(assembly.contains(&format!("\tmovq\t%r10, {}", reg)));
    }
}

#[test]
fn frame_is_rounded_to_thirty_two_bytes() {
    let assembly = compile(
        r#"
        main :: int() {
            int a;
            a = 1;
            return(a);
        }
        "#,
    );
    // 4 bytes of padding plus one int still reserves a full 32.
    assert!(assembly.contains("\taddq\t$-32, %rsp"));
    assert!(assembly.contains("\taddq\t$32, %rsp"));
}

#[test]
fn locals_are_stored_relative_to_the_frame_pointer() {
    let assembly = compile(
        r#"
        int a;

        main :: int() {
            int a;
            a = 7;
            return(a);
        }
        "#,
    );
    // The local shadows the global: the store goes to the frame.
    assert!(assembly.contains("\tmovl\t%r10d, -8(%rbp)"));
    assert!(!assembly.contains("\tmovl\t%r10d, a(%rip)"));
}

#[test]
fn globals_emit_zeroed_data_blocks() {
    let assembly = compile(
        r#"
        char c;
        int x;
        long l;
        int* p;

        main :: int() {
            return(0);
        }
        "#,
    );
    assert!(assembly.contains("c:\n\t.byte\t0"));
    assert!(assembly.contains("x:\n\t.long\t0"));
    assert!(assembly.contains("l:\n\t.quad\t0"));
    assert!(assembly.contains("p:\n\t.quad\t0"));
}

#[test]
fn string_literals_are_emitted_once_with_a_label() {
    let assembly = compile(
        r#"
        char* s;

        main :: int() {
            s = "ab";
            return(0);
        }
        "#,
    );
    assert!(assembly.contains("\t.byte\t97"));
    assert!(assembly.contains("\t.byte\t98"));
    assert!(assembly.contains("\tleaq\tL"));
}

#[test]
fn main_calls_the_runtime_bootstrap() {
    let assembly = compile(
        r#"
        helper :: int() {
            return(1);
        }

        main :: int() {
            return(helper());
        }
        "#,
    );
    assert_eq!(count(&assembly, "\tcall\t__main"), 1);
}
