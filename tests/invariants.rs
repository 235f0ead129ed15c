// ABOUTME: Black-box invariant checks from spec section 8 ("Testable properties")

use lunite::error::ErrorKind;
use lunite::lexer::Lexer;
use lunite::parser::Parser;
use lunite::token::TokenKind;
use lunite::value::Value;
use lunite::Interpreter;

fn eval(source: &str) -> Value {
    lunite::run(source, "<test>").expect("program should run without error")
}

#[test]
fn lexer_roundness_ends_in_eof_and_locations_are_positive() {
    let mut lexer = Lexer::new("let x = 2 + 3 * 4\nreturn x");
    let mut count = 0;
    loop {
        let token = lexer.next_token().expect("well-formed source lexes cleanly");
        assert!(token.loc.line >= 1 && token.loc.col >= 1);
        count += 1;
        if matches!(token.kind, TokenKind::Eof) {
            break;
        }
        assert!(count < 10_000, "lexer did not terminate");
    }
}

#[test]
fn parse_determinism_same_source_same_ast() {
    let source = "func f(a, b=10) { return a + b * 2 }  f(1, 2)";
    let a = Parser::parse_source(source).expect("parses");
    let b = Parser::parse_source(source).expect("parses");
    assert_eq!(a, b);
}

#[test]
fn precedence_mul_binds_tighter_than_add() {
    assert!(matches!(eval("2 + 3 * 4"), Value::Int(14)));
}

#[test]
fn precedence_shift_binds_tighter_than_bitwise() {
    // `1 | 2 << 1` must parse as `1 | (2 << 1)` == `1 | 4` == 5, not `(1 | 2) << 1` == 6.
    assert!(matches!(eval("1 | 2 << 1"), Value::Int(5)));
}

#[test]
fn precedence_bitwise_binds_tighter_than_comparison() {
    // `1 & 1 == 1` must parse as `(1 & 1) == 1`, not `1 & (1 == 1)`.
    assert!(matches!(eval("1 & 1 == 1"), Value::Bool(true)));
}

#[test]
fn precedence_comparison_binds_tighter_than_logical() {
    // `1 == 1 and 0 == 1` must parse as `(1 == 1) and (0 == 1)` == false.
    assert!(matches!(eval("1 == 1 and 0 == 1"), Value::Bool(false)));
}

#[test]
fn const_reassignment_raises_runtime_error_mentioning_constant() {
    let err = lunite::run("const PI = 3\nPI = 4", "<test>").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Runtime);
    assert!(err.message.contains("constant"), "message was: {}", err.message);
}

#[test]
fn functions_close_over_globals_not_caller_locals() {
    let err = lunite::run(
        r#"
        func f() { return local_var }
        func caller() {
            let local_var = 5
            return f()
        }
        caller()
        "#,
        "<test>",
    )
    .unwrap_err();
    assert!(err.message.contains("local_var"), "message was: {}", err.message);
}

#[test]
fn class_resolution_subclass_overrides_and_init_runs_once() {
    let v = eval(
        r#"
        let calls = 0
        class A { func init() { calls = calls + 1 } func label() { return "a" } }
        class B extends A { func label() { return "b" } }
        new B()
        let b2 = new B()
        [calls, b2.label()]
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            // two `new B()` calls above, so `init` ran exactly twice -- once per instance.
            assert!(matches!(items[0], Value::Int(2)));
            assert!(matches!(items[1], Value::String(ref s) if s == "b"));
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn break_only_affects_innermost_loop() {
    let v = eval(
        r#"
        let collected = []
        for i in range(0, 3) {
            for j in range(0, 3) {
                if (j == 1) { break }
                collected = collected + [i * 10 + j]
            }
        }
        collected
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            let rendered: Vec<i64> = items.iter().map(|v| v.as_int().unwrap()).collect();
            assert_eq!(rendered, vec![0, 10, 20]);
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn return_only_unwinds_innermost_call() {
    let v = eval(
        r#"
        func inner() { return 1 }
        func outer() { inner() return 2 }
        outer()
        "#,
    );
    assert!(matches!(v, Value::Int(2)));
}

#[test]
fn finally_runs_on_normal_exit_without_running_rescue() {
    let v = eval(
        r#"
        let log = []
        attempt {
            log = log + ["try"]
        } rescue (e) {
            log = log + ["rescue"]
        } finally {
            log = log + ["finally"]
        }
        log
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            let rendered: Vec<String> = items.iter().map(|v| format!("{}", v)).collect();
            assert_eq!(rendered, vec!["try", "finally"]);
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn error_raised_in_finally_supersedes_pending_result() {
    let err = lunite::run(
        r#"
        attempt {
            undefined_thing
        } rescue (e) {
            1
        } finally {
            also_undefined
        }
        "#,
        "<test>",
    )
    .unwrap_err();
    assert!(err.message.contains("also_undefined"), "message was: {}", err.message);
}

#[test]
fn module_imported_twice_evaluates_body_at_most_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let module_path = dir.path().join("counter.luna");
    std::fs::write(&module_path, "count = count + 1\n").expect("write module");
    let main_path = dir.path().join("main.luna");

    let interp = Interpreter::new();
    interp.globals.define("count", Value::Int(0));
    let source = "import counter\nimport counter\ncount";
    let result = interp
        .run_source(source, main_path.to_str().unwrap())
        .expect("program should run");
    assert!(matches!(result, Value::Int(1)));
}
