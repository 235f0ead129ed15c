// ABOUTME: The eight worked end-to-end scenarios, asserted on returned Value.
// Rationale for checking Value over captured stdout: see DESIGN.md.

use lunite::value::Value;

fn eval(source: &str) -> Value {
    lunite::run(source, "<test>").expect("program should run without error")
}

#[test]
fn arithmetic_precedence() {
    let v = eval("let x = 2 + 3 * 4\nx");
    assert!(matches!(v, Value::Int(14)));
}

#[test]
fn default_parameters() {
    let v = eval(
        r#"
        func f(a, b=10) { return a + b }
        [f(1), f(1, 2)]
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            assert!(matches!(items[0], Value::Int(11)));
            assert!(matches!(items[1], Value::Int(3)));
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn class_init_and_method() {
    let v = eval(
        r#"
        class A { func init(x) { this.x = x } func get() { return this.x } }
        let a = new A(7)
        a.get()
        "#,
    );
    assert!(matches!(v, Value::Int(7)));
}

#[test]
fn subclass_overrides_method() {
    let v = eval(
        r#"
        class A { func init(x) { this.x = x } func get() { return this.x } }
        class B extends A { func get() { return this.x * 2 } }
        new B(5).get()
        "#,
    );
    assert!(matches!(v, Value::Int(10)));
}

#[test]
fn exception_hygiene_missing_key_and_finally() {
    let v = eval(
        r#"
        let log = []
        attempt {
            let d = {"a": 1}
            d["b"]
        } rescue (e) {
            log = log + ["miss"]
        } finally {
            log = log + ["done"]
        }
        log
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            let rendered: Vec<String> = items.iter().map(|v| format!("{}", v)).collect();
            assert_eq!(rendered, vec!["miss", "done"]);
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn loop_advance_and_break() {
    let v = eval(
        r#"
        let seen = []
        for i in range(0, 3) {
            if (i == 1) { advance }
            if (i == 2) { break }
            seen = seen + [i]
        }
        seen
        "#,
    );
    match v {
        Value::List(items) => {
            let items = items.borrow();
            assert_eq!(items.len(), 1);
            assert!(matches!(items[0], Value::Int(0)));
        }
        other => panic!("expected list, got {:?}", other),
    }
}

#[test]
fn match_dispatches_by_value() {
    let v = eval(
        r#"
        match (2) {
            1: "one"
            2: "two"
            other: "x"
        }
        "#,
    );
    assert!(matches!(v, Value::String(ref s) if s == "two"));
}

#[test]
fn fstring_interpolates_expression() {
    let v = eval(r#"let s = f"x={1+2}"
s"#);
    assert!(matches!(v, Value::String(ref s) if s == "x=3"));
}
