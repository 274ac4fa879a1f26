use dana_core::{
    ast::{BinaryOperator, Expression, Statement},
    config::InterpreterConfig,
    ErrorKind,
};
use pretty_assertions::assert_eq;

use crate::{binary, call, def, ident, int, interpreter_with, print, program, sync_config};

/// `def f(n): print(n); return f(n + 1)` started at 0.
fn unbounded_recursion() -> dana_core::Program {
    program(vec![
        def(
            "f",
            &["n"],
            vec![
                print(vec![ident("n")]),
                Statement::ret(call(
                    "f",
                    vec![binary(BinaryOperator::Add, ident("n"), int(1))],
                )),
            ],
        ),
        Statement::expression(call("f", vec![int(0)])).at(3, 1),
    ])
}

#[test]
fn test_unbounded_recursion_hits_the_hard_limit() {
    for config in [InterpreterConfig::default(), sync_config()] {
        let promises = config.promise.enabled;
        let interpreter = interpreter_with(config);
        let error = interpreter
            .execute(&unbounded_recursion(), &interpreter.new_context())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::RecursionLimit, "promises: {}", promises);

        let deepest = interpreter
            .output()
            .iter()
            .map(|line| line.parse::<i64>().unwrap())
            .max()
            .unwrap();
        assert!(
            (498..=500).contains(&deepest),
            "deepest frame {} (promises: {})",
            deepest,
            promises
        );
    }
}

#[test]
fn test_eager_recursion_hits_the_hard_limit() {
    // def f(n): print(n); deliver f(n + 1)
    let program = program(vec![
        def(
            "f",
            &["n"],
            vec![
                print(vec![ident("n")]),
                Statement::deliver(call(
                    "f",
                    vec![binary(BinaryOperator::Add, ident("n"), int(1))],
                )),
            ],
        ),
        Statement::expression(call("f", vec![int(0)])),
    ]);
    let interpreter = interpreter_with(InterpreterConfig::default());
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::RecursionLimit);

    let deepest = interpreter
        .output()
        .iter()
        .map(|line| line.parse::<i64>().unwrap())
        .max()
        .unwrap();
    assert!((498..=500).contains(&deepest), "deepest frame {}", deepest);
}

#[test]
fn test_oversized_range_hits_the_loop_limit_before_allocating() {
    let mut config = InterpreterConfig::default();
    config.limits.max_loop_iterations = 10;
    let interpreter = interpreter_with(config);
    let program = program(vec![Statement::new(dana_core::ast::StatementKind::For {
        variable: "i".into(),
        iterable: call("range", vec![int(20_000_000)]),
        body: vec![Statement::new(dana_core::ast::StatementKind::Pass)],
    })]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::InvalidOperation);
    assert_eq!(error.message(), "loop exceeded 10 iterations");
    assert_eq!(
        error.to_string(),
        "InvalidOperationError: loop exceeded 10 iterations"
    );
}

#[test]
fn test_integer_bounds_do_not_panic() {
    let interpreter = interpreter_with(InterpreterConfig::default());
    let min = || binary(BinaryOperator::Subtract, int(-i64::MAX), int(1));
    let program = program(vec![
        print(vec![call(
            "len",
            vec![call("range", vec![int(1), int(i64::MAX), int(i64::MAX)])],
        )]),
        print(vec![binary(BinaryOperator::Modulo, min(), int(i64::MAX))]),
        print(vec![binary(BinaryOperator::Modulo, min(), int(-1))]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(
        interpreter.output(),
        vec!["1".to_string(), (i64::MAX - 1).to_string(), "0".to_string()]
    );
}

#[test]
fn test_recursion_limit_is_configurable() {
    let mut config = sync_config();
    config.recursion.soft_limit = 10;
    config.recursion.hard_limit = 20;
    let interpreter = interpreter_with(config);
    let error = interpreter
        .execute(&unbounded_recursion(), &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::RecursionLimit);
    assert_eq!(error.message(), "maximum recursion depth exceeded (21 > 20)");
    assert_eq!(interpreter.output().len(), 20);
}

#[test]
fn test_self_referencing_list() {
    let interpreter = interpreter_with(InterpreterConfig::default());
    let program = program(vec![
        def(
            "size",
            &["xs"],
            vec![Statement::ret(call("len", vec![ident("xs")]))],
        ),
        Statement::assign("a", Expression::List(vec![int(1)])),
        Statement::expression(Expression::method(ident("a"), "append", vec![ident("a")])),
        // copying into a call and forcing arguments tolerate the cycle
        print(vec![call("size", vec![ident("a")])]),
        print(vec![ident("a")]).at(5, 1),
    ]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(interpreter.output(), vec!["2"]);
    assert_eq!(error.kind, ErrorKind::CircularReference);
    assert_eq!(error.span.line, 5);
    assert!(
        error.message().contains("root -> [1]"),
        "unexpected message: {}",
        error.message()
    );
}

#[test]
fn test_cycles_are_not_caught_by_try() {
    let interpreter = interpreter_with(InterpreterConfig::default());
    let program = program(vec![
        Statement::assign("a", Expression::List(vec![])),
        Statement::expression(Expression::method(ident("a"), "append", vec![ident("a")])),
        Statement::new(dana_core::ast::StatementKind::TryCatch {
            body: vec![print(vec![call("str", vec![ident("a")])])],
            error_binding: Some("e".into()),
            handler: vec![print(vec![Expression::string("caught")])],
            finally: None,
        }),
    ]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::CircularReference);
    assert!(interpreter.output().is_empty());
}
