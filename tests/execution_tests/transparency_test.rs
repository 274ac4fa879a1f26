use std::sync::OnceLock;

use dana_core::{
    ast::{BinaryOperator, Expression, FStringPart, Statement, StatementKind},
    Interpreter, Program,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use crate::{binary, call, def, ident, int, interpreter, interpreter_with, print, program, sync_config};

fn shared(lazy: bool) -> &'static Interpreter {
    static LAZY: OnceLock<Interpreter> = OnceLock::new();
    static SYNC: OnceLock<Interpreter> = OnceLock::new();
    if lazy {
        LAZY.get_or_init(interpreter)
    } else {
        SYNC.get_or_init(|| interpreter_with(sync_config()))
    }
}

fn through_functions(a: i64, b: i64, op: BinaryOperator) -> Program {
    program(vec![
        def("id", &["x"], vec![Statement::ret(ident("x"))]),
        Statement::expression(binary(
            op,
            call("id", vec![int(a)]),
            call("id", vec![int(b)]),
        )),
    ])
}

fn direct(a: i64, b: i64, op: BinaryOperator) -> Program {
    program(vec![Statement::expression(binary(op, int(a), int(b)))])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn promise_results_match_plain_results(
        a in -1000i64..1000,
        b in -50i64..50,
        op in prop::sample::select(vec![
            BinaryOperator::Add,
            BinaryOperator::Subtract,
            BinaryOperator::Multiply,
            BinaryOperator::FloorDivide,
            BinaryOperator::Modulo,
            BinaryOperator::LessThan,
            BinaryOperator::Equal,
        ]),
    ) {
        let plain = shared(false);
        let wrapped = shared(true);
        let expected = plain.execute(&direct(a, b, op), &plain.new_context());
        let actual = wrapped.execute(&through_functions(a, b, op), &wrapped.new_context());
        match (expected, actual) {
            (Ok(expected), Ok(actual)) => prop_assert_eq!(expected, actual),
            (Err(expected), Err(actual)) => {
                prop_assert_eq!(expected.kind, actual.kind);
                prop_assert_eq!(expected.message(), actual.message());
            }
            (expected, actual) => {
                prop_assert!(false, "diverged: {:?} vs {:?}", expected, actual)
            }
        }
    }
}

/// Every operation on the returned list goes through a promise.
fn list_operations() -> Program {
    program(vec![
        def(
            "make",
            &[],
            vec![Statement::ret(Expression::List(vec![int(3), int(1), int(2)]))],
        ),
        Statement::assign("xs", call("make", vec![])),
        print(vec![Expression::Index {
            object: Box::new(ident("xs")),
            index: Box::new(int(0)),
        }]),
        print(vec![call("len", vec![ident("xs")])]),
        Statement::new(StatementKind::For {
            variable: "v".into(),
            iterable: ident("xs"),
            body: vec![print(vec![ident("v")])],
        }),
        Statement::new(StatementKind::If {
            condition: ident("xs"),
            then_block: vec![print(vec![Expression::string("truthy")])],
            else_block: None,
        }),
        print(vec![binary(
            BinaryOperator::Add,
            call("str", vec![call("make", vec![])]),
            Expression::string("!"),
        )]),
        print(vec![Expression::method(ident("xs"), "index", vec![int(2)])]),
        print(vec![Expression::FString(vec![
            FStringPart::Text("sorted: ".into()),
            FStringPart::Expr(call("sorted", vec![ident("xs")])),
        ])]),
        print(vec![binary(
            BinaryOperator::In,
            int(1),
            call("make", vec![]),
        )]),
    ])
}

#[test]
fn test_operations_on_promises_match_plain_values() {
    let expected = vec![
        "3",
        "3",
        "3",
        "1",
        "2",
        "truthy",
        "[3, 1, 2]!",
        "2",
        "sorted: [1, 2, 3]",
        "True",
    ];

    for config in [dana_core::InterpreterConfig::default(), sync_config()] {
        let interpreter = interpreter_with(config);
        interpreter
            .execute(&list_operations(), &interpreter.new_context())
            .unwrap();
        assert_eq!(interpreter.output(), expected);
    }
}
