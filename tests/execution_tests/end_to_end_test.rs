use std::sync::Arc;
use std::time::{Duration, Instant};

use dana_core::{
    ast::{
        Argument, BinaryOperator, Expression, FStringPart, StatementKind, Statement, StructDef,
        StructField,
    },
    capability::MockCapability,
    ErrorKind,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::{binary, call, def, ident, int, interpreter, interpreter_with, print, program, sync_config};

fn slow_add_program(delay_ms: i64) -> dana_core::Program {
    program(vec![
        def(
            "slow_add",
            &["a", "b"],
            vec![
                Statement::expression(call("sleep", vec![int(delay_ms)])),
                Statement::deliver(binary(BinaryOperator::Add, ident("a"), ident("b"))),
            ],
        ),
        Statement::assign("x", call("slow_add", vec![int(1), int(2)])),
        Statement::assign("y", call("slow_add", vec![int(3), int(4)])),
        print(vec![binary(BinaryOperator::Add, ident("x"), ident("y"))]),
    ])
}

#[test]
fn test_delivered_calls_overlap() {
    let interpreter = interpreter();
    let started = Instant::now();
    interpreter
        .execute(&slow_add_program(300), &interpreter.new_context())
        .unwrap();
    let elapsed = started.elapsed();
    assert_eq!(interpreter.output(), vec!["10"]);
    assert!(
        elapsed < Duration::from_millis(580),
        "eager calls ran one after another: {:?}",
        elapsed
    );
}

#[test]
fn test_same_output_without_promises() {
    let interpreter = interpreter_with(sync_config());
    let started = Instant::now();
    interpreter
        .execute(&slow_add_program(50), &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["10"]);
    assert!(started.elapsed() >= Duration::from_millis(100));
}

#[test]
fn test_try_catch_sees_deferred_errors() {
    let interpreter = interpreter();
    let program = program(vec![
        def(
            "lookup",
            &["key"],
            vec![Statement::deliver(Expression::Index {
                object: Box::new(Expression::Dict(vec![(Expression::string("a"), int(1))])),
                index: Box::new(ident("key")),
            })],
        ),
        Statement::assign("pending", call("lookup", vec![Expression::string("zz")])),
        Statement::new(StatementKind::TryCatch {
            body: vec![print(vec![ident("pending")])],
            error_binding: Some("e".into()),
            handler: vec![print(vec![Expression::FString(vec![
                FStringPart::Text("failed: ".into()),
                FStringPart::Expr(ident("e")),
            ])])],
            finally: Some(vec![print(vec![Expression::string("done")])]),
        }),
        // the failure stays memoized
        Statement::new(StatementKind::TryCatch {
            body: vec![print(vec![ident("pending")])],
            error_binding: Some("again".into()),
            handler: vec![print(vec![ident("again")])],
            finally: None,
        }),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(
        interpreter.output(),
        vec![
            "failed: key not found: 'zz'",
            "done",
            "key not found: 'zz'"
        ]
    );
}

#[test]
fn test_structs_and_method_dispatch() {
    let interpreter = interpreter();
    let rect = ident("r");
    let field = |name: &str| Expression::Attribute {
        object: Box::new(rect.clone()),
        name: name.into(),
    };
    let program = program(vec![
        Statement::new(StatementKind::StructDef(Arc::new(StructDef {
            name: "Rect".into(),
            fields: vec![
                StructField {
                    name: "w".into(),
                    default: None,
                },
                StructField {
                    name: "h".into(),
                    default: Some(int(1)),
                },
            ],
        }))),
        def(
            "area",
            &["r"],
            vec![Statement::ret(binary(
                BinaryOperator::Multiply,
                field("w"),
                field("h"),
            ))],
        ),
        Statement::assign(
            "r",
            Expression::Call {
                function: Box::new(ident("Rect")),
                arguments: vec![
                    Argument::Positional(int(2)),
                    Argument::Named {
                        name: "h".into(),
                        value: int(3),
                    },
                ],
            },
        ),
        print(vec![Expression::method(ident("r"), "area", vec![])]),
        Statement::new(StatementKind::Assignment {
            target: vec![field("w")],
            value: int(5),
        }),
        print(vec![ident("r")]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["6", "Rect(w=5, h=3)"]);
}

#[test]
fn test_reason_end_to_end() {
    let mut backend = MockCapability::new();
    backend
        .expect_invoke()
        .withf(|request| request.input("prompt") == Some(&json!("Summarize: dana")))
        .times(1)
        .returning(|_| Ok(json!("a concurrent language")));

    let interpreter = interpreter();
    interpreter.register_resource("reason", Arc::new(backend));
    let program = program(vec![
        def(
            "summarize",
            &["topic"],
            vec![Statement::deliver(call(
                "reason",
                vec![binary(
                    BinaryOperator::Add,
                    Expression::string("Summarize: "),
                    ident("topic"),
                )],
            ))],
        ),
        Statement::assign("summary", call("summarize", vec![Expression::string("dana")])),
        print(vec![Expression::method(ident("summary"), "upper", vec![])]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["A CONCURRENT LANGUAGE"]);
}

#[test]
fn test_uncaught_error_reports_kind_and_location() {
    let interpreter = interpreter();
    let program = program(vec![
        Statement::assign("x", int(1)).at(1, 1),
        print(vec![ident("y")]).at(2, 1),
    ]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, ErrorKind::NameResolution);
    assert_eq!(
        error.to_string(),
        "NameResolutionError at 2:1: name 'y' is not defined"
    );
    assert!(!error.is_deferred());
}
