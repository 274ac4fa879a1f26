use std::sync::Arc;

use dana_core::{
    ast::{Expression, ScopeKind, Statement, StatementKind},
    capability::MockCapability,
    CapabilityRequest, ErrorKind, SandboxContext, Value,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use crate::{call, def, ident, int, interpreter, interpreter_with, print, program, sync_config};

#[tokio::test]
async fn test_copy_isolates_scopes_and_shares_resources() {
    let mut search = MockCapability::new();
    search
        .expect_invoke()
        .withf(|request| request.method == "query")
        .times(2)
        .returning(|request| Ok(json!({ "query": request.input("q").cloned() })));

    let original = SandboxContext::new();
    original.register_resource_as("search", Arc::new(search));
    original.set_in(ScopeKind::Private, "token", Value::from("abc"));

    let copy = original.copy();
    copy.set(&"private:token".into(), Value::from("changed"))
        .unwrap();
    copy.set_in(ScopeKind::Private, "extra", Value::Integer(1));

    assert_eq!(
        original.get_in(ScopeKind::Private, "token"),
        Some(Value::from("abc"))
    );
    assert_eq!(original.get_in(ScopeKind::Private, "extra"), None);

    for context in [&original, &copy] {
        let response = context
            .resources()
            .invoke(
                "search",
                CapabilityRequest::new("query").with_input("q", json!("dana")),
            )
            .await
            .unwrap();
        assert_eq!(response, json!({ "query": "dana" }));
    }
}

#[test]
fn test_callee_writes_never_reach_the_caller() {
    let interpreter = interpreter();
    let context = interpreter.new_context();
    context.set_in(ScopeKind::Public, "counter", Value::Integer(0));
    let program = program(vec![
        def(
            "bump",
            &[],
            vec![
                Statement::assign(
                    "public:counter",
                    crate::binary(
                        dana_core::ast::BinaryOperator::Add,
                        ident("public:counter"),
                        int(1),
                    ),
                ),
                Statement::ret(ident("public:counter")),
            ],
        ),
        print(vec![call("bump", vec![])]),
        print(vec![ident("public:counter")]),
    ]);
    interpreter.execute(&program, &context).unwrap();
    assert_eq!(interpreter.output(), vec!["1", "0"]);
    assert_eq!(
        context.get_in(ScopeKind::Public, "counter"),
        Some(Value::Integer(0))
    );
}

#[test]
fn test_use_capability_from_a_program() {
    let mut tools = MockCapability::new();
    tools
        .expect_invoke()
        .withf(|request| request.method == "lookup" && request.input("id") == Some(&json!(7)))
        .times(1)
        .returning(|_| Ok(json!({ "name": "widget", "tags": ["a", "b"] })));

    let interpreter = interpreter();
    interpreter.register_resource("inventory", Arc::new(tools));
    let context = interpreter.new_context();
    let program = program(vec![
        Statement::assign(
            "item",
            Expression::Call {
                function: Box::new(ident("use_capability")),
                arguments: vec![
                    dana_core::ast::Argument::Positional(Expression::string("inventory")),
                    dana_core::ast::Argument::Positional(Expression::string("lookup")),
                    dana_core::ast::Argument::Named {
                        name: "id".into(),
                        value: int(7),
                    },
                ],
            },
        ),
        print(vec![Expression::Index {
            object: Box::new(ident("item")),
            index: Box::new(Expression::string("name")),
        }]),
        print(vec![call(
            "len",
            vec![Expression::Index {
                object: Box::new(ident("item")),
                index: Box::new(Expression::string("tags")),
            }],
        )]),
    ]);
    interpreter.execute(&program, &context).unwrap();
    assert_eq!(interpreter.output(), vec!["widget", "2"]);
}

#[test]
fn test_unregistered_capability() {
    let interpreter = interpreter();
    let program = program(vec![Statement::expression(call(
        "use_capability",
        vec![Expression::string("missing"), Expression::string("run")],
    ))]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(error.kind, dana_core::ErrorKind::Capability);
}

#[test]
fn test_callee_cannot_see_caller_locals() {
    // def g(): return hidden
    // def f(): hidden = 7; return g()
    let program = program(vec![
        def("g", &[], vec![Statement::ret(ident("hidden"))]),
        def(
            "f",
            &[],
            vec![
                Statement::assign("hidden", int(7)),
                Statement::ret(call("g", vec![])),
            ],
        ),
        print(vec![call("f", vec![])]),
    ]);
    for config in [dana_core::InterpreterConfig::default(), sync_config()] {
        let interpreter = interpreter_with(config);
        let error = interpreter
            .execute(&program, &interpreter.new_context())
            .unwrap_err();
        assert_eq!(error.kind, ErrorKind::NameResolution);
        assert_eq!(error.message(), "name 'hidden' is not defined");
        assert!(interpreter.output().is_empty());
    }
}

#[test]
fn test_callee_sees_caller_private_scope_and_its_own_parameters() {
    let interpreter = interpreter();
    let context = interpreter.new_context();
    context.set_in(ScopeKind::Private, "greeting", Value::from("hi"));
    let program = program(vec![
        def(
            "greet",
            &["name"],
            vec![Statement::ret(crate::binary(
                dana_core::ast::BinaryOperator::Add,
                ident("greeting"),
                ident("name"),
            ))],
        ),
        Statement::assign("name", Expression::string("unused")),
        print(vec![call("greet", vec![Expression::string(" dana")])]),
    ]);
    interpreter.execute(&program, &context).unwrap();
    assert_eq!(interpreter.output(), vec!["hi dana"]);
}

#[test]
fn test_call_copies_are_released() {
    let interpreter = interpreter();
    let context = interpreter.new_context();
    let heap = context.heap();
    let rows = (0..100)
        .map(|i| heap.alloc_list(vec![Value::Integer(i)]))
        .collect();
    context.set_in(ScopeKind::Private, "table", heap.alloc_list(rows));
    let baseline = heap.len();
    assert_eq!(baseline, 101);

    // every call snapshots the table, 1000 times over
    let program = program(vec![
        def("id", &["x"], vec![Statement::ret(ident("x"))]),
        Statement::new(StatementKind::For {
            variable: "i".into(),
            iterable: call("range", vec![int(1000)]),
            body: vec![Statement::expression(call("id", vec![int(1)]))],
        }),
    ]);
    interpreter.execute(&program, &context).unwrap();
    assert_eq!(heap.len(), baseline);
}
