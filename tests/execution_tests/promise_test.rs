use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dana_core::{
    ast::{BinaryOperator, Expression, Span, Statement, StatementKind},
    config::InterpreterConfig,
    ErrorKind, EvalError, EvalResult, Interpreter, NativeArgs, NativeFunction, SandboxContext,
    Value,
};
use pretty_assertions::assert_eq;

use crate::{binary, call, def, ident, int, interpreter, interpreter_with, print, program};

type EventLog = Arc<Mutex<Vec<String>>>;

/// `wait_for(event, timeout_ms)`: polls the log without touching any promise.
struct WaitFor {
    log: EventLog,
}

#[async_trait]
impl NativeFunction for WaitFor {
    fn name(&self) -> &str {
        "wait_for"
    }

    async fn call(&self, args: NativeArgs, _context: Arc<SandboxContext>) -> EvalResult<Value> {
        let (Some(Value::String(event)), Some(Value::Integer(timeout))) = (args.get(0), args.get(1))
        else {
            return Err(EvalError::type_mismatch("wait_for(event, timeout_ms)"));
        };
        let deadline = Instant::now() + Duration::from_millis(*timeout as u64);
        while Instant::now() < deadline {
            if self.log.lock().unwrap().contains(event) {
                return Ok(Value::Boolean(true));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(Value::Boolean(false))
    }
}

fn with_event_log(interpreter: &Interpreter) -> EventLog {
    let log = EventLog::default();
    let recorder = log.clone();
    interpreter.register_fn("record", move |args, _| {
        if let Some(Value::String(event)) = args.get(0) {
            recorder.lock().unwrap().push(event.clone());
        }
        Ok(Value::None)
    });
    interpreter.register_native(Arc::new(WaitFor { log: log.clone() }));
    log
}

fn started_before_forcing(worker: Statement, call_site: Expression, timeout: i64) -> Vec<String> {
    let interpreter = interpreter();
    let log = with_event_log(&interpreter);
    let program = program(vec![
        worker,
        Statement::assign("p", call_site),
        Statement::assign(
            "seen",
            call("wait_for", vec![Expression::string("started"), int(timeout)]),
        ),
        print(vec![ident("seen")]),
        print(vec![ident("p")]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["started".to_string()]);
    interpreter.output()
}

fn worker(ends_with: Statement) -> Statement {
    def(
        "worker",
        &[],
        vec![
            Statement::expression(call("record", vec![Expression::string("started")])),
            ends_with,
        ],
    )
}

#[test]
fn test_eager_work_starts_without_forcing() {
    let output = started_before_forcing(
        worker(Statement::deliver(int(1))),
        call("worker", vec![]),
        2000,
    );
    assert_eq!(output, vec!["True", "1"]);
}

#[test]
fn test_deliver_call_site_makes_any_function_eager() {
    let output = started_before_forcing(
        worker(Statement::ret(int(1))),
        Expression::deliver(call("worker", vec![])),
        2000,
    );
    assert_eq!(output, vec!["True", "1"]);
}

#[test]
fn test_lazy_work_waits_for_first_use() {
    let output = started_before_forcing(
        worker(Statement::ret(int(1))),
        call("worker", vec![]),
        200,
    );
    assert_eq!(output, vec!["False", "1"]);
}

#[test]
fn test_forcing_is_idempotent() {
    let interpreter = interpreter();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    interpreter.register_fn("tick", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Value::None)
    });
    let program = program(vec![
        def(
            "once",
            &[],
            vec![
                Statement::expression(call("tick", vec![])),
                Statement::ret(int(5)),
            ],
        ),
        Statement::assign("v", call("once", vec![])),
        print(vec![binary(BinaryOperator::Add, ident("v"), int(1))]),
        print(vec![binary(BinaryOperator::Multiply, ident("v"), int(2))]),
        print(vec![ident("v")]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["6", "10", "5"]);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_statements_run_in_source_order() {
    let interpreter = interpreter();
    let program = program(vec![
        def(
            "slow",
            &["x"],
            vec![
                Statement::expression(call("sleep", vec![int(50)])),
                Statement::deliver(ident("x")),
            ],
        ),
        Statement::assign("r", call("slow", vec![int(1)])),
        print(vec![Expression::string("before")]),
        Statement::assign("r", binary(BinaryOperator::Add, ident("r"), int(1))),
        print(vec![ident("r")]),
        print(vec![Expression::string("after")]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["before", "2", "after"]);
}

#[test]
fn test_one_failure_does_not_affect_siblings() {
    let interpreter = interpreter();
    let program = program(vec![
        def(
            "bad",
            &[],
            vec![Statement::deliver(binary(BinaryOperator::FloorDivide, int(1), int(0))).at(2, 5)],
        ),
        def("good", &[], vec![Statement::deliver(int(2))]),
        Statement::assign("b", call("bad", vec![])).at(4, 1),
        Statement::assign("g", call("good", vec![])).at(5, 1),
        print(vec![ident("g")]).at(6, 1),
        print(vec![ident("b")]).at(7, 1),
        print(vec![Expression::string("unreachable")]).at(8, 1),
    ]);
    let error = interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap_err();
    assert_eq!(interpreter.output(), vec!["2"]);
    assert_eq!(error.kind, ErrorKind::InvalidOperation);
    assert_eq!(error.message(), "division by zero");
    assert!(error.is_deferred());
    // reported where it happened, not where it was forced
    assert_eq!(error.span, Span::new(2, 5));
}

#[test]
fn test_bounded_pool_runs_recursive_eager_calls() {
    let mut config = InterpreterConfig::default();
    config.promise.max_concurrency = 1;
    config.promise.worker_threads = 1;
    let interpreter = interpreter_with(config);
    let n = || ident("n");
    let program = program(vec![
        def(
            "fib",
            &["n"],
            vec![
                Statement::new(StatementKind::If {
                    condition: binary(BinaryOperator::LessThan, n(), int(2)),
                    then_block: vec![Statement::deliver(n())],
                    else_block: None,
                }),
                Statement::deliver(binary(
                    BinaryOperator::Add,
                    call("fib", vec![binary(BinaryOperator::Subtract, n(), int(1))]),
                    call("fib", vec![binary(BinaryOperator::Subtract, n(), int(2))]),
                )),
            ],
        ),
        print(vec![call("fib", vec![int(12)])]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["144"]);
}

#[test]
fn test_host_can_force_returned_promise() {
    let interpreter = interpreter();
    let context = interpreter.new_context();
    let program = program(vec![
        def("answer", &[], vec![Statement::ret(int(42))]),
        Statement::ret(call("answer", vec![])),
    ]);
    let state = interpreter.state().clone();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let value = runtime
        .block_on(state.execute_raw(&program, context))
        .unwrap();
    let Value::Promise(promise) = value else {
        panic!("expected a promise, got {:?}", value);
    };
    assert_eq!(promise.status(), dana_core::PromiseStatus::Pending);
    assert_eq!(interpreter.force(&promise).unwrap(), Value::Integer(42));
    assert_eq!(promise.status(), dana_core::PromiseStatus::Resolved);
}

#[test]
fn test_delivered_slow_add_starts_before_next_statement() {
    // x = deliver slow_add(2, 3); y = 10; z = x + y
    let interpreter = interpreter();
    let log = with_event_log(&interpreter);
    let program = program(vec![
        def(
            "slow_add",
            &["a", "b"],
            vec![
                Statement::expression(call("record", vec![Expression::string("slow_add")])),
                Statement::expression(call("sleep", vec![int(50)])),
                Statement::ret(binary(BinaryOperator::Add, ident("a"), ident("b"))),
            ],
        ),
        Statement::assign("x", Expression::deliver(call("slow_add", vec![int(2), int(3)]))),
        Statement::assign(
            "started",
            call("wait_for", vec![Expression::string("slow_add"), int(2000)]),
        ),
        Statement::assign("y", int(10)),
        Statement::assign("z", binary(BinaryOperator::Add, ident("x"), ident("y"))),
        print(vec![ident("started")]),
        print(vec![ident("z")]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["True", "15"]);
    assert_eq!(*log.lock().unwrap(), vec!["slow_add".to_string()]);
}
