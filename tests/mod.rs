mod execution_tests;

use dana_core::{
    ast::{BinaryOperator, Expression, FunctionDef, Parameter, Program, Statement},
    config::InterpreterConfig,
    eval::builtins::OutputSink,
    Interpreter,
};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[ctor::ctor]
fn init_tests() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Interpreter with captured output.
pub fn interpreter() -> Interpreter {
    interpreter_with(InterpreterConfig::default())
}

pub fn interpreter_with(config: InterpreterConfig) -> Interpreter {
    Interpreter::with_output(config, OutputSink::buffer()).expect("Failed to start interpreter")
}

pub fn sync_config() -> InterpreterConfig {
    let mut config = InterpreterConfig::default();
    config.promise.enabled = false;
    config
}

pub fn program(statements: Vec<Statement>) -> Program {
    Program::new(statements)
}

pub fn def(name: &str, parameters: &[&str], body: Vec<Statement>) -> Statement {
    Statement::function(FunctionDef::new(
        name,
        parameters.iter().map(|p| Parameter::new(*p)).collect(),
        body,
    ))
}

pub fn call(name: &str, arguments: Vec<Expression>) -> Expression {
    Expression::call(name, arguments)
}

pub fn ident(name: &str) -> Expression {
    Expression::ident(name)
}

pub fn int(value: i64) -> Expression {
    Expression::int(value)
}

pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::binary(op, left, right)
}

pub fn print(arguments: Vec<Expression>) -> Statement {
    Statement::expression(call("print", arguments))
}
