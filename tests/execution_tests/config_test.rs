use std::io::Write;

use dana_core::{ast::Statement, config::InterpreterConfig, Error, Interpreter, OutputSink};
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

use crate::{call, def, int, print, program};

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_interpreter_from_config_file() {
    let file = config_file(
        r#"{
            "promise": { "enabled": false },
            "recursion": { "soft_limit": 5, "hard_limit": 8 },
            "limits": { "max_loop_iterations": 100 }
        }"#,
    );
    let config = InterpreterConfig::from_file(file.path()).unwrap();
    assert!(!config.promise.enabled);
    assert_eq!(config.promise.max_concurrency, 32);
    assert_eq!(config.recursion.hard_limit, 8);
    assert!(config.cache.enabled);

    let interpreter = Interpreter::with_output(config, OutputSink::buffer()).unwrap();
    let program = program(vec![
        def("three", &[], vec![Statement::ret(int(3))]),
        print(vec![call("three", vec![])]),
    ]);
    interpreter
        .execute(&program, &interpreter.new_context())
        .unwrap();
    assert_eq!(interpreter.output(), vec!["3"]);
    interpreter.shutdown().unwrap();
}

#[test]
fn test_invalid_config_file() {
    let file = config_file(r#"{ "recursion": { "soft_limit": 600, "hard_limit": 500 } }"#);
    let error = InterpreterConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert_eq!(
        error.to_string(),
        "Config error: invalid value for recursion.soft_limit: 600 exceeds hard limit 500"
    );

    let malformed = config_file("{ not json");
    assert!(matches!(
        InterpreterConfig::from_file(malformed.path()),
        Err(Error::Json(_))
    ));
}
