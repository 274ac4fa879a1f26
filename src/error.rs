use thiserror::Error;

use crate::ast::Span;
use crate::capability::CapabilityError;
use crate::config::ConfigError;
use crate::eval::evaluator::EvalError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{0}")]
    Execution(#[from] ExecutionError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type DanaResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}

/// Classification of evaluation failures, as reported to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ErrorKind {
    #[strum(serialize = "NameResolutionError")]
    NameResolution,
    #[strum(serialize = "TypeMismatchError")]
    TypeMismatch,
    #[strum(serialize = "RecursionLimitError")]
    RecursionLimit,
    #[strum(serialize = "CircularReferenceError")]
    CircularReference,
    #[strum(serialize = "CapabilityError")]
    Capability,
    #[strum(serialize = "InvalidOperationError")]
    InvalidOperation,
    #[strum(serialize = "IndexError")]
    IndexOutOfRange,
    #[strum(serialize = "KeyError")]
    KeyNotFound,
    #[strum(serialize = "ArityError")]
    ArityMismatch,
    #[strum(serialize = "RaisedError")]
    Raised,
    #[strum(serialize = "AssertionError")]
    AssertionFailed,
    #[strum(serialize = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::RecursionLimit | ErrorKind::CircularReference)
    }
}

/// An uncaught failure of a top-level execution.
#[derive(Error, Debug, Clone)]
#[error("{kind}{}: {}", location(.span), .error.root())]
pub struct ExecutionError {
    pub kind: ErrorKind,
    pub span: Span,
    pub error: EvalError,
}

impl ExecutionError {
    pub fn message(&self) -> String {
        self.error.root().to_string()
    }

    pub fn is_deferred(&self) -> bool {
        self.error.is_deferred()
    }
}

fn location(span: &Span) -> String {
    if span.is_known() {
        format!(" at {}", span)
    } else {
        String::new()
    }
}

impl From<EvalError> for ExecutionError {
    fn from(error: EvalError) -> Self {
        Self {
            kind: error.kind(),
            span: error.span().unwrap_or_default(),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_execution_error_display() {
        let error: ExecutionError = EvalError::TypeMismatch("unsupported operand".into())
            .at(Span::new(4, 7))
            .into();
        assert_eq!(error.kind, ErrorKind::TypeMismatch);
        assert_eq!(
            error.to_string(),
            "TypeMismatchError at 4:7: unsupported operand"
        );
        let wrapped: Error = error.into();
        assert!(matches!(wrapped, Error::Execution(_)));
    }

    #[test]
    fn test_execution_error_without_location() {
        let error: ExecutionError = EvalError::invalid("loop exceeded 10 iterations").into();
        assert!(!error.span.is_known());
        assert_eq!(
            error.to_string(),
            "InvalidOperationError: loop exceeded 10 iterations"
        );
    }
}
