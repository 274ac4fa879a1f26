use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::{
    builtins::NativeRegistry,
    context::SandboxContext,
    expression::ExpressionEvaluator,
    statement::{ControlFlow, StatementEvaluator, StatementResult},
    value::Value,
};
use crate::ast::{Expression, Program, Span};
use crate::cache::{CacheStats, ExecutionCache};
use crate::capability::CapabilityError;
use crate::config::InterpreterConfig;
use crate::error::ErrorKind;
use crate::promise::{executor::PromiseExecutor, PromiseFailure};

#[derive(Error, Debug, Clone)]
pub enum EvalError {
    #[error("name '{name}' is not defined")]
    NameResolution { name: String },

    #[error("{0}")]
    TypeMismatch(String),

    #[error("maximum recursion depth exceeded ({depth} > {limit})")]
    RecursionLimit { depth: usize, limit: usize },

    #[error("circular reference detected: {}", path.join(" -> "))]
    CircularReference { path: Vec<String> },

    /// Raised by forcing a failed promise. Displays the original error.
    #[error("{0}")]
    PromiseFailure(Arc<PromiseFailure>),

    #[error("{0}")]
    Capability(#[from] CapabilityError),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("index {index} out of range for length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("{function}() takes {expected} arguments but {got} were given")]
    ArityMismatch {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("{0}")]
    Raised(String),

    #[error("{0}")]
    AssertionFailed(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{source}")]
    At { span: Span, source: Box<EvalError> },
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        EvalError::InvalidOperation(message.into())
    }

    pub fn loop_limit(limit: usize) -> Self {
        EvalError::invalid(format!("loop exceeded {} iterations", limit))
    }

    /// Attaches a location, unless one is already attached.
    pub fn at(self, span: Span) -> Self {
        match self {
            EvalError::At { .. } => self,
            other if span.is_known() => EvalError::At {
                span,
                source: Box::new(other),
            },
            other => other,
        }
    }

    /// The error with location and promise wrappers removed.
    pub fn root(&self) -> &EvalError {
        match self {
            EvalError::At { source, .. } => source.root(),
            EvalError::PromiseFailure(failure) => failure.error.root(),
            other => other,
        }
    }

    /// Innermost known location.
    pub fn span(&self) -> Option<Span> {
        match self {
            EvalError::At { span, source } => source.span().or(Some(*span)),
            EvalError::PromiseFailure(failure) => failure
                .error
                .span()
                .or_else(|| failure.call_site.span.is_known().then_some(failure.call_site.span)),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        match self {
            EvalError::At { source, .. } => source.is_deferred(),
            EvalError::PromiseFailure(_) => true,
            _ => false,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            EvalError::NameResolution { .. } => ErrorKind::NameResolution,
            EvalError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            EvalError::RecursionLimit { .. } => ErrorKind::RecursionLimit,
            EvalError::CircularReference { .. } => ErrorKind::CircularReference,
            EvalError::Capability(_) => ErrorKind::Capability,
            EvalError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            EvalError::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            EvalError::KeyNotFound(_) => ErrorKind::KeyNotFound,
            EvalError::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            EvalError::Raised(_) => ErrorKind::Raised,
            EvalError::AssertionFailed(_) => ErrorKind::AssertionFailed,
            EvalError::Internal(_) | EvalError::PromiseFailure(_) | EvalError::At { .. } => {
                ErrorKind::Internal
            }
        }
    }

    /// Fatal errors abort the execution and are never caught by `try`.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }
}

/// Services shared by every evaluator of one top-level execution.
#[derive(Clone)]
pub struct EvalServices {
    pub config: Arc<InterpreterConfig>,
    pub executor: Arc<dyn PromiseExecutor>,
    pub natives: Arc<NativeRegistry>,
    pub cache: Option<Arc<ExecutionCache>>,
}

impl EvalServices {
    pub fn new(
        config: Arc<InterpreterConfig>,
        executor: Arc<dyn PromiseExecutor>,
        natives: Arc<NativeRegistry>,
    ) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(ExecutionCache::new(config.cache.capacity)));
        Self {
            config,
            executor,
            natives,
            cache,
        }
    }
}

/// Entry point for evaluating programs and expressions against a context.
pub struct Evaluator {
    statement_evaluator: StatementEvaluator,
    services: EvalServices,
}

impl Evaluator {
    pub fn new(services: EvalServices) -> Self {
        let expressions = ExpressionEvaluator::new(services.clone());
        Self {
            statement_evaluator: StatementEvaluator::new(expressions),
            services,
        }
    }

    /// Runs every top-level statement in order. Yields the value of the last
    /// expression statement, which may still be a promise.
    #[tracing::instrument(skip(self, program, context), level = "debug")]
    pub async fn eval_program(
        &self,
        program: &Program,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let mut last = Value::None;
        for statement in program.statements.iter() {
            match self
                .statement_evaluator
                .eval_statement(statement, context.clone())
                .await?
            {
                StatementResult::Value(value) => {
                    if matches!(statement.kind, crate::ast::StatementKind::Expression(_)) {
                        last = value;
                    }
                }
                StatementResult::Control(ControlFlow::Return(value)) => {
                    debug!("top-level return");
                    return Ok(value);
                }
                StatementResult::Control(flow) => {
                    return Err(EvalError::invalid(format!("'{}' outside loop", flow))
                        .at(statement.span));
                }
            }
        }
        Ok(last)
    }

    /// Evaluates an expression and forces the result, as a host caller sees it.
    pub async fn evaluate(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let value = self.evaluate_raw(expr, context).await?;
        crate::promise::force_deep(value).await
    }

    /// Evaluates an expression without forcing. Dana calls yield promises.
    pub async fn evaluate_raw(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        self.statement_evaluator
            .expressions()
            .eval_expression(expr, context)
            .await
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.services.cache.as_ref().map(|cache| cache.stats())
    }
}
