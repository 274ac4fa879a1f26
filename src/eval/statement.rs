use core::fmt;
use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::{debug, warn};

use super::builtins;
use super::context::{Definition, SandboxContext};
use super::evaluator::{EvalError, EvalResult};
use super::expression::{force, ExpressionEvaluator};
use super::operators;
use super::value::{HeapObject, Value};
use crate::ast::{Expression, ScopeKind, Statement, StatementKind};
use crate::promise::force_deep;

/// Result of evaluating one statement.
#[derive(Debug, Clone)]
pub enum StatementResult {
    /// Completed normally. Expression statements carry their value.
    Value(Value),

    /// Control transfer out of the enclosing block.
    Control(ControlFlow),
}

#[derive(Debug, Clone)]
pub enum ControlFlow {
    Break,
    Continue,
    /// `return` and `deliver` both end the function with a value.
    Return(Value),
}

impl fmt::Display for ControlFlow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlFlow::Break => write!(f, "break"),
            ControlFlow::Continue => write!(f, "continue"),
            ControlFlow::Return(_) => write!(f, "return"),
        }
    }
}

/// Statements run strictly in source order on the calling logical thread.
#[derive(Clone)]
pub struct StatementEvaluator {
    expressions: ExpressionEvaluator,
}

impl StatementEvaluator {
    pub fn new(expressions: ExpressionEvaluator) -> Self {
        Self { expressions }
    }

    pub fn expressions(&self) -> &ExpressionEvaluator {
        &self.expressions
    }

    #[async_recursion]
    pub async fn eval_statement(
        &self,
        statement: &Statement,
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        context.set_span(statement.span);
        self.dispatch(&statement.kind, context)
            .await
            .map_err(|error| error.at(statement.span))
    }

    /// Runs statements until one transfers control.
    #[async_recursion]
    pub async fn eval_block(
        &self,
        statements: &[Statement],
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        let mut last = Value::None;
        for statement in statements {
            match self.eval_statement(statement, context.clone()).await? {
                StatementResult::Value(value) => last = value,
                control => return Ok(control),
            }
        }
        Ok(StatementResult::Value(last))
    }

    async fn dispatch(
        &self,
        kind: &StatementKind,
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        match kind {
            StatementKind::Expression(expr) => self.eval_expression_statement(expr, context).await,
            StatementKind::Assignment { target, value } => {
                self.eval_assignment(target, value, context).await?;
                Ok(StatementResult::Value(Value::None))
            }
            StatementKind::If {
                condition,
                then_block,
                else_block,
            } => {
                if self.condition(condition, &context).await? {
                    self.eval_block(then_block, context).await
                } else if let Some(else_block) = else_block {
                    self.eval_block(else_block, context).await
                } else {
                    Ok(StatementResult::Value(Value::None))
                }
            }
            StatementKind::While { condition, body } => {
                let limit = self.expressions.services().config.limits.max_loop_iterations;
                let mut iterations = 0;
                while self.condition(condition, &context).await? {
                    iterations += 1;
                    if iterations > limit {
                        return Err(EvalError::loop_limit(limit));
                    }
                    match self.eval_block(body, context.clone()).await? {
                        StatementResult::Control(ControlFlow::Break) => break,
                        StatementResult::Control(ControlFlow::Return(value)) => {
                            return Ok(StatementResult::Control(ControlFlow::Return(value)))
                        }
                        _ => {}
                    }
                }
                Ok(StatementResult::Value(Value::None))
            }
            StatementKind::For {
                variable,
                iterable,
                body,
            } => self.eval_for(variable, iterable, body, context).await,
            StatementKind::FunctionDef(def) => {
                debug!(function = %def.name, mode = %def.delivery_mode(), "define function");
                context.define(def.name.clone(), Definition::Function(def.clone()));
                Ok(StatementResult::Value(Value::None))
            }
            StatementKind::StructDef(def) => {
                debug!(name = %def.name, "define struct");
                context.define(def.name.clone(), Definition::Struct(def.clone()));
                Ok(StatementResult::Value(Value::None))
            }
            StatementKind::Return(value) | StatementKind::Deliver(value) => {
                let value = match value {
                    Some(expr) => self.expressions.eval_expression(expr, context).await?,
                    None => Value::None,
                };
                Ok(StatementResult::Control(ControlFlow::Return(value)))
            }
            StatementKind::Break => Ok(StatementResult::Control(ControlFlow::Break)),
            StatementKind::Continue => Ok(StatementResult::Control(ControlFlow::Continue)),
            StatementKind::Pass => Ok(StatementResult::Value(Value::None)),
            StatementKind::TryCatch {
                body,
                error_binding,
                handler,
                finally,
            } => {
                self.eval_try(body, error_binding.as_deref(), handler, finally.as_deref(), context)
                    .await
            }
            StatementKind::Raise(expr) => {
                let value = self.expressions.eval_deep(expr, context.clone()).await?;
                Err(EvalError::Raised(context.heap().display(&value)?))
            }
            StatementKind::Assert { condition, message } => {
                if self.condition(condition, &context).await? {
                    return Ok(StatementResult::Value(Value::None));
                }
                let message = match message {
                    Some(expr) => {
                        let value = self.expressions.eval_deep(expr, context.clone()).await?;
                        context.heap().display(&value)?
                    }
                    None => "assertion failed".to_string(),
                };
                Err(EvalError::AssertionFailed(message))
            }
        }
    }

    /// Forces the value unless the statement is a bare `deliver` call,
    /// which is fire-and-forget.
    async fn eval_expression_statement(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        let value = self.expressions.eval_expression(expr, context.clone()).await?;
        if matches!(expr, Expression::Deliver(_)) {
            return Ok(StatementResult::Value(value));
        }
        let value = force_deep(value).await?;
        Ok(StatementResult::Value(value))
    }

    async fn condition(&self, expr: &Expression, context: &Arc<SandboxContext>) -> EvalResult<bool> {
        let value = self.expressions.eval_forced(expr, context.clone()).await?;
        context.heap().truthy(&value)
    }

    async fn eval_assignment(
        &self,
        targets: &[Expression],
        value: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<()> {
        let value = self.expressions.eval_expression(value, context.clone()).await?;
        if let [target] = targets {
            return self.assign(target, value, &context).await;
        }

        // unpacking needs the items, so the value is forced here
        let value = force(value).await?;
        let items = builtins::iterate(&value, context.heap())?;
        if items.len() != targets.len() {
            return Err(EvalError::invalid(format!(
                "mismatched assignment: {} targets but got {} values",
                targets.len(),
                items.len()
            )));
        }
        for (target, item) in targets.iter().zip(items) {
            self.assign(target, item, &context).await?;
        }
        Ok(())
    }

    async fn assign(
        &self,
        target: &Expression,
        value: Value,
        context: &Arc<SandboxContext>,
    ) -> EvalResult<()> {
        match target {
            Expression::Identifier(name) => context.set(name, value),
            Expression::Index { object, index } => {
                let object = self.expressions.eval_forced(object, context.clone()).await?;
                let index = self.expressions.eval_deep(index, context.clone()).await?;
                operators::set_index(&object, index, value, context.heap())
            }
            Expression::Attribute { object, name } => {
                let object = self.expressions.eval_forced(object, context.clone()).await?;
                let type_name = context.heap().type_name(&object);
                let Value::Object(target) = object else {
                    return Err(EvalError::type_mismatch(format!(
                        "'{}' object has no attribute '{}'",
                        type_name, name
                    )));
                };
                let assigned = target.with_mut(|object| match object {
                    HeapObject::Struct { fields, .. } => {
                        match fields.iter_mut().find(|(field, _)| field == name) {
                            Some((_, slot)) => {
                                *slot = value;
                                true
                            }
                            None => false,
                        }
                    }
                    _ => false,
                });
                if assigned {
                    Ok(())
                } else {
                    Err(EvalError::type_mismatch(format!(
                        "'{}' object has no attribute '{}'",
                        type_name, name
                    )))
                }
            }
            other => Err(EvalError::invalid(format!(
                "cannot assign to {}",
                other.kind_name()
            ))),
        }
    }

    async fn eval_for(
        &self,
        variable: &str,
        iterable: &Expression,
        body: &[Statement],
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        let iterable = self.expressions.eval_forced(iterable, context.clone()).await?;
        // iterates over a snapshot of the items
        let items = builtins::iterate(&iterable, context.heap())?;
        let limit = self.expressions.services().config.limits.max_loop_iterations;
        if items.len() > limit {
            return Err(EvalError::loop_limit(limit));
        }
        for item in items {
            context.set_in(ScopeKind::Local, variable, item);
            match self.eval_block(body, context.clone()).await? {
                StatementResult::Control(ControlFlow::Break) => break,
                StatementResult::Control(ControlFlow::Return(value)) => {
                    return Ok(StatementResult::Control(ControlFlow::Return(value)))
                }
                _ => {}
            }
        }
        Ok(StatementResult::Value(Value::None))
    }

    async fn eval_try(
        &self,
        body: &[Statement],
        error_binding: Option<&str>,
        handler: &[Statement],
        finally: Option<&[Statement]>,
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        let outcome = match self.eval_try_body(body, context.clone()).await {
            Err(error) if !error.is_fatal() => {
                debug!(kind = %error.kind(), deferred = error.is_deferred(), "caught");
                if let Some(name) = error_binding {
                    context.set_in(
                        ScopeKind::Local,
                        name,
                        Value::String(error.root().to_string()),
                    );
                }
                self.eval_block(handler, context.clone()).await
            }
            other => other,
        };

        if let Some(finally) = finally {
            match self.eval_block(finally, context).await {
                // control transfer in finally replaces the outcome
                Ok(StatementResult::Control(flow)) => return Ok(StatementResult::Control(flow)),
                Ok(StatementResult::Value(_)) => {}
                Err(error) => {
                    if let Err(original) = &outcome {
                        warn!(error = %original, "discarded by error in finally");
                    }
                    return Err(error);
                }
            }
        }
        outcome
    }

    /// Values returned out of a `try` body are forced inside it, so a
    /// deferred failure is caught by the handler that encloses its origin.
    async fn eval_try_body(
        &self,
        body: &[Statement],
        context: Arc<SandboxContext>,
    ) -> EvalResult<StatementResult> {
        match self.eval_block(body, context.clone()).await? {
            StatementResult::Control(ControlFlow::Return(value)) => {
                let value = force_deep(value).await?;
                Ok(StatementResult::Control(ControlFlow::Return(value)))
            }
            other => Ok(other),
        }
    }
}
