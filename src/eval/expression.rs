use std::collections::HashMap;
use std::sync::Arc;

use async_recursion::async_recursion;
use tracing::debug;

use super::builtins::{self, NativeArgs};
use super::context::{Definition, SandboxContext};
use super::evaluator::{EvalError, EvalResult, EvalServices};
use super::operators;
use super::statement::{ControlFlow, StatementEvaluator, StatementResult};
use super::value::{dict_insert, FunctionRef, HeapObject, Value};
use crate::ast::{
    Argument, BinaryOperator, DeliveryMode, Expression, FStringPart, FunctionDef, Literal,
    ScopeKind, ScopedName, StructDef,
};
use crate::cache::ExecutionCache;
use crate::promise::{force_deep, CallSite, Promise, Thunk};

/// Evaluates expressions. Dana calls yield promises; everything else forces
/// what it needs and delegates to the underlying value.
#[derive(Clone)]
pub struct ExpressionEvaluator {
    services: EvalServices,
}

impl ExpressionEvaluator {
    pub fn new(services: EvalServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &EvalServices {
        &self.services
    }

    #[async_recursion]
    pub async fn eval_expression(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        match &self.services.cache {
            Some(cache) if ExecutionCache::is_cacheable(expr) => {
                let cache = cache.clone();
                cache
                    .get_or_compute(expr, &context, || self.eval_uncached(expr, context.clone()))
                    .await
            }
            _ => self.eval_uncached(expr, context).await,
        }
    }

    async fn eval_uncached(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        match expr {
            Expression::Literal(literal) => Ok(Self::eval_literal(literal)),
            Expression::Identifier(name) => self.resolve_identifier(name, &context),
            Expression::Binary { op, left, right } => {
                self.eval_binary(*op, left, right, context).await
            }
            Expression::Unary { op, operand } => {
                let operand = self.eval_forced(operand, context.clone()).await?;
                operators::unary(*op, &operand, context.heap())
            }
            Expression::Call {
                function,
                arguments,
            } => self.eval_call(function, arguments, context, false).await,
            Expression::MethodCall {
                object,
                method,
                arguments,
            } => {
                self.eval_method_call(object, method, arguments, context)
                    .await
            }
            Expression::Attribute { object, name } => {
                let object = self.eval_forced(object, context.clone()).await?;
                Self::attribute(&object, name, &context)
            }
            Expression::Index { object, index } => {
                let object = self.eval_forced(object, context.clone()).await?;
                let index = self.eval_deep(index, context.clone()).await?;
                operators::index(&object, &index, context.heap())
            }
            Expression::Slice {
                object,
                start,
                end,
                step,
            } => {
                let object = self.eval_forced(object, context.clone()).await?;
                let start = self.eval_bound(start.as_deref(), context.clone()).await?;
                let end = self.eval_bound(end.as_deref(), context.clone()).await?;
                let step = self.eval_bound(step.as_deref(), context.clone()).await?;
                operators::slice(&object, start, end, step, context.heap())
            }
            Expression::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expression(item, context.clone()).await?);
                }
                Ok(context.heap().alloc_list(values))
            }
            Expression::Dict(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.eval_deep(key, context.clone()).await?;
                    let value = self.eval_expression(value, context.clone()).await?;
                    dict_insert(&mut values, key, value)?;
                }
                Ok(context.heap().alloc_dict(values))
            }
            Expression::Tuple(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expression(item, context.clone()).await?);
                }
                Ok(Value::Tuple(values))
            }
            Expression::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let condition = self.eval_forced(condition, context.clone()).await?;
                if context.heap().truthy(&condition)? {
                    self.eval_expression(then_expr, context).await
                } else {
                    self.eval_expression(else_expr, context).await
                }
            }
            Expression::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Text(text) => out.push_str(text),
                        FStringPart::Expr(expr) => {
                            let value = self.eval_deep(expr, context.clone()).await?;
                            out.push_str(&context.heap().display(&value)?);
                        }
                    }
                }
                Ok(Value::String(out))
            }
            Expression::Deliver(call) => match call.as_ref() {
                Expression::Call {
                    function,
                    arguments,
                } => self.eval_call(function, arguments, context, true).await,
                other => Err(EvalError::invalid(format!(
                    "deliver expects a function call, found {}",
                    other.kind_name()
                ))),
            },
        }
    }

    fn eval_literal(literal: &Literal) -> Value {
        match literal {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Boolean(*b),
            Literal::None => Value::None,
        }
    }

    /// Scope value first, then definitions, then natives. A scope prefix
    /// restricts the lookup to that scope.
    fn resolve_identifier(&self, name: &ScopedName, context: &SandboxContext) -> EvalResult<Value> {
        if let Some((_, value)) = context.lookup(name) {
            return Ok(value);
        }
        if name.scope.is_none() {
            if let Some(definition) = context.definition(&name.name) {
                return Ok(Value::Function(match definition {
                    Definition::Function(def) => FunctionRef::Dana(def),
                    Definition::Struct(def) => FunctionRef::Struct(def),
                }));
            }
            if self.services.natives.contains(&name.name) {
                return Ok(Value::Function(FunctionRef::Native(name.name.clone())));
            }
        }
        Err(EvalError::NameResolution {
            name: name.to_string(),
        })
    }

    /// Evaluates and forces one level: the result is never a promise.
    pub async fn eval_forced(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let value = self.eval_expression(expr, context).await?;
        force(value).await
    }

    /// Evaluates and forces every promise reachable from the result.
    pub async fn eval_deep(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let value = self.eval_expression(expr, context).await?;
        force_deep(value).await
    }

    async fn eval_bound(
        &self,
        expr: Option<&Expression>,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Option<i64>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match self.eval_forced(expr, context).await? {
            Value::None => Ok(None),
            Value::Integer(i) => Ok(Some(i)),
            Value::Boolean(b) => Ok(Some(b as i64)),
            other => Err(EvalError::type_mismatch(format!(
                "slice indices must be integers or None, not '{}'",
                other.scalar_type_name()
            ))),
        }
    }

    async fn eval_binary(
        &self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let heap = context.heap().clone();
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let left = self.eval_forced(left, context.clone()).await?;
                let decided = heap.truthy(&left)? == (op == BinaryOperator::Or);
                if decided {
                    return Ok(left);
                }
                self.eval_forced(right, context).await
            }
            // structural comparisons look inside containers
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::In
            | BinaryOperator::NotIn => {
                let left = self.eval_deep(left, context.clone()).await?;
                let right = self.eval_deep(right, context).await?;
                operators::binary(op, &left, &right, &heap)
            }
            _ => {
                let left = self.eval_forced(left, context.clone()).await?;
                let right = self.eval_forced(right, context).await?;
                operators::binary(op, &left, &right, &heap)
            }
        }
    }

    /// Arguments are evaluated in order but not forced.
    async fn eval_arguments(
        &self,
        arguments: &[Argument],
        context: Arc<SandboxContext>,
    ) -> EvalResult<NativeArgs> {
        let mut args = NativeArgs::default();
        for argument in arguments {
            match argument {
                Argument::Positional(value) => {
                    args.positional
                        .push(self.eval_expression(value, context.clone()).await?);
                }
                Argument::Named { name, value } => {
                    let value = self.eval_expression(value, context.clone()).await?;
                    args.named.push((name.clone(), value));
                }
            }
        }
        Ok(args)
    }

    async fn eval_call(
        &self,
        function: &Expression,
        arguments: &[Argument],
        context: Arc<SandboxContext>,
        delivered: bool,
    ) -> EvalResult<Value> {
        let callee = match self.eval_forced(function, context.clone()).await? {
            Value::Function(callee) => callee,
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "'{}' object is not callable",
                    context.heap().type_name(&other)
                )))
            }
        };
        let args = self.eval_arguments(arguments, context.clone()).await?;
        self.call_function(callee, args, context, delivered).await
    }

    /// Invokes any callable. Natives run in place; Dana functions are
    /// wrapped in a promise unless promises are disabled.
    pub async fn call_function(
        &self,
        callee: FunctionRef,
        args: NativeArgs,
        context: Arc<SandboxContext>,
        delivered: bool,
    ) -> EvalResult<Value> {
        match callee {
            FunctionRef::Native(name) => {
                let args = force_args(args).await?;
                self.services.natives.call(&name, args, context).await
            }
            FunctionRef::Struct(def) => self.construct(&def, args, context).await,
            FunctionRef::Dana(def) => self.call_dana(def, args, context, delivered).await,
        }
    }

    #[tracing::instrument(skip(self, def, args, context), fields(function = %def.name), level = "debug")]
    async fn call_dana(
        &self,
        def: Arc<FunctionDef>,
        args: NativeArgs,
        context: Arc<SandboxContext>,
        delivered: bool,
    ) -> EvalResult<Value> {
        // the callee sees the caller as it is now, never as it will be
        let mut memo = HashMap::new();
        let callee_context = Arc::new(context.copy_for_call(&mut memo));
        let heap = context.heap();
        let args = NativeArgs {
            positional: args
                .positional
                .iter()
                .map(|value| heap.deep_copy(value, &mut memo))
                .collect(),
            named: args
                .named
                .iter()
                .map(|(name, value)| (name.clone(), heap.deep_copy(value, &mut memo)))
                .collect(),
        };

        if !self.services.config.promise.enabled {
            return self.invoke_dana(def, args, callee_context).await;
        }

        let mode = if delivered {
            DeliveryMode::Eager
        } else {
            def.delivery_mode()
        };
        let call_site = CallSite::new(def.name.clone(), context.span());
        let evaluator = self.clone();
        let thunk: Thunk =
            Box::pin(async move { evaluator.invoke_dana(def, args, callee_context).await });
        let promise = Promise::wrap(thunk, mode, call_site, &self.services.executor);
        Ok(Value::Promise(promise))
    }

    /// Runs a Dana function body against its own context. One call frame.
    async fn invoke_dana(
        &self,
        def: Arc<FunctionDef>,
        args: NativeArgs,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let _frame = context.recursion().enter()?;
        debug!(function = %def.name, depth = context.recursion().depth(), "enter");
        self.bind_parameters(&def, args, &context).await?;
        let statements = StatementEvaluator::new(self.clone());
        match statements.eval_block(&def.body, context).await? {
            StatementResult::Control(ControlFlow::Return(value)) => Ok(value),
            StatementResult::Control(flow) => Err(EvalError::invalid(format!(
                "'{}' outside loop in function '{}'",
                flow, def.name
            ))),
            StatementResult::Value(_) => Ok(Value::None),
        }
    }

    async fn bind_parameters(
        &self,
        def: &FunctionDef,
        args: NativeArgs,
        context: &Arc<SandboxContext>,
    ) -> EvalResult<()> {
        let parameters = &def.parameters;
        if args.positional.len() > parameters.len() {
            return Err(arity_error(
                &def.name,
                parameters.iter().map(|p| p.default.is_some()),
                args.positional.len(),
            ));
        }
        let given = args.positional.len() + args.named.len();
        let mut slots: Vec<Option<Value>> = args.positional.into_iter().map(Some).collect();
        slots.resize(parameters.len(), None);

        for (name, value) in args.named {
            let position = parameters
                .iter()
                .position(|parameter| parameter.name == name)
                .ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "{}() got an unexpected keyword argument '{}'",
                        def.name, name
                    ))
                })?;
            if slots[position].replace(value).is_some() {
                return Err(EvalError::type_mismatch(format!(
                    "{}() got multiple values for argument '{}'",
                    def.name, name
                )));
            }
        }

        for (parameter, slot) in parameters.iter().zip(slots) {
            let value = match (slot, &parameter.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expression(default, context.clone()).await?,
                (None, None) => {
                    return Err(arity_error(
                        &def.name,
                        parameters.iter().map(|p| p.default.is_some()),
                        given,
                    ))
                }
            };
            context.set_in(ScopeKind::Local, &parameter.name, value);
        }
        Ok(())
    }

    async fn construct(
        &self,
        def: &StructDef,
        args: NativeArgs,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        if args.positional.len() > def.fields.len() {
            return Err(EvalError::type_mismatch(format!(
                "{}() takes {} fields but {} were given",
                def.name,
                def.fields.len(),
                args.positional.len()
            )));
        }
        let mut slots: Vec<Option<Value>> = args.positional.into_iter().map(Some).collect();
        slots.resize(def.fields.len(), None);
        for (name, value) in args.named {
            let position = def
                .fields
                .iter()
                .position(|field| field.name == name)
                .ok_or_else(|| {
                    EvalError::type_mismatch(format!("{} has no field '{}'", def.name, name))
                })?;
            slots[position] = Some(value);
        }

        let mut fields = Vec::with_capacity(def.fields.len());
        for (field, slot) in def.fields.iter().zip(slots) {
            let value = match (slot, &field.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expression(default, context.clone()).await?,
                (None, None) => {
                    return Err(EvalError::type_mismatch(format!(
                        "{}() missing field '{}'",
                        def.name, field.name
                    )))
                }
            };
            fields.push((field.name.clone(), value));
        }
        Ok(context.heap().alloc_struct(def.name.clone(), fields))
    }

    async fn eval_method_call(
        &self,
        object: &Expression,
        method: &str,
        arguments: &[Argument],
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let receiver = self.eval_forced(object, context.clone()).await?;
        let args = self.eval_arguments(arguments, context.clone()).await?;
        let forced = force_args(args.clone()).await?;
        if let Some(value) = builtins::call_method(&receiver, method, &forced, context.heap())? {
            return Ok(value);
        }

        // struct instances: `obj.m(a)` calls `m(obj, a)`
        let callee = match self.resolve_identifier(&ScopedName::unscoped(method), &context) {
            Ok(Value::Function(callee)) => callee,
            _ => {
                return Err(EvalError::type_mismatch(format!(
                    "'{}' object has no attribute '{}'",
                    context.heap().type_name(&receiver),
                    method
                )))
            }
        };
        let mut args = args;
        args.positional.insert(0, receiver);
        self.call_function(callee, args, context, false).await
    }

    fn attribute(object: &Value, name: &str, context: &SandboxContext) -> EvalResult<Value> {
        let field = match object {
            Value::Object(handle) => handle.with(|object| match object {
                HeapObject::Struct { fields, .. } => fields
                    .iter()
                    .find(|(field, _)| field == name)
                    .map(|(_, value)| value.clone()),
                _ => None,
            }),
            _ => None,
        };
        field.ok_or_else(|| {
            EvalError::type_mismatch(format!(
                "'{}' object has no attribute '{}'",
                context.heap().type_name(object),
                name
            ))
        })
    }
}

/// Forces one level of promise.
pub async fn force(value: Value) -> EvalResult<Value> {
    match value {
        Value::Promise(promise) => promise.force().await,
        value => Ok(value),
    }
}

async fn force_args(args: NativeArgs) -> EvalResult<NativeArgs> {
    let mut forced = NativeArgs::default();
    for value in args.positional {
        forced.positional.push(force_deep(value).await?);
    }
    for (name, value) in args.named {
        forced.named.push((name, force_deep(value).await?));
    }
    Ok(forced)
}

fn arity_error(function: &str, defaults: impl Iterator<Item = bool>, got: usize) -> EvalError {
    let (mut required, mut total) = (0, 0);
    for has_default in defaults {
        total += 1;
        if !has_default {
            required += 1;
        }
    }
    let expected = if required == total {
        total.to_string()
    } else {
        format!("{} to {}", required, total)
    };
    EvalError::ArityMismatch {
        function: function.to_string(),
        expected,
        got,
    }
}
