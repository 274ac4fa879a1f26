//! Host-implemented functions and value methods.
//!
//! Natives run in place on the calling logical thread and are never wrapped
//! in promises. Their arguments arrive deep-forced.

use core::fmt;
use std::cmp::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::context::SandboxContext;
use super::evaluator::{EvalError, EvalResult};
use super::operators;
use super::value::{dict_get, dict_insert, scalar_key_eq, Heap, HeapObject, Value};
use crate::ast::BinaryOperator;
use crate::capability::{CapabilityError, CapabilityRequest};

/// Positional and keyword arguments of a native call.
#[derive(Debug, Clone, Default)]
pub struct NativeArgs {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl NativeArgs {
    pub fn new(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, value: Value) -> Self {
        self.named.push((name.into(), value));
        self
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }

    pub fn named(&self, name: &str) -> Option<&Value> {
        self.named.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Fails unless `min..=max` positional arguments were given.
    pub fn expect(&self, function: &str, min: usize, max: usize) -> EvalResult<()> {
        let got = self.positional.len();
        if got < min || got > max {
            let expected = if min == max {
                min.to_string()
            } else if max == usize::MAX {
                format!("at least {}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(EvalError::ArityMismatch {
                function: function.to_string(),
                expected,
                got,
            });
        }
        Ok(())
    }

    fn string(&self, function: &str, index: usize) -> EvalResult<&str> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(EvalError::type_mismatch(format!(
                "{}() argument {} must be str, not {}",
                function,
                index + 1,
                other.scalar_type_name()
            ))),
            None => Err(EvalError::ArityMismatch {
                function: function.to_string(),
                expected: format!("at least {}", index + 1),
                got: self.len(),
            }),
        }
    }

    fn integer(&self, function: &str, index: usize) -> EvalResult<i64> {
        match self.get(index) {
            Some(Value::Integer(i)) => Ok(*i),
            Some(Value::Boolean(b)) => Ok(*b as i64),
            Some(other) => Err(EvalError::type_mismatch(format!(
                "{}() argument {} must be int, not {}",
                function,
                index + 1,
                other.scalar_type_name()
            ))),
            None => Err(EvalError::ArityMismatch {
                function: function.to_string(),
                expected: format!("at least {}", index + 1),
                got: self.len(),
            }),
        }
    }
}

#[async_trait]
pub trait NativeFunction: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, args: NativeArgs, context: Arc<SandboxContext>) -> EvalResult<Value>;
}

/// Adapts a plain closure into a native.
pub struct SyncNative<F> {
    name: String,
    function: F,
}

impl<F> SyncNative<F>
where
    F: Fn(&NativeArgs, &SandboxContext) -> EvalResult<Value> + Send + Sync,
{
    pub fn new(name: impl Into<String>, function: F) -> Self {
        Self {
            name: name.into(),
            function,
        }
    }
}

#[async_trait]
impl<F> NativeFunction for SyncNative<F>
where
    F: Fn(&NativeArgs, &SandboxContext) -> EvalResult<Value> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: NativeArgs, context: Arc<SandboxContext>) -> EvalResult<Value> {
        (self.function)(&args, &context)
    }
}

/// Where `print` writes.
#[derive(Clone, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    Buffer(Arc<Mutex<Vec<String>>>),
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputSink::Stdout => write!(f, "Stdout"),
            OutputSink::Buffer(_) => write!(f, "Buffer"),
        }
    }
}

impl OutputSink {
    /// In-memory sink, for capturing program output.
    pub fn buffer() -> Self {
        OutputSink::Buffer(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn write_line(&self, line: &str) {
        match self {
            OutputSink::Stdout => println!("{}", line),
            OutputSink::Buffer(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(line.to_string()),
        }
    }

    /// Captured lines; always empty for stdout.
    pub fn lines(&self) -> Vec<String> {
        match self {
            OutputSink::Stdout => Vec::new(),
            OutputSink::Buffer(lines) => lines
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

#[derive(Default)]
pub struct NativeRegistry {
    functions: DashMap<String, Arc<dyn NativeFunction>>,
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins(output: OutputSink) -> Self {
        let registry = Self::new();
        register_builtins(&registry, output);
        registry
    }

    pub fn register(&self, function: Arc<dyn NativeFunction>) {
        self.functions
            .insert(function.name().to_string(), function);
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&NativeArgs, &SandboxContext) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(SyncNative::new(name, function)));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn NativeFunction>> {
        self.functions.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    #[tracing::instrument(skip(self, args, context), level = "debug")]
    pub async fn call(
        &self,
        name: &str,
        args: NativeArgs,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        let function = self.get(name).ok_or_else(|| EvalError::NameResolution {
            name: name.to_string(),
        })?;
        function.call(args, context).await
    }
}

/// Items visited by `for` and accepted wherever an iterable is.
pub fn iterate(value: &Value, heap: &Heap) -> EvalResult<Vec<Value>> {
    match value {
        Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
        Value::Tuple(items) => Ok(items.clone()),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(items) => Ok(items),
            HeapObject::Dict(entries) => Ok(entries.into_iter().map(|(k, _)| k).collect()),
            HeapObject::Struct { type_name, .. } => Err(EvalError::type_mismatch(format!(
                "'{}' object is not iterable",
                type_name
            ))),
        },
        other => Err(EvalError::type_mismatch(format!(
            "'{}' object is not iterable",
            heap.type_name(other)
        ))),
    }
}

/// Number of items in `range(start, stop, step)`, without overflow.
fn range_len(start: i64, stop: i64, step: i64) -> u128 {
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let span = if step > 0 { stop - start } else { start - stop };
    if span <= 0 {
        return 0;
    }
    let step = step.unsigned_abs();
    (span as u128 - 1) / step + 1
}

fn register_builtins(registry: &NativeRegistry, output: OutputSink) {
    registry.register_fn("len", |args, ctx| {
        args.expect("len", 1, 1)?;
        let length = match &args.positional[0] {
            Value::String(s) => s.chars().count(),
            Value::Tuple(items) => items.len(),
            Value::Object(object) => object
                .with(|object| match object {
                    HeapObject::List(items) => Some(items.len()),
                    HeapObject::Dict(entries) => Some(entries.len()),
                    HeapObject::Struct { .. } => None,
                })
                .ok_or_else(|| {
                    EvalError::type_mismatch(format!(
                        "object of type '{}' has no len()",
                        ctx.heap().type_name(&args.positional[0])
                    ))
                })?,
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "object of type '{}' has no len()",
                    other.scalar_type_name()
                )))
            }
        };
        Ok(Value::Integer(length as i64))
    });

    registry.register_fn("str", |args, ctx| {
        args.expect("str", 0, 1)?;
        match args.get(0) {
            Some(value) => Ok(Value::String(ctx.heap().display(value)?)),
            None => Ok(Value::String(String::new())),
        }
    });

    registry.register_fn("int", |args, _| {
        args.expect("int", 1, 1)?;
        match &args.positional[0] {
            Value::Integer(i) => Ok(Value::Integer(*i)),
            Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
            Value::Float(f) if f.is_finite() => Ok(Value::Integer(f.trunc() as i64)),
            Value::String(s) => s.trim().parse::<i64>().map(Value::Integer).map_err(|_| {
                EvalError::invalid(format!("invalid literal for int() with base 10: '{}'", s))
            }),
            other => Err(EvalError::type_mismatch(format!(
                "int() argument must be a string or a number, not '{}'",
                other.scalar_type_name()
            ))),
        }
    });

    registry.register_fn("float", |args, _| {
        args.expect("float", 1, 1)?;
        match &args.positional[0] {
            Value::Integer(i) => Ok(Value::Float(*i as f64)),
            Value::Boolean(b) => Ok(Value::Float(*b as i64 as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| EvalError::invalid(format!("could not convert string to float: '{}'", s))),
            other => Err(EvalError::type_mismatch(format!(
                "float() argument must be a string or a number, not '{}'",
                other.scalar_type_name()
            ))),
        }
    });

    registry.register_fn("bool", |args, ctx| {
        args.expect("bool", 0, 1)?;
        match args.get(0) {
            Some(value) => Ok(Value::Boolean(ctx.heap().truthy(value)?)),
            None => Ok(Value::Boolean(false)),
        }
    });

    registry.register_fn("type", |args, ctx| {
        args.expect("type", 1, 1)?;
        Ok(Value::String(ctx.heap().type_name(&args.positional[0])))
    });

    registry.register_fn("print", move |args, ctx| {
        let separator = match args.named("sep") {
            Some(Value::String(s)) => s.clone(),
            _ => " ".to_string(),
        };
        let parts = args
            .positional
            .iter()
            .map(|value| ctx.heap().display(value))
            .collect::<EvalResult<Vec<_>>>()?;
        let line = parts.join(&separator);
        debug!(%line, "print");
        output.write_line(&line);
        Ok(Value::None)
    });

    registry.register_fn("range", |args, ctx| {
        args.expect("range", 1, 3)?;
        let (start, stop, step) = match args.len() {
            1 => (0, args.integer("range", 0)?, 1),
            2 => (args.integer("range", 0)?, args.integer("range", 1)?, 1),
            _ => (
                args.integer("range", 0)?,
                args.integer("range", 1)?,
                args.integer("range", 2)?,
            ),
        };
        if step == 0 {
            return Err(EvalError::invalid("range() arg 3 must not be zero"));
        }
        let count = range_len(start, stop, step);
        let limit = ctx.limits().max_loop_iterations;
        if count > limit as u128 {
            return Err(EvalError::loop_limit(limit));
        }
        // every item lies between start and stop, so the casts are exact
        let items = (0..count)
            .map(|i| Value::Integer((start as i128 + i as i128 * step as i128) as i64))
            .collect();
        Ok(ctx.heap().alloc_list(items))
    });

    registry.register_fn("sum", |args, ctx| {
        args.expect("sum", 1, 2)?;
        let heap = ctx.heap();
        let mut total = args.get(1).cloned().unwrap_or(Value::Integer(0));
        for item in iterate(&args.positional[0], heap)? {
            total = operators::binary(BinaryOperator::Add, &total, &item, heap)?;
        }
        Ok(total)
    });

    registry.register_fn("min", |args, ctx| extreme("min", args, ctx.heap(), Ordering::Less));
    registry.register_fn("max", |args, ctx| extreme("max", args, ctx.heap(), Ordering::Greater));

    registry.register_fn("abs", |args, _| {
        args.expect("abs", 1, 1)?;
        match &args.positional[0] {
            Value::Integer(i) => i
                .checked_abs()
                .map(Value::Integer)
                .ok_or_else(|| EvalError::invalid("integer overflow")),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
            other => Err(EvalError::type_mismatch(format!(
                "bad operand type for abs(): '{}'",
                other.scalar_type_name()
            ))),
        }
    });

    registry.register_fn("round", |args, _| {
        args.expect("round", 1, 2)?;
        let digits = match args.get(1).or_else(|| args.named("ndigits")) {
            Some(Value::Integer(n)) => Some(*n),
            _ => None,
        };
        match (&args.positional[0], digits) {
            (Value::Integer(i), _) => Ok(Value::Integer(*i)),
            (Value::Float(f), None) => Ok(Value::Integer(round_half_even(*f) as i64)),
            (Value::Float(f), Some(n)) => {
                let scale = 10f64.powi(n.clamp(-300, 300) as i32);
                Ok(Value::Float(round_half_even(f * scale) / scale))
            }
            (other, _) => Err(EvalError::type_mismatch(format!(
                "type {} doesn't define __round__",
                other.scalar_type_name()
            ))),
        }
    });

    registry.register_fn("sorted", |args, ctx| {
        args.expect("sorted", 1, 1)?;
        let heap = ctx.heap();
        let mut items = iterate(&args.positional[0], heap)?;
        sort_values(&mut items, heap)?;
        if matches!(args.named("reverse"), Some(Value::Boolean(true))) {
            items.reverse();
        }
        Ok(heap.alloc_list(items))
    });

    registry.register_fn("keys", |args, ctx| {
        args.expect("keys", 1, 1)?;
        let entries = dict_entries("keys", &args.positional[0], ctx.heap())?;
        Ok(ctx.heap().alloc_list(entries.into_iter().map(|(k, _)| k).collect()))
    });

    registry.register_fn("values", |args, ctx| {
        args.expect("values", 1, 1)?;
        let entries = dict_entries("values", &args.positional[0], ctx.heap())?;
        Ok(ctx.heap().alloc_list(entries.into_iter().map(|(_, v)| v).collect()))
    });

    registry.register_fn("list", |args, ctx| {
        args.expect("list", 0, 1)?;
        let items = match args.get(0) {
            Some(value) => iterate(value, ctx.heap())?,
            None => Vec::new(),
        };
        Ok(ctx.heap().alloc_list(items))
    });

    registry.register(Arc::new(Sleep));
    registry.register(Arc::new(Reason));
    registry.register(Arc::new(UseCapability));
}

fn extreme(function: &str, args: &NativeArgs, heap: &Heap, wanted: Ordering) -> EvalResult<Value> {
    args.expect(function, 1, usize::MAX)?;
    let candidates = if args.len() == 1 {
        iterate(&args.positional[0], heap)?
    } else {
        args.positional.clone()
    };
    let mut best: Option<Value> = None;
    for candidate in candidates {
        best = match best {
            None => Some(candidate),
            Some(current) => {
                if operators::compare(&candidate, &current, heap, function)? == wanted {
                    Some(candidate)
                } else {
                    Some(current)
                }
            }
        };
    }
    best.ok_or_else(|| EvalError::invalid(format!("{}() arg is an empty sequence", function)))
}

fn round_half_even(f: f64) -> f64 {
    let rounded = f.round();
    if (f - f.trunc()).abs() == 0.5 {
        2.0 * (f / 2.0).round()
    } else {
        rounded
    }
}

fn sort_values(items: &mut [Value], heap: &Heap) -> EvalResult<()> {
    let mut failure = None;
    items.sort_by(|a, b| match operators::compare(a, b, heap, "<") {
        Ok(ordering) => ordering,
        Err(error) => {
            failure.get_or_insert(error);
            Ordering::Equal
        }
    });
    failure.map_or(Ok(()), Err)
}

fn dict_entries(function: &str, value: &Value, heap: &Heap) -> EvalResult<Vec<(Value, Value)>> {
    match value {
        Value::Object(object) => match object.snapshot() {
            HeapObject::Dict(entries) => Ok(entries),
            other => Err(EvalError::type_mismatch(format!(
                "{}() expects a dict, not '{}'",
                function,
                other.type_name()
            ))),
        },
        other => Err(EvalError::type_mismatch(format!(
            "{}() expects a dict, not '{}'",
            function,
            other.scalar_type_name()
        ))),
    }
}

struct Sleep;

#[async_trait]
impl NativeFunction for Sleep {
    fn name(&self) -> &str {
        "sleep"
    }

    async fn call(&self, args: NativeArgs, _context: Arc<SandboxContext>) -> EvalResult<Value> {
        args.expect("sleep", 1, 1)?;
        let millis = match &args.positional[0] {
            Value::Integer(i) => (*i).max(0) as u64,
            Value::Float(f) => f.max(0.0) as u64,
            other => {
                return Err(EvalError::type_mismatch(format!(
                    "sleep() expects milliseconds, not '{}'",
                    other.scalar_type_name()
                )))
            }
        };
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(Value::None)
    }
}

fn capability_inputs(
    named: &[(String, Value)],
    heap: &Heap,
) -> EvalResult<serde_json::Map<String, serde_json::Value>> {
    let mut inputs = serde_json::Map::new();
    for (name, value) in named {
        inputs.insert(name.clone(), heap.to_json(value)?);
    }
    Ok(inputs)
}

async fn invoke_capability(
    context: &SandboxContext,
    name: &str,
    request: CapabilityRequest,
) -> EvalResult<Value> {
    debug!(capability = name, method = %request.method, "invoking capability");
    let response = context.resources().invoke(name, request).await?;
    Ok(context.heap().from_json(&response))
}

/// `reason(prompt, **options)`, sent to the "reason" capability.
struct Reason;

#[async_trait]
impl NativeFunction for Reason {
    fn name(&self) -> &str {
        "reason"
    }

    async fn call(&self, args: NativeArgs, context: Arc<SandboxContext>) -> EvalResult<Value> {
        args.expect("reason", 1, 1)?;
        let prompt = context.heap().display(&args.positional[0])?;
        let mut request = CapabilityRequest::new("reason");
        request.inputs = capability_inputs(&args.named, context.heap())?;
        request
            .inputs
            .insert("prompt".to_string(), serde_json::Value::String(prompt));
        invoke_capability(&context, "reason", request).await
    }
}

/// `use_capability(name, method, **inputs)`.
struct UseCapability;

#[async_trait]
impl NativeFunction for UseCapability {
    fn name(&self) -> &str {
        "use_capability"
    }

    async fn call(&self, args: NativeArgs, context: Arc<SandboxContext>) -> EvalResult<Value> {
        args.expect("use_capability", 2, 2)?;
        let name = args.string("use_capability", 0)?.to_string();
        let method = args.string("use_capability", 1)?.to_string();
        if !context.resources().contains(&name) {
            return Err(CapabilityError::NotRegistered(name).into());
        }
        let mut request = CapabilityRequest::new(method);
        request.inputs = capability_inputs(&args.named, context.heap())?;
        invoke_capability(&context, &name, request).await
    }
}

fn no_attribute(type_name: &str, method: &str) -> EvalError {
    EvalError::type_mismatch(format!(
        "'{}' object has no attribute '{}'",
        type_name, method
    ))
}

/// Calls a built-in method on a forced receiver. `Ok(None)` means the
/// receiver type has no built-in methods (struct instances), so the caller
/// may fall back to a function of that name.
pub fn call_method(
    receiver: &Value,
    method: &str,
    args: &NativeArgs,
    heap: &Heap,
) -> EvalResult<Option<Value>> {
    match receiver {
        Value::String(s) => string_method(s, method, args, heap).map(Some),
        Value::Object(object) => match object.snapshot() {
            HeapObject::List(_) => list_method(receiver, method, args, heap).map(Some),
            HeapObject::Dict(_) => dict_method(receiver, method, args, heap).map(Some),
            HeapObject::Struct { .. } => Ok(None),
        },
        other => Err(no_attribute(other.scalar_type_name(), method)),
    }
}

fn list_method(receiver: &Value, method: &str, args: &NativeArgs, heap: &Heap) -> EvalResult<Value> {
    let Value::Object(list) = receiver else {
        return Err(EvalError::Internal("list receiver is not an object".into()));
    };
    let with_items = |f: &mut dyn FnMut(&mut Vec<Value>) -> EvalResult<Value>| {
        list.with_mut(|object| match object {
            HeapObject::List(items) => f(items),
            _ => Err(EvalError::Internal("list receiver changed type".into())),
        })
    };
    match method {
        "append" => {
            args.expect("append", 1, 1)?;
            let item = args.positional[0].clone();
            with_items(&mut |items: &mut Vec<Value>| {
                items.push(item.clone());
                Ok(Value::None)
            })
        }
        "pop" => {
            args.expect("pop", 0, 1)?;
            let at = match args.get(0) {
                Some(Value::Integer(i)) => Some(*i),
                Some(other) => {
                    return Err(EvalError::type_mismatch(format!(
                        "list indices must be integers, not '{}'",
                        other.scalar_type_name()
                    )))
                }
                None => None,
            };
            with_items(&mut |items: &mut Vec<Value>| {
                let length = items.len();
                let raw = at.unwrap_or(-1);
                let resolved = if raw < 0 { raw + length as i64 } else { raw };
                if resolved < 0 || resolved >= length as i64 {
                    return Err(EvalError::IndexOutOfRange { index: raw, length });
                }
                Ok(items.remove(resolved as usize))
            })
        }
        "extend" => {
            args.expect("extend", 1, 1)?;
            let extra = iterate(&args.positional[0], heap)?;
            with_items(&mut |items: &mut Vec<Value>| {
                items.extend(extra.iter().cloned());
                Ok(Value::None)
            })
        }
        "insert" => {
            args.expect("insert", 2, 2)?;
            let at = args.integer("insert", 0)?;
            let item = args.positional[1].clone();
            with_items(&mut |items: &mut Vec<Value>| {
                let length = items.len() as i64;
                let resolved = if at < 0 { (at + length).max(0) } else { at.min(length) };
                items.insert(resolved as usize, item.clone());
                Ok(Value::None)
            })
        }
        "index" | "count" => {
            args.expect(method, 1, 1)?;
            let items = iterate(receiver, heap)?;
            let mut matches = Vec::new();
            for (position, item) in items.iter().enumerate() {
                if heap.deep_equal(item, &args.positional[0])? {
                    matches.push(position);
                }
            }
            if method == "count" {
                return Ok(Value::Integer(matches.len() as i64));
            }
            matches
                .first()
                .map(|position| Value::Integer(*position as i64))
                .ok_or_else(|| {
                    EvalError::invalid(format!(
                        "{} is not in list",
                        heap.repr(&args.positional[0]).unwrap_or_default()
                    ))
                })
        }
        other => Err(no_attribute("list", other)),
    }
}

fn dict_method(receiver: &Value, method: &str, args: &NativeArgs, heap: &Heap) -> EvalResult<Value> {
    let Value::Object(dict) = receiver else {
        return Err(EvalError::Internal("dict receiver is not an object".into()));
    };
    let entries = match dict.snapshot() {
        HeapObject::Dict(entries) => entries,
        _ => return Err(EvalError::Internal("dict receiver changed type".into())),
    };
    match method {
        "get" => {
            args.expect("get", 1, 2)?;
            Ok(dict_get(&entries, &args.positional[0])
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.expect("keys", 0, 0)?;
            Ok(heap.alloc_list(entries.into_iter().map(|(k, _)| k).collect()))
        }
        "values" => {
            args.expect("values", 0, 0)?;
            Ok(heap.alloc_list(entries.into_iter().map(|(_, v)| v).collect()))
        }
        "items" => {
            args.expect("items", 0, 0)?;
            Ok(heap.alloc_list(
                entries
                    .into_iter()
                    .map(|(k, v)| Value::Tuple(vec![k, v]))
                    .collect(),
            ))
        }
        "pop" => {
            args.expect("pop", 1, 2)?;
            let key = args.positional[0].clone();
            let default = args.get(1).cloned();
            let removed = dict.with_mut(|object| match object {
                HeapObject::Dict(entries) => entries
                    .iter()
                    .position(|(k, _)| scalar_key_eq(k, &key))
                    .map(|position| entries.remove(position).1),
                _ => None,
            });
            removed
                .or(default)
                .ok_or_else(|| EvalError::KeyNotFound(heap.repr(&key).unwrap_or_default()))
        }
        "update" => {
            args.expect("update", 1, 1)?;
            let incoming = dict_entries("update", &args.positional[0], heap)?;
            dict.with_mut(|object| match object {
                HeapObject::Dict(entries) => incoming
                    .into_iter()
                    .try_for_each(|(k, v)| dict_insert(entries, k, v)),
                _ => Ok(()),
            })?;
            Ok(Value::None)
        }
        other => Err(no_attribute("dict", other)),
    }
}

fn string_method(s: &str, method: &str, args: &NativeArgs, heap: &Heap) -> EvalResult<Value> {
    match method {
        "upper" => Ok(Value::String(s.to_uppercase())),
        "lower" => Ok(Value::String(s.to_lowercase())),
        "strip" => match args.get(0) {
            Some(Value::String(chars)) => Ok(Value::String(
                s.trim_matches(|c| chars.contains(c)).to_string(),
            )),
            _ => Ok(Value::String(s.trim().to_string())),
        },
        "split" => {
            args.expect("split", 0, 1)?;
            let parts: Vec<Value> = match args.get(0) {
                Some(Value::String(separator)) if !separator.is_empty() => s
                    .split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
                Some(Value::String(_)) => return Err(EvalError::invalid("empty separator")),
                _ => s
                    .split_whitespace()
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            };
            Ok(heap.alloc_list(parts))
        }
        "join" => {
            args.expect("join", 1, 1)?;
            let pieces = iterate(&args.positional[0], heap)?
                .into_iter()
                .map(|item| match item {
                    Value::String(piece) => Ok(piece),
                    other => Err(EvalError::type_mismatch(format!(
                        "sequence item: expected str instance, {} found",
                        heap.type_name(&other)
                    ))),
                })
                .collect::<EvalResult<Vec<_>>>()?;
            Ok(Value::String(pieces.join(s)))
        }
        "replace" => {
            args.expect("replace", 2, 2)?;
            Ok(Value::String(
                s.replace(args.string("replace", 0)?, args.string("replace", 1)?),
            ))
        }
        "startswith" => {
            args.expect("startswith", 1, 1)?;
            Ok(Value::Boolean(s.starts_with(args.string("startswith", 0)?)))
        }
        "endswith" => {
            args.expect("endswith", 1, 1)?;
            Ok(Value::Boolean(s.ends_with(args.string("endswith", 0)?)))
        }
        "format" => format_string(s, args, heap).map(Value::String),
        other => Err(no_attribute("str", other)),
    }
}

/// `"{} of {name}".format(...)`: `{}` takes the next positional argument,
/// `{0}` a specific one, `{name}` a keyword. `{{` and `}}` escape braces.
fn format_string(template: &str, args: &NativeArgs, heap: &Heap) -> EvalResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut next = 0;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    field.push(c);
                }
                let value = if field.is_empty() {
                    next += 1;
                    args.get(next - 1)
                } else if let Ok(position) = field.parse::<usize>() {
                    args.get(position)
                } else {
                    args.named(&field)
                };
                let value = value.ok_or_else(|| {
                    EvalError::KeyNotFound(format!("format field '{{{}}}'", field))
                })?;
                out.push_str(&heap.display(value)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
