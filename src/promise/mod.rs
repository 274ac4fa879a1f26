//! Transparent futures for Dana call results.
//!
//! A [`Promise`] is a single state cell:
//!
//! ```text
//! Pending(thunk) --claim--> Resolving --settle--> Resolved(value) | Failed(failure)
//! ```
//!
//! Whoever claims the thunk runs it: the executor's claim task for eager
//! promises, or the first forcer for lazy ones. A forcer that finds an eager
//! promise still `Pending` (its claim task is waiting for a pool slot) claims
//! the thunk and runs it itself, so a forcer never waits on work that has not
//! started. A forcer that finds `Resolving` waits for the settle notification.

pub mod executor;

use core::fmt;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_recursion::async_recursion;
use futures::future::BoxFuture;
use futures::FutureExt;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

pub use crate::ast::DeliveryMode;
use crate::ast::Span;
use crate::eval::evaluator::{EvalError, EvalResult};
use crate::eval::value::{HeapObject, ObjectRef, Value};
use executor::PromiseExecutor;

/// Deferred computation of a promise's value.
pub type Thunk = BoxFuture<'static, EvalResult<Value>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromiseId(Uuid);

impl PromiseId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a promise was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub function: String,
    pub span: Span,
}

impl CallSite {
    pub fn new(function: impl Into<String>, span: Span) -> Self {
        Self {
            function: function.into(),
            span,
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}() at {}", self.function, self.span)
    }
}

/// Error raised inside a thunk, with the call site that created the promise.
/// Displays as the original error.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct PromiseFailure {
    pub call_site: CallSite,
    pub error: EvalError,
}

impl PromiseFailure {
    pub fn new(call_site: CallSite, error: EvalError) -> Self {
        Self { call_site, error }
    }
}

pub enum PromiseState {
    Pending(Thunk),
    Resolving,
    Resolved(Value),
    Failed(Arc<PromiseFailure>),
}

impl PromiseState {
    pub fn status(&self) -> PromiseStatus {
        match self {
            PromiseState::Pending(_) => PromiseStatus::Pending,
            PromiseState::Resolving => PromiseStatus::Resolving,
            PromiseState::Resolved(_) => PromiseStatus::Resolved,
            PromiseState::Failed(_) => PromiseStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PromiseStatus {
    Pending,
    Resolving,
    Resolved,
    Failed,
}

impl PromiseStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, PromiseStatus::Resolved | PromiseStatus::Failed)
    }
}

struct PromiseInner {
    id: PromiseId,
    call_site: CallSite,
    mode: DeliveryMode,
    state: Mutex<PromiseState>,
    settled: Notify,
}

/// Shared handle to one promise. Clones observe the same state.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<PromiseInner>,
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.inner.id)
            .field("call_site", &self.inner.call_site)
            .field("mode", &self.inner.mode)
            .field("status", &self.status())
            .finish()
    }
}

impl Promise {
    fn with_state(state: PromiseState, mode: DeliveryMode, call_site: CallSite) -> Self {
        Self {
            inner: Arc::new(PromiseInner {
                id: PromiseId::new(),
                call_site,
                mode,
                state: Mutex::new(state),
                settled: Notify::new(),
            }),
        }
    }

    /// Wraps a thunk. Eager promises are submitted to `executor` right away;
    /// lazy ones wait for their first forcer.
    pub fn wrap(
        thunk: Thunk,
        mode: DeliveryMode,
        call_site: CallSite,
        executor: &Arc<dyn PromiseExecutor>,
    ) -> Self {
        let promise = Self::with_state(PromiseState::Pending(thunk), mode, call_site);
        debug!(
            promise = %promise.id(),
            call_site = %promise.call_site(),
            %mode,
            "promise created"
        );
        if mode == DeliveryMode::Eager {
            executor.submit(promise.clone());
        }
        promise
    }

    /// An already settled promise.
    pub fn resolved(value: Value) -> Self {
        Self::with_state(
            PromiseState::Resolved(value),
            DeliveryMode::Lazy,
            CallSite::new("<resolved>", Span::default()),
        )
    }

    pub fn id(&self) -> PromiseId {
        self.inner.id
    }

    pub fn call_site(&self) -> &CallSite {
        &self.inner.call_site
    }

    pub fn mode(&self) -> DeliveryMode {
        self.inner.mode
    }

    /// Current state, without blocking or forcing.
    pub fn status(&self) -> PromiseStatus {
        self.lock_state().status()
    }

    /// The memoized outcome, if settled.
    pub fn peek(&self) -> Option<EvalResult<Value>> {
        match &*self.lock_state() {
            PromiseState::Resolved(value) => Some(Ok(value.clone())),
            PromiseState::Failed(failure) => Some(Err(EvalError::PromiseFailure(failure.clone()))),
            _ => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PromiseState> {
        // a thunk never runs under this lock, so poisoning leaves a valid state
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the thunk if nobody has yet.
    fn claim(&self) -> Option<Thunk> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, PromiseState::Resolving) {
            PromiseState::Pending(thunk) => Some(thunk),
            other => {
                *state = other;
                None
            }
        }
    }

    async fn run(&self, thunk: Thunk) {
        let outcome = AssertUnwindSafe(thunk)
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(EvalError::Internal(format!("promise thunk panicked: {}", message)))
            });
        self.settle(outcome);
    }

    fn settle(&self, outcome: EvalResult<Value>) {
        let status = {
            let mut state = self.lock_state();
            *state = match outcome {
                Ok(value) => PromiseState::Resolved(value),
                // keep the innermost call site when a failure passes through
                Err(EvalError::PromiseFailure(failure)) => PromiseState::Failed(failure),
                Err(error) => PromiseState::Failed(Arc::new(PromiseFailure::new(
                    self.inner.call_site.clone(),
                    error,
                ))),
            };
            state.status()
        };
        debug!(promise = %self.id(), %status, "promise settled");
        self.inner.settled.notify_waiters();
    }

    /// Claim-task body: runs the thunk unless a forcer already took it.
    pub async fn run_if_pending(&self) {
        if let Some(thunk) = self.claim() {
            debug!(promise = %self.id(), "claimed by executor");
            self.run(thunk).await;
        }
    }

    /// Resolves this promise, and any promise it resolves to.
    pub async fn force(&self) -> EvalResult<Value> {
        let mut current = self.clone();
        loop {
            match current.force_once().await? {
                Value::Promise(next) => current = next,
                value => return Ok(value),
            }
        }
    }

    async fn force_once(&self) -> EvalResult<Value> {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);

            let claimed = {
                let mut state = self.lock_state();
                match std::mem::replace(&mut *state, PromiseState::Resolving) {
                    PromiseState::Pending(thunk) => Some(thunk),
                    PromiseState::Resolving => {
                        // registered before the lock is released, so a settle
                        // between here and the await is not missed
                        notified.as_mut().enable();
                        None
                    }
                    PromiseState::Resolved(value) => {
                        *state = PromiseState::Resolved(value.clone());
                        return Ok(value);
                    }
                    PromiseState::Failed(failure) => {
                        *state = PromiseState::Failed(failure.clone());
                        return Err(EvalError::PromiseFailure(failure));
                    }
                }
            };

            match claimed {
                Some(thunk) => {
                    debug!(promise = %self.id(), mode = %self.mode(), "forcer runs thunk");
                    self.run(thunk).await;
                }
                None => notified.await,
            }
        }
    }
}

/// Forces `value` and every promise reachable from it, writing resolved
/// values back into their object slots. Cycles are fine: each object is
/// visited once.
pub async fn force_deep(value: Value) -> EvalResult<Value> {
    let mut objects = Vec::new();
    let root = force_tree(value, &mut objects).await?;
    let mut visited = HashSet::new();
    while let Some(object) = objects.pop() {
        if !visited.insert(object.id()) {
            continue;
        }
        let slots = object.with(slot_values);
        for (index, slot) in slots.into_iter().enumerate() {
            if contains_promise(&slot) {
                let forced = force_tree(slot, &mut objects).await?;
                object.with_mut(|contents| write_slot(contents, index, forced));
            } else if let Value::Object(child) = slot {
                objects.push(child);
            } else if let Value::Tuple(items) = slot {
                collect_objects(&items, &mut objects);
            }
        }
    }
    Ok(root)
}

#[async_recursion]
async fn force_tree(value: Value, objects: &mut Vec<ObjectRef>) -> EvalResult<Value> {
    match value {
        Value::Promise(promise) => {
            let resolved = promise.force().await?;
            force_tree(resolved, objects).await
        }
        Value::Tuple(items) => {
            let mut forced = Vec::with_capacity(items.len());
            for item in items {
                forced.push(force_tree(item, objects).await?);
            }
            Ok(Value::Tuple(forced))
        }
        Value::Object(object) => {
            objects.push(object.clone());
            Ok(Value::Object(object))
        }
        other => Ok(other),
    }
}

fn contains_promise(value: &Value) -> bool {
    match value {
        Value::Promise(_) => true,
        Value::Tuple(items) => items.iter().any(contains_promise),
        _ => false,
    }
}

fn collect_objects(items: &[Value], objects: &mut Vec<ObjectRef>) {
    for item in items {
        match item {
            Value::Object(object) => objects.push(object.clone()),
            Value::Tuple(inner) => collect_objects(inner, objects),
            _ => {}
        }
    }
}

fn slot_values(object: &HeapObject) -> Vec<Value> {
    match object {
        HeapObject::List(items) => items.clone(),
        HeapObject::Dict(entries) => entries.iter().map(|(_, v)| v.clone()).collect(),
        HeapObject::Struct { fields, .. } => fields.iter().map(|(_, v)| v.clone()).collect(),
    }
}

fn write_slot(object: &mut HeapObject, index: usize, value: Value) {
    let slot = match object {
        HeapObject::List(items) => items.get_mut(index),
        HeapObject::Dict(entries) => entries.get_mut(index).map(|(_, v)| v),
        HeapObject::Struct { fields, .. } => fields.get_mut(index).map(|(_, v)| v),
    };
    if let Some(slot) = slot {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::executor::WorkerPool;
    use super::*;
    use crate::eval::value::Heap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn pool(permits: usize) -> Arc<dyn PromiseExecutor> {
        Arc::new(WorkerPool::new(permits, tokio::runtime::Handle::current()))
    }

    fn counting_thunk(counter: Arc<AtomicUsize>, value: i64) -> Thunk {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::Integer(value))
        })
    }

    #[tokio::test]
    async fn test_lazy_runs_once_on_force() {
        let counter = Arc::new(AtomicUsize::new(0));
        let promise = Promise::wrap(
            counting_thunk(counter.clone(), 7),
            DeliveryMode::Lazy,
            CallSite::new("f", Span::default()),
            &pool(4),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(promise.status(), PromiseStatus::Pending);

        assert_eq!(promise.force().await.unwrap(), Value::Integer(7));
        assert_eq!(promise.force().await.unwrap(), Value::Integer(7));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(promise.status(), PromiseStatus::Resolved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_eager_starts_without_force() {
        let counter = Arc::new(AtomicUsize::new(0));
        let promise = Promise::wrap(
            counting_thunk(counter.clone(), 1),
            DeliveryMode::Eager,
            CallSite::new("f", Span::default()),
            &pool(4),
        );
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(promise.force().await.unwrap(), Value::Integer(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_memoized() {
        let counter = Arc::new(AtomicUsize::new(0));
        let runs = counter.clone();
        let promise = Promise::wrap(
            Box::pin(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Err(EvalError::Raised("bad input".into()))
            }),
            DeliveryMode::Lazy,
            CallSite::new("parse", Span::new(3, 1)),
            &pool(1),
        );
        for _ in 0..2 {
            match promise.force().await.unwrap_err() {
                EvalError::PromiseFailure(failure) => {
                    assert_eq!(failure.to_string(), "bad input");
                    assert_eq!(failure.call_site.function, "parse");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(promise.status(), PromiseStatus::Failed);
    }

    fn explode() -> EvalResult<Value> {
        panic!("thunk exploded")
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let promise = Promise::wrap(
            Box::pin(async { explode() }),
            DeliveryMode::Lazy,
            CallSite::new("f", Span::default()),
            &pool(1),
        );
        let error = promise.force().await.unwrap_err();
        assert!(error.to_string().contains("thunk exploded"));
        assert_eq!(promise.status(), PromiseStatus::Failed);
    }

    #[tokio::test]
    async fn test_force_flattens_nested_promises() {
        let inner = Promise::resolved(Value::Integer(5));
        let outer = Promise::wrap(
            Box::pin(async move { Ok(Value::Promise(inner)) }),
            DeliveryMode::Lazy,
            CallSite::new("outer", Span::default()),
            &pool(1),
        );
        assert_eq!(outer.force().await.unwrap(), Value::Integer(5));
    }

    #[tokio::test]
    async fn test_exhausted_pool_does_not_deadlock() {
        // the only permit is held by a promise that forces a second eager one
        let executor = pool(1);
        let inner_executor = executor.clone();
        let outer = Promise::wrap(
            Box::pin(async move {
                let inner = Promise::wrap(
                    Box::pin(async { Ok(Value::Integer(2)) }),
                    DeliveryMode::Eager,
                    CallSite::new("inner", Span::default()),
                    &inner_executor,
                );
                inner.force().await
            }),
            DeliveryMode::Eager,
            CallSite::new("outer", Span::default()),
            &executor,
        );
        let value = tokio::time::timeout(Duration::from_secs(5), outer.force())
            .await
            .expect("forcing must not deadlock");
        assert_eq!(value.unwrap(), Value::Integer(2));
    }

    #[tokio::test]
    async fn test_force_deep_writes_back() {
        let heap = Heap::new();
        let list = heap.alloc_list(vec![
            Value::Promise(Promise::resolved(Value::Integer(1))),
            Value::Tuple(vec![Value::Promise(Promise::resolved(Value::Integer(2)))]),
        ]);
        let handle = list.as_object().unwrap().clone();
        let inner = Value::Object(handle.clone());
        handle.with_mut(|object| {
            if let HeapObject::List(items) = object {
                items.push(inner);
            }
        });

        let forced = force_deep(list).await.unwrap();
        match forced.as_object().unwrap().snapshot() {
            HeapObject::List(items) => {
                assert_eq!(items[0], Value::Integer(1));
                assert_eq!(items[1], Value::Tuple(vec![Value::Integer(2)]));
            }
            other => panic!("unexpected object: {other:?}"),
        }
    }
}
