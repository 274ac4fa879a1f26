//! Memoization of pure sub-expressions within one execution.
//!
//! Only composite expressions built from literals, identifiers and operators
//! are cached. The key combines the node's address and shape with exactly the
//! bindings the node reads, compared by value, so rebinding an unrelated name
//! never invalidates an entry.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use tracing::debug;

use crate::ast::{Expression, Literal, ScopeKind, ScopedName};
use crate::eval::context::SandboxContext;
use crate::eval::evaluator::EvalResult;
use crate::eval::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    node: usize,
    kind: &'static str,
    shape: u64,
    bindings: Vec<(ScopeKind, String, Binding)>,
}

/// A scalar binding in comparable form. Floats compare by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Binding {
    None,
    Boolean(bool),
    Integer(i64),
    Float(u64),
    String(String),
    Tuple(Vec<Binding>),
}

impl Binding {
    fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::None => Binding::None,
            Value::Boolean(b) => Binding::Boolean(*b),
            Value::Integer(i) => Binding::Integer(*i),
            Value::Float(f) => Binding::Float(f.to_bits()),
            Value::String(s) => Binding::String(s.clone()),
            Value::Tuple(items) => {
                Binding::Tuple(items.iter().map(Binding::from_value).collect::<Option<_>>()?)
            }
            Value::Object(_) | Value::Function(_) | Value::Promise(_) => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

pub struct ExecutionCache {
    entries: Mutex<LruCache<CacheKey, Value>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl ExecutionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pure: literals, identifiers and operators only.
    pub fn is_pure(expr: &Expression) -> bool {
        match expr {
            Expression::Literal(_) | Expression::Identifier(_) => true,
            Expression::Binary { left, right, .. } => Self::is_pure(left) && Self::is_pure(right),
            Expression::Unary { operand, .. } => Self::is_pure(operand),
            _ => false,
        }
    }

    /// Worth routing through the cache: pure and composite.
    pub fn is_cacheable(expr: &Expression) -> bool {
        matches!(expr, Expression::Binary { .. } | Expression::Unary { .. }) && Self::is_pure(expr)
    }

    /// Identifiers read by a pure expression, in evaluation order.
    pub fn dependencies(expr: &Expression) -> Vec<&ScopedName> {
        let mut names = Vec::new();
        Self::collect_dependencies(expr, &mut names);
        names
    }

    fn collect_dependencies<'a>(expr: &'a Expression, names: &mut Vec<&'a ScopedName>) {
        match expr {
            Expression::Identifier(name) => {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            Expression::Binary { left, right, .. } => {
                Self::collect_dependencies(left, names);
                Self::collect_dependencies(right, names);
            }
            Expression::Unary { operand, .. } => Self::collect_dependencies(operand, names),
            _ => {}
        }
    }

    /// Key for `expr` under `context`, or `None` when a dependency is
    /// unbound or holds a promise, function or heap object.
    pub fn key_for(expr: &Expression, context: &SandboxContext) -> Option<CacheKey> {
        if !Self::is_cacheable(expr) {
            return None;
        }
        let bindings = Self::dependencies(expr)
            .into_iter()
            .map(|name| {
                let (scope, value) = context.lookup(name)?;
                Some((scope, name.name.clone(), Binding::from_value(&value)?))
            })
            .collect::<Option<Vec<_>>>()?;
        let mut shape = DefaultHasher::new();
        hash_shape(expr, &mut shape);
        Some(CacheKey {
            node: expr as *const Expression as usize,
            kind: expr.kind_name(),
            shape: shape.finish(),
            bindings,
        })
    }

    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let found = self.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Stores scalar results only.
    pub fn put(&self, key: CacheKey, value: &Value) {
        if value.is_scalar() {
            self.lock().put(key, value.clone());
        }
    }

    /// Looks `expr` up, computing and storing on a miss. Uncacheable nodes go
    /// straight to `compute`.
    pub async fn get_or_compute<F, Fut>(
        &self,
        expr: &Expression,
        context: &SandboxContext,
        compute: F,
    ) -> EvalResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = EvalResult<Value>>,
    {
        let Some(key) = Self::key_for(expr, context) else {
            return compute().await;
        };
        if let Some(value) = self.get(&key) {
            debug!(kind = key.kind, "cache hit");
            return Ok(value);
        }
        let value = compute().await?;
        self.put(key, &value);
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

fn hash_shape<H: Hasher>(expr: &Expression, state: &mut H) {
    expr.kind_name().hash(state);
    match expr {
        Expression::Literal(literal) => match literal {
            Literal::Integer(i) => i.hash(state),
            Literal::Float(f) => f.to_bits().hash(state),
            Literal::String(s) => s.hash(state),
            Literal::Boolean(b) => b.hash(state),
            Literal::None => {}
        },
        Expression::Identifier(name) => name.hash(state),
        Expression::Binary { op, left, right } => {
            op.hash(state);
            hash_shape(left, state);
            hash_shape(right, state);
        }
        Expression::Unary { op, operand } => {
            op.hash(state);
            hash_shape(operand, state);
        }
        _ => {}
    }
}
