use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::evaluator::{EvalError, EvalResult};
use super::value::{Heap, ObjectId, ObjectRef, Value};
use crate::ast::{FunctionDef, ScopeKind, ScopedName, Span, StructDef};
use crate::capability::{Capability, ResourceRegistry};
use crate::config::{InterpreterConfig, LimitsConfig, RecursionConfig};
use crate::guard::RecursionMonitor;

/// Named definitions, kept apart from scope values so a function body can
/// always resolve itself and its siblings.
#[derive(Debug, Clone)]
pub enum Definition {
    Function(Arc<FunctionDef>),
    Struct(Arc<StructDef>),
}

#[derive(Debug, Default)]
struct Scopes {
    local: DashMap<String, Value>,
    private: DashMap<String, Value>,
    public: DashMap<String, Value>,
    system: DashMap<String, Value>,
}

impl Scopes {
    fn get(&self, kind: ScopeKind) -> &DashMap<String, Value> {
        match kind {
            ScopeKind::Local => &self.local,
            ScopeKind::Private => &self.private,
            ScopeKind::Public => &self.public,
            ScopeKind::System => &self.system,
        }
    }
}

/// The four scopes and resource handles of one logical execution.
///
/// Scopes are mutated only by the logical thread that owns the context.
/// Anything that runs elsewhere (an eager promise) gets its own
/// [`SandboxContext::copy`].
#[derive(Debug)]
pub struct SandboxContext {
    scopes: Scopes,
    definitions: DashMap<String, Definition>,
    resources: ResourceRegistry,
    heap: Arc<Heap>,
    recursion: Arc<RecursionMonitor>,
    recursion_config: RecursionConfig,
    limits: LimitsConfig,
    // packed line << 32 | column of the statement being evaluated
    span: AtomicU64,
}

impl Default for SandboxContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxContext {
    pub fn new() -> Self {
        Self::with_config(&InterpreterConfig::default())
    }

    pub fn with_config(config: &InterpreterConfig) -> Self {
        Self {
            scopes: Scopes::default(),
            definitions: DashMap::new(),
            resources: ResourceRegistry::new(),
            heap: Arc::new(Heap::new()),
            recursion: Arc::new(RecursionMonitor::new(&config.recursion)),
            recursion_config: config.recursion.clone(),
            limits: config.limits.clone(),
            span: AtomicU64::new(0),
        }
    }

    /// Replaces the resource table with a shared one.
    pub fn with_resources(mut self, resources: ResourceRegistry) -> Self {
        self.resources = resources;
        self
    }

    pub fn heap(&self) -> &Arc<Heap> {
        &self.heap
    }

    pub fn recursion(&self) -> &Arc<RecursionMonitor> {
        &self.recursion
    }

    pub fn recursion_config(&self) -> &RecursionConfig {
        &self.recursion_config
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn register_resource(&self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        self.register_resource_as(name, capability);
    }

    pub fn register_resource_as(&self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        let name = name.into();
        debug!(resource = %name, "registering resource");
        self.resources.register(name, capability);
    }

    pub fn resource(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.resources.get(name)
    }

    /// Resolves a name, by precedence unless it carries a scope prefix.
    pub fn lookup(&self, name: &ScopedName) -> Option<(ScopeKind, Value)> {
        match name.scope {
            Some(kind) => self.get_in(kind, &name.name).map(|value| (kind, value)),
            None => ScopeKind::PRECEDENCE.iter().find_map(|kind| {
                self.get_in(*kind, &name.name).map(|value| (*kind, value))
            }),
        }
    }

    pub fn get(&self, name: &ScopedName) -> EvalResult<Value> {
        self.lookup(name)
            .map(|(_, value)| value)
            .ok_or_else(|| EvalError::NameResolution {
                name: name.to_string(),
            })
    }

    pub fn get_in(&self, kind: ScopeKind, name: &str) -> Option<Value> {
        self.scopes
            .get(kind)
            .get(name)
            .map(|entry| entry.value().clone())
    }

    /// Program assignment. Unprefixed names go to the local scope.
    pub fn set(&self, name: &ScopedName, value: Value) -> EvalResult<()> {
        let kind = name.scope.unwrap_or(ScopeKind::Local);
        if kind == ScopeKind::System && !self.limits.system_writable {
            return Err(EvalError::invalid(format!(
                "cannot assign to '{}': system scope is read-only",
                name
            )));
        }
        self.set_in(kind, &name.name, value);
        Ok(())
    }

    /// Host-side write, no access checks.
    pub fn set_in(&self, kind: ScopeKind, name: &str, value: Value) {
        self.scopes.get(kind).insert(name.to_string(), value);
    }

    pub fn remove_in(&self, kind: ScopeKind, name: &str) -> Option<Value> {
        self.scopes.get(kind).remove(name).map(|(_, value)| value)
    }

    /// Sorted names bound in one scope.
    pub fn names_in(&self, kind: ScopeKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .scopes
            .get(kind)
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub fn define(&self, name: impl Into<String>, definition: Definition) {
        self.definitions.insert(name.into(), definition);
    }

    pub fn definition(&self, name: &str) -> Option<Definition> {
        self.definitions
            .get(name)
            .map(|entry| entry.value().clone())
    }

    pub fn span(&self) -> Span {
        let packed = self.span.load(Ordering::Relaxed);
        Span::new((packed >> 32) as u32, packed as u32)
    }

    pub fn set_span(&self, span: Span) {
        let packed = ((span.line as u64) << 32) | span.column as u64;
        self.span.store(packed, Ordering::Relaxed);
    }

    /// Independent copy: scope values are deep-copied, resources are shared.
    ///
    /// Objects reachable from several bindings stay shared (and cyclic
    /// structures stay cyclic) within the copy. The copy's recursion monitor
    /// continues from this context's depth.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn copy(&self) -> Self {
        self.copy_scopes(&ScopeKind::PRECEDENCE, &mut HashMap::new())
    }

    /// Context for a Dana call: a [`copy`](Self::copy) with an empty local
    /// scope. Arguments copied through the same `memo` keep their aliasing
    /// with the copied scopes.
    pub fn copy_for_call(&self, memo: &mut HashMap<ObjectId, ObjectRef>) -> Self {
        self.copy_scopes(&CALL_SCOPES, memo)
    }

    fn copy_scopes(&self, kinds: &[ScopeKind], memo: &mut HashMap<ObjectId, ObjectRef>) -> Self {
        let copy = Self {
            scopes: Scopes::default(),
            definitions: self.definitions.clone(),
            resources: self.resources.clone(),
            heap: self.heap.clone(),
            recursion: Arc::new(self.recursion.child()),
            recursion_config: self.recursion_config.clone(),
            limits: self.limits.clone(),
            span: AtomicU64::new(self.span.load(Ordering::Relaxed)),
        };

        for kind in kinds {
            let entries: Vec<(String, Value)> = self
                .scopes
                .get(*kind)
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();
            for (name, value) in entries {
                let value = self.heap.deep_copy(&value, memo);
                copy.set_in(*kind, &name, value);
            }
        }
        copy
    }
}

/// Scopes a callee inherits from its caller.
const CALL_SCOPES: [ScopeKind; 3] = [ScopeKind::Private, ScopeKind::Public, ScopeKind::System];
