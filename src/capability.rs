//! External resources reachable from Dana programs.
//!
//! A capability is anything slow and outside the interpreter: a reasoning
//! backend, a tool connector, a search index. The interpreter only knows the
//! uniform request/response contract below.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("capability '{0}' is not registered")]
    NotRegistered(String),
    #[error("capability '{capability}' does not support method '{method}'")]
    UnsupportedMethod { capability: String, method: String },
    #[error("invalid input for capability '{capability}': {message}")]
    InvalidInput { capability: String, message: String },
    #[error("capability '{capability}' failed: {message}")]
    Failed { capability: String, message: String },
}

impl CapabilityError {
    pub fn failed(capability: impl Into<String>, message: impl Into<String>) -> Self {
        CapabilityError::Failed {
            capability: capability.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    pub method: String,
    #[serde(default)]
    pub inputs: serde_json::Map<String, serde_json::Value>,
}

impl CapabilityRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            inputs: serde_json::Map::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    pub fn input(&self, name: &str) -> Option<&serde_json::Value> {
        self.inputs.get(name)
    }
}

/// Implementations must be thread-safe: one handle is shared by every
/// context copied from the one it was registered on.
#[automock]
#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(
        &self,
        request: CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// Name to handle table. Clones share the same table.
#[derive(Clone, Default)]
pub struct ResourceRegistry {
    entries: Arc<DashMap<String, Arc<dyn Capability>>>,
}

impl fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.entries.insert(name.into(), capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `name` and sends it the request.
    #[tracing::instrument(skip(self, request), fields(method = %request.method), level = "debug")]
    pub async fn invoke(
        &self,
        name: &str,
        request: CapabilityRequest,
    ) -> Result<serde_json::Value, CapabilityError> {
        let capability = self
            .get(name)
            .ok_or_else(|| CapabilityError::NotRegistered(name.to_string()))?;
        capability.invoke(request).await
    }
}
