use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};
use thiserror::Error;

use crate::error::DanaResult;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InterpreterConfig {
    #[serde(default)]
    pub promise: PromiseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub recursion: RecursionConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromiseConfig {
    /// When false, Dana calls run synchronously in place.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Permits of the eager worker pool.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Worker threads of the owned tokio runtime.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for PromiseConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_concurrency: default_max_concurrency(),
            worker_threads: default_worker_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            capacity: default_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecursionConfig {
    /// Depth at which a warning is logged.
    #[serde(default = "default_soft_limit")]
    pub soft_limit: usize,

    /// Depth beyond which evaluation fails with a recursion error.
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,
}

impl Default for RecursionConfig {
    fn default() -> Self {
        Self {
            soft_limit: default_soft_limit(),
            hard_limit: default_hard_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default = "default_thread_stack_size")]
    pub thread_stack_size: usize,

    #[serde(default = "default_shutdown_timeout", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_stack_size: default_thread_stack_size(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsConfig {
    #[serde(default = "default_max_loop_iterations")]
    pub max_loop_iterations: usize,

    /// Lets programs assign into the system scope.
    #[serde(default)]
    pub system_writable: bool,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: default_max_loop_iterations(),
            system_writable: false,
        }
    }
}

impl InterpreterConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> DanaResult<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> DanaResult<Self> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.promise.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "promise.max_concurrency",
                "must be at least 1",
            ));
        }
        if self.promise.worker_threads == 0 {
            return Err(ConfigError::invalid(
                "promise.worker_threads",
                "must be at least 1",
            ));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(ConfigError::invalid(
                "cache.capacity",
                "must be at least 1 when the cache is enabled",
            ));
        }
        if self.recursion.hard_limit == 0 {
            return Err(ConfigError::invalid(
                "recursion.hard_limit",
                "must be at least 1",
            ));
        }
        if self.recursion.soft_limit > self.recursion.hard_limit {
            return Err(ConfigError::invalid(
                "recursion.soft_limit",
                format!(
                    "{} exceeds hard limit {}",
                    self.recursion.soft_limit, self.recursion.hard_limit
                ),
            ));
        }
        if self.runtime.thread_stack_size == 0 {
            return Err(ConfigError::invalid(
                "runtime.thread_stack_size",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_max_concurrency() -> usize {
    32
}
fn default_worker_threads() -> usize {
    4
}
fn default_cache_capacity() -> usize {
    1024
}
fn default_soft_limit() -> usize {
    400
}
fn default_hard_limit() -> usize {
    500
}
fn default_thread_stack_size() -> usize {
    32 * 1024 * 1024
}
fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_max_loop_iterations() -> usize {
    1_000_000
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
