//! # dana-core: concurrent execution core for the Dana language
//!
//! Dana programs read like sequential Python, but every call to a Dana
//! function returns a transparent promise. Work marked with `deliver` starts
//! immediately on a bounded worker pool, while plain `return` results are
//! computed lazily the first time something needs them. Programs never see
//! the difference: any operation on a promise forces it first.
//!
//! ## Architecture
//!
//! ```text
//! Program (ast) → Evaluator → StatementEvaluator → ExpressionEvaluator
//!                                                   ├─ Promise engine (promise)
//!                                                   ├─ ExecutionCache (cache)
//!                                                   └─ natives, capabilities
//! ```
//!
//! - [`ast`]: the already-parsed program tree handed to the core.
//! - [`eval`]: statement and expression evaluation, values and the heap, the
//!   four-scope [`eval::context::SandboxContext`].
//! - [`promise`]: the promise state machine and its executors.
//! - [`cache`]: per-execution memoization of pure expressions.
//! - [`guard`]: recursion depth bound and cycle detection.
//! - [`capability`]: pluggable host capabilities (reasoning backends, tools).
//! - [`interpreter`]: host entry point owning the runtime and worker pool.
//! - [`config`] and [`error`]: configuration and the crate error types.

pub mod ast;
pub mod cache;
pub mod capability;
pub mod config;
pub mod error;
pub mod eval;
pub mod guard;
pub mod interpreter;
pub mod promise;

// Re-exports
pub use ast::*;
pub use capability::{Capability, CapabilityError, CapabilityRequest, ResourceRegistry};
pub use config::InterpreterConfig;
pub use error::*;
pub use eval::builtins::{NativeArgs, NativeFunction, NativeRegistry, OutputSink};
pub use eval::context::SandboxContext;
pub use eval::evaluator::{EvalError, EvalResult};
pub use eval::value::{Heap, HeapObject, ObjectId, ObjectRef, Value};
pub use interpreter::{Interpreter, InterpreterState};
pub use promise::{Promise, PromiseStatus};
