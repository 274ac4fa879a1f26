//! Host-facing entry point.
//!
//! An [`Interpreter`] owns everything one embedding needs: a tokio runtime
//! whose worker threads carry deep stacks, the eager worker pool, the native
//! registry and the shared capability table. Instances are independent; there
//! is no process-wide state.

use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{debug, error, info};

use crate::ast::{Expression, Program};
use crate::capability::{Capability, ResourceRegistry};
use crate::config::InterpreterConfig;
use crate::error::{DanaResult, Error, ExecutionError};
use crate::eval::builtins::{NativeArgs, NativeFunction, NativeRegistry, OutputSink};
use crate::eval::context::SandboxContext;
use crate::eval::evaluator::{EvalError, EvalResult, EvalServices, Evaluator};
use crate::eval::value::Value;
use crate::promise::executor::{PromiseExecutor, WorkerPool};
use crate::promise::{force_deep, Promise};

/// Shared services of an interpreter, usable from inside an existing tokio
/// runtime.
#[derive(Clone)]
pub struct InterpreterState {
    config: Arc<InterpreterConfig>,
    executor: Arc<dyn PromiseExecutor>,
    natives: Arc<NativeRegistry>,
    resources: ResourceRegistry,
    output: OutputSink,
}

impl InterpreterState {
    /// Eager promises are spawned onto `handle`.
    pub fn new(config: InterpreterConfig, handle: Handle, output: OutputSink) -> DanaResult<Self> {
        config.validate()?;
        let executor: Arc<dyn PromiseExecutor> =
            Arc::new(WorkerPool::new(config.promise.max_concurrency, handle));
        Ok(Self {
            config: Arc::new(config),
            executor,
            natives: Arc::new(NativeRegistry::with_builtins(output.clone())),
            resources: ResourceRegistry::new(),
            output,
        })
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn executor(&self) -> &Arc<dyn PromiseExecutor> {
        &self.executor
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Fresh context sharing this interpreter's capability table.
    pub fn new_context(&self) -> Arc<SandboxContext> {
        Arc::new(SandboxContext::with_config(&self.config).with_resources(self.resources.clone()))
    }

    fn evaluator(&self) -> Evaluator {
        Evaluator::new(EvalServices::new(
            self.config.clone(),
            self.executor.clone(),
            self.natives.clone(),
        ))
    }

    /// Runs a program and forces its result.
    #[tracing::instrument(skip(self, program, context), fields(statements = program.len()), level = "debug")]
    pub async fn execute(
        &self,
        program: &Program,
        context: Arc<SandboxContext>,
    ) -> Result<Value, ExecutionError> {
        let evaluator = self.evaluator();
        let result = match evaluator.eval_program(program, context.clone()).await {
            Ok(value) => force_deep(value).await,
            Err(error) => Err(error),
        };
        if let Some(stats) = evaluator.cache_stats() {
            debug!(hits = stats.hits, misses = stats.misses, "execution cache");
        }
        result.map_err(|error| {
            let error = ExecutionError::from(error);
            error!(kind = %error.kind, span = %error.span, "{}", error.message());
            error
        })
    }

    /// Runs a program without forcing its result.
    pub async fn execute_raw(
        &self,
        program: &Program,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        self.evaluator().eval_program(program, context).await
    }

    /// Evaluates one expression and forces the result.
    pub async fn evaluate(
        &self,
        expr: &Expression,
        context: Arc<SandboxContext>,
    ) -> Result<Value, ExecutionError> {
        self.evaluator()
            .evaluate(expr, context)
            .await
            .map_err(ExecutionError::from)
    }

    /// Calls a native by name, as a host.
    pub async fn call_native(
        &self,
        name: &str,
        args: NativeArgs,
        context: Arc<SandboxContext>,
    ) -> EvalResult<Value> {
        self.natives.call(name, args, context).await
    }
}

/// Owns a dedicated runtime and blocks the caller on each execution.
pub struct Interpreter {
    state: InterpreterState,
    runtime: Option<Runtime>,
}

impl Interpreter {
    pub fn new(config: InterpreterConfig) -> DanaResult<Self> {
        Self::with_output(config, OutputSink::Stdout)
    }

    pub fn with_output(config: InterpreterConfig, output: OutputSink) -> DanaResult<Self> {
        config.validate()?;
        let runtime = Builder::new_multi_thread()
            .worker_threads(config.promise.worker_threads)
            .thread_stack_size(config.runtime.thread_stack_size)
            .thread_name("dana-worker")
            .enable_all()
            .build()?;
        info!(
            worker_threads = config.promise.worker_threads,
            max_concurrency = config.promise.max_concurrency,
            promises = config.promise.enabled,
            "interpreter started"
        );
        let state = InterpreterState::new(config, runtime.handle().clone(), output)?;
        Ok(Self {
            state,
            runtime: Some(runtime),
        })
    }

    pub fn state(&self) -> &InterpreterState {
        &self.state
    }

    pub fn config(&self) -> &InterpreterConfig {
        self.state.config()
    }

    pub fn new_context(&self) -> Arc<SandboxContext> {
        self.state.new_context()
    }

    pub fn register_native(&self, function: Arc<dyn NativeFunction>) {
        debug!(native = function.name(), "registering native");
        self.state.natives.register(function);
    }

    pub fn register_fn<F>(&self, name: impl Into<String>, function: F)
    where
        F: Fn(&NativeArgs, &SandboxContext) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.state.natives.register_fn(name, function);
    }

    /// Registers a capability for every context created afterwards and
    /// every context already sharing this interpreter's table.
    pub fn register_resource(&self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.state.resources.register(name, capability);
    }

    /// Captured `print` output; empty when printing to stdout.
    pub fn output(&self) -> Vec<String> {
        self.state.output.lines()
    }

    fn runtime(&self) -> Result<&Runtime, ExecutionError> {
        self.runtime
            .as_ref()
            .ok_or_else(|| EvalError::Internal("interpreter is shut down".into()).into())
    }

    /// Runs `program` on a worker thread and waits for its forced result.
    pub fn execute(
        &self,
        program: &Program,
        context: &Arc<SandboxContext>,
    ) -> Result<Value, ExecutionError> {
        let runtime = self.runtime()?;
        let state = self.state.clone();
        let program = program.clone();
        let context = context.clone();
        let task = runtime.spawn(async move { state.execute(&program, context).await });
        runtime
            .block_on(task)
            .map_err(|join| ExecutionError::from(EvalError::Internal(join.to_string())))?
    }

    /// Evaluates one expression on a worker thread.
    pub fn evaluate(
        &self,
        expr: &Expression,
        context: &Arc<SandboxContext>,
    ) -> Result<Value, ExecutionError> {
        let runtime = self.runtime()?;
        let state = self.state.clone();
        let expr = expr.clone();
        let context = context.clone();
        let task = runtime.spawn(async move { state.evaluate(&expr, context).await });
        runtime
            .block_on(task)
            .map_err(|join| ExecutionError::from(EvalError::Internal(join.to_string())))?
    }

    /// Blocks until `promise` settles.
    pub fn force(&self, promise: &Promise) -> Result<Value, ExecutionError> {
        let runtime = self.runtime()?;
        let promise = promise.clone();
        let task = runtime.spawn(async move { promise.force().await });
        runtime
            .block_on(task)
            .map_err(|join| ExecutionError::from(EvalError::Internal(join.to_string())))?
            .map_err(ExecutionError::from)
    }

    /// Waits up to the configured timeout for in-flight eager work.
    pub fn shutdown(mut self) -> Result<(), Error> {
        if let Some(runtime) = self.runtime.take() {
            info!("interpreter shutting down");
            runtime.shutdown_timeout(self.state.config.runtime.shutdown_timeout);
        }
        Ok(())
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            // safe to call from async contexts, unlike dropping the runtime
            runtime.shutdown_background();
        }
    }
}
