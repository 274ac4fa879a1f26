use core::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::debug;

use super::Promise;

/// Runs the claim task of eagerly dispatched promises.
///
/// `submit` must not block: it is called on the creating logical thread,
/// which continues with the next statement.
pub trait PromiseExecutor: Send + Sync + fmt::Debug {
    fn submit(&self, promise: Promise);

    fn name(&self) -> &str;
}

/// Bounded pool: at most `max_concurrency` claim tasks run thunks at once.
/// Claim tasks beyond that wait for a permit, and may find their thunk
/// already taken by a forcer.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    handle: Handle,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("max_concurrency", &self.max_concurrency)
            .field("available", &self.available())
            .finish()
    }
}

impl WorkerPool {
    pub fn new(max_concurrency: usize, handle: Handle) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            handle,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl PromiseExecutor for WorkerPool {
    fn submit(&self, promise: Promise) {
        let permits = self.permits.clone();
        debug!(promise = %promise.id(), "submitting claim task");
        self.handle.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                // closed pool: a forcer will run the thunk
                Err(_) => return,
            };
            promise.run_if_pending().await;
        });
    }

    fn name(&self) -> &str {
        "worker_pool"
    }
}

/// One task per eager promise, no bound.
#[derive(Debug)]
pub struct UnboundedExecutor {
    handle: Handle,
}

impl UnboundedExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl PromiseExecutor for UnboundedExecutor {
    fn submit(&self, promise: Promise) {
        self.handle.spawn(async move {
            promise.run_if_pending().await;
        });
    }

    fn name(&self) -> &str {
        "unbounded"
    }
}
