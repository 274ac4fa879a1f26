//! Safety nets around recursive descent.
//!
//! [`RecursionMonitor`] bounds the depth of Dana call frames on one logical
//! thread. [`CycleDetector`] bounds traversal of heap graphs, which may be
//! self-referential.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::config::RecursionConfig;
use crate::eval::evaluator::{EvalError, EvalResult};
use crate::eval::value::ObjectId;

/// Depth counter for one logical thread of evaluation.
///
/// A callee context gets a monitor that starts at its caller's depth
/// ([`RecursionMonitor::child`]), so eager work running on another worker
/// continues the same count.
#[derive(Debug)]
pub struct RecursionMonitor {
    depth: AtomicUsize,
    soft_limit: usize,
    hard_limit: usize,
    warned: AtomicBool,
}

impl RecursionMonitor {
    pub fn new(config: &RecursionConfig) -> Self {
        Self::starting_at(0, config.soft_limit, config.hard_limit)
    }

    fn starting_at(depth: usize, soft_limit: usize, hard_limit: usize) -> Self {
        Self {
            depth: AtomicUsize::new(depth),
            soft_limit,
            hard_limit,
            warned: AtomicBool::new(false),
        }
    }

    /// Monitor for a nested logical thread, starting at the current depth.
    pub fn child(&self) -> Self {
        let depth = self.depth();
        let monitor = Self::starting_at(depth, self.soft_limit, self.hard_limit);
        monitor
            .warned
            .store(depth > self.soft_limit, Ordering::Relaxed);
        monitor
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn hard_limit(&self) -> usize {
        self.hard_limit
    }

    /// Enters one frame. The returned guard exits it on drop.
    pub fn enter(self: &Arc<Self>) -> EvalResult<RecursionFrame> {
        let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if depth > self.hard_limit {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(EvalError::RecursionLimit {
                depth,
                limit: self.hard_limit,
            });
        }
        if depth > self.soft_limit && !self.warned.swap(true, Ordering::Relaxed) {
            warn!(
                depth,
                soft_limit = self.soft_limit,
                hard_limit = self.hard_limit,
                "recursion depth crossed soft threshold"
            );
        }
        Ok(RecursionFrame {
            monitor: self.clone(),
        })
    }

    pub fn exit(&self) {
        let previous = self.depth.fetch_sub(1, Ordering::SeqCst);
        if previous <= self.soft_limit + 1 {
            self.warned.store(false, Ordering::Relaxed);
        }
    }
}

#[must_use = "dropping the frame exits it immediately"]
#[derive(Debug)]
pub struct RecursionFrame {
    monitor: Arc<RecursionMonitor>,
}

impl RecursionFrame {
    pub fn depth(&self) -> usize {
        self.monitor.depth()
    }
}

impl Drop for RecursionFrame {
    fn drop(&mut self) {
        self.monitor.exit();
    }
}

/// Tracks the heap objects on the current traversal path.
///
/// Only the path is tracked, so a shared but acyclic sub-structure is visited
/// twice without complaint; re-entering an object already on the path is a
/// cycle.
#[derive(Debug, Default)]
pub struct CycleDetector {
    on_path: HashSet<ObjectId>,
    path: Vec<(ObjectId, String)>,
}

impl CycleDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `label` names the edge taken to reach `id` (`[0]`, `.next`, `{'k'}`).
    pub fn enter(&mut self, id: ObjectId, label: impl Into<String>) -> EvalResult<()> {
        let label = label.into();
        if self.on_path.contains(&id) {
            let mut path = vec!["root".to_string()];
            path.extend(self.path.iter().skip(1).map(|(_, label)| label.clone()));
            path.push(label);
            return Err(EvalError::CircularReference { path });
        }
        self.on_path.insert(id);
        self.path.push((id, label));
        Ok(())
    }

    pub fn exit(&mut self, id: ObjectId) {
        if let Some(position) = self.path.iter().rposition(|(entry, _)| *entry == id) {
            self.path.truncate(position);
        }
        self.on_path.remove(&id);
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}
