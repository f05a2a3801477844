//! Work scheduling
//!
//! The bridge never spawns threads of its own: connect attempts and
//! notification deliveries are [`Work`] items handed to a [`WorkScheduler`].
//! [`TokioScheduler`] is the bundled implementation; it tracks every spawned
//! task in a registry so shutdown can abort whatever is still running.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    task::{AbortHandle, JoinHandle},
};

use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// TRAITS
// ═══════════════════════════════════════════════════════════════════════════

/// A unit of work run by a [`WorkScheduler`].
#[async_trait::async_trait]
pub trait Work: Send + Sync {
    async fn run(&self);

    /// Give up any resource the work holds. May race with `run` and may be
    /// called more than once; only the first effective call releases.
    async fn release(&self) {}
}

/// Accepts work for asynchronous execution. No ordering between submissions.
pub trait WorkScheduler: Send + Sync {
    /// # Errors
    ///
    /// Returns `Unavailable` when the scheduler no longer accepts work.
    fn submit(&self, work: Arc<dyn Work>) -> Result<WorkHandle>;
}

/// Handle to submitted work.
#[derive(Clone)]
pub struct WorkHandle {
    work: Arc<dyn Work>,
    abort: AbortHandle,
}

impl WorkHandle {
    pub fn new(work: Arc<dyn Work>, abort: AbortHandle) -> Self {
        Self { work, abort }
    }

    /// Stop the work and release what it holds.
    pub async fn cancel(&self) {
        self.abort.abort();
        self.work.release().await;
    }

    /// Release the work's resources without aborting it. If the work has not
    /// acquired anything yet, it never will.
    pub async fn release_early(&self) {
        self.work.release().await;
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TASK REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// Spawned tasks still owned by a scheduler.
#[derive(Clone, Default)]
struct TaskRegistry {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl TaskRegistry {
    fn register(&self, task: JoinHandle<()>) {
        self.tasks.lock().push(task);
    }

    fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Remove finished tasks, returning how many were dropped.
    fn cleanup_completed(&self) -> usize {
        let mut tasks = self.tasks.lock();
        let initial_count = tasks.len();
        tasks.retain(|task| !task.is_finished());
        initial_count.saturating_sub(tasks.len())
    }

    fn take_all(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.tasks.lock())
    }

    fn shutdown_all(&self) {
        self.take_all().iter().for_each(JoinHandle::abort);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TOKIO SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════

/// Runs work as tasks on a tokio runtime.
#[derive(Clone)]
pub struct TokioScheduler {
    runtime: Handle,
    registry: TaskRegistry,
    closed: Arc<AtomicBool>,
}

impl TokioScheduler {
    /// Scheduler on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|e| Error::Unavailable(format!("no tokio runtime: {e}")))
    }

    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            registry: TaskRegistry::default(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Tasks not yet reaped, finished or not.
    pub fn task_count(&self) -> usize {
        self.registry.task_count()
    }

    /// Wait until every task submitted so far has finished.
    pub async fn drain(&self) {
        loop {
            let tasks = self.registry.take_all();
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    if e.is_panic() {
                        tracing::error!("scheduled work panicked");
                    }
                }
            }
        }
    }

    /// Stop accepting work and abort everything still running.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let pending = self.registry.task_count();
            self.registry.shutdown_all();
            tracing::debug!(pending, "work scheduler shut down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl WorkScheduler for TokioScheduler {
    fn submit(&self, work: Arc<dyn Work>) -> Result<WorkHandle> {
        if self.is_shutdown() {
            return Err(Error::Unavailable(
                "work scheduler is shut down".to_string(),
            ));
        }
        self.registry.cleanup_completed();
        let task_work = Arc::clone(&work);
        let task = self.runtime.spawn(async move { task_work.run().await });
        let abort = task.abort_handle();
        self.registry.register(task);
        Ok(WorkHandle::new(work, abort))
    }
}
