//! Tokio executor that runs admitted work on the blocking thread pool.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::{SchedulerError, UnderlyingExecutor, WorkHandle};
use crate::util::priority::QueuedWorkPriority;

/// Runs each submitted item with `spawn_blocking` on a tokio runtime.
///
/// Tokio has no notion of priority and cannot pull back a blocking task, so
/// priorities are ignored and `retract` always fails. A wrapper in front of it
/// still retracts records that have not started.
#[derive(Clone)]
pub struct TokioBlockingExecutor {
    handle: Arc<tokio::runtime::Handle>,
    threads: usize,
}

impl TokioBlockingExecutor {
    /// Create from a runtime handle, reporting `threads` to wrappers.
    pub fn new(handle: tokio::runtime::Handle, threads: usize) -> Self {
        Self {
            handle: Arc::new(handle),
            threads: threads.max(1),
        }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Config` outside of a tokio runtime.
    pub fn current(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SchedulerError::Config(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(handle, config.resolved_worker_count()))
    }
}

impl std::fmt::Debug for TokioBlockingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioBlockingExecutor")
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

/// Abandons the item if tokio drops the task without running it.
struct RunOrAbandon(Option<WorkHandle>);

impl RunOrAbandon {
    fn run(mut self) {
        if let Some(work) = self.0.take() {
            work.do_work();
        }
    }
}

impl Drop for RunOrAbandon {
    fn drop(&mut self) {
        if let Some(work) = self.0.take() {
            tracing::debug!("tokio dropped blocking task before it ran, abandoning");
            work.abandon();
        }
    }
}

impl UnderlyingExecutor for TokioBlockingExecutor {
    fn add_work(&self, work: WorkHandle, _priority: QueuedWorkPriority) {
        let task = RunOrAbandon(Some(work));
        drop(self.handle.spawn_blocking(move || task.run()));
    }

    fn num_threads(&self) -> usize {
        self.threads
    }
}
