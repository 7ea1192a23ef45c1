//! Native worker pool: the low-level executor wrappers submit to.
//!
//! This module provides a `WorkerPool` that runs [`QueuedWork`](crate::core::work::QueuedWork) on dedicated OS
//! threads. It has its own priority queue, so it honours the (remapped)
//! priority a wrapper submits with, and it supports retraction of work that no
//! worker has picked up yet.
//!
//! # Design Principles
//!
//! - **No polling**: idle workers sleep on a `Condvar`
//! - **Brief critical sections**: the queue lock is never held while work runs
//! - **Nothing is lost**: work still queued at shutdown is abandoned, never dropped
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_work_scheduler::config::SchedulerConfig;
//! use prometheus_work_scheduler::core::{FnWork, UnderlyingExecutor, WorkerPool};
//! use prometheus_work_scheduler::util::QueuedWorkPriority;
//!
//! let pool = Arc::new(WorkerPool::new(&SchedulerConfig::new().with_worker_count(4))?);
//! pool.add_work(FnWork::new(|| compress()).into_handle(), QueuedWorkPriority::Normal);
//! pool.shutdown();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::error::SchedulerError;
use crate::core::executor::UnderlyingExecutor;
use crate::core::priority_queue::PriorityWorkQueue;
use crate::core::work::WorkHandle;
use crate::util::priority::QueuedWorkPriority;

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,

    /// Currently executing items.
    pub active_tasks: u64,

    /// Items waiting for a worker.
    pub queued_tasks: u64,

    /// Total items run to completion.
    pub completed_tasks: u64,

    /// Total items abandoned at shutdown.
    pub abandoned_tasks: u64,

    /// Total items retracted before a worker picked them up.
    pub retracted_tasks: u64,

    /// Total items submitted.
    pub submitted_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub abandoned_tasks: AtomicU64,
    pub retracted_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            abandoned_tasks: self.abandoned_tasks.load(Ordering::Relaxed),
            retracted_tasks: self.retracted_tasks.load(Ordering::Relaxed),
            submitted_tasks: self.submitted_tasks.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the pool handle and its workers.
struct Shared {
    /// Pending work, most important first.
    queue: Mutex<PriorityWorkQueue>,

    /// Signalled when work arrives or on shutdown.
    available: Condvar,

    /// Shutdown flag.
    shutdown: AtomicBool,

    /// Pool statistics counters.
    counters: PoolCounters,
}

impl Shared {
    /// Block until there is work or the pool shuts down.
    fn next_work(&self) -> Option<WorkHandle> {
        let mut queue = self.queue.lock();
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some((work, _)) = queue.dequeue() {
                self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                return Some(work);
            }
            self.available.wait(&mut queue);
        }
    }

    /// Flag shutdown, wake every worker and abandon whatever is still queued.
    ///
    /// Returns `false` if the pool was already shut down.
    fn begin_shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return false;
        }
        let queued = {
            let mut queue = self.queue.lock();
            self.available.notify_all();
            queue.drain()
        };
        if !queued.is_empty() {
            debug!(count = queued.len(), "abandoning queued work");
        }
        for (work, _) in queued {
            self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            self.counters.abandoned_tasks.fetch_add(1, Ordering::Relaxed);
            work.abandon();
        }
        true
    }
}

/// Worker pool with dedicated OS threads.
///
/// # Design
///
/// - **No polling**: workers block on a `Condvar` until work arrives
/// - **Priority aware**: the most important queued item is always picked first
/// - **Clean shutdown**: queued work is abandoned, running work is joined
pub struct WorkerPool {
    /// State shared with workers.
    shared: Arc<Shared>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Number of workers spawned.
    worker_count: usize,
}

impl WorkerPool {
    /// Create a new worker pool from the given configuration.
    ///
    /// This spawns `config.resolved_worker_count()` OS threads named
    /// `pws-worker-{id}` with the configured stack size.
    ///
    /// # Errors
    ///
    /// - `SchedulerError::InvalidConfig` if the configuration is invalid
    /// - `SchedulerError::ThreadSpawn` if a worker thread cannot be created
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let worker_count = config.resolved_worker_count();
        let shared = Arc::new(Shared {
            queue: Mutex::new(PriorityWorkQueue::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            counters: PoolCounters::default(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            match spawn_worker(worker_id, Arc::clone(&shared), config.thread_stack_size) {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    error!(worker_id = worker_id, error = %e, "Failed to spawn worker thread");
                    shared.begin_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::ThreadSpawn(e.to_string()));
                }
            }
        }

        info!(
            worker_count = worker_count,
            stack_size = config.thread_stack_size,
            "WorkerPool initialized with dedicated OS threads"
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            worker_count,
        })
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(self.worker_count)
    }

    /// Whether `shutdown` has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    /// Shut the pool down.
    ///
    /// Abandons everything still queued, lets running items finish and joins
    /// every worker. Work submitted afterwards is abandoned on submission.
    /// Idempotent.
    pub fn shutdown(&self) {
        if !self.shared.begin_shutdown() {
            return;
        }

        info!("Shutting down worker pool");

        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for (idx, worker) in workers.drain(..).enumerate() {
            if worker.thread().id() == thread::current().id() {
                // Shut down from one of our own work items; it exits on return.
                warn!(worker_id = idx, "Worker pool shut down from its own worker - detaching");
                continue;
            }
            match worker.join() {
                Ok(()) => debug!(worker_id = idx, "Worker joined successfully"),
                Err(_) => warn!(worker_id = idx, "Worker panicked"),
            }
        }

        info!(worker_count = worker_count, "Worker pool shut down complete");
    }
}

impl UnderlyingExecutor for WorkerPool {
    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        // The flag is read under the queue lock: begin_shutdown drains under
        // the same lock, so an item is either drained there or abandoned here.
        let rejected = {
            let mut queue = self.shared.queue.lock();
            if self.shared.shutdown.load(Ordering::Acquire) {
                Some(work)
            } else {
                queue.enqueue(work, priority);
                self.shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                self.shared.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
                None
            }
        };

        match rejected {
            None => {
                self.shared.available.notify_one();
            }
            Some(work) => {
                warn!(%priority, "Work submitted to a shut down worker pool, abandoning");
                self.shared
                    .counters
                    .abandoned_tasks
                    .fetch_add(1, Ordering::Relaxed);
                work.abandon();
            }
        }
    }

    fn retract(&self, work: &WorkHandle) -> bool {
        let retracted = self.shared.queue.lock().retract(work);
        if retracted {
            self.shared.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            self.shared.counters.retracted_tasks.fetch_add(1, Ordering::Relaxed);
        }
        retracted
    }

    fn num_threads(&self) -> usize {
        self.worker_count
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Workers are detached rather than joined; explicit shutdown() joins.
        if self.shared.begin_shutdown() {
            debug!("WorkerPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

/// Spawn a worker thread.
fn spawn_worker(
    worker_id: usize,
    shared: Arc<Shared>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("pws-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id = worker_id, "Worker thread started");

            while let Some(work) = shared.next_work() {
                shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| work.do_work()));
                shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
                shared.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                if outcome.is_err() {
                    error!(worker_id = worker_id, "Work item panicked, worker continues");
                }
            }

            debug!(worker_id = worker_id, "Worker thread exiting");
        })
}
