//! Process-wide scheduler registry.
//!
//! Owns the shared native worker pool, the named memory-bounded wrappers in
//! front of it and the asset compiling coordinator. Everything is created on
//! first use and torn down by an explicit [`SchedulerRegistry::shutdown`].
//! The registry is an ordinary value: construct one at startup and pass it
//! by reference to whatever needs a pool.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::builders::WrapperBuilder;
use crate::config::SchedulerConfig;
use crate::core::{AssetCompilingCoordinator, MemoryBoundedWrapper, SchedulerError, UnderlyingExecutor, WorkerPool};
use crate::util::memory_stats::{MemoryStatsProvider, SystemMemoryStats};

/// Name of the wrapper returned by [`SchedulerRegistry::memory_bounded_pool`].
pub const DEFAULT_POOL: &str = "default";

/// Lazily built schedulers shared by one process.
pub struct SchedulerRegistry {
    config: SchedulerConfig,
    stats: Arc<dyn MemoryStatsProvider>,
    worker_pool: Mutex<Option<Arc<WorkerPool>>>,
    wrappers: RwLock<HashMap<String, Arc<MemoryBoundedWrapper>>>,
    coordinator: AssetCompilingCoordinator,
    shut_down: AtomicBool,
}

impl SchedulerRegistry {
    /// Registry building everything from `config`, reading OS memory.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_memory_stats(config, Arc::new(SystemMemoryStats::new()))
    }

    /// Registry whose wrappers read memory from `stats`.
    pub fn with_memory_stats(config: SchedulerConfig, stats: Arc<dyn MemoryStatsProvider>) -> Self {
        Self {
            config,
            stats,
            worker_pool: Mutex::new(None),
            wrappers: RwLock::new(HashMap::new()),
            coordinator: AssetCompilingCoordinator::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Configuration new components are built from.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The asset compiling coordinator.
    pub const fn coordinator(&self) -> &AssetCompilingCoordinator {
        &self.coordinator
    }

    fn ensure_running(&self) -> Result<(), SchedulerError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        Ok(())
    }

    /// The shared native worker pool, started on first use.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Shutdown` after [`shutdown`](Self::shutdown), or the
    /// pool construction error.
    pub fn worker_pool(&self) -> Result<Arc<WorkerPool>, SchedulerError> {
        self.ensure_running()?;
        let mut slot = self.worker_pool.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(WorkerPool::new(&self.config)?);
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }

    /// The default memory-bounded wrapper over the shared pool.
    ///
    /// # Errors
    ///
    /// See [`get_or_create`](Self::get_or_create).
    pub fn memory_bounded_pool(&self) -> Result<Arc<MemoryBoundedWrapper>, SchedulerError> {
        self.get_or_create(DEFAULT_POOL)
    }

    /// The wrapper registered as `name`, built over the shared pool on first
    /// use.
    ///
    /// # Errors
    ///
    /// `SchedulerError::Shutdown` after [`shutdown`](Self::shutdown), or a
    /// construction error.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<MemoryBoundedWrapper>, SchedulerError> {
        self.ensure_running()?;
        if let Some(wrapper) = self.wrappers.read().get(name) {
            return Ok(Arc::clone(wrapper));
        }

        let pool = self.worker_pool()?;
        let mut wrappers = self.wrappers.write();
        if let Some(wrapper) = wrappers.get(name) {
            return Ok(Arc::clone(wrapper));
        }
        let wrapper = WrapperBuilder::new(name, self.config.clone())
            .with_memory_stats(Arc::clone(&self.stats))
            .build_over(pool as Arc<dyn UnderlyingExecutor>)?;
        let wrapper = Arc::new(wrapper);
        wrappers.insert(name.to_owned(), Arc::clone(&wrapper));
        debug!(name, "registered wrapper");
        Ok(wrapper)
    }

    /// Names of the wrappers created so far.
    pub fn wrapper_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.wrappers.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Shut the coordinator's managers down, destroy every wrapper, then stop
    /// the worker pool. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down scheduler registry");

        self.coordinator.shutdown();

        let wrappers: Vec<(String, Arc<MemoryBoundedWrapper>)> = self.wrappers.write().drain().collect();
        for (name, wrapper) in wrappers {
            debug!(name = %name, "destroying wrapper");
            wrapper.destroy();
        }

        if let Some(pool) = self.worker_pool.lock().take() {
            pool.shutdown();
        }
        info!("scheduler registry shut down");
    }
}

impl Drop for SchedulerRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SchedulerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerRegistry")
            .field("wrappers", &self.wrapper_names())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
