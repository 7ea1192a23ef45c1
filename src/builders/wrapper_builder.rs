//! Builders to construct memory-bounded wrappers from configuration.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::SchedulerConfig;
use crate::core::{MemoryBoundedWrapper, SchedulerError, UnderlyingExecutor, WorkerPool};
use crate::util::memory_stats::{MemoryStatsProvider, SystemMemoryStats};
use crate::util::priority::QueuedWorkPriority;

type MapperFn = Arc<dyn Fn(QueuedWorkPriority) -> QueuedWorkPriority + Send + Sync>;

/// Step-by-step construction of a [`MemoryBoundedWrapper`].
pub struct WrapperBuilder {
    name: String,
    config: SchedulerConfig,
    stats: Arc<dyn MemoryStatsProvider>,
    mapper: Option<MapperFn>,
}

impl WrapperBuilder {
    /// Start from `config`. `name` only labels log output.
    pub fn new(name: impl Into<String>, config: SchedulerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            stats: Arc::new(SystemMemoryStats::new()),
            mapper: None,
        }
    }

    /// Name of the wrapper being built.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration the wrapper will be built from.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Read memory from `stats` instead of the operating system.
    #[must_use]
    pub fn with_memory_stats(mut self, stats: Arc<dyn MemoryStatsProvider>) -> Self {
        self.stats = stats;
        self
    }

    /// Remap admitted priorities with `mapper`.
    #[must_use]
    pub fn with_priority_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(QueuedWorkPriority) -> QueuedWorkPriority + Send + Sync + 'static,
    {
        self.mapper = Some(Arc::new(mapper));
        self
    }

    /// Build a wrapper in front of `executor`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` if the configuration is invalid.
    pub fn build_over(
        &self,
        executor: Arc<dyn UnderlyingExecutor>,
    ) -> Result<MemoryBoundedWrapper, SchedulerError> {
        self.config.validate().map_err(SchedulerError::InvalidConfig)?;

        let wrapper = MemoryBoundedWrapper::new(
            executor,
            self.config.static_max_concurrency(),
            self.config.memory_budget(),
            Arc::clone(&self.stats),
        );
        wrapper.set_destroy_stall_warning(self.config.destroy_stall_warning());
        if let Some(mapper) = &self.mapper {
            let mapper = Arc::clone(mapper);
            wrapper.set_priority_mapper(move |p: QueuedWorkPriority| mapper(p));
        }

        info!(
            name = %self.name,
            max_concurrency = wrapper.max_concurrency(),
            hard_memory_cap_bytes = self.config.hard_memory_cap_bytes,
            "built memory-bounded wrapper"
        );
        Ok(wrapper)
    }

    /// Spawn a native [`WorkerPool`] and build a wrapper in front of it.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidConfig` for an invalid configuration and
    /// `SchedulerError::ThreadSpawn` if the pool cannot start its workers.
    pub fn build(&self) -> Result<(Arc<WorkerPool>, MemoryBoundedWrapper), SchedulerError> {
        let pool = Arc::new(WorkerPool::new(&self.config)?);
        let wrapper = self.build_over(Arc::clone(&pool) as Arc<dyn UnderlyingExecutor>)?;
        Ok((pool, wrapper))
    }
}

impl fmt::Debug for WrapperBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("has_mapper", &self.mapper.is_some())
            .finish_non_exhaustive()
    }
}

/// Build a memory-bounded wrapper over a fresh native worker pool.
///
/// # Errors
///
/// See [`WrapperBuilder::build`].
pub fn build_memory_bounded_wrapper(
    cfg: &SchedulerConfig,
) -> Result<(Arc<WorkerPool>, MemoryBoundedWrapper), SchedulerError> {
    WrapperBuilder::new("default", cfg.clone()).build()
}
