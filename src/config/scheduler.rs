//! Scheduler and memory budget configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::error::AppResult;

/// Environment variable for [`SchedulerConfig::hard_memory_cap_bytes`].
pub const ENV_HARD_MEMORY_CAP_BYTES: &str = "PWS_HARD_MEMORY_CAP_BYTES";
/// Environment variable for [`SchedulerConfig::memory_per_item_default_bytes`].
pub const ENV_MEMORY_PER_ITEM_DEFAULT_BYTES: &str = "PWS_MEMORY_PER_ITEM_DEFAULT_BYTES";
/// Environment variable for [`SchedulerConfig::max_concurrency_override`].
pub const ENV_MAX_CONCURRENCY: &str = "PWS_MAX_CONCURRENCY";
/// Environment variable for [`SchedulerConfig::worker_count`].
pub const ENV_WORKER_COUNT: &str = "PWS_WORKER_COUNT";

const DEFAULT_MEMORY_PER_ITEM: i64 = 64 * 1024 * 1024;
const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;
const DEFAULT_DESTROY_STALL_WARN_MS: u64 = 5_000;

/// Memory figures read by the memory-bounded policy at every admission
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBudget {
    /// Cap on total estimated in-flight memory; `<= 0` disables the cap.
    pub hard_memory_cap_bytes: i64,
    /// Estimate used for items that report unknown memory.
    pub memory_per_item_default_bytes: i64,
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self {
            hard_memory_cap_bytes: 0,
            memory_per_item_default_bytes: DEFAULT_MEMORY_PER_ITEM,
        }
    }
}

impl MemoryBudget {
    /// The hard cap, if one is configured.
    #[must_use]
    pub fn hard_cap(&self) -> Option<u64> {
        u64::try_from(self.hard_memory_cap_bytes).ok().filter(|&cap| cap > 0)
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cap on total estimated in-flight memory; `<= 0` disables the cap.
    pub hard_memory_cap_bytes: i64,
    /// Estimate used for items that report unknown memory.
    pub memory_per_item_default_bytes: i64,
    /// Static ceiling instead of "one per executor thread".
    pub max_concurrency_override: Option<i32>,
    /// Worker threads for the native pool; defaults to the number of CPUs.
    pub worker_count: Option<usize>,
    /// Worker thread stack size in bytes.
    pub thread_stack_size: usize,
    /// Period of the warning emitted while a wrapper waits on running work
    /// during shutdown.
    pub destroy_stall_warn_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let budget = MemoryBudget::default();
        Self {
            hard_memory_cap_bytes: budget.hard_memory_cap_bytes,
            memory_per_item_default_bytes: budget.memory_per_item_default_bytes,
            max_concurrency_override: None,
            worker_count: None,
            thread_stack_size: DEFAULT_STACK_SIZE,
            destroy_stall_warn_ms: DEFAULT_DESTROY_STALL_WARN_MS,
        }
    }
}

impl SchedulerConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hard memory cap.
    #[must_use]
    pub const fn with_hard_memory_cap(mut self, bytes: i64) -> Self {
        self.hard_memory_cap_bytes = bytes;
        self
    }

    /// Set the default per-item memory estimate.
    #[must_use]
    pub const fn with_memory_per_item_default(mut self, bytes: i64) -> Self {
        self.memory_per_item_default_bytes = bytes;
        self
    }

    /// Force a static concurrency ceiling.
    #[must_use]
    pub const fn with_max_concurrency(mut self, max: i32) -> Self {
        self.max_concurrency_override = Some(max);
        self
    }

    /// Set the number of native worker threads.
    #[must_use]
    pub const fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_concurrency_override {
            if max < -1 {
                return Err(format!("max_concurrency_override must be -1 or >= 0, got {max}"));
            }
        }
        if self.worker_count == Some(0) {
            return Err("worker_count must be greater than 0".into());
        }
        if self.thread_stack_size == 0 {
            return Err("thread_stack_size must be greater than 0".into());
        }
        if self.memory_per_item_default_bytes < 0 {
            return Err("memory_per_item_default_bytes must not be negative".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults overridden by `PWS_*` environment variables, after loading a
    /// `.env` file if one exists.
    ///
    /// # Errors
    ///
    /// Fails if a variable is set but does not parse, or if the resulting
    /// configuration is invalid.
    pub fn from_env() -> AppResult<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env file");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `PWS_*` keys.
    ///
    /// # Errors
    ///
    /// Fails if a value does not parse or the result is invalid.
    pub fn from_lookup(mut lookup: impl FnMut(&str) -> Option<String>) -> AppResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_HARD_MEMORY_CAP_BYTES) {
            cfg.hard_memory_cap_bytes = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_HARD_MEMORY_CAP_BYTES}={v}"))?;
        }
        if let Some(v) = lookup(ENV_MEMORY_PER_ITEM_DEFAULT_BYTES) {
            cfg.memory_per_item_default_bytes = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_MEMORY_PER_ITEM_DEFAULT_BYTES}={v}"))?;
        }
        if let Some(v) = lookup(ENV_MAX_CONCURRENCY) {
            cfg.max_concurrency_override = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("{ENV_MAX_CONCURRENCY}={v}"))?,
            );
        }
        if let Some(v) = lookup(ENV_WORKER_COUNT) {
            cfg.worker_count = Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("{ENV_WORKER_COUNT}={v}"))?,
            );
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Memory figures for the memory-bounded policy.
    #[must_use]
    pub const fn memory_budget(&self) -> MemoryBudget {
        MemoryBudget {
            hard_memory_cap_bytes: self.hard_memory_cap_bytes,
            memory_per_item_default_bytes: self.memory_per_item_default_bytes,
        }
    }

    /// Wrapper ceiling: the override, or `-1` for one per executor thread.
    #[must_use]
    pub fn static_max_concurrency(&self) -> i32 {
        self.max_concurrency_override.unwrap_or(-1)
    }

    /// Native worker thread count.
    #[must_use]
    pub fn resolved_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Destroy stall warning period.
    #[must_use]
    pub const fn destroy_stall_warning(&self) -> Duration {
        Duration::from_millis(self.destroy_stall_warn_ms)
    }
}
