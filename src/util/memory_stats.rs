//! Live system memory statistics used by memory-bounded admission.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sysinfo::System;

/// Default minimum age of a [`SystemMemoryStats`] sample before it is re-read.
pub const DEFAULT_MEMORY_REFRESH_INTERVAL: Duration = Duration::from_millis(100);

/// Source of available-memory figures.
///
/// The getters are called under the wrapper lock at every admission decision
/// and must be cheap. Anything slow belongs in [`refresh`](Self::refresh),
/// which runs before the lock is taken.
pub trait MemoryStatsProvider: Send + Sync {
    /// Physical memory currently available to new allocations, in bytes.
    fn available_physical(&self) -> u64;

    /// Virtual memory (physical plus swap) currently available, in bytes.
    fn available_virtual(&self) -> u64;

    /// Bring cached figures up to date.
    fn refresh(&self) {}
}

struct Sampler {
    system: System,
    sampled_at: Instant,
}

/// Reads the operating system's memory counters through `sysinfo`.
///
/// Physical memory is the OS "available" figure and virtual memory adds free
/// swap to it. The figures are cached and re-read by [`refresh`] at most once
/// per refresh interval. On targets `sysinfo` does not support, memory is
/// reported as unbounded so that the configured hard cap still applies.
///
/// [`refresh`]: MemoryStatsProvider::refresh
pub struct SystemMemoryStats {
    sampler: Mutex<Sampler>,
    refresh_interval: Duration,
    physical: AtomicU64,
    virtual_: AtomicU64,
}

impl SystemMemoryStats {
    /// Sample the OS once and cache the figures.
    #[must_use]
    pub fn new() -> Self {
        Self::with_refresh_interval(DEFAULT_MEMORY_REFRESH_INTERVAL)
    }

    /// Like [`new`](Self::new) with a custom minimum sample age.
    #[must_use]
    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        let stats = Self {
            sampler: Mutex::new(Sampler {
                system: System::new(),
                sampled_at: Instant::now(),
            }),
            refresh_interval,
            physical: AtomicU64::new(u64::MAX),
            virtual_: AtomicU64::new(u64::MAX),
        };
        stats.sample(&mut stats.sampler.lock());
        stats
    }

    fn sample(&self, sampler: &mut Sampler) {
        sampler.sampled_at = Instant::now();
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        sampler.system.refresh_memory();
        let physical = sampler.system.available_memory();
        let virtual_ = physical.saturating_add(sampler.system.free_swap());
        self.physical.store(physical, Ordering::Relaxed);
        self.virtual_.store(virtual_, Ordering::Relaxed);
        tracing::trace!(physical, virtual_, "sampled system memory");
    }
}

impl Default for SystemMemoryStats {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStatsProvider for SystemMemoryStats {
    fn available_physical(&self) -> u64 {
        self.physical.load(Ordering::Relaxed)
    }

    fn available_virtual(&self) -> u64 {
        self.virtual_.load(Ordering::Relaxed)
    }

    fn refresh(&self) {
        // Another thread sampling right now is as good as sampling here.
        let Some(mut sampler) = self.sampler.try_lock() else {
            return;
        };
        if sampler.sampled_at.elapsed() >= self.refresh_interval {
            self.sample(&mut sampler);
        }
    }
}

impl fmt::Debug for SystemMemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemMemoryStats")
            .field("available_physical", &self.available_physical())
            .field("available_virtual", &self.available_virtual())
            .field("refresh_interval", &self.refresh_interval)
            .finish()
    }
}

/// Settable memory figures, for embedding hosts that track memory themselves
/// and for tests.
#[derive(Debug)]
pub struct FixedMemoryStats {
    physical: AtomicU64,
    virtual_: AtomicU64,
}

impl FixedMemoryStats {
    /// Create with the given available physical and virtual bytes.
    #[must_use]
    pub const fn new(physical: u64, virtual_: u64) -> Self {
        Self {
            physical: AtomicU64::new(physical),
            virtual_: AtomicU64::new(virtual_),
        }
    }

    /// Report unbounded memory.
    #[must_use]
    pub const fn unbounded() -> Self {
        Self::new(u64::MAX, u64::MAX)
    }

    /// Update available physical memory.
    pub fn set_physical(&self, bytes: u64) {
        self.physical.store(bytes, Ordering::Relaxed);
    }

    /// Update available virtual memory.
    pub fn set_virtual(&self, bytes: u64) {
        self.virtual_.store(bytes, Ordering::Relaxed);
    }
}

impl MemoryStatsProvider for FixedMemoryStats {
    fn available_physical(&self) -> u64 {
        self.physical.load(Ordering::Relaxed)
    }

    fn available_virtual(&self) -> u64 {
        self.virtual_.load(Ordering::Relaxed)
    }
}
