//! Shared utilities.

pub mod memory_stats;
pub mod priority;
pub mod telemetry;

pub use memory_stats::{
    FixedMemoryStats, MemoryStatsProvider, SystemMemoryStats, DEFAULT_MEMORY_REFRESH_INTERVAL,
};
pub use priority::QueuedWorkPriority;
pub use telemetry::*;
