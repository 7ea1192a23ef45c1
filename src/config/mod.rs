//! Configuration models for schedulers, worker pools and memory budgets.

pub mod scheduler;

pub use scheduler::{MemoryBudget, SchedulerConfig};
