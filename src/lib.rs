//! # Prometheus Work Scheduler
//!
//! Priority-aware, memory-bounded, concurrency-limited admission control in
//! front of worker pools, plus the coordinator that drives per-asset-type
//! compilers in dependency order.
//!
//! ## Core Problem Solved
//!
//! Asset compilation (textures, meshes, shaders) produces bursts of expensive
//! background work with very different urgency and memory needs:
//!
//! - **Priority**: what the user is looking at must compile before the rest
//! - **Memory**: admitting everything at once can exhaust RAM on large assets
//! - **Cancellation**: work that became irrelevant should be pulled back before it starts
//! - **Ordering**: some compilers consume the output of others
//!
//! ## Key Features
//!
//! - **ThreadPoolWrapper**: a lock-protected admission layer with its own
//!   priority queue, pause/resume, retraction, priority remapping and
//!   preemption of lower-priority work that has not started
//! - **MemoryBoundedWrapper**: freezes admission while estimated in-flight
//!   memory would reach the available memory, always letting one item run
//! - **DynamicWrapper**: re-sorts pending buckets by runtime signals
//! - **WorkerPool**: native OS-thread executor with priority-aware queue and retraction
//! - **AssetCompilingCoordinator**: processes compiling managers in topological order
//! - **SchedulerRegistry**: init-on-first-use pools with explicit shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_work_scheduler::builders::WrapperBuilder;
//! use prometheus_work_scheduler::config::SchedulerConfig;
//! use prometheus_work_scheduler::core::FnWork;
//! use prometheus_work_scheduler::util::QueuedWorkPriority;
//!
//! let config = SchedulerConfig::from_env()?;
//! let (pool, wrapper) = WrapperBuilder::new("textures", config).build()?;
//!
//! let work = FnWork::new(|| compile_texture())
//!     .with_required_memory(256 * 1024 * 1024)
//!     .into_handle();
//! wrapper.add_work(Arc::clone(&work), QueuedWorkPriority::Normal);
//!
//! // No longer needed: pull it back if it has not started.
//! wrapper.retract(&work);
//!
//! wrapper.destroy();
//! pool.shutdown();
//! ```

/// Core scheduling abstractions: work, queues, wrappers, executors, coordinator.
pub mod core;
/// Configuration models for schedulers and memory budgets.
pub mod config;
/// Builders to construct scheduler components from configuration.
pub mod builders;
/// Runtime adapters and the process-wide registry.
pub mod runtime;
/// Shared utilities.
pub mod util;
