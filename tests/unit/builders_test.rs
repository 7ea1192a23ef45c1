//! Tests for builders

use std::sync::Arc;

use prometheus_work_scheduler::builders::{build_memory_bounded_wrapper, WrapperBuilder};
use prometheus_work_scheduler::config::SchedulerConfig;
use prometheus_work_scheduler::core::{SchedulerError, UnderlyingExecutor, WorkHandle};
use prometheus_work_scheduler::util::{FixedMemoryStats, QueuedWorkPriority};

/// Records submitted priorities and drops the work.
#[derive(Default)]
struct Sink {
    priorities: parking_lot::Mutex<Vec<QueuedWorkPriority>>,
}

impl UnderlyingExecutor for Sink {
    fn add_work(&self, _work: WorkHandle, priority: QueuedWorkPriority) {
        self.priorities.lock().push(priority);
    }

    fn num_threads(&self) -> usize {
        4
    }
}

#[test]
fn test_builder_defaults() {
    let builder = WrapperBuilder::new("meshes", SchedulerConfig::default());
    assert_eq!(builder.name(), "meshes");
    assert_eq!(builder.config(), &SchedulerConfig::default());
}

#[test]
fn test_build_over_applies_config() {
    let sink = Arc::new(Sink::default());
    let config = SchedulerConfig::new()
        .with_max_concurrency(2)
        .with_hard_memory_cap(512 * 1024 * 1024);
    let wrapper = WrapperBuilder::new("textures", config)
        .with_memory_stats(Arc::new(FixedMemoryStats::unbounded()))
        .build_over(Arc::clone(&sink) as Arc<dyn UnderlyingExecutor>)
        .unwrap();

    assert_eq!(wrapper.max_concurrency(), 2);
    assert_eq!(wrapper.memory_limit(), 512 * 1024 * 1024);
    wrapper.pause();
    wrapper.destroy();
}

#[test]
fn test_build_over_unlimited_uses_executor_threads() {
    let sink = Arc::new(Sink::default());
    let wrapper = WrapperBuilder::new("shaders", SchedulerConfig::default())
        .with_memory_stats(Arc::new(FixedMemoryStats::unbounded()))
        .build_over(Arc::clone(&sink) as Arc<dyn UnderlyingExecutor>)
        .unwrap();
    assert_eq!(wrapper.max_concurrency(), 4);
}

#[test]
fn test_builder_priority_mapper() {
    let sink = Arc::new(Sink::default());
    let wrapper = WrapperBuilder::new("audio", SchedulerConfig::default())
        .with_memory_stats(Arc::new(FixedMemoryStats::unbounded()))
        .with_priority_mapper(|_| QueuedWorkPriority::Low)
        .build_over(Arc::clone(&sink) as Arc<dyn UnderlyingExecutor>)
        .unwrap();

    let work = prometheus_work_scheduler::core::FnWork::new(|| {}).into_handle();
    wrapper.add_work(work, QueuedWorkPriority::Highest);
    assert_eq!(*sink.priorities.lock(), vec![QueuedWorkPriority::Low]);
    // The sink never runs the record, so destroy cancels it.
    wrapper.destroy();
}

#[test]
fn test_invalid_config_rejected() {
    let sink = Arc::new(Sink::default());
    let result = WrapperBuilder::new("bad", SchedulerConfig::new().with_max_concurrency(-3))
        .build_over(sink as Arc<dyn UnderlyingExecutor>);
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));

    assert!(matches!(
        build_memory_bounded_wrapper(&SchedulerConfig::new().with_worker_count(0)),
        Err(SchedulerError::InvalidConfig(_))
    ));
}

#[test]
fn test_build_spawns_pool() {
    let (pool, wrapper) =
        build_memory_bounded_wrapper(&SchedulerConfig::new().with_worker_count(2)).unwrap();
    assert_eq!(pool.num_threads(), 2);
    assert_eq!(wrapper.max_concurrency(), 2);
    wrapper.destroy();
    pool.shutdown();
}
