//! Tests for runtime adapters and the scheduler registry

use std::sync::Arc;

use prometheus_work_scheduler::config::SchedulerConfig;
use prometheus_work_scheduler::core::{
    AssetCompilingManager, FnWork, ManagerHandle, ProcessContext, SchedulerError,
};
use prometheus_work_scheduler::runtime::registry::DEFAULT_POOL;
use prometheus_work_scheduler::runtime::SchedulerRegistry;
use prometheus_work_scheduler::util::{FixedMemoryStats, QueuedWorkPriority};

#[cfg(feature = "tokio-runtime")]
mod tokio_executor {
    use super::*;
    use prometheus_work_scheduler::core::{ThreadPoolWrapper, UnderlyingExecutor};
    use prometheus_work_scheduler::runtime::TokioBlockingExecutor;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_tokio_executor_runs_work() {
        let executor = TokioBlockingExecutor::current(&SchedulerConfig::new().with_worker_count(3))
            .expect("inside a runtime");
        assert_eq!(executor.num_threads(), 3);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..5 {
            let tx = tx.clone();
            let work = FnWork::new(move || {
                tx.send(i).unwrap();
            })
            .into_handle();
            executor.add_work(work, QueuedWorkPriority::Normal);
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_wrapper_over_tokio_executor() {
        let executor = Arc::new(TokioBlockingExecutor::new(tokio::runtime::Handle::current(), 2));
        let wrapper = ThreadPoolWrapper::new(executor as Arc<dyn UnderlyingExecutor>, 1);
        assert!(!UnderlyingExecutor::retract(
            &TokioBlockingExecutor::new(tokio::runtime::Handle::current(), 1),
            &FnWork::new(|| {}).into_handle(),
        ));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for i in 0..4 {
            let tx = tx.clone();
            let work = FnWork::new(move || {
                tx.send(i).unwrap();
            })
            .into_handle();
            wrapper.add_work(work, QueuedWorkPriority::Normal);
        }
        drop(tx);

        // Ceiling 1 serializes execution, so FIFO order is kept.
        let mut seen = Vec::new();
        while let Some(i) = rx.recv().await {
            seen.push(i);
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
        assert_eq!(wrapper.stats().completed, 4);
    }

    #[test]
    fn test_current_outside_runtime_fails() {
        assert!(matches!(
            TokioBlockingExecutor::current(&SchedulerConfig::default()),
            Err(SchedulerError::Config(_))
        ));
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

fn registry() -> SchedulerRegistry {
    SchedulerRegistry::with_memory_stats(
        SchedulerConfig::new().with_worker_count(2),
        Arc::new(FixedMemoryStats::unbounded()),
    )
}

struct CountingManager {
    shut_down: std::sync::atomic::AtomicUsize,
}

impl AssetCompilingManager for CountingManager {
    fn asset_type_name(&self) -> &str {
        "texture"
    }

    fn num_remaining_assets(&self) -> usize {
        0
    }

    fn process_async_tasks(&self, _cx: &ProcessContext<'_>) {}

    fn finish_all_compilation(&self) {}

    fn shutdown(&self) {
        self.shut_down
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}

#[test]
fn test_registry_runs_work_on_default_pool() {
    let reg = registry();
    let pool = reg.memory_bounded_pool().unwrap();
    assert_eq!(reg.wrapper_names(), vec![DEFAULT_POOL]);

    let (tx, rx) = crossbeam_channel::unbounded();
    let work = FnWork::new(move || {
        tx.send(()).unwrap();
    })
    .into_handle();
    pool.add_work(work, QueuedWorkPriority::High);
    rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();

    reg.shutdown();
    assert!(reg.is_shut_down());
    assert!(reg.worker_pool().is_err());
}

#[test]
fn test_registry_shutdown_reaches_managers() {
    let reg = registry();
    let manager = Arc::new(CountingManager {
        shut_down: std::sync::atomic::AtomicUsize::new(0),
    });
    reg.coordinator()
        .register_manager(Arc::clone(&manager) as ManagerHandle);

    drop(reg);
    assert_eq!(
        manager.shut_down.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
}

#[test]
fn test_registry_invalid_config_surfaces_error() {
    let reg = SchedulerRegistry::with_memory_stats(
        SchedulerConfig::new().with_thread_stack_size(0),
        Arc::new(FixedMemoryStats::unbounded()),
    );
    assert!(matches!(
        reg.memory_bounded_pool(),
        Err(SchedulerError::InvalidConfig(_))
    ));
}
