//! Memory-bounded admission.
//!
//! [`MemoryBoundedPolicy`] shrinks the wrapper ceiling while the estimated
//! memory of admitted work, plus the next candidate, would reach the memory
//! limit. It never goes below what is already running, and a lone item is
//! always admitted even if its estimate alone exceeds the limit.

use std::ops::Deref;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::{MemoryBudget, SchedulerConfig};
use crate::core::executor::UnderlyingExecutor;
use crate::core::work::{QueuedWork, WorkHandle};
use crate::core::wrapper::{AdmissionContext, AdmissionPolicy, ThreadPoolWrapper};
use crate::util::memory_stats::{MemoryStatsProvider, SystemMemoryStats};
use crate::util::priority::QueuedWorkPriority;

/// Admission policy that throttles on estimated in-flight memory.
pub struct MemoryBoundedPolicy {
    stats: Arc<dyn MemoryStatsProvider>,
    budget: RwLock<MemoryBudget>,
    in_flight_memory: AtomicI64,
}

impl MemoryBoundedPolicy {
    /// Create a policy reading live memory from `stats`.
    pub fn new(budget: MemoryBudget, stats: Arc<dyn MemoryStatsProvider>) -> Self {
        Self {
            stats,
            budget: RwLock::new(budget),
            in_flight_memory: AtomicI64::new(0),
        }
    }

    /// `min(hard cap if set, available physical, available virtual)`, from
    /// the provider's latest sample.
    pub fn memory_limit(&self) -> u64 {
        let physical = self.stats.available_physical();
        let virtual_ = self.stats.available_virtual();
        let os_limit = physical.min(virtual_);
        self.budget
            .read()
            .hard_cap()
            .map_or(os_limit, |cap| cap.min(os_limit))
    }

    /// The item's own estimate, or the configured default when it reports
    /// unknown.
    pub fn required_memory(&self, work: &dyn QueuedWork) -> i64 {
        let estimate = work.required_memory();
        if estimate < 0 {
            self.budget.read().memory_per_item_default_bytes
        } else {
            estimate
        }
    }

    /// Sum of the reservations of admitted, unfinished items.
    pub fn estimated_in_flight_memory(&self) -> i64 {
        self.in_flight_memory.load(Ordering::Acquire)
    }

    /// Current budget.
    pub fn budget(&self) -> MemoryBudget {
        *self.budget.read()
    }

    /// Replace the budget. Reservations already made are kept as they are.
    pub fn set_budget(&self, budget: MemoryBudget) {
        *self.budget.write() = budget;
    }
}

impl AdmissionPolicy for MemoryBoundedPolicy {
    fn max_concurrency(&self, cx: &AdmissionContext<'_>) -> i32 {
        let next = cx.next.map_or(0, |(work, _)| self.required_memory(&**work));
        let projected = self.estimated_in_flight_memory().saturating_add(next);
        if projected > 0 && cx.current > 0 {
            let limit = self.memory_limit();
            if u64::try_from(projected).unwrap_or(0) >= limit {
                debug!(
                    projected,
                    limit,
                    in_flight = cx.current,
                    "memory limit reached, freezing admission"
                );
                return cx.current;
            }
        }
        cx.configured_max
    }

    fn prepare_pass(&self) {
        self.stats.refresh();
    }

    fn on_scheduled(&self, work: &dyn QueuedWork) -> i64 {
        let reserved = self.required_memory(work);
        self.in_flight_memory.fetch_add(reserved, Ordering::AcqRel);
        reserved
    }

    fn on_unscheduled(&self, reserved: i64) {
        let previous = self.in_flight_memory.fetch_sub(reserved, Ordering::AcqRel);
        debug_assert!(
            previous >= reserved,
            "in-flight memory went negative: {previous} - {reserved}"
        );
    }
}

impl std::fmt::Debug for MemoryBoundedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBoundedPolicy")
            .field("budget", &self.budget())
            .field("in_flight_memory", &self.estimated_in_flight_memory())
            .finish_non_exhaustive()
    }
}

/// A [`ThreadPoolWrapper`] whose ceiling follows available memory.
///
/// Dereferences to the wrapped [`ThreadPoolWrapper`] for every queue and
/// admission operation.
#[derive(Debug)]
pub struct MemoryBoundedWrapper {
    inner: ThreadPoolWrapper<MemoryBoundedPolicy>,
}

impl MemoryBoundedWrapper {
    /// Wrap `executor`. `max_concurrency` is the static ceiling, `-1` for the
    /// executor's thread count.
    pub fn new(
        executor: Arc<dyn UnderlyingExecutor>,
        max_concurrency: i32,
        budget: MemoryBudget,
        stats: Arc<dyn MemoryStatsProvider>,
    ) -> Self {
        let policy = MemoryBoundedPolicy::new(budget, stats);
        Self {
            inner: ThreadPoolWrapper::with_policy(executor, max_concurrency, policy),
        }
    }

    /// Wrap `executor` using the configured ceiling, budget and stall
    /// warning, reading memory from the operating system.
    pub fn from_config(executor: Arc<dyn UnderlyingExecutor>, config: &SchedulerConfig) -> Self {
        let wrapper = Self::new(
            executor,
            config.static_max_concurrency(),
            config.memory_budget(),
            Arc::new(SystemMemoryStats::new()),
        );
        wrapper.set_destroy_stall_warning(config.destroy_stall_warning());
        wrapper
    }

    /// See [`MemoryBoundedPolicy::memory_limit`].
    pub fn memory_limit(&self) -> u64 {
        self.inner.policy().memory_limit()
    }

    /// See [`MemoryBoundedPolicy::required_memory`].
    pub fn required_memory(&self, work: &dyn QueuedWork) -> i64 {
        self.inner.policy().required_memory(work)
    }

    /// Estimated memory of admitted, unfinished items.
    pub fn estimated_in_flight_memory(&self) -> i64 {
        self.inner.policy().estimated_in_flight_memory()
    }

    /// Replace the budget and run a scheduling pass.
    pub fn set_memory_budget(&self, budget: MemoryBudget) {
        self.inner.policy().set_budget(budget);
        self.inner.schedule_pending();
    }

    /// Unwrap into the generic wrapper.
    pub fn into_inner(self) -> ThreadPoolWrapper<MemoryBoundedPolicy> {
        self.inner
    }
}

impl Deref for MemoryBoundedWrapper {
    type Target = ThreadPoolWrapper<MemoryBoundedPolicy>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl UnderlyingExecutor for MemoryBoundedWrapper {
    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        self.inner.add_work(work, priority);
    }

    fn retract(&self, work: &WorkHandle) -> bool {
        self.inner.retract(work)
    }

    fn num_threads(&self) -> usize {
        UnderlyingExecutor::num_threads(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::work::FnWork;
    use crate::util::memory_stats::FixedMemoryStats;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Holds submissions until the test runs them.
    #[derive(Default)]
    struct ManualExecutor {
        pending: Mutex<VecDeque<WorkHandle>>,
    }

    impl ManualExecutor {
        fn run_one(&self) -> bool {
            let next = self.pending.lock().pop_front();
            next.map(|w| w.do_work()).is_some()
        }

        fn run_all(&self) {
            while self.run_one() {}
        }

        fn len(&self) -> usize {
            self.pending.lock().len()
        }
    }

    impl UnderlyingExecutor for ManualExecutor {
        fn add_work(&self, work: WorkHandle, _priority: QueuedWorkPriority) {
            self.pending.lock().push_back(work);
        }

        fn num_threads(&self) -> usize {
            8
        }
    }

    fn sized(bytes: i64) -> WorkHandle {
        FnWork::new(|| {}).with_required_memory(bytes).into_handle()
    }

    fn wrapper(
        stats: &Arc<FixedMemoryStats>,
        budget: MemoryBudget,
    ) -> (Arc<ManualExecutor>, MemoryBoundedWrapper) {
        let exec = Arc::new(ManualExecutor::default());
        let stats: Arc<dyn MemoryStatsProvider> = Arc::clone(stats) as Arc<dyn MemoryStatsProvider>;
        let wrapper = MemoryBoundedWrapper::new(
            Arc::clone(&exec) as Arc<dyn UnderlyingExecutor>,
            4,
            budget,
            stats,
        );
        (exec, wrapper)
    }

    #[test]
    fn test_memory_limit_is_minimum() {
        let stats = Arc::new(FixedMemoryStats::new(1_000, 800));
        let (_exec, w) = wrapper(&stats, MemoryBudget::default());
        assert_eq!(w.memory_limit(), 800);

        w.set_memory_budget(MemoryBudget {
            hard_memory_cap_bytes: 500,
            ..MemoryBudget::default()
        });
        assert_eq!(w.memory_limit(), 500);

        stats.set_physical(100);
        assert_eq!(w.memory_limit(), 100);
    }

    #[test]
    fn test_unknown_estimate_uses_default() {
        let stats = Arc::new(FixedMemoryStats::unbounded());
        let budget = MemoryBudget {
            hard_memory_cap_bytes: 0,
            memory_per_item_default_bytes: 42,
        };
        let (_exec, w) = wrapper(&stats, budget);
        assert_eq!(w.required_memory(&*FnWork::new(|| {}).into_handle()), 42);
        assert_eq!(w.required_memory(&*sized(7)), 7);
    }

    #[test]
    fn test_single_oversized_item_still_runs() {
        let stats = Arc::new(FixedMemoryStats::new(100, 100));
        let (exec, w) = wrapper(&stats, MemoryBudget::default());

        w.add_work(sized(10_000), QueuedWorkPriority::Normal);
        assert_eq!(w.current_concurrency(), 1);
        assert_eq!(exec.len(), 1);
        assert_eq!(w.estimated_in_flight_memory(), 10_000);

        exec.run_all();
        assert_eq!(w.current_concurrency(), 0);
        assert_eq!(w.estimated_in_flight_memory(), 0);
    }

    #[test]
    fn test_freezes_at_current_concurrency() {
        let stats = Arc::new(FixedMemoryStats::new(250, 250));
        let (exec, w) = wrapper(&stats, MemoryBudget::default());

        for _ in 0..4 {
            w.add_work(sized(100), QueuedWorkPriority::Normal);
        }
        // 100 + 100 fits, a third would reach 300 >= 250.
        assert_eq!(w.current_concurrency(), 2);
        assert_eq!(w.num_queued(), 2);
        assert_eq!(w.max_concurrency(), 2);

        exec.run_one();
        assert_eq!(w.current_concurrency(), 2);
        assert_eq!(w.num_queued(), 1);

        exec.run_all();
        assert_eq!(w.current_concurrency(), 0);
        assert_eq!(w.num_queued(), 0);
        assert_eq!(w.estimated_in_flight_memory(), 0);
    }

    #[test]
    fn test_raising_budget_admits_more() {
        let stats = Arc::new(FixedMemoryStats::unbounded());
        let budget = MemoryBudget {
            hard_memory_cap_bytes: 150,
            memory_per_item_default_bytes: 0,
        };
        let (exec, w) = wrapper(&stats, budget);
        for _ in 0..3 {
            w.add_work(sized(100), QueuedWorkPriority::Normal);
        }
        assert_eq!(w.current_concurrency(), 1);

        w.set_memory_budget(MemoryBudget {
            hard_memory_cap_bytes: 1_000,
            memory_per_item_default_bytes: 0,
        });
        assert_eq!(w.current_concurrency(), 3);
        exec.run_all();
        assert_eq!(w.estimated_in_flight_memory(), 0);
    }

    #[test]
    fn test_blocking_ignores_memory_freeze() {
        let stats = Arc::new(FixedMemoryStats::new(150, 150));
        let (exec, w) = wrapper(&stats, MemoryBudget::default());
        w.add_work(sized(100), QueuedWorkPriority::Normal);
        w.add_work(sized(100), QueuedWorkPriority::Normal);
        assert_eq!(w.current_concurrency(), 1);

        w.add_work(sized(100), QueuedWorkPriority::Blocking);
        assert_eq!(w.current_concurrency(), 2);
        assert_eq!(w.num_queued(), 1);
        exec.run_all();
        assert_eq!(w.estimated_in_flight_memory(), 0);
    }

    /// Fixed figures that count how often they were refreshed.
    #[derive(Default)]
    struct RefreshCounting {
        refreshes: std::sync::atomic::AtomicUsize,
    }

    impl MemoryStatsProvider for RefreshCounting {
        fn available_physical(&self) -> u64 {
            u64::MAX
        }

        fn available_virtual(&self) -> u64 {
            u64::MAX
        }

        fn refresh(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_each_pass_refreshes_memory_stats() {
        let stats = Arc::new(RefreshCounting::default());
        let exec = Arc::new(ManualExecutor::default());
        let w = MemoryBoundedWrapper::new(
            Arc::clone(&exec) as Arc<dyn UnderlyingExecutor>,
            4,
            MemoryBudget::default(),
            Arc::clone(&stats) as Arc<dyn MemoryStatsProvider>,
        );

        w.add_work(sized(10), QueuedWorkPriority::Normal);
        assert_eq!(stats.refreshes.load(Ordering::SeqCst), 1);

        // Completion runs a pass of its own.
        exec.run_all();
        assert_eq!(stats.refreshes.load(Ordering::SeqCst), 2);

        // Reading the limit uses the cached figures.
        let _ = w.memory_limit();
        assert_eq!(stats.refreshes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_retract_releases_reservation() {
        let stats = Arc::new(FixedMemoryStats::unbounded());
        let (exec, w) = wrapper(&stats, MemoryBudget::default());
        let work = sized(64);
        w.add_work(Arc::clone(&work), QueuedWorkPriority::Normal);
        assert_eq!(w.estimated_in_flight_memory(), 64);

        assert!(w.retract(&work));
        assert_eq!(w.estimated_in_flight_memory(), 0);
        assert_eq!(w.current_concurrency(), 0);
        // The stale proxy is inert.
        exec.run_all();
        assert_eq!(w.stats().completed, 0);
    }
}
