//! Priority-aware admission control in front of an underlying executor.
//!
//! A [`ThreadPoolWrapper`] is not a thread pool. It keeps its own
//! [`PriorityWorkQueue`] and decides how many items may be in flight on the
//! wrapped executor at once, in which order, and at which remapped priority.
//!
//! Every mutation of the queue, the in-flight map and the concurrency counters
//! happens under one `RwLock`. Calls into the executor are made after the lock
//! is released, so executors may run work inline.
//!
//! # Scheduling pass
//!
//! Run after every enqueue, completion, retraction, pause/resume and ceiling
//! change:
//!
//! 1. A finished record releases its slot and its reservation first.
//! 2. If the next pending item is held back only by the ceiling, one
//!    lower-priority record that has not started yet is retracted and put
//!    back at the front of its own bucket.
//! 3. Items are admitted while there is headroom and the pause budget allows
//!    it. `Blocking` items bypass both.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_work_scheduler::core::{FnWork, ThreadPoolWrapper, WorkerPool};
//! use prometheus_work_scheduler::config::SchedulerConfig;
//! use prometheus_work_scheduler::util::QueuedWorkPriority;
//!
//! let pool = Arc::new(WorkerPool::new(&SchedulerConfig::default())?);
//! let wrapper = ThreadPoolWrapper::new(pool, 2);
//! wrapper.add_work(FnWork::new(|| build_texture()).into_handle(), QueuedWorkPriority::Normal);
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::core::executor::UnderlyingExecutor;
use crate::core::priority_queue::PriorityWorkQueue;
use crate::core::scheduled_work::{Admission, RecordOwner, RecordPool, ScheduledWork};
use crate::core::work::{QueuedWork, WorkHandle, WorkId};
use crate::util::priority::QueuedWorkPriority;

/// Default period between warnings while `destroy` waits on running work.
pub const DEFAULT_DESTROY_STALL_WARNING: Duration = Duration::from_secs(5);

/// Remaps the priority an admitted item is submitted to the executor with.
///
/// Called under the wrapper lock from any thread; implementations must be
/// pure or synchronize internally. Never applied to `Blocking` items.
pub trait PriorityMapper: Send + Sync {
    /// Executor priority for an item queued at `priority`.
    fn map(&self, priority: QueuedWorkPriority) -> QueuedWorkPriority;
}

impl<F> PriorityMapper for F
where
    F: Fn(QueuedWorkPriority) -> QueuedWorkPriority + Send + Sync,
{
    fn map(&self, priority: QueuedWorkPriority) -> QueuedWorkPriority {
        self(priority)
    }
}

/// What an admission policy sees when computing the ceiling.
#[derive(Clone, Copy)]
pub struct AdmissionContext<'a> {
    /// Statically configured ceiling, with `-1` already resolved to the
    /// executor's thread count.
    pub configured_max: i32,
    /// Items currently admitted and not finished.
    pub current: i32,
    /// Next item the pass would admit.
    pub next: Option<(&'a WorkHandle, QueuedWorkPriority)>,
}

impl fmt::Debug for AdmissionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionContext")
            .field("configured_max", &self.configured_max)
            .field("current", &self.current)
            .field("next_priority", &self.next.map(|(_, p)| p))
            .finish()
    }
}

/// Overridable parts of the admission algorithm.
///
/// All methods are called with the wrapper lock held, so a reservation made
/// in `on_scheduled` is always balanced by exactly one `on_unscheduled`.
pub trait AdmissionPolicy: Send + Sync + 'static {
    /// Called before the wrapper lock is taken for a scheduling pass. Slow
    /// reads (OS counters and the like) belong here, not in `max_concurrency`.
    fn prepare_pass(&self) {}

    /// Ceiling for the current pass.
    fn max_concurrency(&self, cx: &AdmissionContext<'_>) -> i32 {
        cx.configured_max
    }

    /// An item was admitted; returns the amount reserved for it.
    fn on_scheduled(&self, _work: &dyn QueuedWork) -> i64 {
        0
    }

    /// An admitted item left the in-flight set; `reserved` is what
    /// `on_scheduled` returned for it.
    fn on_unscheduled(&self, _reserved: i64) {}
}

/// Fixed ceiling, no reservations.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticConcurrency;

impl AdmissionPolicy for StaticConcurrency {}

/// Snapshot of wrapper state and lifetime counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrapperStats {
    /// Items waiting in the wrapper queue.
    pub queued: usize,
    /// Admitted items not yet finished.
    pub in_flight: usize,
    /// Resolved ceiling at snapshot time.
    pub max_concurrency: i32,
    /// Remaining pause budget, `-1` when unlimited.
    pub max_task_to_schedule: i64,
    /// Items accepted by `add_work`.
    pub submitted: u64,
    /// Admissions to the executor, including re-admissions.
    pub admitted: u64,
    /// Items the executor ran to completion.
    pub completed: u64,
    /// Items abandoned by the executor or by `destroy`.
    pub abandoned: u64,
    /// Items pulled back by `retract`.
    pub retracted: u64,
    /// Lower-priority items pulled back to make room.
    pub preempted: u64,
    /// Stall warnings emitted while `destroy` waited.
    pub destroy_stalls: u64,
    /// Records waiting in the free list.
    pub pooled_records: usize,
}

#[derive(Debug, Default)]
struct WrapperCounters {
    submitted: AtomicU64,
    admitted: AtomicU64,
    completed: AtomicU64,
    abandoned: AtomicU64,
    retracted: AtomicU64,
    preempted: AtomicU64,
    destroy_stalls: AtomicU64,
}

impl WrapperCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn fill(&self, stats: &mut WrapperStats) {
        stats.submitted = self.submitted.load(Ordering::Relaxed);
        stats.admitted = self.admitted.load(Ordering::Relaxed);
        stats.completed = self.completed.load(Ordering::Relaxed);
        stats.abandoned = self.abandoned.load(Ordering::Relaxed);
        stats.retracted = self.retracted.load(Ordering::Relaxed);
        stats.preempted = self.preempted.load(Ordering::Relaxed);
        stats.destroy_stalls = self.destroy_stalls.load(Ordering::Relaxed);
    }
}

struct WrapperState {
    queue: PriorityWorkQueue,
    in_flight: HashMap<WorkId, Arc<ScheduledWork>>,
    records: RecordPool,
    max_concurrency: i32,
    current_concurrency: i32,
    max_task_to_schedule: i64,
    next_sequence: u64,
    mapper: Arc<dyn PriorityMapper>,
    destroy_stall_warning: Duration,
    destroyed: bool,
    /// Plans waiting for the thread currently draining.
    deferred: VecDeque<Plan>,
    /// Some thread is inside `execute`.
    draining: bool,
}

/// Executor calls to make once the lock is released.
#[derive(Default)]
struct Plan {
    retract: Vec<WorkHandle>,
    submit: Vec<(WorkHandle, QueuedWorkPriority)>,
}

impl Plan {
    fn is_empty(&self) -> bool {
        self.retract.is_empty() && self.submit.is_empty()
    }
}

/// Clears the draining flag if an executor call unwinds. Plans still
/// deferred are picked up by the next thread that drains.
struct DrainGuard<'a> {
    state: &'a RwLock<WrapperState>,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.state.write().draining = false;
        }
    }
}

struct Inner<A: AdmissionPolicy> {
    state: RwLock<WrapperState>,
    executor: Arc<dyn UnderlyingExecutor>,
    policy: A,
    counters: WrapperCounters,
    self_ref: Weak<Self>,
}

/// Admission-control layer in front of an [`UnderlyingExecutor`].
///
/// Dropping the wrapper destroys it.
pub struct ThreadPoolWrapper<A: AdmissionPolicy = StaticConcurrency> {
    inner: Arc<Inner<A>>,
}

impl ThreadPoolWrapper<StaticConcurrency> {
    /// Wrap `executor` with a fixed ceiling. `-1` uses the executor's
    /// thread count.
    pub fn new(executor: Arc<dyn UnderlyingExecutor>, max_concurrency: i32) -> Self {
        Self::with_policy(executor, max_concurrency, StaticConcurrency)
    }
}

impl<A: AdmissionPolicy> ThreadPoolWrapper<A> {
    /// Wrap `executor` with a custom admission policy.
    pub fn with_policy(executor: Arc<dyn UnderlyingExecutor>, max_concurrency: i32, policy: A) -> Self {
        let inner = Arc::new_cyclic(|self_ref| Inner {
            state: RwLock::new(WrapperState {
                queue: PriorityWorkQueue::new(),
                in_flight: HashMap::new(),
                records: RecordPool::default(),
                max_concurrency: max_concurrency.max(-1),
                current_concurrency: 0,
                max_task_to_schedule: -1,
                next_sequence: 0,
                mapper: Arc::new(|p: QueuedWorkPriority| p),
                destroy_stall_warning: DEFAULT_DESTROY_STALL_WARNING,
                destroyed: false,
                deferred: VecDeque::new(),
                draining: false,
            }),
            executor,
            policy,
            counters: WrapperCounters::default(),
            self_ref: self_ref.clone(),
        });
        Self { inner }
    }

    /// Builder-style [`set_priority_mapper`](Self::set_priority_mapper).
    #[must_use]
    pub fn with_priority_mapper(self, mapper: impl PriorityMapper + 'static) -> Self {
        self.set_priority_mapper(mapper);
        self
    }

    /// Replace the priority remapping used for subsequent admissions.
    pub fn set_priority_mapper(&self, mapper: impl PriorityMapper + 'static) {
        self.inner.write().mapper = Arc::new(mapper);
    }

    /// Period between warnings while `destroy` waits on running work.
    pub fn set_destroy_stall_warning(&self, period: Duration) {
        self.inner.write().destroy_stall_warning = period;
    }

    /// The admission policy.
    pub fn policy(&self) -> &A {
        &self.inner.policy
    }

    /// Queue `work` and run a scheduling pass. Never blocks on the executor.
    ///
    /// Work added after [`destroy`](Self::destroy) is abandoned immediately.
    pub fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        self.inner.add_work(work, priority);
    }

    /// Pull `work` back before it runs.
    ///
    /// Returns `true` if it was still queued, or admitted but not yet started.
    /// The wrapper then never calls `do_work` or `abandon` on it; running it is
    /// up to the caller again. Returns `false` if it already started or is
    /// unknown to this wrapper.
    pub fn retract(&self, work: &WorkHandle) -> bool {
        self.inner.retract(work)
    }

    /// Stop admitting new work. Admitted work keeps running.
    pub fn pause(&self) {
        self.inner.write().max_task_to_schedule = 0;
        info!("wrapper paused");
    }

    /// Allow `count` further admissions, or unlimited with `-1`, and run a
    /// scheduling pass.
    pub fn resume(&self, count: i64) {
        let mut plan = Plan::default();
        {
            let mut st = self.inner.pass_write();
            st.max_task_to_schedule = count.max(-1);
            info!(budget = st.max_task_to_schedule, "wrapper resumed");
            self.inner.plan_locked(&mut st, &mut plan);
        }
        self.inner.execute(plan);
    }

    /// Change the ceiling (`-1` uses the executor's thread count) and run a
    /// scheduling pass. Work already admitted over a lowered ceiling is left
    /// alone.
    pub fn set_max_concurrency(&self, max_concurrency: i32) {
        let mut plan = Plan::default();
        {
            let mut st = self.inner.pass_write();
            st.max_concurrency = max_concurrency.max(-1);
            info!(max_concurrency = st.max_concurrency, "wrapper ceiling changed");
            self.inner.plan_locked(&mut st, &mut plan);
        }
        self.inner.execute(plan);
    }

    /// Run a scheduling pass without any other state change, e.g. after
    /// something the admission policy reads has changed.
    pub fn schedule_pending(&self) {
        let mut plan = Plan::default();
        {
            let mut st = self.inner.pass_write();
            self.inner.plan_locked(&mut st, &mut plan);
        }
        self.inner.execute(plan);
    }

    /// Ceiling the next pass would use.
    pub fn max_concurrency(&self) -> i32 {
        let st = self.inner.read();
        self.inner.max_concurrency_locked(&st)
    }

    /// Admitted items not yet finished.
    pub fn current_concurrency(&self) -> i32 {
        self.inner.read().current_concurrency
    }

    /// Items waiting in the wrapper queue.
    pub fn num_queued(&self) -> usize {
        self.inner.read().queue.len()
    }

    /// Whether `destroy` has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.read().destroyed
    }

    /// State snapshot and lifetime counters.
    pub fn stats(&self) -> WrapperStats {
        let mut stats = {
            let st = self.inner.read();
            WrapperStats {
                queued: st.queue.len(),
                in_flight: st.in_flight.len(),
                max_concurrency: self.inner.max_concurrency_locked(&st),
                max_task_to_schedule: st.max_task_to_schedule,
                pooled_records: st.records.len(),
                ..WrapperStats::default()
            }
        };
        self.inner.counters.fill(&mut stats);
        stats
    }

    /// Run `f` on the pending queue under the wrapper lock.
    pub(crate) fn with_queue<R>(&self, f: impl FnOnce(&mut PriorityWorkQueue) -> R) -> R {
        f(&mut self.inner.write().queue)
    }

    /// Shut the wrapper down.
    ///
    /// Abandons everything still queued, retracts (and abandons) admitted work
    /// that has not started, then sleeps until running work finishes. This is
    /// the only blocking operation. Idempotent.
    ///
    /// Called from inside one of this wrapper's own running items (directly
    /// or by dropping the last handle), that item is not waited on.
    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl<A: AdmissionPolicy> Drop for ThreadPoolWrapper<A> {
    fn drop(&mut self) {
        self.inner.destroy();
    }
}

impl<A: AdmissionPolicy> UnderlyingExecutor for ThreadPoolWrapper<A> {
    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        Self::add_work(self, work, priority);
    }

    fn retract(&self, work: &WorkHandle) -> bool {
        Self::retract(self, work)
    }

    fn num_threads(&self) -> usize {
        usize::try_from(self.max_concurrency()).unwrap_or(0)
    }
}

impl<A: AdmissionPolicy> fmt::Debug for ThreadPoolWrapper<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolWrapper")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<A: AdmissionPolicy> Inner<A> {
    fn read(&self) -> RwLockReadGuard<'_, WrapperState> {
        self.state.read()
    }

    fn write(&self) -> RwLockWriteGuard<'_, WrapperState> {
        self.state.write()
    }

    /// Write lock for a scheduling pass.
    fn pass_write(&self) -> RwLockWriteGuard<'_, WrapperState> {
        self.policy.prepare_pass();
        self.state.write()
    }

    fn max_concurrency_locked(&self, st: &WrapperState) -> i32 {
        let configured = if st.max_concurrency < 0 {
            i32::try_from(self.executor.num_threads()).unwrap_or(i32::MAX)
        } else {
            st.max_concurrency
        };
        let cx = AdmissionContext {
            configured_max: configured,
            current: st.current_concurrency,
            next: st.queue.peek(),
        };
        self.policy.max_concurrency(&cx)
    }

    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        let mut plan = Plan::default();
        {
            let mut st = self.pass_write();
            if st.destroyed {
                drop(st);
                warn!(%priority, "work added to a destroyed wrapper, abandoning");
                work.abandon();
                WrapperCounters::bump(&self.counters.abandoned);
                return;
            }
            if st.in_flight.contains_key(&WorkId::of(&work)) {
                warn!(%priority, "work is already in flight, ignoring duplicate add");
                return;
            }
            debug_assert!(!st.queue.contains(&work), "work queued twice");
            st.queue.enqueue(work, priority);
            WrapperCounters::bump(&self.counters.submitted);
            self.plan_locked(&mut st, &mut plan);
        }
        self.execute(plan);
    }

    fn retract(&self, work: &WorkHandle) -> bool {
        let mut plan = Plan::default();
        let retracted = {
            let mut st = self.pass_write();
            let retracted = if st.queue.retract(work) {
                debug!("retracted queued work");
                true
            } else if let Some(record) = self.cancel_in_flight_locked(&mut st, WorkId::of(work)) {
                debug!(priority = %record.priority(), "retracted admitted work before it started");
                drop(record.take_inner());
                plan.retract.push(record as WorkHandle);
                true
            } else {
                false
            };
            if retracted {
                WrapperCounters::bump(&self.counters.retracted);
                self.plan_locked(&mut st, &mut plan);
            }
            retracted
        };
        self.execute(plan);
        retracted
    }

    /// Cancel the not-yet-started record for `id` and release its slot.
    fn cancel_in_flight_locked(
        &self,
        st: &mut WrapperState,
        id: WorkId,
    ) -> Option<Arc<ScheduledWork>> {
        let cancelled = st.in_flight.get(&id).is_some_and(|r| r.try_cancel());
        if !cancelled {
            return None;
        }
        let record = st.in_flight.remove(&id)?;
        self.release_locked(st, Arc::clone(&record));
        Some(record)
    }

    fn release_locked(&self, st: &mut WrapperState, record: Arc<ScheduledWork>) {
        self.policy.on_unscheduled(record.reserved_memory());
        st.current_concurrency -= 1;
        debug_assert!(st.current_concurrency >= 0, "concurrency underflow");
        st.records.release(record);
    }

    fn plan_locked(&self, st: &mut WrapperState, plan: &mut Plan) {
        if st.destroyed {
            return;
        }
        self.preempt_locked(st, plan);

        while let Some(priority) = st.queue.peek_priority() {
            if !priority.is_blocking() {
                if st.max_task_to_schedule == 0 {
                    break;
                }
                if st.current_concurrency >= self.max_concurrency_locked(st) {
                    break;
                }
            }
            let Some((work, priority)) = st.queue.dequeue() else {
                break;
            };
            self.admit_locked(st, work, priority, plan);
        }
    }

    fn admit_locked(
        &self,
        st: &mut WrapperState,
        work: WorkHandle,
        priority: QueuedWorkPriority,
        plan: &mut Plan,
    ) {
        let reserved_memory = self.policy.on_scheduled(&*work);
        st.current_concurrency += 1;
        if st.max_task_to_schedule > 0 {
            st.max_task_to_schedule -= 1;
        }
        st.next_sequence += 1;

        let id = WorkId::of(&work);
        let owner: Weak<dyn RecordOwner> = self.self_ref.clone();
        let record = st.records.acquire(Admission {
            work,
            priority,
            reserved_memory,
            sequence: st.next_sequence,
            owner,
        });
        let mapped = if priority.is_blocking() {
            priority
        } else {
            st.mapper.map(priority)
        };
        debug!(
            %priority,
            %mapped,
            in_flight = st.current_concurrency,
            reserved_memory,
            "admitting work"
        );
        st.in_flight.insert(id, Arc::clone(&record));
        WrapperCounters::bump(&self.counters.admitted);
        plan.submit.push((record as WorkHandle, mapped));
    }

    /// Make room for the next item by retracting one less important record
    /// that has not started, if the ceiling is the only obstacle.
    fn preempt_locked(&self, st: &mut WrapperState, plan: &mut Plan) {
        let Some(next) = st.queue.peek_priority() else {
            return;
        };
        if next.is_blocking() || st.max_task_to_schedule == 0 {
            return;
        }
        if st.current_concurrency < self.max_concurrency_locked(st) {
            return;
        }

        let mut candidates: Vec<(QueuedWorkPriority, u64, WorkId)> = st
            .in_flight
            .iter()
            .filter(|(_, r)| r.priority().is_lower_than(next) && r.is_pending())
            .map(|(id, r)| (r.priority(), r.sequence(), *id))
            .collect();
        // Least important first, most recently admitted first within a level.
        candidates.sort_unstable_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));

        for (priority, _, id) in candidates {
            let Some(record) = self.cancel_in_flight_locked(st, id) else {
                continue;
            };
            if let Some(inner) = record.take_inner() {
                debug!(%priority, %next, "preempting lower priority work");
                st.queue.enqueue_front(inner, priority);
            }
            plan.retract.push(record as WorkHandle);
            WrapperCounters::bump(&self.counters.preempted);
            return;
        }
    }

    /// Make the executor calls of `plan`.
    ///
    /// One thread drains at a time. A pass that finishes while another one is
    /// draining, including a completion nested inside an inline executor's
    /// `add_work`, hands its plan to the draining thread instead of recursing.
    /// Plans are executed in the order they were built.
    fn execute(&self, plan: Plan) {
        if plan.is_empty() {
            return;
        }
        {
            let mut st = self.write();
            st.deferred.push_back(plan);
            if st.draining {
                return;
            }
            st.draining = true;
        }

        let _guard = DrainGuard { state: &self.state };
        loop {
            let plan = {
                let mut st = self.write();
                match st.deferred.pop_front() {
                    Some(plan) => plan,
                    None => {
                        st.draining = false;
                        return;
                    }
                }
            };
            for proxy in plan.retract {
                self.executor.retract(&proxy);
            }
            for (proxy, priority) in plan.submit {
                self.executor.add_work(proxy, priority);
            }
        }
    }

    fn destroy(&self) {
        let (queued, cancelled, stall_period) = {
            let mut st = self.write();
            if st.destroyed {
                return;
            }
            st.destroyed = true;
            st.max_task_to_schedule = 0;
            let queued = st.queue.drain();
            let ids: Vec<WorkId> = st.in_flight.keys().copied().collect();
            let cancelled: Vec<Arc<ScheduledWork>> = ids
                .into_iter()
                .filter_map(|id| self.cancel_in_flight_locked(&mut st, id))
                .collect();
            info!(
                queued = queued.len(),
                retracted = cancelled.len(),
                running = st.in_flight.len(),
                "destroying wrapper"
            );
            (queued, cancelled, st.destroy_stall_warning)
        };

        for (work, _) in queued {
            work.abandon();
            WrapperCounters::bump(&self.counters.abandoned);
        }
        for record in cancelled {
            if let Some(work) = record.take_inner() {
                work.abandon();
            }
            self.executor.retract(&(record as WorkHandle));
            WrapperCounters::bump(&self.counters.abandoned);
        }

        // Work running on this thread is what called us; it finishes after we return.
        let current = std::thread::current().id();
        let mut own_reported = false;
        let mut last_warning = Instant::now();
        loop {
            let (running, own) = {
                let st = self.read();
                let own = st.in_flight.values().filter(|r| r.is_running_on(current)).count();
                (st.in_flight.len() - own, own)
            };
            if own > 0 && !own_reported {
                warn!(own, "wrapper destroyed from its own running work, not waiting on it");
                own_reported = true;
            }
            if running == 0 {
                break;
            }
            if last_warning.elapsed() >= stall_period {
                warn!(running, "wrapper destroy waiting on running work");
                WrapperCounters::bump(&self.counters.destroy_stalls);
                last_warning = Instant::now();
            }
            std::thread::sleep(Duration::from_millis(1));
        }

        self.write().records.clear();
        info!("wrapper destroyed");
    }
}

impl<A: AdmissionPolicy> RecordOwner for Inner<A> {
    fn on_record_finished(&self, id: WorkId, sequence: u64, abandoned: bool) {
        let mut plan = Plan::default();
        {
            let mut st = self.pass_write();
            let current = st.in_flight.get(&id).is_some_and(|r| r.sequence() == sequence);
            if !current {
                debug!(sequence, "ignoring completion of a record no longer in flight");
                return;
            }
            if let Some(record) = st.in_flight.remove(&id) {
                if abandoned {
                    WrapperCounters::bump(&self.counters.abandoned);
                } else {
                    WrapperCounters::bump(&self.counters.completed);
                }
                self.release_locked(&mut st, record);
            }
            self.plan_locked(&mut st, &mut plan);
        }
        self.execute(plan);
    }
}
