//! In-flight work records.
//!
//! A record is the proxy a wrapper submits to its underlying executor in place
//! of the caller's item. Each record carries a one-way state machine:
//!
//! ```text
//! Pending --try_start--> Running --complete--> Completed
//!    \
//!     `--try_cancel--> Cancelled
//! ```
//!
//! Whoever wins the transition out of `Pending` decides the item's fate: the
//! executor thread runs (or abandons) it, or the wrapper retracts it. A
//! cancelled record is inert if the executor later invokes it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::core::work::{QueuedWork, QueuedWorkFlags, WorkHandle, WorkId, UNKNOWN_MEMORY};
use crate::util::priority::QueuedWorkPriority;

/// Upper bound on recycled records kept around.
const MAX_POOLED_RECORDS: usize = 256;

/// Lifecycle of an in-flight record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkState {
    /// Submitted to the executor, not started.
    Pending = 0,
    /// The executor started it; it can no longer be retracted.
    Running = 1,
    /// Retracted before it started.
    Cancelled = 2,
    /// Ran or was abandoned by the executor.
    Completed = 3,
}

impl WorkState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Cancelled,
            _ => Self::Completed,
        }
    }
}

/// Receives completion notifications from records.
pub(crate) trait RecordOwner: Send + Sync {
    /// The record admitted as `sequence` for item `id` has finished running,
    /// or was abandoned by the executor when `abandoned` is set.
    fn on_record_finished(&self, id: WorkId, sequence: u64, abandoned: bool);
}

/// A caller's work item while it is admitted to an executor.
pub(crate) struct ScheduledWork {
    state: AtomicU8,
    /// Cleared once the item ran, was abandoned or was taken back.
    inner: Mutex<Option<WorkHandle>>,
    /// Thread that claimed the record, while it runs.
    runner: Mutex<Option<ThreadId>>,
    id: Option<WorkId>,
    priority: QueuedWorkPriority,
    required_memory: i64,
    reserved_memory: i64,
    sequence: u64,
    owner: Option<Weak<dyn RecordOwner>>,
}

impl ScheduledWork {
    fn empty() -> Self {
        Self {
            state: AtomicU8::new(WorkState::Pending as u8),
            inner: Mutex::new(None),
            runner: Mutex::new(None),
            id: None,
            priority: QueuedWorkPriority::Normal,
            required_memory: UNKNOWN_MEMORY,
            reserved_memory: 0,
            sequence: 0,
            owner: None,
        }
    }

    fn reset(&mut self, admission: Admission) {
        *self.state.get_mut() = WorkState::Pending as u8;
        self.required_memory = admission.work.required_memory();
        self.id = Some(WorkId::of(&admission.work));
        *self.inner.get_mut() = Some(admission.work);
        *self.runner.get_mut() = None;
        self.priority = admission.priority;
        self.reserved_memory = admission.reserved_memory;
        self.sequence = admission.sequence;
        self.owner = Some(admission.owner);
    }

    /// Current lifecycle state.
    pub(crate) fn state(&self) -> WorkState {
        WorkState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the record can still be retracted.
    pub(crate) fn is_pending(&self) -> bool {
        self.state() == WorkState::Pending
    }

    fn transition(&self, from: WorkState, to: WorkState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the record for execution.
    pub(crate) fn try_start(&self) -> bool {
        self.transition(WorkState::Pending, WorkState::Running)
    }

    /// Claim the record for retraction.
    pub(crate) fn try_cancel(&self) -> bool {
        self.transition(WorkState::Pending, WorkState::Cancelled)
    }

    /// Whether the item is running on `thread` right now.
    pub(crate) fn is_running_on(&self, thread: ThreadId) -> bool {
        *self.runner.lock() == Some(thread)
    }

    /// Take the caller's item back out of a cancelled record.
    pub(crate) fn take_inner(&self) -> Option<WorkHandle> {
        debug_assert_eq!(self.state(), WorkState::Cancelled);
        self.inner.lock().take()
    }

    /// Priority the item was admitted at, before remapping.
    pub(crate) const fn priority(&self) -> QueuedWorkPriority {
        self.priority
    }

    /// Amount the admission policy reserved for this record.
    pub(crate) const fn reserved_memory(&self) -> i64 {
        self.reserved_memory
    }

    /// Admission order, unique per wrapper.
    pub(crate) const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Claim the record on the calling thread and take the caller's item.
    fn begin(&self) -> Option<(FinishGuard<'_>, Option<WorkHandle>)> {
        if !self.try_start() {
            return None;
        }
        *self.runner.lock() = Some(thread::current().id());
        let inner = self.inner.lock().take();
        Some((
            FinishGuard {
                record: self,
                abandoned: false,
            },
            inner,
        ))
    }

    fn finish(&self, abandoned: bool) {
        *self.runner.lock() = None;
        self.state.store(WorkState::Completed as u8, Ordering::Release);
        let (Some(owner), Some(id)) = (&self.owner, self.id) else {
            return;
        };
        if let Some(owner) = owner.upgrade() {
            owner.on_record_finished(id, self.sequence, abandoned);
        }
    }
}

/// Reports the record finished when dropped, so a panicking item still
/// releases its slot.
struct FinishGuard<'a> {
    record: &'a ScheduledWork,
    abandoned: bool,
}

impl Drop for FinishGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(
                priority = %self.record.priority,
                "work item panicked, releasing its slot"
            );
        }
        self.record.finish(self.abandoned);
    }
}

impl QueuedWork for ScheduledWork {
    fn do_work(&self) {
        let Some((_finish, inner)) = self.begin() else {
            return;
        };
        if let Some(inner) = inner {
            inner.do_work();
        }
    }

    fn abandon(&self) {
        let Some((mut finish, inner)) = self.begin() else {
            return;
        };
        finish.abandoned = true;
        if let Some(inner) = inner {
            inner.abandon();
        }
    }

    fn required_memory(&self) -> i64 {
        self.required_memory
    }

    fn flags(&self) -> QueuedWorkFlags {
        self.inner
            .lock()
            .as_ref()
            .map_or(QueuedWorkFlags::NONE, |w| w.flags())
    }
}

/// Everything a record captures at admission.
pub(crate) struct Admission {
    pub work: WorkHandle,
    pub priority: QueuedWorkPriority,
    pub reserved_memory: i64,
    pub sequence: u64,
    pub owner: Weak<dyn RecordOwner>,
}

/// Free list of records.
///
/// A record is only reused once no executor holds it any more, so a stale
/// executor reference can never observe a recycled record.
#[derive(Default)]
pub(crate) struct RecordPool {
    free: Vec<Arc<ScheduledWork>>,
}

impl RecordPool {
    /// Take a record for `admission`, reusing a pooled one when possible.
    pub(crate) fn acquire(&mut self, admission: Admission) -> Arc<ScheduledWork> {
        while let Some(mut record) = self.free.pop() {
            if let Some(slot) = Arc::get_mut(&mut record) {
                slot.reset(admission);
                return record;
            }
        }
        let mut record = ScheduledWork::empty();
        record.reset(admission);
        Arc::new(record)
    }

    /// Return a record that left the in-flight set.
    pub(crate) fn release(&mut self, record: Arc<ScheduledWork>) {
        if self.free.len() < MAX_POOLED_RECORDS {
            self.free.push(record);
        }
    }

    /// Number of pooled records.
    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }

    /// Drop every pooled record.
    pub(crate) fn clear(&mut self) {
        self.free.clear();
    }
}
