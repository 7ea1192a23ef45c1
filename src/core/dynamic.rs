//! Wrapper whose pending work can be re-ordered at runtime.

use std::cmp::Ordering;
use std::ops::Deref;

use tracing::debug;

use crate::core::executor::UnderlyingExecutor;
use crate::core::work::WorkHandle;
use crate::core::wrapper::{AdmissionPolicy, StaticConcurrency, ThreadPoolWrapper};
use crate::util::priority::QueuedWorkPriority;

/// A [`ThreadPoolWrapper`] that lets callers re-sort pending buckets by
/// runtime signals such as distance to the camera.
///
/// Sorting only changes the order inside a bucket; an item never moves to a
/// different priority this way. All other operations are reached through
/// `Deref`.
#[derive(Debug)]
pub struct DynamicWrapper<A: AdmissionPolicy = StaticConcurrency> {
    inner: ThreadPoolWrapper<A>,
}

impl<A: AdmissionPolicy> DynamicWrapper<A> {
    /// Make `inner` sortable.
    pub const fn new(inner: ThreadPoolWrapper<A>) -> Self {
        Self { inner }
    }

    /// Stable sort of the pending items queued at `priority`.
    pub fn sort<F>(&self, priority: QueuedWorkPriority, compare: F)
    where
        F: FnMut(&WorkHandle, &WorkHandle) -> Ordering,
    {
        let len = self.inner.with_queue(|queue| {
            queue.sort(priority, compare);
            queue.len_at(priority)
        });
        debug!(%priority, len, "re-sorted pending bucket");
    }

    /// Stable sort of every non-blocking bucket with the same comparator.
    pub fn sort_all<F>(&self, mut compare: F)
    where
        F: FnMut(&WorkHandle, &WorkHandle) -> Ordering,
    {
        self.inner.with_queue(|queue| {
            for priority in QueuedWorkPriority::ALL {
                if !priority.is_blocking() {
                    queue.sort(priority, &mut compare);
                }
            }
        });
    }

    /// Unwrap.
    pub fn into_inner(self) -> ThreadPoolWrapper<A> {
        self.inner
    }
}

impl<A: AdmissionPolicy> Deref for DynamicWrapper<A> {
    type Target = ThreadPoolWrapper<A>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<A: AdmissionPolicy> UnderlyingExecutor for DynamicWrapper<A> {
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
