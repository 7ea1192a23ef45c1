//! Bucketed priority queue of pending work with exact-item retraction.

use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::core::work::{same_work, WorkHandle};
use crate::util::priority::QueuedWorkPriority;

/// Pending work, one FIFO bucket per priority level.
///
/// Dequeue always serves the most important non-empty bucket. Within a bucket
/// insertion order is kept unless a caller explicitly re-sorts it.
pub struct PriorityWorkQueue {
    buckets: [VecDeque<WorkHandle>; QueuedWorkPriority::COUNT],
    len: usize,
}

impl Default for PriorityWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PriorityWorkQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| VecDeque::new()),
            len: 0,
        }
    }

    /// Append `work` to the tail of its priority bucket.
    pub fn enqueue(&mut self, work: WorkHandle, priority: QueuedWorkPriority) {
        self.buckets[priority.index()].push_back(work);
        self.len += 1;
    }

    /// Put `work` back at the head of its bucket, ahead of everything queued
    /// at the same priority.
    pub fn enqueue_front(&mut self, work: WorkHandle, priority: QueuedWorkPriority) {
        self.buckets[priority.index()].push_front(work);
        self.len += 1;
    }

    /// Head of the most important non-empty bucket.
    #[must_use]
    pub fn peek(&self) -> Option<(&WorkHandle, QueuedWorkPriority)> {
        self.buckets
            .iter()
            .zip(QueuedWorkPriority::ALL)
            .find_map(|(bucket, priority)| bucket.front().map(|w| (w, priority)))
    }

    /// Priority of the next item `dequeue` would return.
    #[must_use]
    pub fn peek_priority(&self) -> Option<QueuedWorkPriority> {
        self.peek().map(|(_, p)| p)
    }

    /// Remove and return the head of the most important non-empty bucket.
    pub fn dequeue(&mut self) -> Option<(WorkHandle, QueuedWorkPriority)> {
        for (bucket, priority) in self.buckets.iter_mut().zip(QueuedWorkPriority::ALL) {
            if let Some(work) = bucket.pop_front() {
                self.len -= 1;
                return Some((work, priority));
            }
        }
        None
    }

    /// Remove `work` (by identity) if it is still queued.
    pub fn retract(&mut self, work: &WorkHandle) -> bool {
        self.remove(work).is_some()
    }

    /// Remove `work` (by identity) and report the bucket it was queued in.
    pub fn remove(&mut self, work: &WorkHandle) -> Option<QueuedWorkPriority> {
        for (bucket, priority) in self.buckets.iter_mut().zip(QueuedWorkPriority::ALL) {
            if let Some(pos) = bucket.iter().position(|w| same_work(w, work)) {
                bucket.remove(pos);
                self.len -= 1;
                return Some(priority);
            }
        }
        None
    }

    /// Whether `work` is queued.
    #[must_use]
    pub fn contains(&self, work: &WorkHandle) -> bool {
        self.buckets
            .iter()
            .any(|bucket| bucket.iter().any(|w| same_work(w, work)))
    }

    /// Stable re-sort of a single bucket. Bucket membership does not change.
    pub fn sort<F>(&mut self, priority: QueuedWorkPriority, mut compare: F)
    where
        F: FnMut(&WorkHandle, &WorkHandle) -> Ordering,
    {
        let bucket = &mut self.buckets[priority.index()];
        bucket.make_contiguous().sort_by(|a, b| compare(a, b));
    }

    /// Number of items queued at `priority`.
    #[must_use]
    pub fn len_at(&self, priority: QueuedWorkPriority) -> usize {
        self.buckets[priority.index()].len()
    }

    /// Total number of queued items.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Remove everything, most important first.
    pub fn drain(&mut self) -> Vec<(WorkHandle, QueuedWorkPriority)> {
        let mut out = Vec::with_capacity(self.len);
        for (bucket, priority) in self.buckets.iter_mut().zip(QueuedWorkPriority::ALL) {
            out.extend(bucket.drain(..).map(|w| (w, priority)));
        }
        self.len = 0;
        out
    }
}
