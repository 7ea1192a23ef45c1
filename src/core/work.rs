//! Units of queued work and their identity.

use std::fmt;
use std::sync::Arc;

/// Memory estimate meaning "unknown, use the configured default".
pub const UNKNOWN_MEMORY: i64 = -1;

/// Optional execution hints attached to a work item.
///
/// Hints are advisory; no scheduling decision in this crate depends on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueuedWorkFlags(u8);

impl QueuedWorkFlags {
    /// No hints.
    pub const NONE: Self = Self(0);
    /// The item must not be picked up by a thread busy-waiting on other work.
    pub const DO_NOT_RUN_INSIDE_BUSY_WAIT: Self = Self(1);

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A unit of caller-owned work.
///
/// Schedulers call exactly one of [`do_work`](Self::do_work) or
/// [`abandon`](Self::abandon) for each admission they do not retract. They
/// never drop the caller's ownership: items are shared through [`WorkHandle`].
pub trait QueuedWork: Send + Sync {
    /// Run the work synchronously on the calling thread.
    fn do_work(&self);

    /// Called instead of `do_work` when the work is discarded before it ran.
    fn abandon(&self);

    /// Estimated peak memory in bytes, or [`UNKNOWN_MEMORY`].
    fn required_memory(&self) -> i64 {
        UNKNOWN_MEMORY
    }

    /// Execution hints.
    fn flags(&self) -> QueuedWorkFlags {
        QueuedWorkFlags::NONE
    }
}

/// Shared handle to a work item. Identity is the allocation, not the value.
pub type WorkHandle = Arc<dyn QueuedWork>;

/// Pointer identity of a [`WorkHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkId(usize);

impl WorkId {
    /// Identity of the item behind `work`.
    #[must_use]
    pub fn of(work: &WorkHandle) -> Self {
        Self(Arc::as_ptr(work).cast::<()>() as usize)
    }
}

/// Whether two handles refer to the same item.
#[must_use]
pub fn same_work(a: &WorkHandle, b: &WorkHandle) -> bool {
    WorkId::of(a) == WorkId::of(b)
}

/// Work item backed by closures.
pub struct FnWork<W, A = fn()>
where
    W: Fn() + Send + Sync,
    A: Fn() + Send + Sync,
{
    work: W,
    on_abandon: A,
    required_memory: i64,
    flags: QueuedWorkFlags,
}

impl<W> FnWork<W>
where
    W: Fn() + Send + Sync,
{
    /// Work that runs `work` and ignores abandonment.
    pub fn new(work: W) -> Self {
        Self {
            work,
            on_abandon: || {},
            required_memory: UNKNOWN_MEMORY,
            flags: QueuedWorkFlags::NONE,
        }
    }
}

impl<W, A> FnWork<W, A>
where
    W: Fn() + Send + Sync,
    A: Fn() + Send + Sync,
{
    /// Replace the abandonment callback.
    pub fn on_abandon<B>(self, on_abandon: B) -> FnWork<W, B>
    where
        B: Fn() + Send + Sync,
    {
        FnWork {
            work: self.work,
            on_abandon,
            required_memory: self.required_memory,
            flags: self.flags,
        }
    }

    /// Set the memory estimate.
    #[must_use]
    pub const fn with_required_memory(mut self, bytes: i64) -> Self {
        self.required_memory = bytes;
        self
    }

    /// Set execution hints.
    #[must_use]
    pub const fn with_flags(mut self, flags: QueuedWorkFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Wrap into a shareable handle.
    pub fn into_handle(self) -> WorkHandle
    where
        W: 'static,
        A: 'static,
    {
        Arc::new(self)
    }
}

impl<W, A> QueuedWork for FnWork<W, A>
where
    W: Fn() + Send + Sync,
    A: Fn() + Send + Sync,
{
    fn do_work(&self) {
        (self.work)();
    }

    fn abandon(&self) {
        (self.on_abandon)();
    }

    fn required_memory(&self) -> i64 {
        self.required_memory
    }

    fn flags(&self) -> QueuedWorkFlags {
        self.flags
    }
}

impl<W, A> fmt::Debug for FnWork<W, A>
where
    W: Fn() + Send + Sync,
    A: Fn() + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork")
            .field("required_memory", &self.required_memory)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
