//! The executor contract wrappers submit admitted work to.

use crate::core::work::WorkHandle;
use crate::util::priority::QueuedWorkPriority;

/// An executor that actually runs work: an OS-thread pool, a task runtime, or
/// another wrapper.
///
/// Wrappers treat it as opaque beyond this submit/retract/thread-count
/// contract. Submission must not block for long; it is always called without
/// any wrapper lock held, so an implementation may run work inline.
///
/// # Example
///
/// ```rust,ignore
/// use prometheus_work_scheduler::core::{UnderlyingExecutor, WorkHandle};
/// use prometheus_work_scheduler::util::QueuedWorkPriority;
///
/// struct Inline;
///
/// impl UnderlyingExecutor for Inline {
///     fn add_work(&self, work: WorkHandle, _priority: QueuedWorkPriority) {
///         work.do_work();
///     }
///
///     fn num_threads(&self) -> usize {
///         1
///     }
/// }
/// ```
pub trait UnderlyingExecutor: Send + Sync {
    /// Submit work. The executor must eventually call exactly one of
    /// `do_work` or `abandon` on it, unless it is successfully retracted.
    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority);

    /// Pull back work previously submitted and not yet started.
    ///
    /// Executors without retraction support keep the default.
    fn retract(&self, _work: &WorkHandle) -> bool {
        false
    }

    /// Number of threads work can run on concurrently.
    fn num_threads(&self) -> usize;
}

impl<E: UnderlyingExecutor + ?Sized> UnderlyingExecutor for std::sync::Arc<E> {
    fn add_work(&self, work: WorkHandle, priority: QueuedWorkPriority) {
        (**self).add_work(work, priority);
    }

    fn retract(&self, work: &WorkHandle) -> bool {
        (**self).retract(work)
    }

    fn num_threads(&self) -> usize {
        (**self).num_threads()
    }
}
