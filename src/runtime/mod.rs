//! Runtime adapters and the process-wide scheduler registry.

pub mod registry;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_executor;

pub use registry::SchedulerRegistry;
#[cfg(feature = "tokio-runtime")]
pub use tokio_executor::TokioBlockingExecutor;
