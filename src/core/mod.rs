//! Core scheduling abstractions: work items, queues, admission wrappers,
//! executors and the compile coordinator.

pub mod coordinator;
pub mod dynamic;
pub mod error;
pub mod executor;
pub mod memory_bounded;
pub mod object_cache;
pub mod priority_queue;
pub(crate) mod scheduled_work;
pub mod topological_sort;
pub mod work;
pub mod worker_pool;
pub mod wrapper;

pub use coordinator::{AssetCompilingCoordinator, AssetCompilingManager, ManagerHandle, ProcessContext};
pub use dynamic::DynamicWrapper;
pub use error::{AppResult, SchedulerError};
pub use executor::UnderlyingExecutor;
pub use memory_bounded::{MemoryBoundedPolicy, MemoryBoundedWrapper};
pub use object_cache::{ObjectGraphSource, ObjectId, ObjectReverseLookupCache};
pub use priority_queue::PriorityWorkQueue;
pub use topological_sort::{topological_sort, TopologicalSortFlags};
pub use work::{same_work, FnWork, QueuedWork, QueuedWorkFlags, WorkHandle, WorkId, UNKNOWN_MEMORY};
pub use worker_pool::{PoolStats, WorkerPool};
pub use wrapper::{
    AdmissionContext, AdmissionPolicy, PriorityMapper, StaticConcurrency, ThreadPoolWrapper, WrapperStats,
    DEFAULT_DESTROY_STALL_WARNING,
};
