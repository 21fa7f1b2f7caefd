//! Core scheduling abstractions: pools, workers, tasks and futures.

pub mod error;
pub mod future;
pub mod scheduler;
pub mod worker_pool;

/// Scheduler-wide monotonic task identifier.
pub type TaskId = u64;

pub use error::{AppResult, BusError, ConfigError, KernelError, SchedulerError, TaskError};
pub use future::{FutureState, TaskFuture};
pub use scheduler::Scheduler;
pub use worker_pool::{PoolStats, WorkerPool, WorkerSnapshot};
