//! Error types for kernel operations.

use thiserror::Error;

/// Usage errors produced by the scheduler.
///
/// These indicate programming mistakes (unknown pool, duplicate pool) rather
/// than runtime conditions, and are returned immediately to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// No pool is registered under this name.
    #[error("unknown pool: {0}")]
    UnknownPool(String),
    /// A pool with this name already exists.
    #[error("duplicate pool: {0}")]
    DuplicatePool(String),
    /// Pools need at least one worker.
    #[error("pool `{pool}` needs at least one worker, got {count}")]
    InvalidWorkerCount {
        /// Pool name.
        pool: String,
        /// Requested worker count.
        count: usize,
    },
    /// The scheduler has been shut down and accepts no more work.
    #[error("scheduler has been shut down")]
    Shutdown,
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker `{worker}`: {reason}")]
    Spawn {
        /// Worker label.
        worker: String,
        /// OS error text.
        reason: String,
    },
}

/// Reasons a task future ends up rejected (or a wait gives up).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("task failed: {0}")]
    Failed(String),
    /// The task body panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was still queued when its pool shut down.
    #[error("task cancelled: {0}")]
    Cancelled(String),
    /// The waiter gave up before the future completed. The task itself keeps
    /// running and its future may still complete later.
    #[error("wait timed out")]
    Timeout,
}

/// Errors produced by the event bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A subscription or transient pattern could not be compiled.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Values parsed but are out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// JSON could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Config file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error for assembling and running a kernel.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Scheduler usage error.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// Event bus error.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A kernel service thread could not be spawned.
    #[error("failed to spawn `{name}` thread: {reason}")]
    Spawn {
        /// Thread name.
        name: String,
        /// OS error text.
        reason: String,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
