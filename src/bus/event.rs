//! Event records and the well-known kernel event names.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::clock::now_ms;

/// Published when a pool is created. Data: `{pool, workers}`.
pub const POOL_CREATED: &str = "scheduler.poolCreated";
/// Published by a worker before running a task. Data: `{pool, task_id, task_type, worker}`.
pub const TASK_START: &str = "task.start";
/// Published by a worker after a task succeeded.
pub const TASK_END: &str = "task.end";
/// Published by a worker after a task failed; data carries `error`.
pub const TASK_ERROR: &str = "task.error";
/// Published by the time wheel each time its cursor wraps to slot 0.
pub const MINUTE_TICK: &str = "stats.minuteTick";

/// A single notification flowing through the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Dotted event name, e.g. `storage.changed`.
    pub name: String,
    /// Arbitrary payload.
    pub data: Value,
    /// Publish time in milliseconds since epoch.
    pub timestamp_ms: u128,
}

impl Event {
    /// Create an event stamped with the current time.
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            timestamp_ms: now_ms(),
        }
    }
}
