//! Publish/subscribe event bus.

pub mod event;
pub mod event_bus;
pub mod pattern;

use serde_json::Value;

pub use event::{Event, MINUTE_TICK, POOL_CREATED, TASK_END, TASK_ERROR, TASK_START};
pub use event_bus::{BusStats, CleanupReport, EventBus, ListenerHandle};
pub use pattern::Pattern;

/// Anything kernel services can publish lifecycle notifications into.
///
/// [`EventBus`] is the production sink; tests can substitute a recorder.
pub trait EventSink: Send + Sync {
    /// Publish `name` with `data`.
    fn publish(&self, name: &str, data: Value);
}
