//! Serializable diagnostics payloads.

use serde::{Deserialize, Serialize};

use crate::bus::{BusStats, Event};
use crate::core::PoolStats;
use crate::timer::WheelSnapshot;

/// Point-in-time view of a whole kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSnapshot {
    /// Milliseconds since the kernel started, or 0 if it never did.
    pub uptime_ms: u128,
    /// Every pool, ordered by name.
    pub pools: Vec<PoolStats>,
    /// Bus counters.
    pub bus: BusStats,
    /// Most recent recorded events, oldest first.
    pub recent_events: Vec<Event>,
    /// Wheel state.
    pub wheel: WheelSnapshot,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// Workers, wheel and pump are all running.
    pub ok: bool,
    /// Scheduler workers running.
    pub workers_running: bool,
    /// Wheel advancing.
    pub wheel_running: bool,
    /// Event pump running.
    pub pump_running: bool,
    /// Tasks waiting across all pools.
    pub queued_tasks: u64,
}
