//! Fixed-size time wheel for delayed one-shot callbacks.
//!
//! The wheel is a circular array of `slot_count` buckets (60 by default, one
//! tick per second). `schedule(delay, cb)` drops `cb` into slot
//! `(cursor + delay) % slot_count`; each tick advances the cursor by one,
//! takes that slot's callbacks and runs them.
//!
//! Delays are not range-checked: a delay of `slot_count` or more aliases onto
//! an earlier slot, so `schedule(61, cb)` on a 60-slot wheel fires after one
//! tick and `schedule(0, cb)` after a full revolution. Callers needing longer
//! delays re-arm from inside the callback (see [`TimeWheel::every`]).
//!
//! Scheduled callbacks cannot be cancelled individually; `stop` abandons all
//! of them.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::bus::{EventSink, MINUTE_TICK};
use crate::config::WheelConfig;
use crate::core::error::KernelError;
use crate::util::panic::panic_message;

/// A zero-argument callback parked on the wheel.
pub type WheelCallback = Box<dyn FnOnce() + Send + 'static>;

/// Wheel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WheelState {
    /// Not advancing.
    Stopped,
    /// Advance thread is running.
    Running,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    /// Slot the cursor moved to.
    pub slot: usize,
    /// Callbacks run.
    pub fired: usize,
    /// Callbacks that panicked.
    pub failed: usize,
    /// Whether the cursor wrapped to slot 0 on this tick.
    pub wrapped: bool,
}

/// Diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WheelSnapshot {
    /// Lifecycle state.
    pub state: WheelState,
    /// Slot count.
    pub slot_count: usize,
    /// Current cursor position.
    pub current_slot: usize,
    /// Callbacks waiting across all slots.
    pub pending: usize,
    /// Ticks since creation.
    pub ticks: u64,
    /// Full revolutions since creation.
    pub revolutions: u64,
    /// Callbacks that panicked since creation.
    pub failed_callbacks: u64,
}

struct Slots {
    cursor: usize,
    buckets: Vec<Vec<WheelCallback>>,
    ticks: u64,
    revolutions: u64,
}

struct WheelInner {
    slots: Mutex<Slots>,
    sink: Option<Arc<dyn EventSink>>,
    failed_callbacks: AtomicU64,
}

impl WheelInner {
    fn schedule(&self, delay: u64, callback: WheelCallback) {
        let mut slots = self.slots.lock();
        let n = slots.buckets.len();
        // Reduce first so huge delays cannot overflow the addition.
        let offset = usize::try_from(delay % n as u64).unwrap_or(0);
        let target = (slots.cursor + offset) % n;
        slots.buckets[target].push(callback);
    }

    fn schedule_every(self: &Arc<Self>, period: u64, callback: Arc<dyn Fn() + Send + Sync>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.schedule(
            period,
            Box::new(move || {
                // Re-arm first so a panicking callback keeps its schedule.
                if let Some(inner) = weak.upgrade() {
                    inner.schedule_every(period, Arc::clone(&callback));
                }
                callback();
            }),
        );
    }

    fn tick(&self) -> TickReport {
        let (slot, due, wrapped, revolutions, n) = {
            let mut slots = self.slots.lock();
            let n = slots.buckets.len();
            slots.cursor = (slots.cursor + 1) % n;
            slots.ticks += 1;
            let wrapped = slots.cursor == 0;
            if wrapped {
                slots.revolutions += 1;
            }
            let cursor = slots.cursor;
            let due = std::mem::take(&mut slots.buckets[cursor]);
            (cursor, due, wrapped, slots.revolutions, n)
        };

        let fired = due.len();
        let mut failed = 0;
        for callback in due {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(callback)) {
                failed += 1;
                warn!(slot, error = %panic_message(&*payload), "wheel callback panicked");
            }
        }
        if failed > 0 {
            self.failed_callbacks
                .fetch_add(failed as u64, Ordering::Relaxed);
        }

        if wrapped {
            if let Some(sink) = &self.sink {
                sink.publish(
                    MINUTE_TICK,
                    json!({ "revolutions": revolutions, "slot_count": n }),
                );
            }
        }

        TickReport {
            slot,
            fired,
            failed,
            wrapped,
        }
    }
}

struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Shared clock for delayed callbacks.
pub struct TimeWheel {
    config: WheelConfig,
    inner: Arc<WheelInner>,
    ticker: Mutex<Option<Ticker>>,
}

impl TimeWheel {
    /// Create a stopped wheel. `sink` receives `stats.minuteTick`.
    ///
    /// A zero `slot_count` is bumped to one.
    pub fn new(config: WheelConfig, sink: Option<Arc<dyn EventSink>>) -> Self {
        let slot_count = config.slot_count.max(1);
        let buckets = (0..slot_count).map(|_| Vec::new()).collect();
        Self {
            config: WheelConfig {
                slot_count,
                ..config
            },
            inner: Arc::new(WheelInner {
                slots: Mutex::new(Slots {
                    cursor: 0,
                    buckets,
                    ticks: 0,
                    revolutions: 0,
                }),
                sink,
                failed_callbacks: AtomicU64::new(0),
            }),
            ticker: Mutex::new(None),
        }
    }

    /// Run `callback` once, `delay_seconds` ticks from now (modulo the slot
    /// count).
    pub fn schedule<F>(&self, delay_seconds: u64, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.schedule(delay_seconds, Box::new(callback));
    }

    /// Run `callback` every `period_seconds` ticks by re-arming itself.
    ///
    /// A zero period is treated as one. The recurrence ends when a running
    /// wheel is [stopped](Self::stop), which abandons the pending re-arm with
    /// every other callback, or when the wheel is dropped.
    pub fn every<F>(&self, period_seconds: u64, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner
            .schedule_every(period_seconds.max(1), Arc::new(callback));
    }

    /// Advance one slot and run its callbacks on the calling thread.
    ///
    /// The advance thread started by [`start`](Self::start) calls this once
    /// per tick; embedders and tests may drive a stopped wheel by hand.
    pub fn tick(&self) -> TickReport {
        self.inner.tick()
    }

    /// Start the advance thread. Starting a running wheel is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Spawn`] if the thread cannot be created.
    pub fn start(&self) -> Result<(), KernelError> {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let inner = Arc::clone(&self.inner);
        let tick = Duration::from_millis(self.config.tick_millis.max(1));

        let handle = thread::Builder::new()
            .name("time-wheel".into())
            .spawn(move || {
                // Deadline-based so slow callbacks do not accumulate drift.
                let mut next = Instant::now() + tick;
                loop {
                    match stop_rx.recv_deadline(next) {
                        Err(RecvTimeoutError::Timeout) => {
                            inner.tick();
                            next += tick;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("time wheel thread exiting");
            })
            .map_err(|e| KernelError::Spawn {
                name: "time-wheel".into(),
                reason: e.to_string(),
            })?;

        *ticker = Some(Ticker { stop_tx, handle });
        info!(
            slots = self.config.slot_count,
            tick_millis = self.config.tick_millis,
            "time wheel started"
        );
        Ok(())
    }

    /// Stop advancing. Callbacks still on the wheel are abandoned.
    pub fn stop(&self) {
        let Some(Ticker { stop_tx, handle }) = self.ticker.lock().take() else {
            return;
        };
        let _ = stop_tx.try_send(());
        drop(stop_tx);

        // A callback may stop the wheel from the wheel thread itself.
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!("time wheel thread panicked");
        }

        let abandoned = {
            let mut slots = self.inner.slots.lock();
            let count = slots.buckets.iter().map(Vec::len).sum::<usize>();
            slots.buckets.iter_mut().for_each(Vec::clear);
            count
        };
        info!(abandoned, "time wheel stopped");
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> WheelState {
        if self.ticker.lock().is_some() {
            WheelState::Running
        } else {
            WheelState::Stopped
        }
    }

    /// Current cursor position.
    #[must_use]
    pub fn current_slot(&self) -> usize {
        self.inner.slots.lock().cursor
    }

    /// Number of slots.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.config.slot_count
    }

    /// Callbacks waiting across all slots.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.slots.lock().buckets.iter().map(Vec::len).sum()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> WheelSnapshot {
        let state = self.state();
        let slots = self.inner.slots.lock();
        WheelSnapshot {
            state,
            slot_count: slots.buckets.len(),
            current_slot: slots.cursor,
            pending: slots.buckets.iter().map(Vec::len).sum(),
            ticks: slots.ticks,
            revolutions: slots.revolutions,
            failed_callbacks: self.inner.failed_callbacks.load(Ordering::Relaxed),
        }
    }
}

impl Drop for TimeWheel {
    fn drop(&mut self) {
        self.stop();
    }
}
