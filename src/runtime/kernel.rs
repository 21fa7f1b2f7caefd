//! The assembled kernel: one bus, one scheduler, one wheel, one pump.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use crate::bus::EventBus;
use crate::config::KernelConfig;
use crate::core::error::KernelError;
use crate::core::Scheduler;
use crate::timer::{TimeWheel, WheelState};
use crate::util::clock::now_ms;

use super::diagnostics::{Health, KernelSnapshot};

/// Recent events included in a [`KernelSnapshot`].
const SNAPSHOT_EVENTS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running,
    Stopped,
}

struct Pump {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-wide kernel. Build one with [`KernelBuilder`](crate::builders::KernelBuilder).
pub struct Kernel {
    config: KernelConfig,
    bus: Arc<EventBus>,
    scheduler: Arc<Scheduler>,
    wheel: Arc<TimeWheel>,
    pump: Mutex<Option<Pump>>,
    started_at_ms: Mutex<Option<u128>>,
    phase: Mutex<Phase>,
    phase_cv: Condvar,
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("phase", &*self.phase.lock())
            .field("pools", &self.scheduler.pool_names())
            .field("wheel", &self.wheel.state())
            .finish_non_exhaustive()
    }
}

impl Kernel {
    pub(crate) fn from_parts(
        config: KernelConfig,
        bus: Arc<EventBus>,
        scheduler: Arc<Scheduler>,
        wheel: Arc<TimeWheel>,
    ) -> Self {
        Self {
            config,
            bus,
            scheduler,
            wheel,
            pump: Mutex::new(None),
            started_at_ms: Mutex::new(None),
            phase: Mutex::new(Phase::Idle),
            phase_cv: Condvar::new(),
        }
    }

    /// Configuration the kernel was built from.
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Shared event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Shared scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Shared time wheel.
    #[must_use]
    pub const fn wheel(&self) -> &Arc<TimeWheel> {
        &self.wheel
    }

    /// Start workers, the wheel and the event pump, then return.
    ///
    /// Starting a running kernel is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Scheduler`] with `Shutdown` once the kernel has
    /// been stopped, or [`KernelError::Spawn`] if a service thread cannot be
    /// created.
    pub fn start(&self) -> Result<(), KernelError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                Phase::Running => return Ok(()),
                Phase::Stopped => {
                    return Err(crate::core::SchedulerError::Shutdown.into());
                }
                Phase::Idle => *phase = Phase::Running,
            }
        }

        if let Err(err) = self.start_services() {
            warn!(error = %err, "kernel start failed; tearing down");
            self.shutdown();
            return Err(err);
        }

        *self.started_at_ms.lock() = Some(now_ms());
        info!(pools = self.scheduler.pool_names().len(), "kernel started");
        Ok(())
    }

    fn start_services(&self) -> Result<(), KernelError> {
        self.scheduler.start_workers()?;
        self.wheel.start()?;
        self.start_pump()?;

        let bus = Arc::clone(&self.bus);
        self.wheel.every(self.config.pump.cleanup_every_secs, move || {
            bus.cleanup(now_ms());
        });
        Ok(())
    }

    fn start_pump(&self) -> Result<(), KernelError> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let bus = Arc::clone(&self.bus);
        let interval = Duration::from_millis(self.config.pump.interval_millis.max(1));

        let handle = thread::Builder::new()
            .name("event-pump".into())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {
                            bus.process_pending();
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("event pump exiting");
            })
            .map_err(|e| KernelError::Spawn {
                name: "event-pump".into(),
                reason: e.to_string(),
            })?;

        *self.pump.lock() = Some(Pump { stop_tx, handle });
        Ok(())
    }

    /// Start the kernel and block until [`shutdown`](Self::shutdown) is
    /// called from another thread or from a task.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn run(&self) -> Result<(), KernelError> {
        self.start()?;
        let mut phase = self.phase.lock();
        while *phase != Phase::Stopped {
            self.phase_cv.wait(&mut phase);
        }
        Ok(())
    }

    /// Stop the wheel, the workers and the pump, in that order. Idempotent.
    ///
    /// Queued tasks are rejected; events still waiting for redelivery are
    /// discarded.
    pub fn shutdown(&self) {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::Stopped {
                return;
            }
            *phase = Phase::Stopped;
        }

        self.wheel.stop();
        self.scheduler.shutdown();
        if let Some(Pump { stop_tx, handle }) = self.pump.lock().take() {
            let _ = stop_tx.try_send(());
            drop(stop_tx);
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!("event pump panicked");
            }
        }

        self.phase_cv.notify_all();
        info!("kernel shut down");
    }

    /// Whether the kernel has been started and not yet shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        *self.phase.lock() == Phase::Running
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn snapshot(&self) -> KernelSnapshot {
        let uptime_ms = self
            .started_at_ms
            .lock()
            .map_or(0, |started| now_ms().saturating_sub(started));
        KernelSnapshot {
            uptime_ms,
            pools: self.scheduler.pools(),
            bus: self.bus.stats(),
            recent_events: self.bus.recent_events(SNAPSHOT_EVENTS),
            wheel: self.wheel.snapshot(),
        }
    }

    /// Liveness of each service thread.
    #[must_use]
    pub fn health(&self) -> Health {
        let workers_running = self.scheduler.is_running();
        let wheel_running = self.wheel.state() == WheelState::Running;
        let pump_running = self.pump.lock().is_some();
        let queued_tasks = self.scheduler.pools().iter().map(|p| p.queued_tasks).sum();
        Health {
            ok: workers_running && wheel_running && pump_running,
            workers_running,
            wheel_running,
            pump_running,
            queued_tasks,
        }
    }
}

impl Drop for Kernel {
    fn drop(&mut self) {
        self.shutdown();
    }
}
