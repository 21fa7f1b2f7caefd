//! Pattern-keyed publish/subscribe hub.
//!
//! Every `publish` dispatches synchronously to matching listeners on the
//! calling thread. Non-transient events are also counted, kept in a bounded
//! history ring and appended to a bounded deferred queue, which
//! [`EventBus::process_queue`] redelivers later in small batches. Both rings
//! evict oldest-first.
//!
//! Listeners are kept in one ordered list: higher priority first, then
//! registration order. Consumers should still treat cross-listener order as
//! an implementation detail.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::BusConfig;
use crate::core::error::BusError;
use crate::util::panic::panic_message;

use super::event::Event;
use super::pattern::Pattern;
use super::EventSink;

type Callback = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

/// Identifies a subscription so it can be removed again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    /// Numeric listener id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }
}

struct Listener {
    id: u64,
    pattern: Pattern,
    priority: i32,
    callback: Callback,
}

/// Snapshot of bus activity since creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Non-transient events published.
    pub published: u64,
    /// Transient events published (dispatched only).
    pub transient: u64,
    /// Listener invocations, immediate and deferred.
    pub deliveries: u64,
    /// Events redelivered by `process_queue`.
    pub redelivered: u64,
    /// Listener invocations that returned an error or panicked.
    pub listener_failures: u64,
    /// Failures written to the last-resort channel.
    pub surfaced_failures: u64,
    /// Events evicted from the history ring.
    pub history_evictions: u64,
    /// Events evicted from the deferred queue before redelivery.
    pub queue_evictions: u64,
    /// Registered listeners.
    pub listeners: usize,
    /// Events currently in the history ring.
    pub history_len: usize,
    /// Events currently waiting in the deferred queue.
    pub queue_len: usize,
}

#[derive(Debug, Default)]
struct BusCounters {
    published: AtomicU64,
    transient: AtomicU64,
    deliveries: AtomicU64,
    redelivered: AtomicU64,
    listener_failures: AtomicU64,
    surfaced_failures: AtomicU64,
    history_evictions: AtomicU64,
    queue_evictions: AtomicU64,
}

/// Result of a [`EventBus::cleanup`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// History entries older than the rolling window that were dropped.
    pub expired_events: usize,
    /// Per-name counters that exceeded the overflow threshold and were reset.
    pub reset_counters: usize,
}

/// Publish/subscribe hub shared by every kernel service.
pub struct EventBus {
    config: BusConfig,
    transient: Vec<Pattern>,
    listeners: RwLock<Vec<Arc<Listener>>>,
    history: Mutex<VecDeque<Event>>,
    deferred: Mutex<VecDeque<Event>>,
    type_counts: Mutex<HashMap<String, u64>>,
    next_listener_id: AtomicU64,
    counters: BusCounters,
}

impl EventBus {
    /// Create a bus, compiling the configured transient patterns.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidPattern`] if a transient pattern is malformed.
    pub fn new(config: BusConfig) -> Result<Self, BusError> {
        let transient = config
            .transient_patterns
            .iter()
            .map(|p| Pattern::compile(p))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            history_capacity = config.history_capacity,
            queue_capacity = config.queue_capacity,
            transient_patterns = transient.len(),
            "EventBus initialized"
        );

        Ok(Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity.min(1024))),
            deferred: Mutex::new(VecDeque::with_capacity(config.queue_capacity.min(1024))),
            config,
            transient,
            listeners: RwLock::new(Vec::new()),
            type_counts: Mutex::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            counters: BusCounters::default(),
        })
    }

    /// Configuration the bus was built with.
    #[must_use]
    pub const fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Subscribe `callback` to every event whose name matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidPattern`] if the pattern does not compile.
    pub fn subscribe<F>(&self, pattern: &str, callback: F) -> Result<ListenerHandle, BusError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe_with_priority(pattern, 0, callback)
    }

    /// Subscribe with an explicit priority; higher priorities run first.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidPattern`] if the pattern does not compile.
    pub fn subscribe_with_priority<F>(
        &self,
        pattern: &str,
        priority: i32,
        callback: F,
    ) -> Result<ListenerHandle, BusError>
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let pattern = Pattern::compile(pattern)?;
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let listener = Arc::new(Listener {
            id,
            pattern,
            priority,
            callback: Arc::new(callback),
        });

        let mut listeners = self.listeners.write();
        let at = listeners.partition_point(|l| l.priority >= priority);
        listeners.insert(at, listener);
        trace!(listener = id, priority, "listener subscribed");
        Ok(ListenerHandle(id))
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != handle.0);
        listeners.len() != before
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Whether `name` is classified as transient (dispatch-only).
    #[must_use]
    pub fn is_transient(&self, name: &str) -> bool {
        self.transient.iter().any(|p| p.matches(name))
    }

    /// Publish an event and dispatch it immediately to matching listeners.
    ///
    /// Returns the number of listeners invoked. Listener failures never
    /// propagate to the publisher.
    pub fn publish(&self, name: &str, data: Value) -> usize {
        let event = Event::new(name, data);

        if self.is_transient(name) {
            self.counters.transient.fetch_add(1, Ordering::Relaxed);
        } else {
            self.record(&event);
        }

        self.dispatch(&event)
    }

    fn record(&self, event: &Event) {
        self.counters.published.fetch_add(1, Ordering::Relaxed);
        *self
            .type_counts
            .lock()
            .entry(event.name.clone())
            .or_insert(0) += 1;

        if push_bounded(&mut self.history.lock(), event, self.config.history_capacity) {
            self.counters.history_evictions.fetch_add(1, Ordering::Relaxed);
        }
        if push_bounded(&mut self.deferred.lock(), event, self.config.queue_capacity) {
            self.counters.queue_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn dispatch(&self, event: &Event) -> usize {
        // Snapshot matches so listeners may subscribe or publish re-entrantly.
        let matching: Vec<Arc<Listener>> = self
            .listeners
            .read()
            .iter()
            .filter(|l| l.pattern.matches(&event.name))
            .cloned()
            .collect();

        for listener in &matching {
            self.invoke(listener, event);
        }
        self.counters
            .deliveries
            .fetch_add(matching.len() as u64, Ordering::Relaxed);
        matching.len()
    }

    fn invoke(&self, listener: &Listener, event: &Event) {
        let failure = match catch_unwind(AssertUnwindSafe(|| (listener.callback)(event))) {
            Ok(Ok(())) => return,
            Ok(Err(err)) => format!("{err:#}"),
            Err(payload) => format!("panic: {}", panic_message(&*payload)),
        };

        self.counters.listener_failures.fetch_add(1, Ordering::Relaxed);
        if self.surfaces(&event.name) {
            self.counters.surfaced_failures.fetch_add(1, Ordering::Relaxed);
            // Last-resort channel; stays off the logger so a broken log
            // listener cannot fail recursively.
            eprintln!(
                "[craftkernel] listener {} (`{}`) failed on `{}`: {failure}",
                listener.id, listener.pattern, event.name
            );
        } else {
            trace!(
                listener = listener.id,
                event = %event.name,
                error = %failure,
                "listener failure swallowed"
            );
        }
    }

    fn surfaces(&self, name: &str) -> bool {
        self.config
            .surface_keywords
            .iter()
            .any(|k| name.contains(k.as_str()))
    }

    /// Redeliver up to `max_per_call` deferred events in FIFO order.
    ///
    /// Redelivered events are not enqueued again. Returns how many were
    /// processed.
    pub fn process_queue(&self, max_per_call: usize) -> usize {
        let mut processed = 0;
        while processed < max_per_call {
            let Some(event) = self.deferred.lock().pop_front() else {
                break;
            };
            self.dispatch(&event);
            processed += 1;
        }
        if processed > 0 {
            self.counters
                .redelivered
                .fetch_add(processed as u64, Ordering::Relaxed);
        }
        processed
    }

    /// [`process_queue`](Self::process_queue) with the configured batch size.
    pub fn process_pending(&self) -> usize {
        self.process_queue(self.config.batch_size)
    }

    /// Events waiting for redelivery.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.deferred.lock().len()
    }

    /// The last `count` recorded events, oldest first.
    #[must_use]
    pub fn recent_events(&self, count: usize) -> Vec<Event> {
        let history = self.history.lock();
        let skip = history.len().saturating_sub(count);
        history.iter().skip(skip).cloned().collect()
    }

    /// Per-name publish counts of non-transient events.
    #[must_use]
    pub fn event_types(&self) -> BTreeMap<String, u64> {
        self.type_counts
            .lock()
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect()
    }

    /// Drop history older than the rolling window and reset overflowing
    /// counters.
    pub fn cleanup(&self, now_ms: u128) -> CleanupReport {
        let window_ms = u128::from(self.config.history_window_secs) * 1000;
        let expired_events = {
            let mut history = self.history.lock();
            let before = history.len();
            history.retain(|e| now_ms.saturating_sub(e.timestamp_ms) <= window_ms);
            before - history.len()
        };

        let overflow = self.config.counter_overflow;
        let reset_counters = {
            let mut counts = self.type_counts.lock();
            let before = counts.len();
            counts.retain(|_, count| *count <= overflow);
            before - counts.len()
        };

        if expired_events > 0 || reset_counters > 0 {
            debug!(expired_events, reset_counters, "event bus cleanup");
        }
        CleanupReport {
            expired_events,
            reset_counters,
        }
    }

    /// Activity counters and current buffer sizes.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let c = &self.counters;
        BusStats {
            published: c.published.load(Ordering::Relaxed),
            transient: c.transient.load(Ordering::Relaxed),
            deliveries: c.deliveries.load(Ordering::Relaxed),
            redelivered: c.redelivered.load(Ordering::Relaxed),
            listener_failures: c.listener_failures.load(Ordering::Relaxed),
            surfaced_failures: c.surfaced_failures.load(Ordering::Relaxed),
            history_evictions: c.history_evictions.load(Ordering::Relaxed),
            queue_evictions: c.queue_evictions.load(Ordering::Relaxed),
            listeners: self.listener_count(),
            history_len: self.history.lock().len(),
            queue_len: self.queue_len(),
        }
    }
}

impl EventSink for EventBus {
    fn publish(&self, name: &str, data: Value) {
        Self::publish(self, name, data);
    }
}

/// Append with oldest-first eviction. Returns true if something was evicted.
fn push_bounded(ring: &mut VecDeque<Event>, event: &Event, capacity: usize) -> bool {
    if capacity == 0 {
        return false;
    }
    let evicted = if ring.len() >= capacity {
        ring.pop_front();
        true
    } else {
        false
    };
    ring.push_back(event.clone());
    evicted
}
