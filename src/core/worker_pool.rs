//! Named worker pools backed by dedicated OS threads.
//!
//! Each pool owns one FIFO channel and a fixed set of workers that block on
//! it. Receiving from the channel is the exclusive hand-off: exactly one worker
//! claims each task, and tasks leave the channel in submission order.
//!
//! # Design
//!
//! - **No polling**: idle workers sleep in `recv()` until work arrives
//! - **Clean shutdown**: dropping the sender unblocks workers; anything still
//!   queued is rejected with [`TaskError::Cancelled`] instead of abandoned
//! - **Isolation**: a failing or panicking task rejects its own future and the
//!   worker carries on with the next task

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::bus::{EventSink, TASK_END, TASK_ERROR, TASK_START};
use crate::config::PoolConfig;
use crate::util::panic::panic_message;

use super::error::{SchedulerError, TaskError};
use super::future::TaskFuture;
use super::TaskId;

/// How long `shutdown` waits for each worker to exit before detaching it.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Snapshot of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Index within the pool.
    pub id: usize,
    /// `"<pool>-<index>"`.
    pub label: String,
    /// Whether the worker is running a task right now.
    pub busy: bool,
    /// Task being run, if busy.
    pub current_task_id: Option<TaskId>,
    /// Tasks this worker has finished (either outcome).
    pub processed: u64,
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Pool name.
    pub name: String,
    /// Number of workers.
    pub worker_count: usize,
    /// Whether the workers have been started.
    pub running: bool,
    /// Tasks currently executing.
    pub active_tasks: u64,
    /// Tasks waiting in the queue.
    pub queued_tasks: u64,
    /// Total tasks submitted.
    pub submitted_tasks: u64,
    /// Tasks that resolved.
    pub completed_tasks: u64,
    /// Tasks that were rejected by a failure or panic.
    pub failed_tasks: u64,
    /// Tasks rejected at shutdown without running.
    pub cancelled_tasks: u64,
    /// Per-worker state.
    pub workers: Vec<WorkerSnapshot>,
}

/// Internal counters for pool statistics.
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub queued_tasks: AtomicU64,
    pub submitted_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub cancelled_tasks: AtomicU64,
}

#[derive(Debug)]
struct WorkerState {
    id: usize,
    label: String,
    busy: bool,
    current_task_id: Option<TaskId>,
    processed: u64,
}

/// Per-worker execution context handed to task bodies.
pub(crate) struct ExecContext {
    #[cfg(feature = "tokio-runtime")]
    pub runtime: Option<tokio::runtime::Runtime>,
}

impl ExecContext {
    fn for_worker(label: &str) -> Self {
        #[cfg(feature = "tokio-runtime")]
        {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => Some(rt),
                Err(e) => {
                    error!(worker = %label, error = %e, "failed to create worker runtime; async tasks will be rejected");
                    None
                }
            };
            Self { runtime }
        }
        #[cfg(not(feature = "tokio-runtime"))]
        {
            let _ = label;
            Self {}
        }
    }
}

/// What a task body produced: the failure to report (if any) and a closure
/// that settles the task's future.
pub(crate) struct Settlement {
    pub error: Option<TaskError>,
    finish: Box<dyn FnOnce() + Send>,
}

impl Settlement {
    pub(crate) fn new<T>(future: TaskFuture<T>, outcome: Result<T, TaskError>) -> Self
    where
        T: Send + Sync + 'static,
    {
        let error = outcome.as_ref().err().cloned();
        Self {
            error,
            finish: Box::new(move || {
                match outcome {
                    Ok(value) => future.resolve(value),
                    Err(err) => future.reject(err),
                };
            }),
        }
    }

    fn finish(self) {
        (self.finish)();
    }
}

/// A type-erased task body.
pub(crate) trait Runnable: Send {
    /// Run the body to completion.
    fn run(self: Box<Self>, ctx: &ExecContext) -> Settlement;
    /// Reject without running.
    fn cancel(self: Box<Self>, reason: TaskError);
}

/// Synchronous closure body.
pub(crate) struct BlockingBody<T, F> {
    pub work: F,
    pub future: TaskFuture<T>,
}

impl<T, F> Runnable for BlockingBody<T, F>
where
    T: Send + Sync + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    fn run(self: Box<Self>, _ctx: &ExecContext) -> Settlement {
        let Self { work, future } = *self;
        let outcome = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(TaskError::Failed(format!("{err:#}"))),
            Err(payload) => Err(TaskError::Panicked(panic_message(&*payload))),
        };
        Settlement::new(future, outcome)
    }

    fn cancel(self: Box<Self>, reason: TaskError) {
        self.future.reject(reason);
    }
}

/// Async body driven on the worker's own current-thread runtime.
#[cfg(feature = "tokio-runtime")]
pub(crate) struct AsyncBody<T, Fut> {
    pub work: Fut,
    pub future: TaskFuture<T>,
}

#[cfg(feature = "tokio-runtime")]
impl<T, Fut> Runnable for AsyncBody<T, Fut>
where
    T: Send + Sync + 'static,
    Fut: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
{
    fn run(self: Box<Self>, ctx: &ExecContext) -> Settlement {
        let Self { work, future } = *self;
        let Some(runtime) = ctx.runtime.as_ref() else {
            return Settlement::new(
                future,
                Err(TaskError::Failed("worker has no async runtime".into())),
            );
        };
        let outcome = match catch_unwind(AssertUnwindSafe(|| runtime.block_on(work))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(TaskError::Failed(format!("{err:#}"))),
            Err(payload) => Err(TaskError::Panicked(panic_message(&*payload))),
        };
        Settlement::new(future, outcome)
    }

    fn cancel(self: Box<Self>, reason: TaskError) {
        self.future.reject(reason);
    }
}

/// A task sitting in a pool queue.
pub(crate) struct WorkerTask {
    pub id: TaskId,
    pub task_type: String,
    pub body: Box<dyn Runnable>,
}

/// A named pool of workers sharing one FIFO queue.
pub struct WorkerPool {
    name: String,
    config: PoolConfig,
    /// Option allows clean shutdown by dropping.
    task_tx: Mutex<Option<Sender<WorkerTask>>>,
    task_rx: Receiver<WorkerTask>,
    workers: Vec<Arc<Mutex<WorkerState>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    started: AtomicBool,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Allocate worker records and an empty queue. No threads are started.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] for zero workers.
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Result<Self, SchedulerError> {
        let name = name.into();
        if config.workers == 0 {
            return Err(SchedulerError::InvalidWorkerCount {
                pool: name,
                count: 0,
            });
        }

        let (task_tx, task_rx) = unbounded();
        let workers = (0..config.workers)
            .map(|id| {
                Arc::new(Mutex::new(WorkerState {
                    id,
                    label: format!("{name}-{id}"),
                    busy: false,
                    current_task_id: None,
                    processed: 0,
                }))
            })
            .collect();

        Ok(Self {
            name,
            config,
            task_tx: Mutex::new(Some(task_tx)),
            task_rx,
            workers,
            handles: Mutex::new(Vec::new()),
            counters: Arc::new(PoolCounters::default()),
            started: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of workers.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Whether workers have been started.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::Acquire) && !self.shutdown.load(Ordering::Acquire)
    }

    pub(crate) fn enqueue(&self, task: WorkerTask) -> Result<(), SchedulerError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        let task_id = task.id;

        let task_tx = self.task_tx.lock();
        let Some(tx) = task_tx.as_ref() else {
            return Err(SchedulerError::Shutdown);
        };
        // Count before sending so a fast worker never sees the gauge go negative.
        self.counters.queued_tasks.fetch_add(1, Ordering::Relaxed);
        if tx.send(task).is_err() {
            self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
            return Err(SchedulerError::Shutdown);
        }
        self.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
        debug!(pool = %self.name, task_id, "task queued");
        Ok(())
    }

    /// Spawn one thread per worker. Calling it again is a no-op.
    ///
    /// If a spawn fails the pool stays not running with the workers spawned
    /// so far; calling `start` again spawns only the missing ones.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Shutdown`] after shutdown, or
    /// [`SchedulerError::Spawn`] if the OS refuses a thread.
    pub fn start(&self, sink: &Arc<dyn EventSink>) -> Result<(), SchedulerError> {
        self.start_with(sink, |builder, ctx| builder.spawn(move || ctx.run()))
    }

    fn start_with<S>(&self, sink: &Arc<dyn EventSink>, mut spawn: S) -> Result<(), SchedulerError>
    where
        S: FnMut(thread::Builder, WorkerLoop) -> io::Result<JoinHandle<()>>,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }

        let mut handles = self.handles.lock();
        if handles.len() == self.workers.len() {
            return Ok(());
        }
        for state in self.workers.iter().skip(handles.len()) {
            let label = state.lock().label.clone();
            let ctx = WorkerLoop {
                pool: self.name.clone(),
                task_rx: self.task_rx.clone(),
                state: Arc::clone(state),
                counters: Arc::clone(&self.counters),
                shutdown: Arc::clone(&self.shutdown),
                sink: Arc::clone(sink),
            };

            let mut builder = thread::Builder::new().name(label.clone());
            if let Some(stack) = self.config.stack_size {
                builder = builder.stack_size(stack);
            }
            let handle = spawn(builder, ctx).map_err(|e| {
                warn!(pool = %self.name, worker = %label, spawned = handles.len(), "worker spawn failed");
                SchedulerError::Spawn {
                    worker: label,
                    reason: e.to_string(),
                }
            })?;
            handles.push(handle);
        }

        self.started.store(true, Ordering::Release);
        info!(pool = %self.name, workers = self.workers.len(), "worker pool started");
        Ok(())
    }

    /// Current statistics snapshot.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let c = &self.counters;
        PoolStats {
            name: self.name.clone(),
            worker_count: self.workers.len(),
            running: self.is_running(),
            active_tasks: c.active_tasks.load(Ordering::Relaxed),
            queued_tasks: c.queued_tasks.load(Ordering::Relaxed),
            submitted_tasks: c.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: c.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: c.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: c.cancelled_tasks.load(Ordering::Relaxed),
            workers: self
                .workers
                .iter()
                .map(|w| {
                    let w = w.lock();
                    WorkerSnapshot {
                        id: w.id,
                        label: w.label.clone(),
                        busy: w.busy,
                        current_task_id: w.current_task_id,
                        processed: w.processed,
                    }
                })
                .collect(),
        }
    }

    /// Shut the pool down.
    ///
    /// Stops accepting work, rejects anything still queued and joins the
    /// workers, detaching any that do not exit within two seconds.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pool = %self.name, "shutting down worker pool");

        // Dropping the sender unblocks every worker waiting in recv().
        self.task_tx.lock().take();

        let mut handles = self.handles.lock();
        if handles.is_empty() {
            // No workers will ever drain the queue; reject here.
            while let Ok(task) = self.task_rx.try_recv() {
                cancel_task(&self.name, task, &self.counters);
            }
            return;
        }

        let current = thread::current().id();
        for handle in handles.drain(..) {
            let label = handle.thread().name().unwrap_or("worker").to_string();
            if handle.thread().id() == current {
                warn!(worker = %label, "shutdown called from a worker of this pool; not joining itself");
                continue;
            }

            let (tx, rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = tx.send(handle.join().is_ok());
            });
            match rx.recv_timeout(JOIN_TIMEOUT) {
                Ok(true) => debug!(worker = %label, "worker joined"),
                Ok(false) => warn!(worker = %label, "worker panicked"),
                Err(_) => {
                    warn!(worker = %label, "worker did not exit within timeout - detaching");
                    continue;
                }
            }
            let _ = joiner.join();
        }
        info!(pool = %self.name, "worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join; explicit shutdown() joins.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.task_tx.lock().take();
            while let Ok(task) = self.task_rx.try_recv() {
                cancel_task(&self.name, task, &self.counters);
            }
        }
    }
}

fn cancel_task(pool: &str, task: WorkerTask, counters: &PoolCounters) {
    counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
    counters.cancelled_tasks.fetch_add(1, Ordering::Relaxed);
    debug!(pool = %pool, task_id = task.id, "rejecting queued task at shutdown");
    task.body
        .cancel(TaskError::Cancelled(format!("pool `{pool}` shut down")));
}

/// Everything one worker thread owns.
struct WorkerLoop {
    pool: String,
    task_rx: Receiver<WorkerTask>,
    state: Arc<Mutex<WorkerState>>,
    counters: Arc<PoolCounters>,
    shutdown: Arc<AtomicBool>,
    sink: Arc<dyn EventSink>,
}

impl WorkerLoop {
    fn run(self) {
        let label = self.state.lock().label.clone();
        debug!(worker = %label, "worker started");
        let ctx = ExecContext::for_worker(&label);

        // recv() blocks until work arrives and fails once the sender is
        // dropped and the queue is drained.
        while let Ok(task) = self.task_rx.recv() {
            if self.shutdown.load(Ordering::Acquire) {
                cancel_task(&self.pool, task, &self.counters);
                continue;
            }
            self.execute(&label, task, &ctx);
        }

        debug!(worker = %label, "worker exiting");
    }

    fn execute(&self, label: &str, task: WorkerTask, ctx: &ExecContext) {
        let WorkerTask { id, task_type, body } = task;

        self.counters.queued_tasks.fetch_sub(1, Ordering::Relaxed);
        self.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.state.lock();
            state.busy = true;
            state.current_task_id = Some(id);
        }

        let payload = json!({
            "pool": self.pool,
            "task_id": id,
            "task_type": task_type,
            "worker": label,
        });
        self.sink.publish(TASK_START, payload.clone());
        debug!(worker = %label, task_id = id, task_type = %task_type, "executing task");

        let settlement = body.run(ctx);

        match &settlement.error {
            None => {
                self.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
                self.sink.publish(TASK_END, payload);
            }
            Some(err) => {
                self.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                warn!(worker = %label, task_id = id, error = %err, "task failed");
                let mut payload = payload;
                payload["error"] = json!(err.to_string());
                self.sink.publish(TASK_ERROR, payload);
            }
        }

        {
            let mut state = self.state.lock();
            state.busy = false;
            state.current_task_id = None;
            state.processed += 1;
        }
        self.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);

        // Settle last so anyone woken by the future sees the events and an
        // idle worker.
        settlement.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl EventSink for Recorder {
        fn publish(&self, name: &str, data: Value) {
            self.events.lock().push((name.to_string(), data));
        }
    }

    fn queue_blocking<T, F>(pool: &WorkerPool, id: TaskId, work: F) -> TaskFuture<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let future = TaskFuture::for_task(id);
        pool.enqueue(WorkerTask {
            id,
            task_type: "test".into(),
            body: Box::new(BlockingBody {
                work,
                future: future.clone(),
            }),
        })
        .unwrap();
        future
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = WorkerPool::new("empty", PoolConfig::with_workers(0));
        assert!(matches!(
            err,
            Err(SchedulerError::InvalidWorkerCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_runs_task_and_publishes_lifecycle() {
        let recorder = Arc::new(Recorder::default());
        let sink: Arc<dyn EventSink> = recorder.clone();
        let pool = WorkerPool::new("io", PoolConfig::with_workers(1)).unwrap();
        pool.start(&sink).unwrap();

        let future = queue_blocking(&pool, 1, || Ok(21 * 2));
        assert_eq!(future.wait_timeout(Duration::from_secs(5)), Ok(42));

        let names: Vec<String> = recorder.events.lock().iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, vec![TASK_START, TASK_END]);

        let stats = pool.stats();
        assert_eq!(stats.completed_tasks, 1);
        assert_eq!(stats.queued_tasks, 0);
        assert_eq!(stats.active_tasks, 0);
        assert!(!stats.workers[0].busy);
        assert_eq!(stats.workers[0].label, "io-0");
        pool.shutdown();
    }

    #[test]
    fn test_panicking_task_rejects_and_worker_survives() {
        let sink: Arc<dyn EventSink> = Arc::new(Recorder::default());
        let pool = WorkerPool::new("io", PoolConfig::with_workers(1)).unwrap();
        pool.start(&sink).unwrap();

        let bad: TaskFuture<()> = queue_blocking(&pool, 1, || panic!("disk on fire"));
        let good = queue_blocking(&pool, 2, || Ok("ok"));

        assert_eq!(
            bad.wait_timeout(Duration::from_secs(5)),
            Err(TaskError::Panicked("disk on fire".into()))
        );
        assert_eq!(good.wait_timeout(Duration::from_secs(5)), Ok("ok"));
        assert_eq!(pool.stats().failed_tasks, 1);
        pool.shutdown();
    }

    #[test]
    fn test_shutdown_before_start_cancels_queued() {
        let pool = WorkerPool::new("idle", PoolConfig::with_workers(2)).unwrap();
        let future = queue_blocking(&pool, 1, || Ok(()));
        pool.shutdown();

        assert!(matches!(future.wait(), Err(TaskError::Cancelled(_))));
        assert_eq!(pool.stats().cancelled_tasks, 1);
        assert!(pool.enqueue(WorkerTask {
            id: 2,
            task_type: "late".into(),
            body: Box::new(BlockingBody {
                work: || -> anyhow::Result<()> { Ok(()) },
                future: TaskFuture::new(),
            }),
        })
        .is_err());
    }

    #[test]
    fn test_failed_spawn_leaves_pool_stopped_and_retry_completes() {
        let sink: Arc<dyn EventSink> = Arc::new(Recorder::default());
        let pool = WorkerPool::new("flaky", PoolConfig::with_workers(3)).unwrap();

        let mut attempts = 0;
        let err = pool
            .start_with(&sink, |builder, ctx| {
                attempts += 1;
                if attempts == 2 {
                    return Err(io::Error::other("thread limit reached"));
                }
                builder.spawn(move || ctx.run())
            })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Spawn { ref worker, .. } if worker == "flaky-1"));
        assert!(!pool.is_running());
        assert_eq!(pool.handles.lock().len(), 1);

        pool.start(&sink).unwrap();
        assert!(pool.is_running());
        assert_eq!(pool.handles.lock().len(), 3);

        let future = queue_blocking(&pool, 1, || Ok("ran"));
        assert_eq!(future.wait_timeout(Duration::from_secs(5)), Ok("ran"));
        pool.shutdown();
        assert!(pool.handles.lock().is_empty());
    }
}
