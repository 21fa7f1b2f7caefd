//! Scheduler owning the named worker pools.
//!
//! Pools are independent concurrency domains: disk I/O work queued on `io`
//! cannot starve UI refresh work queued on `ui`. Ordering is FIFO within a
//! pool and unspecified across pools.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};
use serde_json::json;
use tracing::{debug, info};

use crate::bus::{EventSink, POOL_CREATED};
use crate::config::PoolConfig;

use super::error::SchedulerError;
use super::future::TaskFuture;
use super::worker_pool::{BlockingBody, PoolStats, WorkerPool, WorkerTask};
use super::TaskId;

/// Owner of every worker pool and the task id sequence.
pub struct Scheduler {
    pools: RwLock<BTreeMap<String, Arc<WorkerPool>>>,
    sink: Arc<dyn EventSink>,
    next_task_id: AtomicU64,
    running: AtomicBool,
    /// True once shut down; paired with `stopped_cv` for `run_workers`.
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl Scheduler {
    /// Create a scheduler that publishes lifecycle events into `sink`.
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            pools: RwLock::new(BTreeMap::new()),
            sink,
            next_task_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            stopped: Mutex::new(false),
            stopped_cv: Condvar::new(),
        }
    }

    /// Create a pool with `worker_count` workers and publish
    /// `scheduler.poolCreated`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::DuplicatePool`],
    /// [`SchedulerError::InvalidWorkerCount`] or [`SchedulerError::Shutdown`].
    pub fn create_pool(&self, name: &str, worker_count: usize) -> Result<(), SchedulerError> {
        self.create_pool_with(name, PoolConfig::with_workers(worker_count))
    }

    /// Create a pool from a full [`PoolConfig`].
    ///
    /// If workers are already running, the new pool's workers start at once.
    ///
    /// # Errors
    ///
    /// Same as [`create_pool`](Self::create_pool), plus
    /// [`SchedulerError::Spawn`] when starting immediately fails.
    pub fn create_pool_with(&self, name: &str, config: PoolConfig) -> Result<(), SchedulerError> {
        if self.is_shutdown() {
            return Err(SchedulerError::Shutdown);
        }
        let workers = config.workers;
        let pool = Arc::new(WorkerPool::new(name, config)?);

        {
            let mut pools = self.pools.write();
            if pools.contains_key(name) {
                return Err(SchedulerError::DuplicatePool(name.to_string()));
            }
            pools.insert(name.to_string(), Arc::clone(&pool));
        }

        if self.running.load(Ordering::Acquire) {
            pool.start(&self.sink)?;
        }

        info!(pool = %name, workers, "pool created");
        self.sink
            .publish(POOL_CREATED, json!({ "pool": name, "workers": workers }));
        Ok(())
    }

    fn pool(&self, name: &str) -> Result<Arc<WorkerPool>, SchedulerError> {
        self.pools
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownPool(name.to_string()))
    }

    fn next_id(&self) -> TaskId {
        self.next_task_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `work` on `pool` and return its future immediately.
    ///
    /// `task_type` is a free-form label carried in `task.*` events. The value
    /// is shared by every clone of the future, so it must be `Sync`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::UnknownPool`] for a pool that was never
    /// created and [`SchedulerError::Shutdown`] after shutdown.
    pub fn submit<T, F>(
        &self,
        pool: &str,
        task_type: &str,
        work: F,
    ) -> Result<TaskFuture<T>, SchedulerError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let pool = self.pool(pool)?;
        let id = self.next_id();
        let future = TaskFuture::for_task(id);
        pool.enqueue(WorkerTask {
            id,
            task_type: task_type.to_string(),
            body: Box::new(BlockingBody {
                work,
                future: future.clone(),
            }),
        })?;
        Ok(future)
    }

    /// Queue an async body on `pool`. The worker drives it on its own
    /// current-thread runtime, so the body may `.await` timers and I/O.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    #[cfg(feature = "tokio-runtime")]
    pub fn submit_async<T, Fut>(
        &self,
        pool: &str,
        task_type: &str,
        work: Fut,
    ) -> Result<TaskFuture<T>, SchedulerError>
    where
        T: Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let pool = self.pool(pool)?;
        let id = self.next_id();
        let future = TaskFuture::for_task(id);
        pool.enqueue(WorkerTask {
            id,
            task_type: task_type.to_string(),
            body: Box::new(super::worker_pool::AsyncBody {
                work,
                future: future.clone(),
            }),
        })?;
        Ok(future)
    }

    /// Start every pool's workers and return.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Shutdown`] after shutdown or
    /// [`SchedulerError::Spawn`] if a worker thread cannot be created.
    pub fn start_workers(&self) -> Result<(), SchedulerError> {
        if self.is_shutdown() {
            return Err(SchedulerError::Shutdown);
        }
        self.running.store(true, Ordering::Release);

        let pools: Vec<Arc<WorkerPool>> = self.pools.read().values().cloned().collect();
        for pool in &pools {
            pool.start(&self.sink)?;
        }
        info!(pools = pools.len(), "workers started");
        Ok(())
    }

    /// Start every worker and block until [`shutdown`](Self::shutdown).
    ///
    /// # Errors
    ///
    /// Same as [`start_workers`](Self::start_workers).
    pub fn run_workers(&self) -> Result<(), SchedulerError> {
        self.start_workers()?;
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.stopped_cv.wait(&mut stopped);
        }
        debug!("run_workers returning after shutdown");
        Ok(())
    }

    /// Whether workers have been started and not shut down.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.stopped.lock()
    }

    /// Stop accepting work, reject queued tasks, join workers and release
    /// any caller blocked in [`run_workers`](Self::run_workers).
    pub fn shutdown(&self) {
        {
            let mut stopped = self.stopped.lock();
            if *stopped {
                return;
            }
            *stopped = true;
        }
        self.running.store(false, Ordering::Release);

        let pools: Vec<Arc<WorkerPool>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.shutdown();
        }
        self.stopped_cv.notify_all();
        info!("scheduler shut down");
    }

    /// Snapshot of one pool, or `None` for an unknown name.
    #[must_use]
    pub fn pool_stats(&self, name: &str) -> Option<PoolStats> {
        self.pools.read().get(name).map(|p| p.stats())
    }

    /// Snapshots of every pool, ordered by name.
    #[must_use]
    pub fn pools(&self) -> Vec<PoolStats> {
        self.pools.read().values().map(|p| p.stats()).collect()
    }

    /// Names of every pool, sorted.
    #[must_use]
    pub fn pool_names(&self) -> Vec<String> {
        self.pools.read().keys().cloned().collect()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    struct Discard;

    impl EventSink for Discard {
        fn publish(&self, _name: &str, _data: Value) {}
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(Arc::new(Discard))
    }

    #[test]
    fn test_unknown_pool_fails_fast() {
        let sched = scheduler();
        let err = sched.submit("nope", "t", || Ok(1)).unwrap_err();
        assert_eq!(err, SchedulerError::UnknownPool("nope".into()));
    }

    #[test]
    fn test_duplicate_pool() {
        let sched = scheduler();
        sched.create_pool("io", 1).unwrap();
        assert_eq!(
            sched.create_pool("io", 2),
            Err(SchedulerError::DuplicatePool("io".into()))
        );
    }

    #[test]
    fn test_task_ids_are_monotonic_across_pools() {
        let sched = scheduler();
        sched.create_pool("a", 1).unwrap();
        sched.create_pool("b", 1).unwrap();
        let f1 = sched.submit("a", "t", || Ok(())).unwrap();
        let f2 = sched.submit("b", "t", || Ok(())).unwrap();
        let f3 = sched.submit("a", "t", || Ok(())).unwrap();
        assert_eq!(f1.task_id(), Some(1));
        assert_eq!(f2.task_id(), Some(2));
        assert_eq!(f3.task_id(), Some(3));
    }

    #[test]
    fn test_submit_after_shutdown() {
        let sched = scheduler();
        sched.create_pool("io", 1).unwrap();
        sched.shutdown();
        assert_eq!(
            sched.submit("io", "t", || Ok(())).unwrap_err(),
            SchedulerError::Shutdown
        );
        assert_eq!(sched.start_workers(), Err(SchedulerError::Shutdown));
    }
}
