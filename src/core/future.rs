//! One-shot task futures.
//!
//! A [`TaskFuture`] is the caller's handle on a submitted task. It completes
//! exactly once, either resolved with the task's value or rejected with a
//! [`TaskError`]; the first completion wins and later attempts are ignored.
//!
//! Waiting blocks on a `parking_lot` Condvar, so there is no polling loop.
//! Continuations registered with [`TaskFuture::and_then`],
//! [`TaskFuture::or_else`] or [`TaskFuture::on_complete`] run on the
//! completing thread, or immediately on the registering thread when the future
//! is already terminal. Waiters are released only after the continuations
//! queued at completion have run, so a continuation must not block on its own
//! future.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::TaskError;
use super::TaskId;

/// Completion state of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutureState {
    /// Not completed yet.
    Pending,
    /// Completed with a value.
    Resolved,
    /// Completed with an error.
    Rejected,
}

type Outcome<T> = Arc<Result<T, TaskError>>;
type Continuation<T> = Box<dyn FnOnce(Result<&T, &TaskError>) + Send + 'static>;

struct FutureEntry<T> {
    outcome: Option<Outcome<T>>,
    continuations: Vec<Continuation<T>>,
    /// Set once the continuations queued at completion have run; waiters
    /// only return after this.
    settled: bool,
}

impl<T> FutureEntry<T> {
    fn settled_outcome(&self) -> Option<&Result<T, TaskError>> {
        if self.settled {
            self.outcome.as_deref()
        } else {
            None
        }
    }
}

struct Shared<T> {
    entry: Mutex<FutureEntry<T>>,
    ready: Condvar,
}

/// Handle on the eventual result of a task.
///
/// Cloning is cheap; all clones observe the same completion.
pub struct TaskFuture<T> {
    shared: Arc<Shared<T>>,
    task_id: Option<TaskId>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            task_id: self.task_id,
        }
    }
}

impl<T> Default for TaskFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskFuture")
            .field("task_id", &self.task_id)
            .field("state", &self.state())
            .finish()
    }
}

impl<T> TaskFuture<T> {
    /// Create a pending future that is not tied to any task.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                entry: Mutex::new(FutureEntry {
                    outcome: None,
                    continuations: Vec::new(),
                    settled: false,
                }),
                ready: Condvar::new(),
            }),
            task_id: None,
        }
    }

    pub(crate) fn for_task(task_id: TaskId) -> Self {
        let mut future = Self::new();
        future.task_id = Some(task_id);
        future
    }

    /// Identifier of the task this future belongs to, if any.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    /// Current completion state.
    #[must_use]
    pub fn state(&self) -> FutureState {
        match self.shared.entry.lock().outcome.as_deref() {
            None => FutureState::Pending,
            Some(Ok(_)) => FutureState::Resolved,
            Some(Err(_)) => FutureState::Rejected,
        }
    }

    /// True once the future resolved with a value.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state() == FutureState::Resolved
    }

    /// True once the future was rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.state() == FutureState::Rejected
    }

    /// True once the future is resolved or rejected.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state() != FutureState::Pending
    }

    /// Resolve with a value. Returns false if the future was already terminal.
    pub fn resolve(&self, value: T) -> bool {
        self.complete(Ok(value))
    }

    /// Reject with an error. Returns false if the future was already terminal.
    pub fn reject(&self, error: TaskError) -> bool {
        self.complete(Err(error))
    }

    fn complete(&self, outcome: Result<T, TaskError>) -> bool {
        let (outcome, continuations) = {
            let mut entry = self.shared.entry.lock();
            if entry.outcome.is_some() {
                return false;
            }
            let outcome = Arc::new(outcome);
            entry.outcome = Some(Arc::clone(&outcome));
            (outcome, std::mem::take(&mut entry.continuations))
        };

        for continuation in continuations {
            run_continuation(continuation, &outcome);
        }

        self.shared.entry.lock().settled = true;
        self.shared.ready.notify_all();
        true
    }

    /// Register a continuation for either outcome.
    ///
    /// Runs immediately on this thread if the future is already terminal.
    /// Threads blocked in [`wait`](Self::wait) are released after every
    /// continuation registered before completion has returned.
    pub fn on_complete<F>(&self, callback: F)
    where
        F: FnOnce(Result<&T, &TaskError>) + Send + 'static,
    {
        let outcome = {
            let mut entry = self.shared.entry.lock();
            match entry.outcome.as_ref() {
                Some(outcome) => Arc::clone(outcome),
                None => {
                    entry.continuations.push(Box::new(callback));
                    return;
                }
            }
        };
        run_continuation(Box::new(callback), &outcome);
    }

    /// Register a continuation that only runs on resolution.
    pub fn and_then<F>(&self, callback: F)
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Ok(value) = outcome {
                callback(value);
            }
        });
    }

    /// Register a continuation that only runs on rejection.
    pub fn or_else<F>(&self, callback: F)
    where
        F: FnOnce(&TaskError) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(error) = outcome {
                callback(error);
            }
        });
    }
}

impl<T: Clone> TaskFuture<T> {
    /// The outcome if the future is terminal, without blocking.
    #[must_use]
    pub fn try_outcome(&self) -> Option<Result<T, TaskError>> {
        self.shared.entry.lock().settled_outcome().cloned()
    }

    /// Block the current thread until the future completes.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the task failed.
    pub fn wait(&self) -> Result<T, TaskError> {
        let mut entry = self.shared.entry.lock();
        loop {
            if let Some(outcome) = entry.settled_outcome() {
                return outcome.clone();
            }
            self.shared.ready.wait(&mut entry);
        }
    }

    /// Block until the future completes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the task failed, or
    /// [`TaskError::Timeout`] if the wait gave up first.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        let deadline = Instant::now() + timeout;
        let mut entry = self.shared.entry.lock();
        loop {
            if let Some(outcome) = entry.settled_outcome() {
                return outcome.clone();
            }
            if self.shared.ready.wait_until(&mut entry, deadline).timed_out() {
                return entry
                    .settled_outcome()
                    .cloned()
                    .unwrap_or(Err(TaskError::Timeout));
            }
        }
    }
}

#[cfg(feature = "tokio-runtime")]
impl<T: Clone + Send + 'static> TaskFuture<T> {
    /// Wait for completion from async code without blocking the runtime.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason if the task failed.
    pub async fn wait_async(&self) -> Result<T, TaskError> {
        if let Some(outcome) = self.try_outcome() {
            return outcome;
        }
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.on_complete(move |outcome| {
            let _ = tx.send(outcome.cloned().map_err(Clone::clone));
        });
        rx.await
            .unwrap_or_else(|_| Err(TaskError::Cancelled("future dropped before completion".into())))
    }
}

fn run_continuation<T>(continuation: Continuation<T>, outcome: &Outcome<T>) {
    let outcome = (**outcome).as_ref();
    if catch_unwind(AssertUnwindSafe(|| continuation(outcome))).is_err() {
        warn!("future continuation panicked; remaining continuations still run");
    }
}
