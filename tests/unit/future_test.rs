//! Tests for task futures outside any pool

use craftkernel::core::{FutureState, TaskError, TaskFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_first_completion_wins() {
    let future: TaskFuture<i32> = TaskFuture::new();
    assert_eq!(future.state(), FutureState::Pending);
    assert!(future.resolve(1));
    assert!(!future.reject(TaskError::Failed("late".into())));
    assert!(!future.resolve(2));
    assert_eq!(future.wait(), Ok(1));
    assert_eq!(future.state(), FutureState::Resolved);
}

#[test]
fn test_wait_timeout_on_pending_future() {
    let future: TaskFuture<()> = TaskFuture::new();
    assert_eq!(
        future.wait_timeout(Duration::from_millis(20)),
        Err(TaskError::Timeout)
    );
    assert!(!future.is_terminal());
}

#[test]
fn test_resolve_from_another_thread_wakes_waiter() {
    let future: TaskFuture<String> = TaskFuture::new();
    let producer = future.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(10));
        producer.resolve("done".to_string());
    });
    assert_eq!(future.wait(), Ok("done".to_string()));
    handle.join().expect("producer thread");
}

#[test]
fn test_late_continuation_runs_immediately() {
    let future: TaskFuture<u8> = TaskFuture::new();
    future.reject(TaskError::Cancelled("shutdown".into()));

    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    future.or_else(move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    });
    let h = Arc::clone(&hits);
    future.and_then(move |_| {
        h.fetch_add(100, Ordering::SeqCst);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_panicking_continuation_does_not_block_others() {
    let future: TaskFuture<u8> = TaskFuture::new();
    let hits = Arc::new(AtomicUsize::new(0));

    future.on_complete(|_| panic!("continuation exploded"));
    let h = Arc::clone(&hits);
    future.on_complete(move |outcome| {
        assert_eq!(outcome, Ok(&9));
        h.fetch_add(1, Ordering::SeqCst);
    });

    assert!(future.resolve(9));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_waiter_sees_effects_of_slow_continuation() {
    let future: TaskFuture<u8> = TaskFuture::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let h = Arc::clone(&hits);
    future.and_then(move |v| {
        std::thread::sleep(Duration::from_millis(50));
        h.fetch_add(usize::from(*v), Ordering::SeqCst);
    });

    let producer = future.clone();
    let handle = std::thread::spawn(move || {
        producer.resolve(4);
    });

    assert_eq!(future.wait_timeout(Duration::from_secs(5)), Ok(4));
    assert_eq!(hits.load(Ordering::SeqCst), 4);
    handle.join().expect("producer thread");
}
