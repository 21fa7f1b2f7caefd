//! Tests for utility functions

use craftkernel::util::telemetry::{DEFAULT_DIRECTIVES, LOG_ENV};
use craftkernel::util::{init_tracing, init_tracing_with, log_directives, now_ms, panic_message};
use std::collections::HashMap;

#[test]
fn test_now_ms_is_monotonic_enough() {
    let a = now_ms();
    let b = now_ms();
    assert!(b >= a);
    assert!(a > 1_600_000_000_000);
}

#[test]
fn test_panic_message_from_worker_thread() {
    let handle = std::thread::spawn(|| panic!("worker {} died", 3));
    let payload = handle.join().unwrap_err();
    assert_eq!(panic_message(&*payload), "worker 3 died");
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    assert!(!init_tracing_with("craftkernel=debug"));
    tracing::info!("tracing initialized twice without panicking");
}

#[test]
fn test_log_directives_precedence() {
    let env = |pairs: &[(&str, &str)]| -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    };

    let none = env(&[]);
    assert_eq!(log_directives(|k| none.get(k).cloned()), DEFAULT_DIRECTIVES);

    let rust_log = env(&[("RUST_LOG", "debug")]);
    assert_eq!(log_directives(|k| rust_log.get(k).cloned()), "debug");

    let both = env(&[(LOG_ENV, " craftkernel::timer=trace "), ("RUST_LOG", "debug")]);
    assert_eq!(log_directives(|k| both.get(k).cloned()), "craftkernel::timer=trace");

    let blank = env(&[(LOG_ENV, "  "), ("RUST_LOG", "warn")]);
    assert_eq!(log_directives(|k| blank.get(k).cloned()), "warn");
}
