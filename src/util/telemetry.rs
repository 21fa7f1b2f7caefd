//! Log subscriber setup for hosts that do not bring their own.
//!
//! Kernel logging goes straight to `tracing` and never through the event bus,
//! so a failing `log.*` listener cannot recurse into the logger.

use tracing_subscriber::EnvFilter;

/// Variable consulted first for filter directives.
pub const LOG_ENV: &str = "CRAFTKERNEL_LOG";

/// Directives used when neither [`LOG_ENV`] nor `RUST_LOG` is set: kernel
/// lifecycle at `info`, everything else at `warn`.
pub const DEFAULT_DIRECTIVES: &str = "craftkernel=info,warn";

/// Pick the filter directives from `lookup`: [`LOG_ENV`], then `RUST_LOG`,
/// then [`DEFAULT_DIRECTIVES`]. Blank values are skipped.
#[must_use]
pub fn log_directives<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(lookup)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

/// Install a `fmt` subscriber filtered by the process environment.
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    init_tracing_with(&log_directives(|key| std::env::var(key).ok()));
}

/// Install a `fmt` subscriber with explicit filter directives, tagging each
/// line with the worker thread name (`io-0`, `time-wheel`, ...).
///
/// Unparsable directives fall back to [`DEFAULT_DIRECTIVES`]. Returns true
/// if this call installed the subscriber.
pub fn init_tracing_with(directives: &str) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let (filter, rejected) = match EnvFilter::try_new(directives) {
        Ok(filter) => (filter, None),
        Err(e) => (EnvFilter::new(DEFAULT_DIRECTIVES), Some(e)),
    };
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_target(true)
        .try_init()
        .is_ok();
    if let Some(e) = rejected {
        tracing::warn!(directives, error = %e, "invalid log directives; using defaults");
    }
    installed
}
