//! Tests for error types

use craftkernel::core::{BusError, ConfigError, KernelError, SchedulerError, TaskError};

#[test]
fn test_unknown_pool_error() {
    let err = SchedulerError::UnknownPool("mining".to_string());
    assert_eq!(format!("{}", err), "unknown pool: mining");
}

#[test]
fn test_invalid_worker_count_error() {
    let err = SchedulerError::InvalidWorkerCount {
        pool: "io".to_string(),
        count: 0,
    };
    assert_eq!(format!("{}", err), "pool `io` needs at least one worker, got 0");
}

#[test]
fn test_task_errors() {
    assert_eq!(
        format!("{}", TaskError::Failed("disk full".into())),
        "task failed: disk full"
    );
    assert_eq!(format!("{}", TaskError::Timeout), "wait timed out");
}

#[test]
fn test_bus_error() {
    let err = BusError::InvalidPattern {
        pattern: "[abc".to_string(),
        reason: "missing ']'".to_string(),
    };
    assert_eq!(format!("{}", err), "invalid pattern `[abc`: missing ']'");
}

#[test]
fn test_kernel_error_is_transparent() {
    let err: KernelError = SchedulerError::Shutdown.into();
    assert_eq!(format!("{}", err), "scheduler has been shut down");

    let err: KernelError = ConfigError::Invalid("bad".into()).into();
    assert!(matches!(err, KernelError::Config(ConfigError::Invalid(_))));
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn fails() -> craftkernel::core::AppResult<()> {
        let outcome: Result<(), TaskError> = Err(TaskError::Cancelled("shutdown".into()));
        outcome?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(err.to_string().contains("shutdown"));
}
