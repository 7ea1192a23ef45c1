//! Tests for error types

use prometheus_work_scheduler::core::{AppResult, SchedulerError};

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("worker_count must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: worker_count must be greater than 0"
    );
}

#[test]
fn test_config_error() {
    let err = SchedulerError::Config("no tokio runtime".to_string());
    assert_eq!(format!("{err}"), "configuration error: no tokio runtime");
}

#[test]
fn test_thread_spawn_error() {
    let err = SchedulerError::ThreadSpawn("resource temporarily unavailable".to_string());
    assert_eq!(
        format!("{err}"),
        "failed to spawn worker thread: resource temporarily unavailable"
    );
}

#[test]
fn test_shutdown_error() {
    assert_eq!(format!("{}", SchedulerError::Shutdown), "scheduler shut down");
}

#[test]
fn test_scheduler_error_into_app_result() {
    fn fails() -> AppResult<()> {
        Err(SchedulerError::Shutdown.into())
    }
    let err = fails().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::Shutdown)
    ));
}
