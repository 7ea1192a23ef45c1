//! Error types for scheduler construction and configuration.
//!
//! Scheduling operations themselves do not fail: retraction and topological
//! sorting report booleans, memory pressure only throttles admission.

use thiserror::Error;

/// Errors produced while building scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Configuration could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(String),
    /// The component has been shut down.
    #[error("scheduler shut down")]
    Shutdown,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
