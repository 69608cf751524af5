//! Scheduler error types

use thiserror::Error;

use crate::request::RequestError;

/// Errors returned by scheduler operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("Unknown thread: {0}")]
    UnknownThread(String),

    #[error("Thread already exists: {0}")]
    ThreadExists(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    #[error("Unknown thread event: {0}")]
    UnknownEvent(String),

    #[error("Scheduler is not running")]
    Closed,
}
