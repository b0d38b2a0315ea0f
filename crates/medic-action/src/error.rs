//! Error types for the coordination engine.

use crate::types::{ActionStatus, ActionType};

/// Errors surfaced synchronously by store and coordinator operations.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Action not found: {0}")]
    NotFound(String),
    #[error("Action already exists: {0}")]
    DuplicateId(String),
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ActionStatus,
        to: ActionStatus,
    },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// Errors from a single executor call. Terminal to that action only.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Executor failed: {0}")]
    Failed(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("No executor registered for {0}")]
    Unregistered(ActionType),
    #[error("Executor panicked: {0}")]
    Panicked(String),
}

/// Errors from a scheduler tick as a whole.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler failed: {0}")]
    Failed(String),
    #[error("Store error: {0}")]
    Store(#[from] ActionError),
}
