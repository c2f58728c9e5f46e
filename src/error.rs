//! Error types for the grouped execution engine.

use crate::execution::ExecutionStatus;
use thiserror::Error;

/// Errors surfaced by the engine, the context and the grouping strategies.
///
/// Handler failures never show up here directly: they are recovered into unit status.
/// The type is `Clone` so the context's failure accumulator can be copied out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unit {id} cannot {operation} while {status}")]
    InvalidState {
        id: String,
        operation: &'static str,
        status: ExecutionStatus,
    },

    #[error("Unknown execution unit: {0}")]
    UnknownUnit(String),

    #[error("Worker pool is closed")]
    PoolClosed,

    #[error("Worker pool error: {0}")]
    PoolError(String),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

impl From<tokio::task::JoinError> for EngineError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            EngineError::TaskFailed("task was cancelled".to_string())
        } else {
            EngineError::TaskFailed(format!("task panicked: {}", err))
        }
    }
}
