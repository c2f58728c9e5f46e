//! CLI output: error mapping from engine errors to stable CLI surface.

use crate::error::EngineError;

/// Map engine errors to a string for CLI output.
pub fn map_error(e: &EngineError) -> String {
    match e {
        EngineError::InvalidArgument(message) => format!("error: {}", message),
        EngineError::ConfigError(message) => format!("configuration error: {}", message),
        other => format!("error: {}", other),
    }
}
