//! Configuration System
//!
//! Engine settings loaded from defaults, an optional user-level config file, an optional
//! explicit file and `GROUPEXEC_*` environment variables, in that order of precedence
//! (later sources override earlier ones).

use crate::error::EngineError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

mod merge;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker pool size; 0 means cached (no cap on concurrent sub-groups)
    #[serde(default)]
    pub pool_size: usize,

    /// Fallback interval for completion checks (milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Grace period for in-flight tasks when the engine is closed (milliseconds)
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Name given to worker threads
    #[serde(default = "default_worker_thread_name")]
    pub worker_thread_name: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

fn default_worker_thread_name() -> String {
    "groupexec-worker".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 0,
            poll_interval_ms: default_poll_interval_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            worker_thread_name: default_worker_thread_name(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::ConfigError(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.worker_thread_name.trim().is_empty() {
            return Err(EngineError::ConfigError(
                "worker_thread_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Loads [`EngineConfig`] through the `config` crate.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the user-level file, then environment.
    pub fn load() -> Result<EngineConfig, EngineError> {
        Self::load_with(None)
    }

    /// Like [`load`](Self::load), with `path` layered between the user-level file and the
    /// environment. The file must exist.
    pub fn load_from_file(path: &Path) -> Result<EngineConfig, EngineError> {
        Self::load_with(Some(path))
    }

    fn load_with(path: Option<&Path>) -> Result<EngineConfig, EngineError> {
        let mut builder = merge::merge_policy::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(path) = path {
            builder = sources::explicit_file::add_to_builder(builder, path)?;
        }
        builder = sources::environment::add_to_builder(builder);

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
