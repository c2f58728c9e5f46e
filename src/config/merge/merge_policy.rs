//! Merge rules: defaults first, every later source overrides.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("pool_size", 0)?
        .set_default("poll_interval_ms", 500)?
        .set_default("shutdown_grace_ms", 5_000)?
        .set_default("worker_thread_name", "groupexec-worker")
}
