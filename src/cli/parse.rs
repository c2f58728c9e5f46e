//! CLI parse: clap types for groupexec. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// groupexec - run grouped execution plans
#[derive(Parser)]
#[command(name = "groupexec")]
#[command(about = "Run ordered groups of concurrent, sequentially chained units")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (layered over the user-level config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true, default_value = "false")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a plan with simulated units and report every unit's result
    Run {
        /// Plan file (TOML)
        plan: PathBuf,
        /// Worker pool size (0 = cached); overrides configuration
        #[arg(long)]
        pool_size: Option<usize>,
        /// Give up waiting after this many seconds and cancel the run
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a plan and show how each group is split into sub-groups
    Validate {
        /// Plan file (TOML)
        plan: PathBuf,
    },
}
