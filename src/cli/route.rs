//! CLI route: single route table and run context.

use crate::cli::parse::Commands;
use crate::cli::presentation::{format_partition_text, format_results_json, format_results_text};
use crate::config::{ConfigLoader, EngineConfig};
use crate::engine::ExecutorEngine;
use crate::error::EngineError;
use crate::execution::ExecutionStatus;
use crate::plan::PlanFile;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Rendered command output and whether the command should exit successfully.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub text: String,
    pub success: bool,
}

/// Runtime context for CLI execution. Built from an optional config path using ConfigLoader only.
pub struct RunContext {
    config: EngineConfig,
}

impl RunContext {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, EngineError> {
        let config = match config_path {
            Some(ref path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        Ok(Self { config })
    }

    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn execute(&self, command: &Commands) -> Result<CommandOutput, EngineError> {
        match command {
            Commands::Run {
                plan,
                pool_size,
                timeout_secs,
                json,
            } => {
                self.run_plan(plan, *pool_size, timeout_secs.map(Duration::from_secs), *json)
                    .await
            }
            Commands::Validate { plan } => self.validate_plan(plan),
        }
    }

    async fn run_plan(
        &self,
        plan_path: &Path,
        pool_size: Option<usize>,
        timeout: Option<Duration>,
        json: bool,
    ) -> Result<CommandOutput, EngineError> {
        let plan = PlanFile::load(plan_path)?;
        let groups = plan.build_groups()?;

        let mut config = self.config.clone();
        if let Some(pool_size) = pool_size {
            config.pool_size = pool_size;
        }
        let engine = ExecutorEngine::from_config(&config)?;
        let context = engine.execute(groups)?;
        info!(
            plan = %plan_path.display(),
            invocation_id = %context.invocation_id(),
            "Plan submitted"
        );

        let finished = match timeout {
            Some(timeout) => context.wait_timeout(timeout).await,
            None => {
                context.wait().await;
                true
            }
        };
        if !finished {
            warn!(invocation_id = %context.invocation_id(), "Run timed out, cancelling");
            context.cancel();
            context.wait_timeout(config.shutdown_grace()).await;
        }
        engine.close()?;

        let all_succeeded = context
            .list_results()
            .iter()
            .all(|(_, result)| result.status == ExecutionStatus::Succeeded);
        let success = finished && all_succeeded && context.failures().is_empty();

        let text = if json {
            format_results_json(&*context)?
        } else {
            format_results_text(&*context)
        };
        Ok(CommandOutput { text, success })
    }

    fn validate_plan(&self, plan_path: &Path) -> Result<CommandOutput, EngineError> {
        let plan = PlanFile::load(plan_path)?;
        let groups = plan.build_groups()?;
        Ok(CommandOutput {
            text: format_partition_text(&groups),
            success: true,
        })
    }
}
