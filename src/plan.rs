//! Plan files
//!
//! TOML description of groups and units for dry runs of the engine. Each unit is executed by
//! [`SimulatedHandler`], which sleeps for the unit's duration and optionally fails.
//!
//! ```toml
//! [[group]]
//! name = "create-tables"
//! strategy = "dependency"
//!
//! [[group.unit]]
//! id = "ds_0.t_order"
//! duration_ms = 200
//!
//! [[group.unit]]
//! id = "ds_0.t_order_item"
//! depends_on = ["ds_0.t_order"]
//! ```

use crate::error::EngineError;
use crate::execution::{
    DependencyStrategy, ExecutionGroup, ExecutionUnit, GroupingStrategy, Invocation,
    ParallelStrategy, SequentialStrategy, StrategyKind, UnitHandler,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(rename = "group", default)]
    pub groups: Vec<PlanGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanGroup {
    pub name: String,
    #[serde(default)]
    pub strategy: StrategyKind,
    #[serde(rename = "unit", default)]
    pub units: Vec<PlanUnit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanUnit {
    pub id: String,
    /// Defaults to the unit's position in the file, starting at 1.
    #[serde(default)]
    pub order: Option<i64>,
    /// Ids this unit must run after; only used by the dependency strategy.
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub fail: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Input of a simulated unit.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    pub duration: Duration,
    pub fail: bool,
    pub message: Option<String>,
}

impl PlanFile {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            EngineError::InvalidArgument(format!("Failed to read plan {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let plan: PlanFile = toml::from_str(text)
            .map_err(|e| EngineError::InvalidArgument(format!("Invalid plan: {}", e)))?;
        if plan.groups.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Plan must contain at least one [[group]]".to_string(),
            ));
        }
        Ok(plan)
    }

    pub fn unit_count(&self) -> usize {
        self.groups.iter().map(|group| group.units.len()).sum()
    }

    /// Build execution groups backed by [`SimulatedHandler`].
    pub fn build_groups(&self) -> Result<Vec<ExecutionGroup<SimulatedWork, String>>, EngineError> {
        let handler: Arc<dyn UnitHandler<SimulatedWork, String>> = Arc::new(SimulatedHandler);
        let mut position = 0i64;
        let mut groups = Vec::with_capacity(self.groups.len());

        for group in &self.groups {
            let units = group
                .units
                .iter()
                .map(|unit| {
                    position += 1;
                    ExecutionUnit::new(
                        unit.id.clone(),
                        unit.order.unwrap_or(position),
                        Arc::clone(&handler),
                        SimulatedWork {
                            duration: Duration::from_millis(unit.duration_ms),
                            fail: unit.fail,
                            message: unit.message.clone(),
                        },
                    )
                })
                .collect();

            let strategy: Box<dyn GroupingStrategy<SimulatedWork, String>> = match group.strategy {
                StrategyKind::Sequential => Box::new(SequentialStrategy),
                StrategyKind::Parallel => Box::new(ParallelStrategy),
                StrategyKind::Dependency => Box::new(DependencyStrategy::new(
                    group
                        .units
                        .iter()
                        .filter(|unit| !unit.depends_on.is_empty())
                        .map(|unit| (unit.id.clone(), unit.depends_on.clone()))
                        .collect::<HashMap<_, _>>(),
                )),
            };
            groups.push(ExecutionGroup::new(group.name.clone(), units, strategy.as_ref())?);
        }
        Ok(groups)
    }
}

/// Sleeps for the unit's duration in short slices, then succeeds or fails as configured.
///
/// A terminated unit stops early and returns what it has; a cancelled invocation stops it
/// early with an error, since the work never completed.
pub struct SimulatedHandler;

impl SimulatedHandler {
    const SLICE: Duration = Duration::from_millis(10);
}

#[async_trait]
impl UnitHandler<SimulatedWork, String> for SimulatedHandler {
    async fn execute(
        &self,
        invocation: &Invocation<'_, SimulatedWork, String>,
    ) -> anyhow::Result<String> {
        let work = invocation.input();
        let started = Instant::now();
        while started.elapsed() < work.duration {
            if invocation.is_terminating() {
                return Ok(format!("stopped after {}ms", started.elapsed().as_millis()));
            }
            if invocation.context().is_cancelled() {
                anyhow::bail!("cancelled after {}ms", started.elapsed().as_millis());
            }
            let remaining = work.duration.saturating_sub(started.elapsed());
            tokio::time::sleep(remaining.min(Self::SLICE)).await;
        }

        if work.fail {
            anyhow::bail!(
                "{}",
                work.message.clone().unwrap_or_else(|| "simulated failure".to_string())
            );
        }
        Ok(work
            .message
            .clone()
            .unwrap_or_else(|| format!("completed in {}ms", started.elapsed().as_millis())))
    }
}
