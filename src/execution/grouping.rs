//! Built-in grouping strategies.

use crate::error::EngineError;
use crate::execution::group::GroupingStrategy;
use crate::execution::sub_group::ExecutionSubGroup;
use crate::execution::unit::ExecutionUnit;
use crate::execution::{UnitInput, UnitOutput};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Name of a built-in strategy, as used in plan files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Sequential,
    #[default]
    Parallel,
    Dependency,
}

/// All units in one sub-group, in declaration order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl<I: UnitInput, R: UnitOutput> GroupingStrategy<I, R> for SequentialStrategy {
    fn list_sub_groups(
        &self,
        units: &[Arc<ExecutionUnit<I, R>>],
    ) -> Result<Vec<ExecutionSubGroup<I, R>>, EngineError> {
        Ok(vec![ExecutionSubGroup::new(units.to_vec())])
    }
}

/// One sub-group per unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelStrategy;

impl<I: UnitInput, R: UnitOutput> GroupingStrategy<I, R> for ParallelStrategy {
    fn list_sub_groups(
        &self,
        units: &[Arc<ExecutionUnit<I, R>>],
    ) -> Result<Vec<ExecutionSubGroup<I, R>>, EngineError> {
        Ok(units
            .iter()
            .map(|unit| ExecutionSubGroup::new(vec![Arc::clone(unit)]))
            .collect())
    }
}

/// Groups units connected by dependencies, e.g. a child table and the parent tables its
/// foreign keys reference.
///
/// Each connected set of units becomes one sub-group ordered so that a unit runs after
/// everything it depends on (ties broken by `order`, then id). Unrelated sets run in parallel.
/// Dependencies on ids outside the group are ignored.
#[derive(Debug, Clone, Default)]
pub struct DependencyStrategy {
    /// unit id -> ids it depends on
    dependencies: HashMap<String, Vec<String>>,
}

impl DependencyStrategy {
    pub fn new(dependencies: HashMap<String, Vec<String>>) -> Self {
        Self { dependencies }
    }

    pub fn depends_on(mut self, id: impl Into<String>, parent: impl Into<String>) -> Self {
        self.dependencies
            .entry(id.into())
            .or_default()
            .push(parent.into());
        self
    }
}

impl<I: UnitInput, R: UnitOutput> GroupingStrategy<I, R> for DependencyStrategy {
    fn list_sub_groups(
        &self,
        units: &[Arc<ExecutionUnit<I, R>>],
    ) -> Result<Vec<ExecutionSubGroup<I, R>>, EngineError> {
        let position: HashMap<&str, usize> = units
            .iter()
            .enumerate()
            .map(|(index, unit)| (unit.id(), index))
            .collect();

        // edges[parent] = children
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
        let mut in_degree = vec![0usize; units.len()];
        let mut components = DisjointSet::new(units.len());
        for (child, unit) in units.iter().enumerate() {
            let Some(parents) = self.dependencies.get(unit.id()) else {
                continue;
            };
            for parent in parents {
                let Some(&parent) = position.get(parent.as_str()) else {
                    continue;
                };
                if parent == child {
                    return Err(EngineError::InvalidArgument(format!(
                        "Unit '{}' depends on itself",
                        unit.id()
                    )));
                }
                if edges[parent].contains(&child) {
                    continue;
                }
                edges[parent].push(child);
                in_degree[child] += 1;
                components.union(parent, child);
            }
        }

        let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
        for index in 0..units.len() {
            members.entry(components.find(index)).or_default().push(index);
        }

        let mut sub_groups = Vec::with_capacity(members.len());
        for component in members.into_values() {
            let sorted = topological_order(units, &component, &edges, &mut in_degree)?;
            sub_groups.push(sorted);
        }
        sub_groups.sort_by(|a, b| {
            let key = |chain: &Vec<usize>| {
                chain
                    .iter()
                    .map(|&index| (units[index].order(), units[index].id()))
                    .min()
            };
            key(a).cmp(&key(b))
        });

        Ok(sub_groups
            .into_iter()
            .map(|chain| {
                ExecutionSubGroup::new(chain.into_iter().map(|i| Arc::clone(&units[i])).collect())
            })
            .collect())
    }
}

/// Kahn's algorithm restricted to one component; ready units are taken by (order, id).
fn topological_order<I: UnitInput, R: UnitOutput>(
    units: &[Arc<ExecutionUnit<I, R>>],
    component: &[usize],
    edges: &[Vec<usize>],
    in_degree: &mut [usize],
) -> Result<Vec<usize>, EngineError> {
    let mut ready: BTreeSet<(i64, &str, usize)> = component
        .iter()
        .filter(|&&index| in_degree[index] == 0)
        .map(|&index| (units[index].order(), units[index].id(), index))
        .collect();

    let mut sorted = Vec::with_capacity(component.len());
    while let Some(next) = ready.pop_first() {
        let index = next.2;
        sorted.push(index);
        for &child in &edges[index] {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                ready.insert((units[child].order(), units[child].id(), child));
            }
        }
    }

    if sorted.len() < component.len() {
        let mut cycle: Vec<&str> = component
            .iter()
            .filter(|&&index| in_degree[index] > 0)
            .map(|&index| units[index].id())
            .collect();
        cycle.sort_unstable();
        return Err(EngineError::InvalidArgument(format!(
            "Dependency cycle between units: {}",
            cycle.join(", ")
        )));
    }
    Ok(sorted)
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a != b {
            self.parent[b] = a;
        }
    }
}
