//! Execution model: units, sub-groups, groups and the shared context of one invocation.

pub mod context;
pub mod group;
pub mod grouping;
pub mod handler;
pub mod result;
pub mod status;
pub mod sub_group;
pub mod unit;

pub use context::{ExecutionGroupContext, ProgressSnapshot, DEFAULT_POLL_INTERVAL};
pub use group::{ExecutionGroup, GroupingStrategy};
pub use grouping::{DependencyStrategy, ParallelStrategy, SequentialStrategy, StrategyKind};
pub use handler::{Invocation, UnitHandler};
pub use result::ExecutionResult;
pub use status::ExecutionStatus;
pub use sub_group::ExecutionSubGroup;
pub use unit::ExecutionUnit;

/// Bound for unit inputs.
pub trait UnitInput: Send + Sync + 'static {}

impl<T: Send + Sync + 'static> UnitInput for T {}

/// Bound for handler outputs; cloned whenever a result is read.
pub trait UnitOutput: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> UnitOutput for T {}
