//! groupexec: Grouped Execution Engine
//!
//! Runs batches of execution groups. Groups run one after another; each group is split by a
//! grouping strategy into sub-groups that run concurrently on a bounded worker pool, while the
//! units inside a sub-group run in order. Every unit's status and result is tracked in a shared
//! context that callers can query, wait on, terminate or skip units through.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod logging;
pub mod plan;

pub use config::{ConfigLoader, EngineConfig};
pub use engine::{ExecutorEngine, ShutdownService, WorkerPool};
pub use error::EngineError;
pub use execution::{
    DependencyStrategy, ExecutionGroup, ExecutionGroupContext, ExecutionResult, ExecutionStatus,
    ExecutionSubGroup, ExecutionUnit, GroupingStrategy, Invocation, ParallelStrategy,
    ProgressSnapshot, SequentialStrategy, StrategyKind, UnitHandler, UnitInput, UnitOutput,
};
