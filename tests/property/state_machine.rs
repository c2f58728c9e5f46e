//! Property-based tests for the unit lifecycle
//!
//! Random sequences of execute, terminate and skip requests against a context must only ever
//! move units along lifecycle edges.

use async_trait::async_trait;
use groupexec::execution::{
    ExecutionGroup, ExecutionGroupContext, ExecutionStatus, ExecutionUnit, Invocation,
    ParallelStrategy, UnitHandler,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Execute(usize),
    Terminate(usize),
    Skip(usize),
}

struct Scripted;

#[async_trait]
impl UnitHandler<Outcome, usize> for Scripted {
    async fn execute(&self, invocation: &Invocation<'_, Outcome, usize>) -> anyhow::Result<usize> {
        match invocation.input() {
            Outcome::Succeed => Ok(invocation.order() as usize),
            Outcome::Fail => anyhow::bail!("scripted failure"),
            Outcome::Panic => panic!("scripted panic"),
        }
    }
}

fn outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![Just(Outcome::Succeed), Just(Outcome::Fail), Just(Outcome::Panic)]
}

fn op(units: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..units).prop_map(Op::Execute),
        (0..units).prop_map(Op::Terminate),
        (0..units).prop_map(Op::Skip),
    ]
}

/// States reachable from `from` through zero or more lifecycle edges.
fn reachable(from: ExecutionStatus) -> HashSet<ExecutionStatus> {
    let mut seen = HashSet::from([from]);
    let mut frontier = vec![from];
    while let Some(current) = frontier.pop() {
        for next in ExecutionStatus::ALL {
            if current.can_transition_to(next) && seen.insert(next) {
                frontier.push(next);
            }
        }
    }
    seen
}

fn build_context(outcomes: &[Outcome]) -> ExecutionGroupContext<Outcome, usize> {
    let handler: Arc<dyn UnitHandler<Outcome, usize>> = Arc::new(Scripted);
    let units = outcomes
        .iter()
        .enumerate()
        .map(|(index, outcome)| {
            ExecutionUnit::new(format!("u{}", index), index as i64, Arc::clone(&handler), *outcome)
        })
        .collect();
    let group = ExecutionGroup::new("g", units, &ParallelStrategy).unwrap();
    ExecutionGroupContext::new(vec![group]).unwrap()
}

/// Test that every observed status change follows the lifecycle graph
#[test]
fn test_transitions_follow_lifecycle_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    let input = (prop::collection::vec(outcome(), 1..5), prop::collection::vec(op(5), 0..30));

    runner
        .run(&input, |(outcomes, ops)| {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let context = build_context(&outcomes);
            let ids: Vec<String> = (0..outcomes.len()).map(|i| format!("u{}", i)).collect();

            runtime.block_on(async {
                for op in ops {
                    let (index, before) = match op {
                        Op::Execute(i) | Op::Terminate(i) | Op::Skip(i) => {
                            let i = i % ids.len();
                            (i, context.status_of(&ids[i]).unwrap())
                        }
                    };
                    let id = &ids[index];

                    match op {
                        Op::Execute(_) => {
                            context.get_unit(id).unwrap().execute(&context).await;
                            if before == ExecutionStatus::Pending {
                                let after = context.status_of(id).unwrap();
                                assert!(matches!(
                                    after,
                                    ExecutionStatus::Succeeded | ExecutionStatus::Failed
                                ));
                            }
                        }
                        Op::Terminate(_) => {
                            // Nothing runs between ops, so no unit is ever Running here.
                            assert!(context.terminate(id).await.is_err());
                            assert_eq!(context.status_of(id), Some(before));
                        }
                        Op::Skip(_) => {
                            let first = context.skip(id).unwrap();
                            let second = context.skip(id).unwrap();
                            assert_eq!(first, second);
                            if before.is_skippable() {
                                assert_eq!(first, ExecutionStatus::Skipped);
                            } else {
                                assert_eq!(first, before);
                            }
                        }
                    }

                    let after = context.status_of(id).unwrap();
                    assert!(reachable(before).contains(&after), "{:?} -> {:?}", before, after);
                }
            });

            let completed = ids
                .iter()
                .filter(|id| context.status_of(id).unwrap().is_completed())
                .count();
            prop_assert_eq!(context.is_completed(), completed == ids.len());
            prop_assert_eq!(context.progress().completed_units, completed);
            Ok(())
        })
        .unwrap();
}

/// Test that `is_completed` is exactly the set of terminal outcomes
#[test]
fn test_completed_states_have_no_exit_but_skip_property() {
    let mut runner = proptest::test_runner::TestRunner::default();
    runner
        .run(&(0..ExecutionStatus::ALL.len()), |index| {
            let status = ExecutionStatus::ALL[index];
            let exits: Vec<_> = ExecutionStatus::ALL
                .iter()
                .copied()
                .filter(|next| status.can_transition_to(*next))
                .collect();
            if status.is_completed() {
                prop_assert!(exits.iter().all(|next| *next == ExecutionStatus::Skipping));
            } else {
                prop_assert!(!exits.is_empty());
            }
            Ok(())
        })
        .unwrap();
}
