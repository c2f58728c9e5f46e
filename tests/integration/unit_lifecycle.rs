//! Unit lifecycle driven directly through a context, without an engine.

use super::test_utils::{engine, group, unit, wait_for_status, TestHandler, TestWork};
use async_trait::async_trait;
use groupexec::error::EngineError;
use groupexec::execution::{
    ExecutionGroup, ExecutionGroupContext, ExecutionResult, ExecutionStatus, ExecutionUnit,
    Invocation, ParallelStrategy, UnitHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

const WAIT: Duration = Duration::from_secs(5);

fn context_with(
    handler: &Arc<TestHandler>,
    units: &[(&str, TestWork)],
) -> Arc<ExecutionGroupContext<TestWork, String>> {
    let units = units
        .iter()
        .enumerate()
        .map(|(index, (id, work))| unit(handler, id, index as i64 + 1, work.clone()))
        .collect();
    Arc::new(ExecutionGroupContext::new(vec![group("g", units, &ParallelStrategy)]).unwrap())
}

#[tokio::test]
async fn test_concurrent_execute_runs_handler_once() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::sleep(20))]);
    let unit = context.get_unit("a").unwrap();

    tokio::join!(unit.execute(&context), unit.execute(&context));

    assert_eq!(handler.calls(), 1);
    assert_eq!(context.status_of("a"), Some(ExecutionStatus::Succeeded));
}

#[tokio::test]
async fn test_execute_after_completion_is_noop() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::quick())]);
    let unit = context.get_unit("a").unwrap();

    unit.execute(&context).await;
    let first = context.get_execution_result("a").unwrap();
    unit.execute(&context).await;

    assert_eq!(handler.calls(), 1);
    assert_eq!(context.get_execution_result("a").unwrap(), first);
}

#[tokio::test]
async fn test_terminate_requires_running_unit() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::quick())]);

    let err = context.terminate("a").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::InvalidState {
            id: "a".to_string(),
            operation: "terminate",
            status: ExecutionStatus::Pending,
        }
    );
    assert_eq!(context.status_of("a"), Some(ExecutionStatus::Pending));

    context.get_unit("a").unwrap().execute(&context).await;
    assert!(matches!(
        context.terminate("a").await,
        Err(EngineError::InvalidState {
            status: ExecutionStatus::Succeeded,
            ..
        })
    ));
    assert_eq!(context.status_of("a"), Some(ExecutionStatus::Succeeded));
}

#[tokio::test]
async fn test_unknown_unit_rejected() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::quick())]);

    assert_eq!(
        context.terminate("ghost").await.unwrap_err(),
        EngineError::UnknownUnit("ghost".to_string())
    );
    assert_eq!(
        context.skip("ghost").unwrap_err(),
        EngineError::UnknownUnit("ghost".to_string())
    );
    assert!(context.get_execution_result("ghost").is_none());
}

#[tokio::test]
async fn test_unit_from_other_context_is_not_executed() {
    let handler = TestHandler::new();
    let mine = context_with(&handler, &[("a", TestWork::quick())]);
    let other = context_with(&handler, &[("b", TestWork::quick())]);

    let unit = mine.get_unit("a").unwrap();
    unit.execute(&other).await;

    assert_eq!(handler.calls(), 0);
    assert_eq!(mine.status_of("a"), Some(ExecutionStatus::Pending));
}

#[tokio::test]
async fn test_handler_panic_becomes_failure() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::panicking())]);

    context.get_unit("a").unwrap().execute(&context).await;

    let result = context.get_execution_result("a").unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.error.unwrap().contains("boom in a"));
}

#[tokio::test]
async fn test_before_execute_failure_is_ignored() {
    let handler = TestHandler::failing_before_execute();
    let context = context_with(&handler, &[("a", TestWork::quick())]);

    context.get_unit("a").unwrap().execute(&context).await;

    assert_eq!(context.status_of("a"), Some(ExecutionStatus::Succeeded));
    assert_eq!(handler.calls(), 1);
}

#[tokio::test]
async fn test_terminate_failure_is_recorded() {
    let handler = TestHandler::failing_terminate();
    let context = context_with(&handler, &[("a", TestWork::blocking())]);

    let runner = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let unit = context.get_unit("a").unwrap();
            unit.execute(&context).await;
        })
    };
    assert!(wait_for_status(&context, "a", ExecutionStatus::Running, WAIT).await);

    let status = context.terminate("a").await.unwrap();
    assert_eq!(status, ExecutionStatus::TerminateFailed);
    runner.await.unwrap();

    let result = context.get_execution_result("a").unwrap();
    assert_eq!(result.status, ExecutionStatus::TerminateFailed);
    assert!(result.error.unwrap().contains("cannot terminate a"));

    assert_eq!(context.skip("a").unwrap(), ExecutionStatus::Skipped);
}

#[tokio::test]
async fn test_skip_ignores_non_failed_units() {
    let handler = TestHandler::new();
    let context = context_with(&handler, &[("a", TestWork::quick())]);

    assert_eq!(context.skip("a").unwrap(), ExecutionStatus::Pending);
    context.get_unit("a").unwrap().execute(&context).await;
    assert_eq!(context.skip("a").unwrap(), ExecutionStatus::Succeeded);
}

#[tokio::test]
async fn test_dropped_terminate_still_settles_unit() {
    let handler = TestHandler::slow_terminate(Duration::from_secs(5));
    let engine = engine(2);
    let context = engine
        .execute(vec![group(
            "g",
            vec![unit(&handler, "u", 1, TestWork::blocking())],
            &ParallelStrategy,
        )])
        .unwrap();
    assert!(wait_for_status(&context, "u", ExecutionStatus::Running, WAIT).await);

    let timed_out = tokio::time::timeout(Duration::from_millis(50), context.terminate("u")).await;
    assert!(timed_out.is_err());

    let result = context.get_execution_result("u").unwrap();
    assert_eq!(result.status, ExecutionStatus::TerminateFailed);
    assert!(result.error.unwrap().contains("termination abandoned"));

    assert!(context.wait_timeout(Duration::from_secs(2)).await);
    assert!(context.is_completed());
    assert!(context.failures().is_empty());
}

/// Blocks in `execute` until termination is requested, and in `terminate` until released.
struct GatedHandler {
    release: Notify,
}

#[async_trait]
impl UnitHandler<bool, String> for GatedHandler {
    async fn execute(&self, invocation: &Invocation<'_, bool, String>) -> anyhow::Result<String> {
        while !invocation.is_terminating() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        if *invocation.input() {
            anyhow::bail!("interrupted {}", invocation.unit_id());
        }
        Ok(format!("partial {}", invocation.unit_id()))
    }

    async fn terminate(&self, _invocation: &Invocation<'_, bool, String>) -> anyhow::Result<()> {
        self.release.notified().await;
        Ok(())
    }
}

/// Run `execute` to completion while a terminate request is held open, then release it.
async fn execute_during_termination(
    fail: bool,
) -> (ExecutionResult<String>, ExecutionResult<String>) {
    let handler = Arc::new(GatedHandler {
        release: Notify::new(),
    });
    let units = vec![ExecutionUnit::new(
        "a",
        7,
        Arc::clone(&handler) as Arc<dyn UnitHandler<bool, String>>,
        fail,
    )];
    let context = Arc::new(
        ExecutionGroupContext::new(vec![
            ExecutionGroup::new("g", units, &ParallelStrategy).unwrap()
        ])
        .unwrap(),
    );

    let runner = {
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let unit = context.get_unit("a").unwrap();
            unit.execute(&context).await;
        })
    };
    let deadline = tokio::time::Instant::now() + WAIT;
    while context.status_of("a") != Some(ExecutionStatus::Running) {
        assert!(tokio::time::Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let terminator = {
        let context = Arc::clone(&context);
        tokio::spawn(async move { context.terminate("a").await })
    };
    runner.await.unwrap();
    let after_execute = context.get_execution_result("a").unwrap();

    handler.release.notify_one();
    assert_eq!(
        terminator.await.unwrap().unwrap(),
        ExecutionStatus::Terminated
    );
    (after_execute, context.get_execution_result("a").unwrap())
}

#[tokio::test]
async fn test_execute_value_attached_while_terminating() {
    let (after_execute, settled) = execute_during_termination(false).await;

    assert_eq!(after_execute.status, ExecutionStatus::Terminating);
    assert_eq!(after_execute.value, Some("partial a".to_string()));
    assert!(after_execute.error.is_none());

    assert_eq!(settled.status, ExecutionStatus::Terminated);
    assert_eq!(settled.value, Some("partial a".to_string()));
    assert_eq!(settled.order, 7);
}

#[tokio::test]
async fn test_execute_error_recorded_while_terminating() {
    let (after_execute, settled) = execute_during_termination(true).await;

    assert_eq!(after_execute.status, ExecutionStatus::Terminating);
    assert!(after_execute.value.is_none());
    assert!(after_execute.error.unwrap().contains("interrupted a"));

    assert_eq!(settled.status, ExecutionStatus::Terminated);
}
