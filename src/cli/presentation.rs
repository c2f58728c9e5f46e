//! CLI presentation: text and json formatters for run results and plan partitions.

use crate::error::EngineError;
use crate::execution::{
    ExecutionGroup, ExecutionGroupContext, ExecutionStatus, UnitInput, UnitOutput,
};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;
use serde_json::json;
use std::fmt::Display;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Succeeded => format!("{}", status.green()),
        ExecutionStatus::Failed | ExecutionStatus::TerminateFailed => format!("{}", status.red()),
        ExecutionStatus::Skipped | ExecutionStatus::Terminated => format!("{}", status.yellow()),
        other => other.to_string(),
    }
}

/// Results table ordered by unit order, followed by progress and orchestration failures.
pub fn format_results_text<I: UnitInput, R: UnitOutput + Display>(
    context: &ExecutionGroupContext<I, R>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Results")));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Order", "Unit", "Status", "Duration", "Detail"]);
    for (id, result) in context.list_results() {
        let duration = match (result.started_at, result.finished_at) {
            (Some(start), Some(end)) => format!("{}ms", (end - start).num_milliseconds()),
            _ => "-".to_string(),
        };
        let detail = result
            .error
            .clone()
            .or_else(|| result.value.as_ref().map(|value| value.to_string()))
            .unwrap_or_default();
        table.add_row(vec![
            result.order.to_string(),
            id,
            format_status(result.status),
            duration,
            detail,
        ]);
    }
    out.push_str(&format!("{}\n\n", table));

    let progress = context.progress();
    out.push_str(&format!(
        "{} of {} units completed, {} of {} groups completed\n",
        progress.completed_units,
        progress.total_units,
        progress.completed_groups,
        progress.total_groups
    ));
    for failure in context.failures() {
        out.push_str(&format!("{} {}\n", "failure:".red(), failure));
    }
    out
}

pub fn format_results_json<I: UnitInput, R: UnitOutput + Serialize>(
    context: &ExecutionGroupContext<I, R>,
) -> Result<String, EngineError> {
    let results: Vec<_> = context
        .list_results()
        .into_iter()
        .map(|(id, result)| json!({ "id": id, "result": result }))
        .collect();
    let failures: Vec<String> = context.failures().iter().map(|f| f.to_string()).collect();
    serde_json::to_string_pretty(&json!({
        "progress": context.progress(),
        "results": results,
        "failures": failures,
    }))
    .map_err(|e| EngineError::InvalidArgument(format!("Failed to serialize results: {}", e)))
}

/// Sub-groups of each group: units within a line run in order, lines run in parallel.
pub fn format_partition_text<I: UnitInput, R: UnitOutput>(
    groups: &[ExecutionGroup<I, R>],
) -> String {
    let mut out = String::new();
    for (index, group) in groups.iter().enumerate() {
        out.push_str(&format!(
            "{}\n",
            format_section_heading(&format!("Group {}: {}", index + 1, group.name()))
        ));
        for (sub_index, sub_group) in group.sub_groups().iter().enumerate() {
            let chain: Vec<&str> = sub_group.units().iter().map(|unit| unit.id()).collect();
            out.push_str(&format!("  [{}] {}\n", sub_index + 1, chain.join(" -> ")));
        }
        out.push('\n');
    }
    out
}
