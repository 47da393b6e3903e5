//! Execution record listing

use anyhow::{Context as _, Result};
use colored::Colorize;
use profiler_lib::events::CorrelationSummary;
use profiler_lib::{export, BatchLogger, ExecutionRecord};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{time_range, Context};
use crate::output::{color_status, format_duration, print_info, print_success, print_table};

/// Row for the executions table
#[derive(Tabled, Serialize)]
struct ExecutionRow {
    #[tabled(rename = "Launched")]
    launched_at: String,
    #[tabled(rename = "Plugin")]
    plugin_name: String,
    #[tabled(rename = "Instance")]
    pod_instance: String,
    #[tabled(rename = "Node")]
    node_name: String,
    #[tabled(rename = "State")]
    end_state: String,
    #[tabled(rename = "Duration")]
    duration: String,
}

impl ExecutionRow {
    fn new(record: &ExecutionRecord) -> Self {
        Self {
            launched_at: record.launched_at().format("%Y-%m-%d %H:%M:%S").to_string(),
            plugin_name: record.plugin_name().to_string(),
            pod_instance: record.pod_instance().to_string(),
            node_name: record.node_name().to_string(),
            end_state: color_status(record.end_state().as_str()),
            duration: format_duration(record.execution_time()),
        }
    }
}

/// List the executions of a node over a time range
pub async fn list_jobs(
    ctx: &Context,
    vsn: &str,
    start: &str,
    end: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let (start, end) = time_range(start, end)?;
    let logger = BatchLogger::new(vsn);
    let records = ctx.execution_records(vsn, start, end, &logger).await?;

    if let Some(path) = output {
        export::write_executions(path, &records)
            .await
            .with_context(|| format!("Failed to export executions to {}", path.display()))?;
        print_success(&format!(
            "Wrote {} execution records to {}",
            records.len(),
            path.display()
        ));
    }

    let rows: Vec<ExecutionRow> = records.iter().map(ExecutionRow::new).collect();
    print_table(&rows, ctx.format);

    let summary = CorrelationSummary::from_records(&records);
    print_info(&format!(
        "{} executions: {} completed, {} failed, {}",
        summary.total.to_string().bold(),
        summary.completed,
        summary.failed,
        format!("{} unknown", summary.unknown).yellow()
    ));

    Ok(())
}
