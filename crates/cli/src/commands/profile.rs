//! Per-execution resource profiling

use anyhow::{Context as _, Result};
use chrono::Duration;
use profiler_lib::profile::{ExecutionOutcome, ProfileBuilder, ProfileConfig};
use profiler_lib::telemetry::DownloadKind;
use profiler_lib::{export, BatchLogger, ProfileRow};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::{time_range, Context};
use crate::output::{
    color_status, format_bytes, print_info, print_success, print_table, print_warning,
};

/// Row for the outcomes table
#[derive(Tabled, Serialize)]
struct OutcomeRow {
    #[tabled(rename = "Instance")]
    plugin_instance: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Peak Mem")]
    peak_mem: String,
    #[tabled(rename = "Details")]
    details: String,
}

impl OutcomeRow {
    fn new(outcome: &ExecutionOutcome, profile: &[ProfileRow]) -> Self {
        match outcome {
            ExecutionOutcome::Profiled { plugin_instance, rows } => Self {
                plugin_instance: plugin_instance.clone(),
                outcome: color_status("profiled"),
                rows: *rows,
                peak_mem: peak_mem(profile, plugin_instance),
                details: String::new(),
            },
            ExecutionOutcome::Skipped { plugin_instance, error } => Self {
                plugin_instance: plugin_instance.clone(),
                outcome: color_status("skipped"),
                rows: 0,
                peak_mem: "-".to_string(),
                details: error.to_string(),
            },
        }
    }
}

fn peak_mem(profile: &[ProfileRow], instance: &str) -> String {
    profile
        .iter()
        .filter(|r| r.plugin_instance == instance)
        .filter_map(|r| r.mem)
        .fold(None, |peak: Option<f64>, mem| Some(peak.map_or(mem, |p| p.max(mem))))
        .map(format_bytes)
        .unwrap_or_else(|| "-".to_string())
}

/// Options of the `profile` subcommand
pub struct ProfileArgs<'a> {
    pub vsn: &'a str,
    pub start: &'a str,
    pub end: Option<&'a str>,
    pub plugin: Option<&'a str>,
    pub output: Option<&'a Path>,
    pub metrics_file: Option<&'a Path>,
}

/// Build resource profiles for every execution of a node in a time range
pub async fn build_profiles(ctx: &Context, args: ProfileArgs<'_>) -> Result<()> {
    let (start, end) = time_range(args.start, args.end)?;
    let logger = BatchLogger::new(args.vsn);

    let mut records = ctx.execution_records(args.vsn, start, end, &logger).await?;
    if let Some(plugin) = args.plugin {
        records.retain(|r| r.plugin_name() == plugin);
    }
    if records.is_empty() {
        print_warning("No executions found in the requested range");
        return Ok(());
    }

    let builder = ProfileBuilder::new(ctx.source(DownloadKind::Perf, &logger), logger)
        .with_config(ProfileConfig {
            window_padding: Duration::seconds(ctx.config.window_padding_secs),
        })
        .with_metrics(ctx.metrics.clone());
    let report = builder.build_all(&records).await;

    if let Some(path) = args.output {
        export::write_profiles(path, &report.rows)
            .await
            .with_context(|| format!("Failed to export profiles to {}", path.display()))?;
        print_success(&format!("Wrote {} profile rows to {}", report.rows.len(), path.display()));
    }

    if let Some(path) = args.metrics_file {
        ctx.write_metrics(path).await?;
    }

    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| OutcomeRow::new(o, &report.rows))
        .collect();
    print_table(&rows, ctx.format);
    print_info(&format!(
        "{} profiled, {} skipped, {} rows",
        report.profiled_count(),
        report.skipped_count(),
        report.rows.len()
    ));

    Ok(())
}
