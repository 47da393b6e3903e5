//! Raw telemetry download

use anyhow::{Context as _, Result};
use profiler_lib::export::ExportFormat;
use profiler_lib::telemetry::{BulkDownloader, DownloadKind, TelemetryFrame};
use profiler_lib::BatchLogger;
use std::path::Path;

use super::{time_range, Context};
use crate::output::print_success;

/// Download raw telemetry for a node day by day and write it to `output`
pub async fn download(
    ctx: &Context,
    vsn: &str,
    kind: DownloadKind,
    start: &str,
    end: Option<&str>,
    output: &Path,
) -> Result<()> {
    let (start, end) = time_range(start, end)?;
    let logger = BatchLogger::new(vsn);

    let downloader = BulkDownloader::new(ctx.source(kind, &logger), logger)
        .with_metrics(ctx.metrics.clone());
    let frame = downloader
        .download(kind, vsn, start, end)
        .await
        .with_context(|| format!("Failed to download {kind} telemetry"))?;

    let content = render(&frame, ExportFormat::from_path(output))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(output, content)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_success(&format!(
        "Wrote {} {} records to {}",
        frame.len(),
        kind,
        output.display()
    ));
    Ok(())
}

fn render(frame: &TelemetryFrame, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => Ok(frame.to_csv()),
        ExportFormat::Json => {
            serde_json::to_string_pretty(frame.records()).context("Failed to encode records")
        }
    }
}
