//! Subcommand implementations

pub mod download;
pub mod jobs;
pub mod profile;

use anyhow::{bail, Context as _, Result};
use chrono::{DateTime, Utc};
use profiler_lib::telemetry::{
    BulkDownloader, CachedSource, DownloadKind, HttpTelemetryClient, QueryCache, TelemetrySource,
};
use profiler_lib::{events, parse_time, BatchLogger, BatchMetrics, ExecutionRecord};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::output::OutputFormat;

/// Shared state for one CLI invocation
pub struct Context {
    pub config: Config,
    pub format: OutputFormat,
    pub metrics: BatchMetrics,
    client: Arc<HttpTelemetryClient>,
    cache: Option<QueryCache>,
}

impl Context {
    pub fn new(config: Config, use_cache: bool, format: OutputFormat) -> Result<Self> {
        let timeout = config.request_timeout_secs.map(Duration::from_secs);
        let client = HttpTelemetryClient::new(&config.api_url, timeout)
            .context("Failed to create telemetry client")?;
        let cache = if use_cache {
            Some(QueryCache::new(config.cache_root()?))
        } else {
            None
        };

        Ok(Self {
            config,
            format,
            metrics: BatchMetrics::new(),
            client: Arc::new(client),
            cache,
        })
    }

    /// Telemetry source for `kind`, behind the query cache when enabled
    pub fn source(&self, kind: DownloadKind, logger: &BatchLogger) -> Arc<dyn TelemetrySource> {
        match &self.cache {
            Some(cache) => Arc::new(
                CachedSource::new(self.client.clone(), cache.clone(), kind.as_str(), logger.clone())
                    .with_metrics(self.metrics.clone()),
            ),
            None => self.client.clone(),
        }
    }

    /// Download scheduler events for `vsn` and correlate them
    pub async fn execution_records(
        &self,
        vsn: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        logger: &BatchLogger,
    ) -> Result<Vec<ExecutionRecord>> {
        let downloader = BulkDownloader::new(self.source(DownloadKind::Job, logger), logger.clone())
            .with_metrics(self.metrics.clone());
        let frame = downloader
            .download(DownloadKind::Job, vsn, start, end)
            .await
            .context("Failed to download scheduler events")?;

        Ok(events::execution_records(&frame, logger, Some(&self.metrics)))
    }

    /// Write the Prometheus exposition of this run's counters
    pub async fn write_metrics(&self, path: &Path) -> Result<()> {
        let text = self.metrics.render().context("Failed to encode metrics")?;
        tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write metrics to {}", path.display()))
    }
}

/// Resolve a `--start`/`--end` pair; a missing end means now
pub fn time_range(start: &str, end: Option<&str>) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = parse_time(start).with_context(|| format!("Invalid --start {start:?}"))?;
    let end = parse_time(end.unwrap_or_default())
        .with_context(|| format!("Invalid --end {:?}", end.unwrap_or_default()))?;

    if start >= end {
        bail!("--start ({start}) must be before --end ({end})");
    }
    Ok((start, end))
}
