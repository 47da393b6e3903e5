//! Day-windowed bulk download
//!
//! Long ranges are fetched one 24-hour window at a time so each window can
//! be cached independently and re-runs only download what is missing.

use super::frame::TelemetryFrame;
use super::query::TelemetryQuery;
use super::{TelemetryError, TelemetrySource};
use crate::observability::{BatchLogger, BatchMetrics};
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// What a bulk download fetches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadKind {
    /// Scheduler lifecycle events
    Job,
    /// CPU, memory and power metrics
    Perf,
}

impl DownloadKind {
    /// Name of the cache subdirectory for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadKind::Job => "job",
            DownloadKind::Perf => "perf",
        }
    }

    pub fn query(&self, vsn: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> TelemetryQuery {
        match self {
            DownloadKind::Job => TelemetryQuery::scheduler_events(vsn, start, Some(end)),
            DownloadKind::Perf => TelemetryQuery::performance(vsn, start, Some(end)),
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "job" | "jobs" => Ok(DownloadKind::Job),
            "perf" | "performance" => Ok(DownloadKind::Perf),
            other => Err(format!("unknown download kind {other:?}, expected job or perf")),
        }
    }
}

/// Split `[start, end]` into consecutive windows of at most one day
///
/// Boundaries step 24 hours from `start`; a trailing partial window ends at
/// `end`. An empty or inverted range yields no windows.
pub fn day_windows(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut windows = Vec::new();
    let mut window_start = start;

    while window_start < end {
        let window_end = (window_start + Duration::days(1)).min(end);
        windows.push((window_start, window_end));
        window_start = window_end;
    }

    windows
}

/// Fetches long ranges window by window and concatenates the results
pub struct BulkDownloader<S> {
    source: S,
    logger: BatchLogger,
    metrics: Option<BatchMetrics>,
}

impl<S: TelemetrySource> BulkDownloader<S> {
    pub fn new(source: S, logger: BatchLogger) -> Self {
        Self {
            source,
            logger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Download `kind` for `vsn` over `[start, end]`, in chronological order
    pub async fn download(
        &self,
        kind: DownloadKind,
        vsn: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TelemetryFrame, TelemetryError> {
        let windows = day_windows(start, end);
        let total = windows.len();
        let mut frame = TelemetryFrame::default();

        for (i, (window_start, window_end)) in windows.into_iter().enumerate() {
            self.logger.log_window(i + 1, total, window_start, window_end);

            let query = kind.query(vsn, window_start, window_end);
            let started = Instant::now();
            let window = self.source.query(&query).await?;

            if let Some(metrics) = &self.metrics {
                metrics.observe_query_latency(started.elapsed().as_secs_f64());
                metrics.add_samples_fetched(window.len() as u64);
            }
            frame.append(window);
        }

        Ok(frame)
    }
}
