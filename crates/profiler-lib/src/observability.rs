//! Observability for profiling batches
//!
//! Provides:
//! - Prometheus counters for a batch run (executions, rows, samples, cache)
//! - Structured progress logging with tracing, one line per window/execution

use chrono::{DateTime, Utc};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Histogram buckets for telemetry query latency (in seconds)
const QUERY_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

struct BatchMetricsInner {
    registry: Registry,
    executions_total: IntCounter,
    executions_profiled: IntCounter,
    executions_skipped: IntCounterVec,
    profile_rows: IntCounter,
    events_ingested: IntCounter,
    events_rejected: IntCounter,
    samples_fetched: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    query_latency_seconds: Histogram,
}

impl BatchMetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        let executions_total = IntCounter::new(
            "edgeprof_executions_total",
            "Execution records seen by the profile builder",
        )
        .expect("Failed to create executions_total");
        let executions_profiled = IntCounter::new(
            "edgeprof_executions_profiled_total",
            "Executions that produced a resource profile",
        )
        .expect("Failed to create executions_profiled");
        let executions_skipped = IntCounterVec::new(
            Opts::new(
                "edgeprof_executions_skipped_total",
                "Executions skipped, by reason",
            ),
            &["reason"],
        )
        .expect("Failed to create executions_skipped");
        let profile_rows = IntCounter::new(
            "edgeprof_profile_rows_total",
            "Aligned profile rows emitted",
        )
        .expect("Failed to create profile_rows");
        let events_ingested = IntCounter::new(
            "edgeprof_events_ingested_total",
            "Scheduler lifecycle events decoded",
        )
        .expect("Failed to create events_ingested");
        let events_rejected = IntCounter::new(
            "edgeprof_events_rejected_total",
            "Scheduler records that could not be decoded",
        )
        .expect("Failed to create events_rejected");
        let samples_fetched = IntCounter::new(
            "edgeprof_samples_fetched_total",
            "Raw telemetry records fetched",
        )
        .expect("Failed to create samples_fetched");
        let cache_hits = IntCounter::new(
            "edgeprof_cache_hits_total",
            "Telemetry windows served from the on-disk cache",
        )
        .expect("Failed to create cache_hits");
        let cache_misses = IntCounter::new(
            "edgeprof_cache_misses_total",
            "Telemetry windows downloaded because no cache file existed",
        )
        .expect("Failed to create cache_misses");
        let query_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "edgeprof_query_latency_seconds",
                "Time spent waiting for telemetry queries",
            )
            .buckets(QUERY_LATENCY_BUCKETS.to_vec()),
        )
        .expect("Failed to create query_latency_seconds");

        for collector in [
            Box::new(executions_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(executions_profiled.clone()),
            Box::new(executions_skipped.clone()),
            Box::new(profile_rows.clone()),
            Box::new(events_ingested.clone()),
            Box::new(events_rejected.clone()),
            Box::new(samples_fetched.clone()),
            Box::new(cache_hits.clone()),
            Box::new(cache_misses.clone()),
            Box::new(query_latency_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("Failed to register batch metric");
        }

        Self {
            registry,
            executions_total,
            executions_profiled,
            executions_skipped,
            profile_rows,
            events_ingested,
            events_rejected,
            samples_fetched,
            cache_hits,
            cache_misses,
            query_latency_seconds,
        }
    }
}

/// Counters for one batch run
///
/// Each instance owns a private registry, so independent runs (and tests)
/// never collide. Clones share the same counters.
#[derive(Clone)]
pub struct BatchMetrics {
    inner: Arc<BatchMetricsInner>,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BatchMetricsInner::new()),
        }
    }

    pub fn inc_executions(&self) {
        self.inner.executions_total.inc();
    }

    pub fn inc_profiled(&self, rows: u64) {
        self.inner.executions_profiled.inc();
        self.inner.profile_rows.inc_by(rows);
    }

    pub fn inc_skipped(&self, reason: &str) {
        self.inner
            .executions_skipped
            .with_label_values(&[reason])
            .inc();
    }

    pub fn add_events(&self, ingested: u64, rejected: u64) {
        self.inner.events_ingested.inc_by(ingested);
        self.inner.events_rejected.inc_by(rejected);
    }

    pub fn add_samples_fetched(&self, count: u64) {
        self.inner.samples_fetched.inc_by(count);
    }

    pub fn inc_cache_hits(&self) {
        self.inner.cache_hits.inc();
    }

    pub fn inc_cache_misses(&self) {
        self.inner.cache_misses.inc();
    }

    pub fn observe_query_latency(&self, duration_secs: f64) {
        self.inner.query_latency_seconds.observe(duration_secs);
    }

    pub fn executions_profiled(&self) -> u64 {
        self.inner.executions_profiled.get()
    }

    pub fn executions_skipped(&self, reason: &str) -> u64 {
        self.inner
            .executions_skipped
            .with_label_values(&[reason])
            .get()
    }

    pub fn profile_rows(&self) -> u64 {
        self.inner.profile_rows.get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.inner.cache_hits.get()
    }

    pub fn cache_misses(&self) -> u64 {
        self.inner.cache_misses.get()
    }

    /// Prometheus text exposition of every counter
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Structured progress logger for a batch over one node
///
/// Every line carries an `event` field and the node's VSN so the progress
/// stream can be filtered per run.
#[derive(Clone, Debug)]
pub struct BatchLogger {
    vsn: String,
}

impl BatchLogger {
    pub fn new(vsn: impl Into<String>) -> Self {
        Self { vsn: vsn.into() }
    }

    pub fn vsn(&self) -> &str {
        &self.vsn
    }

    /// Log the start of one bulk download window
    pub fn log_window(&self, index: usize, total: usize, start: DateTime<Utc>, end: DateTime<Utc>) {
        info!(
            event = "window_query",
            vsn = %self.vsn,
            window = index,
            windows = total,
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            "Querying window"
        );
    }

    pub fn log_cache_hit(&self, path: &Path) {
        info!(
            event = "cache_hit",
            vsn = %self.vsn,
            path = %path.display(),
            "Cache found, reading the file instead of downloading"
        );
    }

    pub fn log_download(&self, start: DateTime<Utc>, end: DateTime<Utc>) {
        info!(
            event = "download",
            vsn = %self.vsn,
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            "Downloading"
        );
    }

    pub fn log_cache_saved(&self, path: &Path) {
        debug!(
            event = "cache_saved",
            vsn = %self.vsn,
            path = %path.display(),
            "Saved query result to cache"
        );
    }

    pub fn log_cache_skipped(&self, end: DateTime<Utc>) {
        debug!(
            event = "cache_skipped",
            vsn = %self.vsn,
            end = %end.to_rfc3339(),
            "Window not yet closed, result not cached"
        );
    }

    pub fn log_cache_error(&self, error: &str) {
        warn!(
            event = "cache_error",
            vsn = %self.vsn,
            error = %error,
            "Cache unusable, falling back to the telemetry API"
        );
    }

    pub fn log_event_rejected(&self, name: &str, error: &str) {
        debug!(
            event = "event_rejected",
            vsn = %self.vsn,
            name = %name,
            error = %error,
            "Skipping scheduler record"
        );
    }

    pub fn log_correlation(&self, total: usize, completed: usize, failed: usize, unknown: usize) {
        info!(
            event = "correlation_complete",
            vsn = %self.vsn,
            executions = total,
            completed = completed,
            failed = failed,
            unknown = unknown,
            "Correlated lifecycle events into execution records"
        );
    }

    pub fn log_execution_fetch(&self, instance: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        info!(
            event = "execution_fetch",
            vsn = %self.vsn,
            plugin_instance = %instance,
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            "Fetching execution telemetry"
        );
    }

    pub fn log_metric_records(&self, instance: &str, metric: &str, count: usize) {
        debug!(
            event = "metric_records",
            vsn = %self.vsn,
            plugin_instance = %instance,
            metric = %metric,
            count = count,
            "Metric records found"
        );
    }

    pub fn log_power_unavailable(&self, instance: &str, columns: &[&str]) {
        warn!(
            event = "power_unavailable",
            vsn = %self.vsn,
            plugin_instance = %instance,
            columns = ?columns,
            "Sensor metadata not found, power columns left empty"
        );
    }

    pub fn log_execution_skipped(&self, instance: &str, reason: &str, details: &str) {
        warn!(
            event = "execution_skipped",
            vsn = %self.vsn,
            plugin_instance = %instance,
            reason = %reason,
            details = %details,
            "Execution skipped"
        );
    }

    pub fn log_execution_profiled(&self, instance: &str, rows: usize) {
        info!(
            event = "execution_profiled",
            vsn = %self.vsn,
            plugin_instance = %instance,
            rows = rows,
            "Generated execution profile"
        );
    }

    pub fn log_batch_complete(&self, profiled: usize, skipped: usize, rows: usize) {
        info!(
            event = "batch_complete",
            vsn = %self.vsn,
            profiled = profiled,
            skipped = skipped,
            rows = rows,
            "Profiling batch complete"
        );
    }
}
