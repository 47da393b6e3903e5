//! Telemetry query model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Cumulative CPU-seconds counter per container
pub const CPU_USAGE_METRIC: &str = "container_cpu_usage_seconds_total";
pub const MEMORY_RSS_METRIC: &str = "container_memory_rss";
pub const MEMORY_WORKING_SET_METRIC: &str = "container_memory_working_set_bytes";
/// Per-rail power reading on Jetson boards, tagged with `meta.sensor`
pub const POWER_METRIC: &str = "tegra_wattage_current_milliwatts";

pub const LAUNCHED_EVENT: &str = "sys.scheduler.status.plugin.launched";
pub const COMPLETED_EVENT: &str = "sys.scheduler.status.plugin.complete";
pub const FAILED_EVENT: &str = "sys.scheduler.status.plugin.failed";

/// Bucket holding the node exporter metrics
pub const PERFORMANCE_BUCKET: &str = "grafana-agent";

/// Filter applied by the query API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFilter {
    pub vsn: String,
    /// `|`-separated metric names
    pub name: String,
}

/// A request for raw telemetry over a time range
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryQuery {
    pub start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    pub filter: QueryFilter,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
}

impl TelemetryQuery {
    pub fn new(vsn: &str, names: &[&str], start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            filter: QueryFilter {
                vsn: vsn.to_uppercase(),
                name: names.join("|"),
            },
            bucket: None,
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// CPU, memory and power metrics of one node
    pub fn performance(vsn: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self::new(
            vsn,
            &[
                CPU_USAGE_METRIC,
                MEMORY_RSS_METRIC,
                MEMORY_WORKING_SET_METRIC,
                POWER_METRIC,
            ],
            start,
            end,
        )
        .with_bucket(PERFORMANCE_BUCKET)
    }

    /// Plugin lifecycle notifications of one node's scheduler
    pub fn scheduler_events(vsn: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self::new(
            vsn,
            &[LAUNCHED_EVENT, COMPLETED_EVENT, FAILED_EVENT],
            start,
            end,
        )
    }
}
