//! Fleet telemetry access
//!
//! This module provides the query model, an HTTP client for the telemetry
//! API, an on-disk CSV cache of query results, and a day-windowed bulk
//! downloader built on top of any [`TelemetrySource`].

mod bulk;
mod cache;
mod client;
mod frame;
mod query;

pub use bulk::{day_windows, BulkDownloader, DownloadKind};
pub use cache::{CacheError, CachedSource, QueryCache};
pub use client::{parse_ndjson, HttpTelemetryClient, DEFAULT_QUERY_ENDPOINT};
pub use frame::{SampleValue, TelemetryFrame, TelemetryRecord, META_PREFIX};
pub use query::{
    QueryFilter, TelemetryQuery, COMPLETED_EVENT, CPU_USAGE_METRIC, FAILED_EVENT, LAUNCHED_EVENT,
    MEMORY_RSS_METRIC, MEMORY_WORKING_SET_METRIC, PERFORMANCE_BUCKET, POWER_METRIC,
};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid telemetry endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("telemetry request failed: {0}")]
    Http(#[source] reqwest::Error),

    #[error("telemetry API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode telemetry record on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Trait for anything that can answer a telemetry query
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch the raw records matching `query`
    async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError>;
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
        (**self).query(query).await
    }
}
