//! HTTP client for the fleet telemetry query API
//!
//! The API accepts a JSON query document and answers with one JSON record
//! per line.

use super::frame::{TelemetryFrame, TelemetryRecord};
use super::query::TelemetryQuery;
use super::{TelemetryError, TelemetrySource};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Public query endpoint of the fleet data service
pub const DEFAULT_QUERY_ENDPOINT: &str = "https://data.sagecontinuum.org/api/v1/query";

/// Telemetry source backed by the HTTP query API
pub struct HttpTelemetryClient {
    client: Client,
    endpoint: Url,
}

impl HttpTelemetryClient {
    /// Create a new client; `timeout` of `None` waits indefinitely
    pub fn new(endpoint: &str, timeout: Option<Duration>) -> Result<Self, TelemetryError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(TelemetryError::Http)?;

        let endpoint = Url::parse(endpoint).map_err(|source| TelemetryError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl TelemetrySource for HttpTelemetryClient {
    async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
        debug!(
            endpoint = %self.endpoint,
            vsn = %query.filter.vsn,
            start = %query.start,
            end = ?query.end,
            "Querying telemetry"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(query)
            .send()
            .await
            .map_err(TelemetryError::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelemetryError::Status { status, body });
        }

        let body = response.text().await.map_err(TelemetryError::Http)?;
        parse_ndjson(&body)
    }
}

/// Decode a newline-delimited JSON response body
pub fn parse_ndjson(body: &str) -> Result<TelemetryFrame, TelemetryError> {
    body.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<TelemetryRecord>(line).map_err(|source| TelemetryError::Decode {
                line: i + 1,
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(TelemetryFrame::new)
}
