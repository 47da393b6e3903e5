//! Decoding scheduler telemetry into lifecycle events
//!
//! Each scheduler record carries a JSON document in its value describing
//! the plugin pod. The event kind is fixed here, once, from the metric name.

use crate::models::{EventKind, LifecycleEvent};
use crate::observability::BatchLogger;
use crate::telemetry::{TelemetryFrame, TelemetryRecord};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{name} is not a plugin lifecycle event")]
    NotLifecycleEvent { name: String },

    #[error("{name} has a numeric value, expected a JSON payload")]
    NonTextPayload { name: String },

    #[error("invalid payload for {name}: {source}")]
    Payload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Fields of the scheduler payload that the profiler uses
#[derive(Debug, Deserialize)]
struct SchedulerPayload {
    k3s_pod_instance: String,
    #[serde(default)]
    k3s_pod_node_name: String,
    plugin_name: String,
    #[serde(default)]
    plugin_selector: Option<Value>,
    #[serde(default)]
    plugin_image: Option<String>,
    #[serde(default)]
    plugin_task: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error_log: Option<String>,
}

/// Events decoded from a frame, plus how many records were rejected
#[derive(Debug, Default)]
pub struct IngestReport {
    pub events: Vec<LifecycleEvent>,
    pub rejected: usize,
}

/// Decode one scheduler record
pub fn parse_event(record: &TelemetryRecord) -> Result<LifecycleEvent, IngestError> {
    let kind = EventKind::from_event_name(&record.name).ok_or_else(|| {
        IngestError::NotLifecycleEvent {
            name: record.name.clone(),
        }
    })?;

    let raw = record
        .value
        .as_text()
        .ok_or_else(|| IngestError::NonTextPayload {
            name: record.name.clone(),
        })?;

    let payload: SchedulerPayload =
        serde_json::from_str(raw).map_err(|source| IngestError::Payload {
            name: record.name.clone(),
            source,
        })?;

    Ok(LifecycleEvent {
        kind,
        timestamp: record.timestamp,
        node: record.meta("node").unwrap_or_default().to_string(),
        vsn: record.meta("vsn").unwrap_or_default().to_string(),
        pod_instance: payload.k3s_pod_instance,
        pod_node_name: payload.k3s_pod_node_name,
        plugin_name: payload.plugin_name,
        plugin_selector: selector_text(payload.plugin_selector),
        plugin_image: non_empty(payload.plugin_image),
        plugin_task: non_empty(payload.plugin_task),
        reason: non_empty(payload.reason),
        error_log: non_empty(payload.error_log),
    })
}

/// Decode every lifecycle record of a frame, skipping the rest
pub fn parse_events(frame: &TelemetryFrame, logger: &BatchLogger) -> IngestReport {
    let mut report = IngestReport::default();

    for record in frame.records() {
        match parse_event(record) {
            Ok(event) => report.events.push(event),
            Err(e) => {
                report.rejected += 1;
                logger.log_event_rejected(&record.name, &e.to_string());
            }
        }
    }

    report
}

/// The selector is usually a JSON-encoded string; an inline object is
/// re-encoded so downstream parsing sees one shape.
fn selector_text(selector: Option<Value>) -> Option<String> {
    match selector? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
