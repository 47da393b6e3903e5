//! Scheduler lifecycle events
//!
//! Decodes raw scheduler telemetry into typed events and correlates
//! launches with their completion or failure into execution records.

mod correlator;
mod ingest;

pub use correlator::{correlate, CorrelationSummary};
pub use ingest::{parse_event, parse_events, IngestError, IngestReport};

use crate::models::ExecutionRecord;
use crate::observability::{BatchLogger, BatchMetrics};
use crate::telemetry::TelemetryFrame;

/// Decode and correlate a frame of scheduler records in one step
pub fn execution_records(
    frame: &TelemetryFrame,
    logger: &BatchLogger,
    metrics: Option<&BatchMetrics>,
) -> Vec<ExecutionRecord> {
    let report = parse_events(frame, logger);
    if let Some(metrics) = metrics {
        metrics.add_events(report.events.len() as u64, report.rejected as u64);
    }

    let records = correlate(&report.events);
    let summary = CorrelationSummary::from_records(&records);
    logger.log_correlation(
        summary.total,
        summary.completed,
        summary.failed,
        summary.unknown,
    );

    records
}
