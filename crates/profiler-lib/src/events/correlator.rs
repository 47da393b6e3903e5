//! Matching launches to their terminal events

use crate::models::{EndState, EventKind, ExecutionRecord, LifecycleEvent, Termination};
use serde::Serialize;
use std::collections::HashMap;

/// Counts of correlated execution records by end state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CorrelationSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub unknown: usize,
}

impl CorrelationSummary {
    pub fn from_records(records: &[ExecutionRecord]) -> Self {
        records
            .iter()
            .fold(Self::default(), |mut summary, record| {
                summary.total += 1;
                match record.end_state() {
                    EndState::Completed => summary.completed += 1,
                    EndState::Failed => summary.failed += 1,
                    EndState::Unknown => summary.unknown += 1,
                }
                summary
            })
    }
}

/// Build one execution record per launched event
///
/// A launch is completed by the first completed event (in input order) with
/// the same pod instance; failing that, by the first failed event; otherwise
/// its end state is unknown. Terminal events stamped before the launch are
/// not considered. Records are returned sorted by plugin name, keeping input
/// order among equal names.
pub fn correlate(events: &[LifecycleEvent]) -> Vec<ExecutionRecord> {
    let completed = index_by_instance(events, EventKind::Completed);
    let failed = index_by_instance(events, EventKind::Failed);

    let mut records: Vec<ExecutionRecord> = events
        .iter()
        .filter(|e| e.kind == EventKind::Launched)
        .map(|launch| {
            let termination = first_terminal(&completed, launch)
                .map(|done| Termination::Completed {
                    at: done.timestamp,
                    node_name: done.pod_node_name.clone(),
                })
                .or_else(|| {
                    first_terminal(&failed, launch).map(|fail| Termination::Failed {
                        at: fail.timestamp,
                        node_name: fail.pod_node_name.clone(),
                        reason: fail.reason.clone(),
                        error_log: fail.error_log.clone(),
                    })
                })
                .unwrap_or(Termination::Unknown);

            ExecutionRecord {
                launch: launch.clone(),
                termination,
            }
        })
        .collect();

    records.sort_by(|a, b| a.launch.plugin_name.cmp(&b.launch.plugin_name));
    records
}

fn index_by_instance(events: &[LifecycleEvent], kind: EventKind) -> HashMap<&str, Vec<&LifecycleEvent>> {
    let mut index: HashMap<&str, Vec<&LifecycleEvent>> = HashMap::new();
    for event in events.iter().filter(|e| e.kind == kind) {
        index
            .entry(event.pod_instance.as_str())
            .or_default()
            .push(event);
    }
    index
}

fn first_terminal<'a>(
    index: &HashMap<&str, Vec<&'a LifecycleEvent>>,
    launch: &LifecycleEvent,
) -> Option<&'a LifecycleEvent> {
    index
        .get(launch.pod_instance.as_str())?
        .iter()
        .find(|e| e.timestamp >= launch.timestamp)
        .copied()
}
