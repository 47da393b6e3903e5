//! Core data models for the plugin profiler

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheduler lifecycle notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Launched,
    Completed,
    Failed,
}

impl EventKind {
    /// Classify a scheduler metric name such as `sys.scheduler.status.plugin.launched`
    ///
    /// Only the final dot-separated segment is inspected. The scheduler
    /// publishes completion as `complete`; `completed` is accepted as well.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name.rsplit('.').next()? {
            "launched" => Some(EventKind::Launched),
            "complete" | "completed" => Some(EventKind::Completed),
            "failed" => Some(EventKind::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Launched => "launched",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scheduler status notification for a plugin pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    /// Node identifier reported by the telemetry pipeline
    pub node: String,
    /// Fleet node version (VSN), e.g. `W023`
    pub vsn: String,
    /// Correlation key between a launch and its terminal event
    pub pod_instance: String,
    pub pod_node_name: String,
    pub plugin_name: String,
    /// JSON-encoded node selector map, when the plugin declared one
    pub plugin_selector: Option<String>,
    pub plugin_image: Option<String>,
    pub plugin_task: Option<String>,
    pub reason: Option<String>,
    pub error_log: Option<String>,
}

/// Final state of an execution record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndState {
    Completed,
    Failed,
    Unknown,
}

impl EndState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndState::Completed => "completed",
            EndState::Failed => "failed",
            EndState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EndState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an execution ended, as observed from its terminal event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "end_state", rename_all = "lowercase")]
pub enum Termination {
    Completed {
        at: DateTime<Utc>,
        node_name: String,
    },
    Failed {
        at: DateTime<Utc>,
        node_name: String,
        reason: Option<String>,
        error_log: Option<String>,
    },
    /// No terminal event was observed in the queried window
    Unknown,
}

/// A launched plugin pod together with its observed outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub launch: LifecycleEvent,
    pub termination: Termination,
}

impl ExecutionRecord {
    pub fn end_state(&self) -> EndState {
        match self.termination {
            Termination::Completed { .. } => EndState::Completed,
            Termination::Failed { .. } => EndState::Failed,
            Termination::Unknown => EndState::Unknown,
        }
    }

    pub fn pod_instance(&self) -> &str {
        &self.launch.pod_instance
    }

    pub fn plugin_name(&self) -> &str {
        &self.launch.plugin_name
    }

    pub fn launched_at(&self) -> DateTime<Utc> {
        self.launch.timestamp
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Termination::Completed { at, .. } => Some(at),
            _ => None,
        }
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Termination::Failed { at, .. } => Some(at),
            _ => None,
        }
    }

    /// Timestamp of the terminal event, whichever kind it was
    pub fn terminal_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at().or_else(|| self.failed_at())
    }

    /// Execution duration in seconds (terminal minus launch)
    pub fn execution_time(&self) -> Option<f64> {
        self.terminal_at()
            .map(|end| duration_secs(end - self.launch.timestamp))
    }

    /// Node name reported by the terminal event, or by the launch when unknown
    pub fn node_name(&self) -> &str {
        match &self.termination {
            Termination::Completed { node_name, .. } | Termination::Failed { node_name, .. } => {
                node_name
            }
            Termination::Unknown => &self.launch.pod_node_name,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match &self.termination {
            Termination::Failed { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn error_log(&self) -> Option<&str> {
        match &self.termination {
            Termination::Failed { error_log, .. } => error_log.as_deref(),
            _ => None,
        }
    }
}

/// Numeric telemetry measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricSample {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: f64,
    pub container: Option<String>,
    pub sensor: Option<String>,
}

/// Instantaneous CPU utilization derived from a cumulative counter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUtilizationSample {
    pub timestamp: DateTime<Utc>,
    /// Seconds since the first row of the reconstruction window
    pub elapsed_secs: f64,
    /// Percentage of one core; `NaN` when two samples share a timestamp
    pub cpu_percent: f64,
}

/// Hardware family of an edge node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Jetson,
    RaspberryPi,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Jetson => "Jetson",
            DeviceClass::RaspberryPi => "RaspberryPi",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One aligned timestamp of an execution's resource profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub timestamp: DateTime<Utc>,
    pub cpu: f64,
    /// RSS plus working set, in bytes
    pub mem: Option<f64>,
    /// Total board power (mW)
    pub sys_power: Option<f64>,
    /// CPU+GPU rail power (mW)
    pub cpugpu_power: Option<f64>,
    pub plugin_instance: String,
    pub device: Option<DeviceClass>,
    pub gpu_requested: bool,
}

/// Convert a chrono duration into fractional seconds
pub fn duration_secs(duration: Duration) -> f64 {
    match duration.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => duration.num_milliseconds() as f64 / 1_000.0,
    }
}
