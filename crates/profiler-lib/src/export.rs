//! Flat dataset export for execution records and profile rows
//!
//! Every temporal field is written as an ISO-8601 string and missing values
//! are left empty (CSV) or `null` (JSON).

use crate::models::{ExecutionRecord, ProfileRow};
use crate::tabular;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXECUTION_COLUMNS: &[&str] = &[
    "timestamp",
    "node",
    "vsn",
    "event",
    "k3s_pod_instance",
    "k3s_pod_node_name",
    "plugin_name",
    "plugin_image",
    "plugin_task",
    "plugin_selector",
    "completed_at",
    "failed_at",
    "execution_time",
    "end_state",
    "reason",
    "error_log",
];

pub const PROFILE_COLUMNS: &[&str] = &[
    "timestamp",
    "cpu",
    "mem",
    "sys_power",
    "cpugpu_power",
    "plugin_instance",
    "device",
    "gpu_requested",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk dataset format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    /// JSON for `.json` paths, CSV otherwise
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ExportFormat::Json,
            _ => ExportFormat::Csv,
        }
    }
}

/// Flat view of an execution record
#[derive(Debug, Serialize)]
struct ExecutionRow<'a> {
    timestamp: String,
    node: &'a str,
    vsn: &'a str,
    event: &'a str,
    k3s_pod_instance: &'a str,
    k3s_pod_node_name: &'a str,
    plugin_name: &'a str,
    plugin_image: Option<&'a str>,
    plugin_task: Option<&'a str>,
    plugin_selector: Option<&'a str>,
    completed_at: Option<String>,
    failed_at: Option<String>,
    execution_time: Option<f64>,
    end_state: &'a str,
    reason: Option<&'a str>,
    error_log: Option<&'a str>,
}

impl<'a> ExecutionRow<'a> {
    fn new(record: &'a ExecutionRecord) -> Self {
        let launch = &record.launch;
        Self {
            timestamp: iso(launch.timestamp),
            node: &launch.node,
            vsn: &launch.vsn,
            event: launch.kind.as_str(),
            k3s_pod_instance: &launch.pod_instance,
            k3s_pod_node_name: record.node_name(),
            plugin_name: &launch.plugin_name,
            plugin_image: launch.plugin_image.as_deref(),
            plugin_task: launch.plugin_task.as_deref(),
            plugin_selector: launch.plugin_selector.as_deref(),
            completed_at: record.completed_at().map(iso),
            failed_at: record.failed_at().map(iso),
            execution_time: record.execution_time(),
            end_state: record.end_state().as_str(),
            reason: record.reason(),
            error_log: record.error_log(),
        }
    }

    fn cells(&self) -> Vec<String> {
        let text = |v: Option<&str>| v.unwrap_or_default().to_string();
        vec![
            self.timestamp.clone(),
            self.node.to_string(),
            self.vsn.to_string(),
            self.event.to_string(),
            self.k3s_pod_instance.to_string(),
            self.k3s_pod_node_name.to_string(),
            self.plugin_name.to_string(),
            text(self.plugin_image),
            text(self.plugin_task),
            text(self.plugin_selector),
            self.completed_at.clone().unwrap_or_default(),
            self.failed_at.clone().unwrap_or_default(),
            tabular::format_opt_f64(self.execution_time),
            self.end_state.to_string(),
            text(self.reason),
            text(self.error_log),
        ]
    }
}

/// Flat view of a profile row
#[derive(Debug, Serialize)]
struct FlatProfileRow<'a> {
    timestamp: String,
    cpu: f64,
    mem: Option<f64>,
    sys_power: Option<f64>,
    cpugpu_power: Option<f64>,
    plugin_instance: &'a str,
    device: Option<&'static str>,
    gpu_requested: bool,
}

impl<'a> FlatProfileRow<'a> {
    fn new(row: &'a ProfileRow) -> Self {
        Self {
            timestamp: iso(row.timestamp),
            cpu: row.cpu,
            mem: row.mem,
            sys_power: row.sys_power,
            cpugpu_power: row.cpugpu_power,
            plugin_instance: &row.plugin_instance,
            device: row.device.map(|d| d.as_str()),
            gpu_requested: row.gpu_requested,
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.timestamp.clone(),
            if self.cpu.is_nan() {
                String::new()
            } else {
                self.cpu.to_string()
            },
            tabular::format_opt_f64(self.mem),
            tabular::format_opt_f64(self.sys_power),
            tabular::format_opt_f64(self.cpugpu_power),
            self.plugin_instance.to_string(),
            self.device.unwrap_or_default().to_string(),
            self.gpu_requested.to_string(),
        ]
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub fn executions_to_csv(records: &[ExecutionRecord]) -> String {
    tabular::render(
        EXECUTION_COLUMNS,
        records.iter().map(|r| ExecutionRow::new(r).cells()),
    )
}

pub fn executions_to_json(records: &[ExecutionRecord]) -> Result<String, ExportError> {
    let rows: Vec<_> = records.iter().map(ExecutionRow::new).collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

pub fn profiles_to_csv(rows: &[ProfileRow]) -> String {
    tabular::render(
        PROFILE_COLUMNS,
        rows.iter().map(|r| FlatProfileRow::new(r).cells()),
    )
}

pub fn profiles_to_json(rows: &[ProfileRow]) -> Result<String, ExportError> {
    let flat: Vec<_> = rows.iter().map(FlatProfileRow::new).collect();
    Ok(serde_json::to_string_pretty(&flat)?)
}

/// Write execution records to `path`, format chosen from its extension
pub async fn write_executions(path: &Path, records: &[ExecutionRecord]) -> Result<(), ExportError> {
    let content = match ExportFormat::from_path(path) {
        ExportFormat::Csv => executions_to_csv(records),
        ExportFormat::Json => executions_to_json(records)?,
    };
    write(path, content).await
}

/// Write profile rows to `path`, format chosen from its extension
pub async fn write_profiles(path: &Path, rows: &[ProfileRow]) -> Result<(), ExportError> {
    let content = match ExportFormat::from_path(path) {
        ExportFormat::Csv => profiles_to_csv(rows),
        ExportFormat::Json => profiles_to_json(rows)?,
    };
    write(path, content).await
}

async fn write(path: &Path, content: String) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ExportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    tokio::fs::write(path, content)
        .await
        .map_err(|source| ExportError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceClass, EventKind, LifecycleEvent, Termination};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn failed_record() -> ExecutionRecord {
        ExecutionRecord {
            launch: LifecycleEvent {
                kind: EventKind::Launched,
                timestamp: t0(),
                node: "000048b02d15bc7c".to_string(),
                vsn: "W023".to_string(),
                pod_instance: "imagesampler-top-abc123".to_string(),
                pod_node_name: "000048b02d15bc7c.ws-nxcore".to_string(),
                plugin_name: "imagesampler-top".to_string(),
                plugin_selector: Some(r#"{"resource.gpu":"true"}"#.to_string()),
                plugin_image: None,
                plugin_task: None,
                reason: None,
                error_log: None,
            },
            termination: Termination::Failed {
                at: t0() + Duration::seconds(45),
                node_name: "000048b02d15bc7c.ws-nxcore".to_string(),
                reason: Some("Error".to_string()),
                error_log: Some("Traceback\n  boom, again".to_string()),
            },
        }
    }

    fn profile_row(cpu: f64) -> ProfileRow {
        ProfileRow {
            timestamp: t0(),
            cpu,
            mem: Some(1100.0),
            sys_power: None,
            cpugpu_power: None,
            plugin_instance: "imagesampler-top-abc123".to_string(),
            device: Some(DeviceClass::Jetson),
            gpu_requested: true,
        }
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ExportFormat::from_path(Path::new("out.json")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out.JSON")), ExportFormat::Json);
        assert_eq!(ExportFormat::from_path(Path::new("out.csv")), ExportFormat::Csv);
        assert_eq!(ExportFormat::from_path(Path::new("out")), ExportFormat::Csv);
    }

    #[test]
    fn test_execution_csv() {
        let csv = executions_to_csv(&[failed_record()]);
        let rows = tabular::parse(&csv).unwrap();

        assert_eq!(rows[0], EXECUTION_COLUMNS.to_vec());
        let row = &rows[1];
        assert_eq!(row[0], "2024-01-01T00:00:00+00:00");
        assert_eq!(row[10], "");
        assert_eq!(row[11], "2024-01-01T00:00:45+00:00");
        assert_eq!(row[12], "45");
        assert_eq!(row[13], "failed");
        assert_eq!(row[15], "Traceback\n  boom, again");
    }

    #[test]
    fn test_execution_json() {
        let json = executions_to_json(&[failed_record()]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["end_state"], "failed");
        assert_eq!(value[0]["completed_at"], serde_json::Value::Null);
        assert_eq!(value[0]["execution_time"], 45.0);
    }

    #[test]
    fn test_profile_csv_leaves_missing_empty() {
        let csv = profiles_to_csv(&[profile_row(f64::NAN), profile_row(0.5)]);
        let rows = tabular::parse(&csv).unwrap();

        assert_eq!(rows[1][1], "");
        assert_eq!(rows[1][2], "1100");
        assert_eq!(rows[1][3], "");
        assert_eq!(rows[1][6], "Jetson");
        assert_eq!(rows[1][7], "true");
        assert_eq!(rows[2][1], "0.5");
    }

    #[tokio::test]
    async fn test_write_profiles_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("profiles.json");

        write_profiles(&path, &[profile_row(1.0)]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[0]["device"], "Jetson");
        assert_eq!(value[0]["sys_power"], serde_json::Value::Null);
    }
}
