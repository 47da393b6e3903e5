//! Raw telemetry records and frames
//!
//! A frame keeps the set of metadata columns seen across its records, so
//! consumers can tell "no sensor metadata at all" apart from "no sample for
//! this sensor".

use crate::models::RawMetricSample;
use crate::tabular::{self, TabularError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Prefix used for metadata columns in the tabular form
pub const META_PREFIX: &str = "meta.";

/// Value carried by a telemetry record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleValue {
    Number(f64),
    Text(String),
}

impl SampleValue {
    /// Numeric view of the value; text is parsed when it holds a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SampleValue::Number(v) => Some(*v),
            SampleValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SampleValue::Text(s) => Some(s),
            SampleValue::Number(_) => None,
        }
    }

    fn from_cell(cell: &str) -> Self {
        match cell.parse::<f64>() {
            Ok(v) => SampleValue::Number(v),
            Err(_) => SampleValue::Text(cell.to_string()),
        }
    }
}

impl fmt::Display for SampleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleValue::Number(v) => write!(f, "{}", v),
            SampleValue::Text(s) => f.write_str(s),
        }
    }
}

/// One row returned by the telemetry query API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub value: SampleValue,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl TelemetryRecord {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Typed numeric sample, `None` for text-valued records
    pub fn to_metric_sample(&self) -> Option<RawMetricSample> {
        Some(RawMetricSample {
            timestamp: self.timestamp,
            name: self.name.clone(),
            value: self.value.as_f64()?,
            container: self.meta("container").map(str::to_string),
            sensor: self.meta("sensor").map(str::to_string),
        })
    }
}

/// Ordered collection of telemetry records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryFrame {
    records: Vec<TelemetryRecord>,
    meta_columns: BTreeSet<String>,
}

impl TelemetryFrame {
    pub fn new(records: Vec<TelemetryRecord>) -> Self {
        let meta_columns = records
            .iter()
            .flat_map(|r| r.meta.keys().cloned())
            .collect();
        Self {
            records,
            meta_columns,
        }
    }

    pub fn records(&self) -> &[TelemetryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record carried the given metadata key
    pub fn has_meta(&self, key: &str) -> bool {
        self.meta_columns.contains(key)
    }

    pub fn meta_columns(&self) -> impl Iterator<Item = &str> {
        self.meta_columns.iter().map(String::as_str)
    }

    /// Append another frame's records after this frame's
    pub fn append(&mut self, other: TelemetryFrame) {
        self.meta_columns.extend(other.meta_columns);
        self.records.extend(other.records);
    }

    /// Numeric samples of the named metric, in frame order
    pub fn metric_samples(&self, name: &str) -> Vec<RawMetricSample> {
        self.records
            .iter()
            .filter(|r| r.name == name)
            .filter_map(TelemetryRecord::to_metric_sample)
            .collect()
    }

    /// Render as CSV with one `meta.<key>` column per metadata key
    pub fn to_csv(&self) -> String {
        let mut header: Vec<String> = vec!["timestamp".into(), "name".into(), "value".into()];
        header.extend(self.meta_columns.iter().map(|k| format!("{META_PREFIX}{k}")));
        let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();

        let rows = self.records.iter().map(|record| {
            let mut row = vec![
                record.timestamp.to_rfc3339(),
                record.name.clone(),
                record.value.to_string(),
            ];
            row.extend(
                self.meta_columns
                    .iter()
                    .map(|k| record.meta(k).unwrap_or_default().to_string()),
            );
            row
        });

        tabular::render(&header_refs, rows)
    }

    /// Parse the CSV form produced by [`TelemetryFrame::to_csv`]
    ///
    /// Columns come from the header, so a cached frame keeps its metadata
    /// columns even when every value in them is empty.
    pub fn from_csv(content: &str) -> Result<Self, TabularError> {
        let mut rows = tabular::parse(content)?.into_iter();
        let Some(header) = rows.next() else {
            return Ok(Self::default());
        };

        let column = |name: &str| {
            header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| TabularError::MissingColumn(name.to_string()))
        };
        let ts_idx = column("timestamp")?;
        let name_idx = column("name")?;
        let value_idx = column("value")?;
        let meta_idx: Vec<(usize, String)> = header
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.strip_prefix(META_PREFIX).map(|k| (i, k.to_string())))
            .collect();

        let mut records = Vec::new();
        for (i, row) in rows.enumerate() {
            let row_number = i + 2;
            if row.len() != header.len() {
                return Err(TabularError::RowWidth {
                    row: row_number,
                    expected: header.len(),
                    found: row.len(),
                });
            }

            let timestamp = DateTime::parse_from_rfc3339(&row[ts_idx])
                .map_err(|_| TabularError::InvalidTimestamp {
                    row: row_number,
                    value: row[ts_idx].clone(),
                })?
                .with_timezone(&Utc);

            let meta = meta_idx
                .iter()
                .filter(|(idx, _)| !row[*idx].is_empty())
                .map(|(idx, key)| (key.clone(), row[*idx].clone()))
                .collect();

            records.push(TelemetryRecord {
                timestamp,
                name: row[name_idx].clone(),
                value: SampleValue::from_cell(&row[value_idx]),
                meta,
            });
        }

        Ok(Self {
            records,
            meta_columns: meta_idx.into_iter().map(|(_, k)| k).collect(),
        })
    }
}
