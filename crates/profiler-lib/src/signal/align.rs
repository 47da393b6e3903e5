//! Nearest-preceding alignment of metric streams
//!
//! The CPU utilization series is the timeline backbone. Memory and power
//! readings are joined onto it "as of" each backbone timestamp: the most
//! recent reading at or before it, never an interpolation.

use crate::models::{CpuUtilizationSample, RawMetricSample};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AlignError {
    #[error("{series} timestamps are not sorted at index {index}")]
    Unsorted { series: &'static str, index: usize },
}

/// A timestamped numeric stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<(DateTime<Utc>, f64)>,
}

impl Series {
    /// Wrap points as given; ordering is checked when the series is joined
    pub fn new(points: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self { points }
    }

    /// Stable-sort points by timestamp
    pub fn sorted(mut points: Vec<(DateTime<Utc>, f64)>) -> Self {
        points.sort_by_key(|(ts, _)| *ts);
        Self { points }
    }

    pub fn from_samples(samples: &[RawMetricSample]) -> Self {
        Self::sorted(samples.iter().map(|s| (s.timestamp, s.value)).collect())
    }

    pub fn points(&self) -> &[(DateTime<Utc>, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Pairwise sum of two sorted series at identical timestamps
    ///
    /// Each point of `self` is paired with at most one point of `other`;
    /// timestamps present in only one series are dropped.
    pub fn sum_matching(&self, other: &Series) -> Series {
        let mut out = Vec::with_capacity(self.len().min(other.len()));
        let mut j = 0;

        for &(ts, value) in &self.points {
            while j < other.points.len() && other.points[j].0 < ts {
                j += 1;
            }
            if j < other.points.len() && other.points[j].0 == ts {
                out.push((ts, value + other.points[j].1));
                j += 1;
            }
        }

        Series::new(out)
    }

    fn check_sorted(&self, series: &'static str) -> Result<(), AlignError> {
        check_sorted(self.points.iter().map(|(ts, _)| *ts), series)
    }
}

/// Power readings for the aligned profile
#[derive(Debug, Clone, PartialEq)]
pub enum PowerStreams {
    /// The backend reported no sensor metadata at all
    Unavailable,
    Reported { system: Series, cpu_gpu: Series },
}

/// Column-oriented per-execution table on the CPU backbone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedProfile {
    pub timestamps: Vec<DateTime<Utc>>,
    pub cpu: Vec<f64>,
    pub mem: Vec<Option<f64>>,
    pub sys_power: Vec<Option<f64>>,
    pub cpugpu_power: Vec<Option<f64>>,
}

impl AlignedProfile {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Join this table's own columns back onto its own timeline
    pub fn realign(&self) -> Result<AlignedProfile, AlignError> {
        let column = |values: &[Option<f64>]| {
            Series::new(
                self.timestamps
                    .iter()
                    .zip(values)
                    .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
                    .collect(),
            )
        };

        Ok(AlignedProfile {
            timestamps: self.timestamps.clone(),
            cpu: self.cpu.clone(),
            mem: asof_join(&self.timestamps, &column(&self.mem), "memory")?,
            sys_power: asof_join(&self.timestamps, &column(&self.sys_power), "system power")?,
            cpugpu_power: asof_join(
                &self.timestamps,
                &column(&self.cpugpu_power),
                "cpu+gpu power",
            )?,
        })
    }
}

/// For every backbone timestamp, the latest `series` value at or before it
pub fn asof_join(
    backbone: &[DateTime<Utc>],
    series: &Series,
    name: &'static str,
) -> Result<Vec<Option<f64>>, AlignError> {
    check_sorted(backbone.iter().copied(), "backbone")?;
    series.check_sorted(name)?;

    let points = series.points();
    let mut out = Vec::with_capacity(backbone.len());
    let mut j = 0;
    let mut latest = None;

    for ts in backbone {
        while j < points.len() && points[j].0 <= *ts {
            latest = Some(points[j].1);
            j += 1;
        }
        out.push(latest);
    }

    Ok(out)
}

/// Merge CPU, memory and power streams onto the CPU timeline
pub fn align(
    cpu: &[CpuUtilizationSample],
    mem: &Series,
    power: &PowerStreams,
) -> Result<AlignedProfile, AlignError> {
    let timestamps: Vec<DateTime<Utc>> = cpu.iter().map(|s| s.timestamp).collect();
    let mem = asof_join(&timestamps, mem, "memory")?;

    let (sys_power, cpugpu_power) = match power {
        PowerStreams::Unavailable => (vec![None; timestamps.len()], vec![None; timestamps.len()]),
        PowerStreams::Reported { system, cpu_gpu } => (
            asof_join(&timestamps, system, "system power")?,
            asof_join(&timestamps, cpu_gpu, "cpu+gpu power")?,
        ),
    };

    Ok(AlignedProfile {
        cpu: cpu.iter().map(|s| s.cpu_percent).collect(),
        timestamps,
        mem,
        sys_power,
        cpugpu_power,
    })
}

fn check_sorted(
    timestamps: impl Iterator<Item = DateTime<Utc>>,
    series: &'static str,
) -> Result<(), AlignError> {
    let mut previous: Option<DateTime<Utc>> = None;
    for (index, ts) in timestamps.enumerate() {
        if previous.is_some_and(|p| ts < p) {
            return Err(AlignError::Unsorted { series, index });
        }
        previous = Some(ts);
    }
    Ok(())
}
