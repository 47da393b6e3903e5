//! CPU utilization from cumulative CPU-seconds counters

use crate::models::{duration_secs, CpuUtilizationSample, RawMetricSample};
use chrono::{DateTime, Utc};

/// Convert a cumulative CPU-seconds series into utilization percentages
///
/// A zero reading is synthesized at `anchor` (the execution's launch) so the
/// first real sample is measured against it. Rows are stable-sorted by
/// timestamp, and every row after the first yields
/// `Δvalue / Δseconds × 100`; the first row only serves as a base and is
/// not emitted, so the output has one row per input sample.
///
/// Two rows sharing a timestamp give a `NaN` utilization for the later one,
/// which still becomes the base for the next row.
pub fn cpu_utilization(samples: &[RawMetricSample], anchor: DateTime<Utc>) -> Vec<CpuUtilizationSample> {
    let mut rows: Vec<(DateTime<Utc>, f64)> = Vec::with_capacity(samples.len() + 1);
    rows.push((anchor, 0.0));
    rows.extend(samples.iter().map(|s| (s.timestamp, s.value)));
    rows.sort_by_key(|(ts, _)| *ts);

    let window_start = rows[0].0;

    rows.windows(2)
        .map(|pair| {
            let (prev_ts, prev_value) = pair[0];
            let (ts, value) = pair[1];
            let dt = duration_secs(ts - prev_ts);
            let cpu_percent = if dt == 0.0 {
                f64::NAN
            } else {
                (value - prev_value) / dt * 100.0
            };

            CpuUtilizationSample {
                timestamp: ts,
                elapsed_secs: duration_secs(ts - window_start),
                cpu_percent,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn counter(offset_secs: i64, value: f64) -> RawMetricSample {
        RawMetricSample {
            timestamp: t0() + Duration::seconds(offset_secs),
            name: "container_cpu_usage_seconds_total".to_string(),
            value,
            container: Some("plugin-a".to_string()),
            sensor: None,
        }
    }

    #[test]
    fn test_empty_series() {
        assert!(cpu_utilization(&[], t0()).is_empty());
    }

    #[test]
    fn test_first_sample_measured_from_anchor() {
        let samples = vec![counter(30, 3.0), counter(60, 6.0)];
        let cpu = cpu_utilization(&samples, t0());

        assert_eq!(cpu.len(), samples.len());
        assert!((cpu[0].cpu_percent - 3.0 / 30.0 * 100.0).abs() < 1e-9);
        assert_eq!(cpu[0].elapsed_secs, 30.0);
        assert!((cpu[1].cpu_percent - 10.0).abs() < 1e-9);
        assert_eq!(cpu[1].elapsed_secs, 60.0);
    }

    #[test]
    fn test_launch_scenario_with_sample_at_anchor() {
        let samples = vec![counter(0, 1.0), counter(60, 1.3), counter(120, 1.9)];
        let cpu = cpu_utilization(&samples, t0());

        assert_eq!(cpu.len(), 3);
        assert!(cpu[0].cpu_percent.is_nan());
        assert_eq!(cpu[1].timestamp, t0() + Duration::seconds(60));
        assert!((cpu[1].cpu_percent - 0.5).abs() < 1e-9);
        assert!((cpu[2].cpu_percent - 1.0).abs() < 1e-9);
        assert_eq!(cpu[2].elapsed_secs, 120.0);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let samples = vec![counter(120, 2.0), counter(60, 1.0)];
        let cpu = cpu_utilization(&samples, t0());

        assert_eq!(cpu[0].timestamp, t0() + Duration::seconds(60));
        assert!((cpu[1].cpu_percent - 1.0 / 60.0 * 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_samples_before_anchor() {
        let samples = vec![counter(-30, 5.0), counter(30, 5.6)];
        let cpu = cpu_utilization(&samples, t0());

        // The earliest real sample becomes the base; the anchor is emitted.
        assert_eq!(cpu.len(), 2);
        assert_eq!(cpu[0].timestamp, t0());
        assert_eq!(cpu[0].elapsed_secs, 30.0);
        assert!((cpu[1].cpu_percent - 5.6 / 30.0 * 100.0).abs() < 1e-9);
    }
}
