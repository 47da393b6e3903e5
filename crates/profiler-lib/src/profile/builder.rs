//! Per-execution profile assembly
//!
//! For each execution record: query the node's metrics over the execution
//! window padded on both sides, rebuild CPU utilization from the container's
//! counter, sum the memory streams, align everything on the CPU timeline,
//! and tag the rows with the execution's metadata.

use super::device::{device_class, gpu_requested};
use crate::models::{ExecutionRecord, ProfileRow};
use crate::observability::{BatchLogger, BatchMetrics};
use crate::signal::{align, cpu_utilization, AlignError, PowerStreams, Series};
use crate::telemetry::{
    TelemetryError, TelemetryFrame, TelemetryQuery, TelemetrySource, CPU_USAGE_METRIC,
    MEMORY_RSS_METRIC, MEMORY_WORKING_SET_METRIC, POWER_METRIC,
};
use chrono::{DateTime, Duration, Utc};
use std::time::Instant;
use thiserror::Error;

/// Default padding added before launch and after termination
pub const DEFAULT_WINDOW_PADDING_SECS: i64 = 60;

/// Metadata key carrying the power rail name
pub const SENSOR_META: &str = "sensor";
/// Total board input rail
pub const SYSTEM_POWER_SENSOR: &str = "vdd_in";
/// Combined CPU, GPU and CV rail
pub const CPU_GPU_POWER_SENSOR: &str = "vdd_cpu_gpu_cv";

/// Why an execution produced no profile
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("no terminal event observed for {instance}")]
    NoTerminalEvent { instance: String },

    #[error("no telemetry between {start} and {end}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("telemetry query failed: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("failed to align {cpu_samples} cpu samples with {mem_samples} memory samples: {source}")]
    Alignment {
        #[source]
        source: AlignError,
        cpu_samples: usize,
        mem_samples: usize,
    },
}

impl ProfileError {
    /// Short label used for metrics and summaries
    pub fn reason(&self) -> &'static str {
        match self {
            ProfileError::NoTerminalEvent { .. } => "no_terminal_event",
            ProfileError::EmptyWindow { .. } => "empty_window",
            ProfileError::Telemetry(_) => "telemetry",
            ProfileError::Alignment { .. } => "alignment",
        }
    }
}

/// Result of profiling one execution within a batch
#[derive(Debug)]
pub enum ExecutionOutcome {
    Profiled { plugin_instance: String, rows: usize },
    Skipped { plugin_instance: String, error: ProfileError },
}

impl ExecutionOutcome {
    pub fn plugin_instance(&self) -> &str {
        match self {
            ExecutionOutcome::Profiled { plugin_instance, .. }
            | ExecutionOutcome::Skipped { plugin_instance, .. } => plugin_instance,
        }
    }

    pub fn is_profiled(&self) -> bool {
        matches!(self, ExecutionOutcome::Profiled { .. })
    }
}

/// Rows of every profiled execution plus one outcome per record
#[derive(Debug, Default)]
pub struct BatchReport {
    pub rows: Vec<ProfileRow>,
    pub outcomes: Vec<ExecutionOutcome>,
}

impl BatchReport {
    pub fn profiled_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_profiled()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.profiled_count()
    }
}

/// Configuration for profile building
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    /// Padding applied on both sides of the execution window (default: 1 minute)
    pub window_padding: Duration,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            window_padding: Duration::seconds(DEFAULT_WINDOW_PADDING_SECS),
        }
    }
}

/// Builds resource profiles for execution records from a telemetry source
pub struct ProfileBuilder<S> {
    source: S,
    config: ProfileConfig,
    logger: BatchLogger,
    metrics: Option<BatchMetrics>,
}

impl<S: TelemetrySource> ProfileBuilder<S> {
    pub fn new(source: S, logger: BatchLogger) -> Self {
        Self {
            source,
            config: ProfileConfig::default(),
            logger,
            metrics: None,
        }
    }

    pub fn with_config(mut self, config: ProfileConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metrics(mut self, metrics: BatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Padded query window of an execution
    pub fn window(
        &self,
        record: &ExecutionRecord,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), ProfileError> {
        let end = record
            .terminal_at()
            .ok_or_else(|| ProfileError::NoTerminalEvent {
                instance: record.pod_instance().to_string(),
            })?;
        let padding = self.config.window_padding;

        Ok((record.launched_at() - padding, end + padding))
    }

    /// Profile a single execution
    pub async fn build(&self, record: &ExecutionRecord) -> Result<Vec<ProfileRow>, ProfileError> {
        let instance = record.pod_instance();
        let (start, end) = self.window(record)?;

        self.logger.log_execution_fetch(instance, start, end);
        let query = TelemetryQuery::performance(&record.launch.vsn, start, Some(end));
        let started = Instant::now();
        let frame = self.source.query(&query).await?;

        if let Some(metrics) = &self.metrics {
            metrics.observe_query_latency(started.elapsed().as_secs_f64());
            metrics.add_samples_fetched(frame.len() as u64);
        }

        if frame.is_empty() {
            return Err(ProfileError::EmptyWindow { start, end });
        }

        self.assemble(record, &frame)
    }

    /// Turn an execution's telemetry frame into aligned profile rows
    pub fn assemble(
        &self,
        record: &ExecutionRecord,
        frame: &TelemetryFrame,
    ) -> Result<Vec<ProfileRow>, ProfileError> {
        let instance = record.pod_instance();
        let plugin = record.plugin_name();
        let container_samples = |metric: &str| {
            let samples: Vec<_> = frame
                .metric_samples(metric)
                .into_iter()
                .filter(|s| s.container.as_deref() == Some(plugin))
                .collect();
            self.logger.log_metric_records(instance, metric, samples.len());
            samples
        };

        let cpu = cpu_utilization(&container_samples(CPU_USAGE_METRIC), record.launched_at());
        let rss = Series::from_samples(&container_samples(MEMORY_RSS_METRIC));
        let working_set = Series::from_samples(&container_samples(MEMORY_WORKING_SET_METRIC));
        let mem = working_set.sum_matching(&rss);

        let power = if frame.has_meta(SENSOR_META) {
            let rail = |sensor: &str| {
                let samples: Vec<_> = frame
                    .metric_samples(POWER_METRIC)
                    .into_iter()
                    .filter(|s| s.sensor.as_deref() == Some(sensor))
                    .collect();
                self.logger.log_metric_records(instance, sensor, samples.len());
                Series::from_samples(&samples)
            };
            PowerStreams::Reported {
                system: rail(SYSTEM_POWER_SENSOR),
                cpu_gpu: rail(CPU_GPU_POWER_SENSOR),
            }
        } else {
            let columns: Vec<&str> = frame.meta_columns().collect();
            self.logger.log_power_unavailable(instance, &columns);
            PowerStreams::Unavailable
        };

        // Every stream above is sorted on construction, so this only fires
        // if that stops holding.
        let aligned = align(&cpu, &mem, &power).map_err(|source| ProfileError::Alignment {
            source,
            cpu_samples: cpu.len(),
            mem_samples: mem.len(),
        })?;

        let device = device_class(record.node_name());
        let gpu = gpu_requested(record.launch.plugin_selector.as_deref());

        Ok((0..aligned.len())
            .map(|i| ProfileRow {
                timestamp: aligned.timestamps[i],
                cpu: aligned.cpu[i],
                mem: aligned.mem[i],
                sys_power: aligned.sys_power[i],
                cpugpu_power: aligned.cpugpu_power[i],
                plugin_instance: instance.to_string(),
                device,
                gpu_requested: gpu,
            })
            .collect())
    }

    /// Profile every record in order, continuing past failures
    pub async fn build_all(&self, records: &[ExecutionRecord]) -> BatchReport {
        let mut report = BatchReport::default();

        for record in records {
            let instance = record.pod_instance().to_string();
            if let Some(metrics) = &self.metrics {
                metrics.inc_executions();
            }

            match self.build(record).await {
                Ok(rows) => {
                    self.logger.log_execution_profiled(&instance, rows.len());
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_profiled(rows.len() as u64);
                    }
                    report.outcomes.push(ExecutionOutcome::Profiled {
                        plugin_instance: instance,
                        rows: rows.len(),
                    });
                    report.rows.extend(rows);
                }
                Err(error) => {
                    self.logger
                        .log_execution_skipped(&instance, error.reason(), &error.to_string());
                    if let Some(metrics) = &self.metrics {
                        metrics.inc_skipped(error.reason());
                    }
                    report.outcomes.push(ExecutionOutcome::Skipped {
                        plugin_instance: instance,
                        error,
                    });
                }
            }
        }

        self.logger.log_batch_complete(
            report.profiled_count(),
            report.skipped_count(),
            report.rows.len(),
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceClass, EventKind, LifecycleEvent, RawMetricSample, Termination};
    use crate::telemetry::{SampleValue, TelemetryRecord};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    /// Serves one canned frame and remembers the windows it was asked for
    struct MockSource {
        frame: TelemetryFrame,
        windows: Mutex<Vec<(DateTime<Utc>, Option<DateTime<Utc>>)>>,
    }

    impl MockSource {
        fn new(frame: TelemetryFrame) -> Self {
            Self {
                frame,
                windows: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TelemetrySource for MockSource {
        async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
            self.windows.lock().unwrap().push((query.start, query.end));
            Ok(self.frame.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl TelemetrySource for FailingSource {
        async fn query(&self, _query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
            Err(TelemetryError::Status {
                status: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn at(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    fn sample(name: &str, offset_secs: i64, value: f64, meta: &[(&str, &str)]) -> TelemetryRecord {
        TelemetryRecord {
            timestamp: at(offset_secs),
            name: name.to_string(),
            value: SampleValue::Number(value),
            meta: meta
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn record(instance: &str, termination: Termination, selector: Option<&str>) -> ExecutionRecord {
        ExecutionRecord {
            launch: LifecycleEvent {
                kind: EventKind::Launched,
                timestamp: at(0),
                node: "000048b02d15bc7c".to_string(),
                vsn: "W023".to_string(),
                pod_instance: instance.to_string(),
                pod_node_name: "000048b02d15bc7c.ws-nxcore".to_string(),
                plugin_name: "plugin-a".to_string(),
                plugin_selector: selector.map(str::to_string),
                plugin_image: None,
                plugin_task: None,
                reason: None,
                error_log: None,
            },
            termination,
        }
    }

    fn completed(instance: &str) -> ExecutionRecord {
        record(
            instance,
            Termination::Completed {
                at: at(120),
                node_name: "000048b02d15bc7c.ws-nxcore".to_string(),
            },
            Some(r#"{"resource.gpu":"true"}"#),
        )
    }

    fn container_frame(with_power: bool) -> TelemetryFrame {
        let plugin = [("container", "plugin-a")];
        let mut records = vec![
            sample(CPU_USAGE_METRIC, 0, 1.0, &plugin),
            sample(CPU_USAGE_METRIC, 60, 1.3, &plugin),
            sample(CPU_USAGE_METRIC, 120, 1.9, &plugin),
            sample(CPU_USAGE_METRIC, 60, 99.0, &[("container", "plugin-b")]),
            sample(MEMORY_RSS_METRIC, 0, 100.0, &plugin),
            sample(MEMORY_RSS_METRIC, 60, 200.0, &plugin),
            sample(MEMORY_WORKING_SET_METRIC, 0, 1000.0, &plugin),
            sample(MEMORY_WORKING_SET_METRIC, 60, 2000.0, &plugin),
        ];
        if with_power {
            records.push(sample(POWER_METRIC, -10, 4500.0, &[("sensor", SYSTEM_POWER_SENSOR)]));
            records.push(sample(POWER_METRIC, 30, 1200.0, &[("sensor", CPU_GPU_POWER_SENSOR)]));
        }
        TelemetryFrame::new(records)
    }

    #[tokio::test]
    async fn test_build_completed_execution() {
        let builder = ProfileBuilder::new(MockSource::new(container_frame(true)), BatchLogger::new("W023"));

        let rows = builder.build(&completed("plugin-a-abc")).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows[0].cpu.is_nan());
        assert!((rows[1].cpu - 0.5).abs() < 1e-9);
        assert!((rows[2].cpu - 1.0).abs() < 1e-9);
        assert_eq!(rows[0].mem, Some(1100.0));
        assert_eq!(rows[2].mem, Some(2200.0));
        assert_eq!(rows[0].sys_power, Some(4500.0));
        assert_eq!(rows[0].cpugpu_power, None);
        assert_eq!(rows[1].cpugpu_power, Some(1200.0));
        assert!(rows.iter().all(|r| r.plugin_instance == "plugin-a-abc"));
        assert!(rows.iter().all(|r| r.device == Some(DeviceClass::Jetson)));
        assert!(rows.iter().all(|r| r.gpu_requested));
    }

    #[tokio::test]
    async fn test_window_is_padded() {
        let source = MockSource::new(container_frame(false));
        let builder = ProfileBuilder::new(source, BatchLogger::new("W023")).with_config(ProfileConfig {
            window_padding: Duration::seconds(30),
        });

        builder.build(&completed("plugin-a-abc")).await.unwrap();

        let windows = builder.source().windows.lock().unwrap().clone();
        assert_eq!(windows, vec![(at(-30), Some(at(150)))]);
    }

    #[tokio::test]
    async fn test_missing_sensor_metadata_leaves_power_empty() {
        let builder = ProfileBuilder::new(MockSource::new(container_frame(false)), BatchLogger::new("W023"));

        let rows = builder.build(&completed("plugin-a-abc")).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.sys_power.is_none() && r.cpugpu_power.is_none()));
        assert_eq!(rows[1].mem, Some(2200.0));
    }

    #[tokio::test]
    async fn test_failed_execution_uses_failure_time() {
        let builder = ProfileBuilder::new(MockSource::new(container_frame(false)), BatchLogger::new("W023"));
        let failed = record(
            "plugin-a-def",
            Termination::Failed {
                at: at(90),
                node_name: "sage-rpi-01".to_string(),
                reason: Some("Error".to_string()),
                error_log: None,
            },
            None,
        );

        let (start, end) = builder.window(&failed).unwrap();
        assert_eq!((start, end), (at(-60), at(150)));

        let rows = builder.build(&failed).await.unwrap();
        assert!(rows.iter().all(|r| r.device == Some(DeviceClass::RaspberryPi)));
        assert!(rows.iter().all(|r| !r.gpu_requested));
    }

    #[tokio::test]
    async fn test_unknown_end_state_is_skipped() {
        let builder = ProfileBuilder::new(MockSource::new(container_frame(false)), BatchLogger::new("W023"));
        let err = builder
            .build(&record("plugin-a-ghi", Termination::Unknown, None))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "no_terminal_event");
        assert!(builder.source().windows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_window() {
        let builder = ProfileBuilder::new(MockSource::new(TelemetryFrame::default()), BatchLogger::new("W023"));
        let err = builder.build(&completed("plugin-a-abc")).await.unwrap_err();

        assert!(matches!(err, ProfileError::EmptyWindow { .. }));
    }

    #[tokio::test]
    async fn test_build_all_continues_past_failures() {
        let metrics = BatchMetrics::new();
        let builder = ProfileBuilder::new(MockSource::new(container_frame(true)), BatchLogger::new("W023"))
            .with_metrics(metrics.clone());
        let records = vec![
            completed("plugin-a-1"),
            record("plugin-a-2", Termination::Unknown, None),
            completed("plugin-a-3"),
        ];

        let report = builder.build_all(&records).await;

        assert_eq!(report.profiled_count(), 2);
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(report.rows.len(), 6);
        assert_eq!(report.outcomes[1].plugin_instance(), "plugin-a-2");
        assert_eq!(metrics.executions_profiled(), 2);
        assert_eq!(metrics.profile_rows(), 6);
        assert_eq!(metrics.executions_skipped("no_terminal_event"), 1);
    }

    #[tokio::test]
    async fn test_telemetry_error_is_reported() {
        let builder = ProfileBuilder::new(FailingSource, BatchLogger::new("W023"));
        let report = builder.build_all(&[completed("plugin-a-1")]).await;

        assert_eq!(report.profiled_count(), 0);
        match &report.outcomes[0] {
            ExecutionOutcome::Skipped { error, .. } => assert_eq!(error.reason(), "telemetry"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_alignment_error_reason() {
        let cpu = cpu_utilization(
            &[RawMetricSample {
                timestamp: at(0),
                name: CPU_USAGE_METRIC.to_string(),
                value: 1.0,
                container: Some("plugin-a".to_string()),
                sensor: None,
            }],
            at(0),
        );
        let unsorted = Series::new(vec![(at(60), 2.0), (at(0), 1.0)]);
        let source = align(&cpu, &unsorted, &PowerStreams::Unavailable).unwrap_err();

        let error = ProfileError::Alignment {
            source,
            cpu_samples: cpu.len(),
            mem_samples: unsorted.len(),
        };
        assert_eq!(error.reason(), "alignment");
        assert!(error.to_string().contains("1 cpu samples with 2 memory samples"));
    }
}
