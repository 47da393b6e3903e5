//! On-disk cache of telemetry query results
//!
//! Layout: `<root>/<vsn>/<kind>/<sha256 of "vsn,start,end">.csv`. A present
//! file short-circuits the network call entirely.

use super::frame::TelemetryFrame;
use super::query::TelemetryQuery;
use super::{TelemetryError, TelemetrySource};
use crate::observability::{BatchLogger, BatchMetrics};
use crate::tabular::TabularError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cached file {path} is malformed: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: TabularError,
    },
}

/// Directory-backed store of query results
#[derive(Debug, Clone)]
pub struct QueryCache {
    root: PathBuf,
}

impl QueryCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding one node's results of one download kind
    pub fn dir(&self, vsn: &str, kind: &str) -> PathBuf {
        self.root.join(vsn).join(kind)
    }

    /// Hex digest naming the cache file of a window
    pub fn cache_key(vsn: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        let key = format!("{},{},{}", vsn, start.to_rfc3339(), end.to_rfc3339());
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    pub fn path(&self, vsn: &str, kind: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> PathBuf {
        self.dir(vsn, kind)
            .join(format!("{}.csv", Self::cache_key(vsn, start, end)))
    }

    /// Read a cached window, `None` when it was never stored
    pub async fn load(
        &self,
        vsn: &str,
        kind: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<TelemetryFrame>, CacheError> {
        let path = self.path(vsn, kind, start, end);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        TelemetryFrame::from_csv(&content)
            .map(Some)
            .map_err(|source| CacheError::Format { path, source })
    }

    /// Write a window's result, creating directories as needed
    pub async fn store(
        &self,
        vsn: &str,
        kind: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        frame: &TelemetryFrame,
    ) -> Result<PathBuf, CacheError> {
        let dir = self.dir(vsn, kind);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| CacheError::Io {
                path: dir.clone(),
                source,
            })?;

        let path = self.path(vsn, kind, start, end);
        fs::write(&path, frame.to_csv())
            .await
            .map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(path)
    }
}

/// Telemetry source that consults a [`QueryCache`] before its inner source
///
/// Open-ended queries (no end timestamp) are never cached, nor are windows
/// ending in the future, whose data may still be arriving. Cache read or
/// write failures are logged and fall back to the inner source.
pub struct CachedSource<S> {
    inner: S,
    cache: QueryCache,
    kind: String,
    logger: BatchLogger,
    metrics: Option<BatchMetrics>,
}

impl<S: TelemetrySource> CachedSource<S> {
    pub fn new(inner: S, cache: QueryCache, kind: impl Into<String>, logger: BatchLogger) -> Self {
        Self {
            inner,
            cache,
            kind: kind.into(),
            logger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: BatchMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: TelemetrySource> TelemetrySource for CachedSource<S> {
    async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
        let Some(end) = query.end else {
            return self.inner.query(query).await;
        };
        let vsn = query.filter.vsn.as_str();

        match self.cache.load(vsn, &self.kind, query.start, end).await {
            Ok(Some(frame)) => {
                self.logger
                    .log_cache_hit(&self.cache.path(vsn, &self.kind, query.start, end));
                if let Some(metrics) = &self.metrics {
                    metrics.inc_cache_hits();
                }
                return Ok(frame);
            }
            Ok(None) => {}
            Err(e) => self.logger.log_cache_error(&e.to_string()),
        }

        if let Some(metrics) = &self.metrics {
            metrics.inc_cache_misses();
        }
        self.logger.log_download(query.start, end);
        let frame = self.inner.query(query).await?;

        if end > Utc::now() {
            self.logger.log_cache_skipped(end);
            return Ok(frame);
        }

        match self
            .cache
            .store(vsn, &self.kind, query.start, end, &frame)
            .await
        {
            Ok(path) => self.logger.log_cache_saved(&path),
            Err(e) => self.logger.log_cache_error(&e.to_string()),
        }

        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{SampleValue, TelemetryRecord};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TelemetrySource for CountingSource {
        async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TelemetryFrame::new(vec![TelemetryRecord {
                timestamp: query.start,
                name: "container_memory_rss".to_string(),
                value: SampleValue::Number(1.0),
                meta: [("vsn".to_string(), query.filter.vsn.clone())].into(),
            }]))
        }
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (start, start + Duration::days(1))
    }

    #[test]
    fn test_cache_key_is_stable_hex() {
        let (start, end) = window();
        let key = QueryCache::cache_key("W023", start, end);

        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, QueryCache::cache_key("W023", start, end));
        assert_ne!(key, QueryCache::cache_key("W024", start, end));
    }

    #[test]
    fn test_cache_layout() {
        let cache = QueryCache::new("/tmp/cache-root");
        let (start, end) = window();
        let path = cache.path("W023", "perf", start, end);

        assert!(path.starts_with("/tmp/cache-root/W023/perf"));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("csv"));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let cache = QueryCache::new(temp_dir.path());
        let (start, end) = window();

        assert!(cache.load("W023", "job", start, end).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_source_hits_after_first_query() {
        let temp_dir = TempDir::new().unwrap();
        let cache = QueryCache::new(temp_dir.path());
        let metrics = BatchMetrics::new();
        let source = CachedSource::new(
            CountingSource {
                calls: AtomicUsize::new(0),
            },
            cache.clone(),
            "perf",
            BatchLogger::new("W023"),
        )
        .with_metrics(metrics.clone());

        let (start, end) = window();
        let query = TelemetryQuery::performance("W023", start, Some(end));

        let first = source.query(&query).await.unwrap();
        let second = source.query(&query).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);
        assert!(cache.path("W023", "perf", start, end).exists());
        assert_eq!(metrics.cache_hits(), 1);
        assert_eq!(metrics.cache_misses(), 1);
    }

    #[tokio::test]
    async fn test_open_ended_query_bypasses_cache() {
        let temp_dir = TempDir::new().unwrap();
        let source = CachedSource::new(
            CountingSource {
                calls: AtomicUsize::new(0),
            },
            QueryCache::new(temp_dir.path()),
            "perf",
            BatchLogger::new("W023"),
        );

        let (start, _) = window();
        let query = TelemetryQuery::performance("W023", start, None);
        source.query(&query).await.unwrap();
        source.query(&query).await.unwrap();

        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_window_ending_in_future_is_not_stored() {
        struct LaggingSource {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl TelemetrySource for LaggingSource {
            async fn query(&self, query: &TelemetryQuery) -> Result<TelemetryFrame, TelemetryError> {
                // Nothing ingested yet on the first call
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Ok(TelemetryFrame::default());
                }
                Ok(TelemetryFrame::new(vec![TelemetryRecord {
                    timestamp: query.start,
                    name: "container_memory_rss".to_string(),
                    value: SampleValue::Number(1.0),
                    meta: Default::default(),
                }]))
            }
        }

        let temp_dir = TempDir::new().unwrap();
        let cache = QueryCache::new(temp_dir.path());
        let source = CachedSource::new(
            LaggingSource {
                calls: AtomicUsize::new(0),
            },
            cache.clone(),
            "perf",
            BatchLogger::new("W023"),
        );

        let now = Utc::now();
        let (start, end) = (now - Duration::minutes(3), now + Duration::seconds(50));
        let query = TelemetryQuery::performance("W023", start, Some(end));

        let first = source.query(&query).await.unwrap();
        let second = source.query(&query).await.unwrap();

        assert!(first.is_empty());
        assert_eq!(second.len(), 1);
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 2);
        assert!(!cache.path("W023", "perf", start, end).exists());
    }

    #[tokio::test]
    async fn test_corrupt_cache_file_falls_back_to_source() {
        let temp_dir = TempDir::new().unwrap();
        let cache = QueryCache::new(temp_dir.path());
        let (start, end) = window();
        let path = cache.path("W023", "perf", start, end);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "timestamp,name,value\nnot-a-time,x,1\n").unwrap();

        let source = CachedSource::new(
            CountingSource {
                calls: AtomicUsize::new(0),
            },
            cache,
            "perf",
            BatchLogger::new("W023"),
        );
        let frame = source
            .query(&TelemetryQuery::performance("W023", start, Some(end)))
            .await
            .unwrap();

        assert_eq!(frame.len(), 1);
        assert_eq!(source.inner().calls.load(Ordering::SeqCst), 1);
    }
}
