//! Configuration management for the CLI

use anyhow::{Context, Result};
use profiler_lib::profile::DEFAULT_WINDOW_PADDING_SECS;
use profiler_lib::telemetry::DEFAULT_QUERY_ENDPOINT;
use serde::Deserialize;
use std::path::PathBuf;

/// CLI configuration, from `~/.config/edgeprof/config.toml` and `EDGEPROF_*`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Telemetry query endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Root of the on-disk query cache
    #[serde(default)]
    pub cache_root: Option<PathBuf>,

    /// HTTP request timeout; unset waits indefinitely
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Padding around each execution window, in seconds
    #[serde(default = "default_window_padding")]
    pub window_padding_secs: i64,
}

fn default_api_url() -> String {
    DEFAULT_QUERY_ENDPOINT.to_string()
}

fn default_window_padding() -> i64 {
    DEFAULT_WINDOW_PADDING_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            cache_root: None,
            request_timeout_secs: None,
            window_padding_secs: default_window_padding(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (if any) and environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = Self::config_path() {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder
            .add_source(config::Environment::with_prefix("EDGEPROF"))
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Cache root, defaulting to `~/.waggle`
    pub fn cache_root(&self) -> Result<PathBuf> {
        match &self.cache_root {
            Some(root) => Ok(root.clone()),
            None => {
                let home = dirs_next::home_dir().context("Could not determine home directory")?;
                Ok(home.join(".waggle"))
            }
        }
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("edgeprof").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_url, DEFAULT_QUERY_ENDPOINT);
        assert_eq!(config.window_padding_secs, 60);
        assert!(config.request_timeout_secs.is_none());
    }

    #[test]
    fn test_explicit_cache_root() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            cache_root: Some(temp_dir.path().to_path_buf()),
            ..Config::default()
        };
        assert_eq!(config.cache_root().unwrap(), temp_dir.path());
    }

    #[test]
    fn test_file_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "api_url = \"http://localhost:9000/query\"\nwindow_padding_secs = 30\n").unwrap();

        let config: Config = config::Config::builder()
            .add_source(config::File::from(path))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.api_url, "http://localhost:9000/query");
        assert_eq!(config.window_padding_secs, 30);
        assert!(config.cache_root.is_none());
    }
}
