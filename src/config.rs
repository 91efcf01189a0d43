//! Resolved SDK configuration.
//!
//! The connection layer only ever sees scalar values; resolution order is
//! explicit builder values, then environment, then an optional YAML config
//! file, then defaults. Only the API key is mandatory.

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.mltrack.dev";
pub const DEFAULT_MAX_RETRIES: u32 = 4;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(3600);
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_key: String,
    pub base_url: String,
    /// Total attempt budget of the retrying synchronous POST path.
    pub max_retries: u32,
    pub request_timeout: Duration,
    /// How long `end()` waits for pending uploads before giving up.
    pub cleanup_timeout: Duration,
    pub heartbeat_interval: Duration,
}

impl TrackerConfig {
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Resolve purely from environment / config file.
    pub fn from_env() -> Result<Self> {
        Self::builder().build()
    }
}

/// Optional on-disk config, YAML. Every field may be absent.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    api_key: Option<String>,
    base_url: Option<String>,
    max_retries: Option<u32>,
    request_timeout_secs: Option<u64>,
    cleanup_timeout_secs: Option<u64>,
    heartbeat_interval_secs: Option<u64>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| Error::configuration(format!("invalid config file {}: {e}", path.display())))
    }
}

#[derive(Debug, Default)]
pub struct TrackerConfigBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    max_retries: Option<u32>,
    request_timeout: Option<Duration>,
    cleanup_timeout: Option<Duration>,
    heartbeat_interval: Option<Duration>,
    config_file: Option<PathBuf>,
}

impl TrackerConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = Some(timeout);
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Explicit config-file path; otherwise `MLTRACK_CONFIG` is consulted.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    pub fn build(self) -> Result<TrackerConfig> {
        let file = match self
            .config_file
            .or_else(|| env::var("MLTRACK_CONFIG").ok().map(PathBuf::from))
        {
            Some(path) => FileConfig::load(&path)?,
            None => FileConfig::default(),
        };

        let api_key = self
            .api_key
            .or_else(|| env::var("MLTRACK_API_KEY").ok())
            .or(file.api_key)
            .unwrap_or_default();
        if api_key.trim().is_empty() {
            return Err(Error::configuration(
                "API key is required; set it on the builder or via MLTRACK_API_KEY",
            ));
        }

        let base_url = self
            .base_url
            .or_else(|| env::var("MLTRACK_BASE_URL").ok())
            .or(file.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let max_retries = self
            .max_retries
            .or_else(|| env_parse("MLTRACK_MAX_RETRIES"))
            .or(file.max_retries)
            .unwrap_or(DEFAULT_MAX_RETRIES);
        if max_retries == 0 {
            return Err(Error::configuration("max_retries must be at least 1"));
        }

        let request_timeout = self
            .request_timeout
            .or_else(|| env_parse("MLTRACK_TIMEOUT_SECS").map(Duration::from_secs))
            .or(file.request_timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let cleanup_timeout = self
            .cleanup_timeout
            .or_else(|| env_parse("MLTRACK_CLEANUP_TIMEOUT_SECS").map(Duration::from_secs))
            .or(file.cleanup_timeout_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_CLEANUP_TIMEOUT);

        let heartbeat_interval = self
            .heartbeat_interval
            .or_else(|| env_parse("MLTRACK_HEARTBEAT_INTERVAL_SECS").map(Duration::from_secs))
            .or(file.heartbeat_interval_secs.map(Duration::from_secs))
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL);

        Ok(TrackerConfig {
            api_key,
            base_url,
            max_retries,
            request_timeout,
            cleanup_timeout,
            heartbeat_interval,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builder_values_win() {
        let config = TrackerConfig::builder()
            .api_key("k")
            .base_url("http://localhost:9999")
            .max_retries(2)
            .cleanup_timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        assert_eq!(config.base_url, "http://localhost:9999");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.cleanup_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn missing_api_key_is_rejected() {
        // Scope to the builder path; env may carry a key on dev machines.
        if env::var("MLTRACK_API_KEY").is_ok() || env::var("MLTRACK_CONFIG").is_ok() {
            return;
        }
        assert!(matches!(
            TrackerConfig::builder().build(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn zero_retries_is_rejected() {
        let err = TrackerConfig::builder().api_key("k").max_retries(0).build();
        assert!(matches!(err, Err(Error::Configuration(_))));
    }

    #[test]
    fn config_file_fills_gaps() {
        if env::var("MLTRACK_API_KEY").is_ok() {
            return;
        }
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "api_key: file-key\nbase_url: http://from-file\nmax_retries: 7\nheartbeat_interval_secs: 2"
        )
        .unwrap();

        let config = TrackerConfig::builder()
            .config_file(file.path())
            .base_url("http://explicit")
            .build()
            .unwrap();
        assert_eq!(config.api_key, "file-key");
        // Explicit builder value outranks the file.
        assert_eq!(config.base_url, "http://explicit");
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
    }

    #[test]
    fn malformed_config_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api_key: [unterminated").unwrap();
        let err = TrackerConfig::builder().config_file(file.path()).build();
        assert!(matches!(err, Err(Error::Configuration(_))));
    }
}
