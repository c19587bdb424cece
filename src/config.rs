//! Configuration for the remotefile client

use crate::error::{FileError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Configuration for a file client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the storage API server
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token sent with API requests (optional)
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Default project/workspace id used when creating files
    #[serde(default)]
    pub project: Option<String>,

    /// Part buffer threshold in bytes; each full buffer becomes one
    /// uploaded part (default: 100 MiB)
    #[serde(default = "default_max_part_size")]
    pub max_part_size: usize,

    /// Number of concurrent upload workers (default: 5)
    #[serde(default = "default_max_write_workers")]
    pub max_write_workers: usize,

    /// Number of concurrent download workers used by the file download
    /// helper (default: 5)
    #[serde(default = "default_max_read_workers")]
    pub max_read_workers: usize,

    /// Reorder buffer capacity for linear queries started by the download
    /// helper, counted in pending chunks (default: 20)
    #[serde(default = "default_max_pending_chunks")]
    pub max_pending_chunks: usize,

    /// Maximum HTTP attempts per request, first try included (default: 5)
    #[serde(default = "default_max_http_attempts")]
    pub max_http_attempts: usize,

    /// Backoff unit in milliseconds; the sleep before retry `n` is
    /// `retry_base_delay_ms << n` (default: 1000, giving 2 s, 4 s, 8 s, 16 s)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Per-request timeout in seconds (default: 600)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_url() -> String {
    "http://localhost:8124".to_string()
}

fn default_max_part_size() -> usize {
    100 * 1024 * 1024
}

fn default_max_write_workers() -> usize {
    5
}

fn default_max_read_workers() -> usize {
    5
}

fn default_max_pending_chunks() -> usize {
    20
}

fn default_max_http_attempts() -> usize {
    5
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    600
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            api_url: default_api_url(),
            auth_token: None,
            project: None,
            max_part_size: default_max_part_size(),
            max_write_workers: default_max_write_workers(),
            max_read_workers: default_max_read_workers(),
            max_pending_chunks: default_max_pending_chunks(),
            max_http_attempts: default_max_http_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file
    ///
    /// # Returns
    /// * `Ok(ClientConfig)` if the file can be read, parsed, and validated
    /// * `Err(FileError)` otherwise
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| {
            FileError::Config(format!(
                "failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: ClientConfig = serde_yaml::from_str(&contents)
            .map_err(|e| FileError::Config(format!("failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api_url.is_empty() {
            return Err(FileError::Config("api_url must not be empty".into()));
        }
        if self.max_part_size == 0 {
            return Err(FileError::Config("max_part_size must be at least 1".into()));
        }
        if self.max_write_workers == 0 {
            return Err(FileError::Config(
                "max_write_workers must be at least 1".into(),
            ));
        }
        if self.max_read_workers == 0 {
            return Err(FileError::Config(
                "max_read_workers must be at least 1".into(),
            ));
        }
        if self.max_pending_chunks == 0 {
            return Err(FileError::Config(
                "max_pending_chunks must be at least 1".into(),
            ));
        }
        if self.max_http_attempts == 0 {
            return Err(FileError::Config(
                "max_http_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Backoff unit as a Duration
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
