//! Configuration types for userdata-export
//!
//! Every struct deserializes with sensible defaults so a consumer only has to
//! provide what differs (typically `publish.bucket` and `remote.base_url`).
//! Loading the values from files or the environment is left to the embedding service.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Main configuration for the export pipeline
///
/// Fields are organized into sub-configs:
/// - [`poll`](PollConfig) : async job poll budget, shared by every call site
/// - [`retry`](RetryConfig) : transient-failure retries for file downloads
/// - [`export`](ExportConfig) : worker pool size and workspace location
/// - [`publish`](PublishConfig) : destination bucket and link lifetime
/// - [`remote`](RemoteConfig) : remote table service endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Poll budget for remote async jobs
    #[serde(default)]
    pub poll: PollConfig,

    /// Retry policy for file-handle downloads
    #[serde(default)]
    pub retry: RetryConfig,

    /// Fan-out and workspace settings
    #[serde(default)]
    pub export: ExportConfig,

    /// Archive destination and presigned link settings
    #[serde(default)]
    pub publish: PublishConfig,

    /// Remote table service connection
    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Config {
    /// Check the values that would otherwise fail deep inside a run
    pub fn validate(&self) -> Result<()> {
        if self.poll.max_attempts == 0 {
            return Err(Error::config(
                "poll budget must allow at least one attempt",
                "poll.max_attempts",
            ));
        }
        if self.export.max_workers == 0 {
            return Err(Error::config(
                "worker pool needs at least one worker",
                "export.max_workers",
            ));
        }
        if self.publish.bucket.trim().is_empty() {
            return Err(Error::config("bucket must be specified", "publish.bucket"));
        }
        if self.publish.url_ttl.is_zero() {
            return Err(Error::config(
                "presigned URL lifetime must be positive",
                "publish.url_ttl",
            ));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(Error::config(
                "remote base URL must be specified",
                "remote.base_url",
            ));
        }
        Ok(())
    }
}

/// Poll budget for remote async jobs
///
/// The same policy drives both the table query job and the attachment bulk
/// download job. The worst-case wait for one job is `max_attempts * interval`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Number of status checks before giving up (default: 60)
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,

    /// Delay before each status check, in milliseconds (default: 1000)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_poll_max_attempts(),
            interval: default_poll_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Worker pool and workspace settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Maximum number of tables exported concurrently (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Parent directory for per-run workspaces (default: the system temp dir)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            workspace_root: None,
        }
    }
}

/// Archive destination and presigned link settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Bucket (or container) that receives the archives
    #[serde(default)]
    pub bucket: String,

    /// Lifetime of the presigned download link, in seconds (default: 24 hours)
    #[serde(default = "default_url_ttl", with = "duration_serde")]
    pub url_ttl: Duration,

    /// Bucket region; falls back to the environment when unset
    #[serde(default)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint (plain HTTP allowed), e.g. a local MinIO
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            url_ttl: default_url_ttl(),
            region: None,
            endpoint: None,
        }
    }
}

/// Remote table service connection
#[derive(Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the REST API, e.g. `https://tables.example.com/repo/v1`
    #[serde(default)]
    pub base_url: String,

    /// Bearer token sent with every request
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout, in seconds (default: 60)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            auth_token: None,
            request_timeout: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

fn default_poll_max_attempts() -> u32 {
    60
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_workers() -> usize {
    4
}

fn default_url_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Poll intervals are short enough that seconds are too coarse
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
