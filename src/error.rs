//! Error types for userdata-export
//!
//! This module provides the error handling for the library, including:
//! - A single [`Error`] enum covering remote, storage, archive and request failures
//! - [`TableFailure`], the per-table failure record rendered into `error.log`
//! - Queue disposition mapping, so the outer consumer can tell a request it should
//!   drop (bad request) from one it should redeliver (transient infrastructure failure)

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for userdata-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for userdata-export
///
/// Per-table failures (`Remote`, `PollTimeout`, I/O while writing a table's files)
/// are captured by the orchestrator and never escape it on their own; they surface
/// only in the user-visible error report or in [`Error::TablesFailed`].
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "publish.bucket")
        key: Option<String>,
    },

    /// Malformed export request (unparseable job, missing fields, start after end)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The caller could not be mapped to an identity filter value
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// A remote call failed outright
    #[error("remote error during {operation}: {message}")]
    Remote {
        /// What was being attempted (e.g., "start table query")
        operation: String,
        /// HTTP status returned by the remote service, if any
        status: Option<u16>,
        /// Response body or failure description
        message: String,
    },

    /// A remote async job never became ready within its poll budget
    #[error("timeout waiting for {job} after {attempts} attempts")]
    PollTimeout {
        /// Label of the job being polled
        job: String,
        /// Number of status checks performed
        attempts: u32,
    },

    /// Every table in the run failed, so there is nothing to deliver
    #[error("all {} table exports failed", failures.len())]
    TablesFailed {
        /// One entry per failed table
        failures: Vec<TableFailure>,
    },

    /// Uploading the archive or generating its URL failed
    #[error("failed to publish {key}: {reason}")]
    Publish {
        /// Object key of the archive
        key: String,
        /// Underlying failure
        reason: String,
    },

    /// The archive builder was handed no files
    #[error("refusing to build an archive with no entries")]
    EmptyArchive,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Zip archive error
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Blob storage error
    #[error("storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a [`Error::Config`] naming the offending key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Shorthand for a [`Error::Remote`]
    pub fn remote(
        operation: impl Into<String>,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Error::Remote {
            operation: operation.into(),
            status,
            message: message.into(),
        }
    }
}

/// A single table's failure, as shown to the end user in `error.log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    /// Remote table identifier
    pub table_id: String,
    /// Rendered cause
    pub message: String,
}

impl TableFailure {
    /// Record a failure for `table_id` from its underlying error
    pub fn new(table_id: impl Into<String>, error: &Error) -> Self {
        Self {
            table_id: table_id.into(),
            message: error.to_string(),
        }
    }
}

impl fmt::Display for TableFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table_id, self.message)
    }
}

/// What the queue consumer should do with a message whose processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The request itself is bad; acknowledge and drop it, retrying cannot help
    Discard,
    /// Infrastructure or remote failure; leave the message for redelivery
    Redeliver,
}

/// Classify errors for the outer queue consumer
pub trait QueueDisposition {
    /// Whether the failed message should be dropped or redelivered
    fn disposition(&self) -> Disposition;

    /// Machine-readable error code for logs and metrics
    fn error_code(&self) -> &str;
}

impl QueueDisposition for Error {
    fn disposition(&self) -> Disposition {
        match self {
            // The same message will fail the same way every time
            Error::BadRequest(_) | Error::IdentityNotFound(_) => Disposition::Discard,
            Error::Config { .. } => Disposition::Discard,
            Error::EmptyArchive => Disposition::Discard,

            Error::Remote { .. }
            | Error::PollTimeout { .. }
            | Error::TablesFailed { .. }
            | Error::Publish { .. }
            | Error::Io(_)
            | Error::Csv(_)
            | Error::Archive(_)
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::Storage(_)
            | Error::Other(_) => Disposition::Redeliver,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::BadRequest(_) => "bad_request",
            Error::IdentityNotFound(_) => "identity_not_found",
            Error::Remote { .. } => "remote_error",
            Error::PollTimeout { .. } => "poll_timeout",
            Error::TablesFailed { .. } => "tables_failed",
            Error::Publish { .. } => "publish_failed",
            Error::EmptyArchive => "empty_archive",
            Error::Io(_) => "io_error",
            Error::Csv(_) => "csv_error",
            Error::Archive(_) => "archive_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Storage(_) => "storage_error",
            Error::Other(_) => "internal_error",
        }
    }
}
