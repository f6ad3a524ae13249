//! # userdata-export
//!
//! Background export of a user's data from a set of remote tables.
//!
//! For one caller and an inclusive date range, every table is queried through
//! the remote service's async job protocol, attachments referenced by the
//! returned rows are bulk downloaded, and everything is packed into a single
//! zip that is uploaded to blob storage. The caller gets a presigned,
//! time-limited link. Temporary files never outlive the run.
//!
//! ## Pipeline
//!
//! - [`poller`] starts a remote job and polls it under a bounded budget
//! - [`task`] exports one table: query, download, attachment scan, bulk fetch
//! - [`orchestrator`] fans tasks out on a bounded pool and collects failures
//! - [`archive`] zips the results
//! - [`publish`] uploads the zip and mints the link
//! - [`workspace`] tracks and removes every temporary file
//! - [`worker`] glues a raw job to identity lookup, catalog and notification
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use userdata_export::{
//!     BlobPublisher, Config, ExportOrchestrator, HttpTableService, LocalFilesystem,
//!     ObjectStoreBlobStore, SystemClock,
//! };
//!
//! # async fn example(
//! #     tables: Vec<userdata_export::TableDescriptor>,
//! #     request: userdata_export::ExportRequest,
//! # ) -> userdata_export::Result<()> {
//! let config: Config = serde_json::from_str(
//!     r#"{ "publish": { "bucket": "userdata" },
//!          "remote": { "base_url": "https://tables.example.com/repo/v1" } }"#,
//! )?;
//! config.validate()?;
//!
//! let fs = Arc::new(LocalFilesystem::from_config(&config.export));
//! let clock = Arc::new(SystemClock);
//! let store = Arc::new(ObjectStoreBlobStore::s3(&config.publish, clock.clone())?);
//! let publisher = BlobPublisher::new(store, fs.clone(), clock, &config.publish);
//! let service = Arc::new(HttpTableService::new(&config.remote)?);
//!
//! let orchestrator = ExportOrchestrator::new(&config, service, fs, publisher);
//! let outcome = orchestrator.run(tables, &request).await?;
//! if let Some(link) = outcome.link() {
//!     println!("download until {}: {}", link.expires_at, link.url);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive creation
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Filesystem capability
pub mod fs;
/// Multi-table export orchestration
pub mod orchestrator;
/// Async job polling
pub mod poller;
/// Archive upload and presigned links
pub mod publish;
/// Remote table service
pub mod remote;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-table export task
pub mod task;
/// Core types
pub mod types;
/// Request processing
pub mod worker;
/// Request-scoped workspace and cleanup
pub mod workspace;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use archive::ArchiveBuilder;
pub use config::Config;
pub use error::{Disposition, Error, QueueDisposition, Result, TableFailure};
pub use fs::{Filesystem, LocalFilesystem, MemoryFilesystem};
pub use orchestrator::ExportOrchestrator;
pub use poller::{JobStatus, start_and_await};
pub use publish::{BlobPublisher, BlobStore, Clock, FixedClock, ObjectStoreBlobStore, SystemClock};
pub use remote::{HttpTableService, TableService};
pub use types::{
    ArchiveDescriptor, CallerMetadata, DateRange, ExportOutcome, ExportRequest, FieldType,
    PresignedLink, RowFilter, SchemaField, TableDescriptor, TaskResult,
};
pub use worker::{CatalogProvider, ExportJob, Identity, IdentityResolver, Notifier, RequestProcessor};
pub use workspace::{CleanupSummary, Workspace};
