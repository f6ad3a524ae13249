//! Archive publishing
//!
//! Uploads the finished archive to a blob store and hands back a presigned,
//! time-limited download link for it.

mod clock;
mod s3;

pub use clock::{Clock, FixedClock, SystemClock};
pub use s3::ObjectStoreBlobStore;

use crate::config::PublishConfig;
use crate::error::{Error, Result};
use crate::fs::{Filesystem, run_blocking};
use crate::types::{ArchiveDescriptor, PresignedLink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

/// Blob storage with presigned read links
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any existing object
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Read the object stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Create a credential-free GET URL for `key` that stops working at `expires_at`
    async fn presign_get(&self, key: &str, expires_at: DateTime<Utc>) -> Result<Url>;
}

/// Uploads archives and mints their download links
pub struct BlobPublisher {
    store: Arc<dyn BlobStore>,
    fs: Arc<dyn Filesystem>,
    clock: Arc<dyn Clock>,
    url_ttl: Duration,
}

impl BlobPublisher {
    /// Create a publisher writing to `store`
    pub fn new(
        store: Arc<dyn BlobStore>,
        fs: Arc<dyn Filesystem>,
        clock: Arc<dyn Clock>,
        config: &PublishConfig,
    ) -> Self {
        Self {
            store,
            fs,
            clock,
            url_ttl: config.url_ttl,
        }
    }

    /// Upload `archive` under its name and return a link valid for the configured TTL
    ///
    /// # Errors
    /// Store failures become [`Error::Publish`]; reading the archive can fail with
    /// [`Error::Io`].
    pub async fn publish(&self, archive: &ArchiveDescriptor) -> Result<PresignedLink> {
        let key = archive.name.as_str();
        let publish_error = |e: Error| Error::Publish {
            key: key.to_string(),
            reason: e.to_string(),
        };

        let path = archive.path.clone();
        let bytes = run_blocking(&self.fs, move |fs| fs.read(&path)).await?;
        let size = bytes.len();

        let started = Instant::now();
        self.store.put(key, bytes).await.map_err(publish_error)?;
        info!(
            key,
            bytes = size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "archive uploaded"
        );

        let ttl = chrono::Duration::from_std(self.url_ttl).map_err(|e| {
            Error::config(
                format!("presigned URL lifetime out of range: {}", e),
                "publish.url_ttl",
            )
        })?;
        let expires_at = self.clock.now() + ttl;
        let url = self
            .store
            .presign_get(key, expires_at)
            .await
            .map_err(publish_error)?;

        info!(key, %expires_at, "presigned link created");
        Ok(PresignedLink { url, expires_at })
    }
}
