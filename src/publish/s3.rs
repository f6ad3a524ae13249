use super::{BlobStore, Clock};
use crate::config::PublishConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::Method;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::{ObjectStore, PutPayload};
use std::sync::Arc;
use url::Url;

/// [`BlobStore`] over any `object_store` backend that can also sign URLs
pub struct ObjectStoreBlobStore {
    store: Arc<dyn ObjectStore>,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
}

impl ObjectStoreBlobStore {
    /// Combine a store and the signer for the same bucket
    ///
    /// `clock` turns an absolute expiry into the relative lifetime signers expect.
    pub fn new(store: Arc<dyn ObjectStore>, signer: Arc<dyn Signer>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            signer,
            clock,
        }
    }

    /// S3 bucket from `config`, with credentials taken from the environment
    pub fn s3(config: &PublishConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);

        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }

        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        let s3 = Arc::new(builder.build().map_err(|e| {
            Error::config(format!("invalid S3 settings: {}", e), "publish.bucket")
        })?);
        Ok(Self::new(s3.clone(), s3, clock))
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.store
            .put(&Path::from(key), PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let bytes = self.store.get(&Path::from(key)).await?.bytes().await?;
        Ok(bytes.to_vec())
    }

    async fn presign_get(&self, key: &str, expires_at: DateTime<Utc>) -> Result<Url> {
        let expires_in = (expires_at - self.clock.now()).to_std().map_err(|_| {
            Error::Other(format!("link expiry {expires_at} is already in the past"))
        })?;
        let url = self
            .signer
            .signed_url(Method::GET, &Path::from(key), expires_in)
            .await?;
        Ok(url)
    }
}
