//! Blob storage fixtures: an in-memory bucket with a deterministic signer

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use http::Method;
use object_store::ObjectStore;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::signer::Signer;
use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use userdata_export::{FixedClock, ObjectStoreBlobStore};

/// Instant every test clock is frozen at
pub fn frozen_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2015, 8, 19, 14, 0, 0).unwrap()
}

/// Signs URLs as `https://signed.example/<key>?expires_in=<secs>`
#[derive(Debug)]
pub struct TestSigner;

#[async_trait]
impl Signer for TestSigner {
    async fn signed_url(
        &self,
        method: Method,
        path: &Path,
        expires_in: Duration,
    ) -> object_store::Result<Url> {
        assert_eq!(method, Method::GET);
        Ok(Url::parse(&format!(
            "https://signed.example/{path}?expires_in={}",
            expires_in.as_secs()
        ))
        .unwrap())
    }
}

/// In-memory bucket plus a blob store over it using the frozen clock
pub fn memory_bucket() -> (Arc<InMemory>, Arc<ObjectStoreBlobStore>) {
    let bucket = Arc::new(InMemory::new());
    let store = Arc::new(ObjectStoreBlobStore::new(
        bucket.clone(),
        Arc::new(TestSigner),
        Arc::new(FixedClock(frozen_now())),
    ));
    (bucket, store)
}

/// Keys of every object in the bucket
pub async fn object_keys(bucket: &InMemory) -> Vec<String> {
    let mut keys: Vec<String> = bucket
        .list(None)
        .map_ok(|meta| meta.location.to_string())
        .try_collect()
        .await
        .unwrap();
    keys.sort();
    keys
}

/// Entries of a zip as (name, content) pairs, in archive order
pub fn unzip(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
    let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..zip.len())
        .map(|i| {
            let mut entry = zip.by_index(i).unwrap();
            let mut content = Vec::new();
            entry.read_to_end(&mut content).unwrap();
            (entry.name().to_string(), content)
        })
        .collect()
}
