//! Shared fakes for unit tests: a scripted table service and a recording blob store.

use crate::config::{Config, PollConfig, PublishConfig, RemoteConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::poller::JobStatus;
use crate::publish::BlobStore;
use crate::remote::{BulkDownloadRequest, TableService};
use crate::types::{CallerMetadata, DateRange, ExportRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// Request for `test-health-code` covering January 2024
pub(crate) fn test_request() -> ExportRequest {
    let range = DateRange::new(
        "2024-01-01".parse().unwrap(),
        "2024-01-31".parse().unwrap(),
    )
    .unwrap();
    ExportRequest::new(
        "test-health-code",
        range,
        CallerMetadata {
            study_id: "test-study".into(),
            log_id: "log-1".into(),
        },
    )
    .unwrap()
}

/// Config that never sleeps between polls or retries
pub(crate) fn test_config() -> Config {
    Config {
        poll: PollConfig {
            max_attempts: 3,
            interval: Duration::ZERO,
        },
        retry: RetryConfig {
            max_attempts: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: false,
        },
        publish: PublishConfig {
            bucket: "test-bucket".into(),
            ..Default::default()
        },
        remote: RemoteConfig {
            base_url: "http://localhost".into(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// How one table behaves
#[derive(Clone, Default)]
pub(crate) struct TableScript {
    csv: String,
    bundle: Option<Vec<u8>>,
    query_failure: Option<u16>,
    never_ready: bool,
    bundle_failure: Option<u16>,
    bundle_never_ready: bool,
    panics: bool,
    flaky_downloads: u32,
    delay: Duration,
}

impl TableScript {
    /// Query succeeds with this CSV
    pub(crate) fn rows(csv: &str) -> Self {
        Self {
            csv: csv.to_string(),
            ..Default::default()
        }
    }

    /// Query job never becomes ready
    pub(crate) fn never_ready() -> Self {
        Self {
            never_ready: true,
            ..Default::default()
        }
    }

    /// Starting the query fails with `status`
    pub(crate) fn failing_query(status: u16) -> Self {
        Self {
            query_failure: Some(status),
            ..Default::default()
        }
    }

    /// Starting the query panics
    pub(crate) fn panicking() -> Self {
        Self {
            panics: true,
            ..Default::default()
        }
    }

    pub(crate) fn with_bundle(mut self, bundle: &[u8]) -> Self {
        self.bundle = Some(bundle.to_vec());
        self
    }

    /// The bulk download job never becomes ready
    pub(crate) fn bundle_never_ready(mut self) -> Self {
        self.bundle_never_ready = true;
        self
    }

    /// Starting the bulk download fails with `status`
    pub(crate) fn failing_bundle(mut self, status: u16) -> Self {
        self.bundle_failure = Some(status);
        self
    }

    /// The first `n` downloads for this table fail with a 503
    pub(crate) fn with_flaky_downloads(mut self, n: u32) -> Self {
        self.flaky_downloads = n;
        self
    }

    /// Starting the query takes `delay`
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Default)]
struct Recorded {
    queries: Vec<String>,
    bulk_requests: Vec<BulkDownloadRequest>,
    download_attempts: u32,
    flaky_remaining: HashMap<String, u32>,
    in_flight: usize,
    max_in_flight: usize,
}

/// [`TableService`] answering from per-table scripts
///
/// File handle ids are `csv:<table>` and `zip:<table>`.
#[derive(Default)]
pub(crate) struct ScriptedTableService {
    tables: HashMap<String, TableScript>,
    state: Mutex<Recorded>,
}

impl ScriptedTableService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_table(mut self, table_id: &str, script: TableScript) -> Self {
        self.state
            .get_mut()
            .unwrap()
            .flaky_remaining
            .insert(table_id.to_string(), script.flaky_downloads);
        self.tables.insert(table_id.to_string(), script);
        self
    }

    fn script(&self, table_id: &str) -> Result<&TableScript> {
        self.tables
            .get(table_id)
            .ok_or_else(|| Error::remote("start table query", Some(404), "unknown table"))
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub(crate) fn bulk_requests(&self) -> Vec<BulkDownloadRequest> {
        self.state.lock().unwrap().bulk_requests.clone()
    }

    pub(crate) fn download_attempts(&self) -> u32 {
        self.state.lock().unwrap().download_attempts
    }

    /// Most query starts ever in progress at once
    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_in_flight
    }
}

#[async_trait]
impl TableService for ScriptedTableService {
    async fn start_table_query(&self, table_id: &str, sql: &str) -> Result<String> {
        let script = self.script(table_id)?;
        {
            let mut state = self.state.lock().unwrap();
            state.queries.push(sql.to_string());
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
        }
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        self.state.lock().unwrap().in_flight -= 1;

        if script.panics {
            panic!("scripted panic for {table_id}");
        }
        if let Some(status) = script.query_failure {
            return Err(Error::remote(
                "start table query",
                Some(status),
                "scripted failure",
            ));
        }
        Ok(table_id.to_string())
    }

    async fn get_table_query_result(
        &self,
        table_id: &str,
        _token: &str,
    ) -> Result<JobStatus<String>> {
        if self.script(table_id)?.never_ready {
            return Ok(JobStatus::NotReady);
        }
        Ok(JobStatus::Ready(format!("csv:{table_id}")))
    }

    async fn start_bulk_download(&self, request: &BulkDownloadRequest) -> Result<String> {
        let table_id = request
            .requested_files
            .first()
            .map(|f| f.associate_object_id.clone())
            .unwrap_or_default();
        self.state
            .lock()
            .unwrap()
            .bulk_requests
            .push(request.clone());
        if let Some(status) = self.script(&table_id)?.bundle_failure {
            return Err(Error::remote(
                "start bulk download",
                Some(status),
                "scripted failure",
            ));
        }
        Ok(format!("bulk:{table_id}"))
    }

    async fn get_bulk_download_result(&self, token: &str) -> Result<JobStatus<String>> {
        let table_id = token.trim_start_matches("bulk:");
        if self.script(table_id)?.bundle_never_ready {
            return Ok(JobStatus::NotReady);
        }
        Ok(JobStatus::Ready(format!("zip:{table_id}")))
    }

    async fn download_file_handle(&self, file_handle_id: &str) -> Result<Vec<u8>> {
        let (kind, table_id) = file_handle_id
            .split_once(':')
            .ok_or_else(|| Error::remote("download file handle", Some(404), "bad handle"))?;
        {
            let mut state = self.state.lock().unwrap();
            state.download_attempts += 1;
            if let Some(remaining) = state.flaky_remaining.get_mut(table_id)
                && *remaining > 0
            {
                *remaining -= 1;
                return Err(Error::remote(
                    "download file handle",
                    Some(503),
                    "unavailable",
                ));
            }
        }

        let script = self.script(table_id)?;
        Ok(match kind {
            "csv" => script.csv.clone().into_bytes(),
            _ => script
                .bundle
                .clone()
                .unwrap_or_else(|| b"PK\x05\x06".to_vec()),
        })
    }
}

/// In-memory [`BlobStore`] remembering every presign request
#[derive(Default)]
pub(crate) struct RecordingBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    presigned: Mutex<Vec<(String, DateTime<Utc>)>>,
    fail_puts: bool,
}

impl RecordingBlobStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_puts(mut self) -> Self {
        self.fail_puts = true;
        self
    }

    pub(crate) fn presigned(&self) -> Vec<(String, DateTime<Utc>)> {
        self.presigned.lock().unwrap().clone()
    }

    pub(crate) fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for RecordingBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        if self.fail_puts {
            return Err(Error::Other("access denied".into()));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| Error::Other(format!("no object {key}")))
    }

    async fn presign_get(&self, key: &str, expires_at: DateTime<Utc>) -> Result<Url> {
        self.presigned
            .lock()
            .unwrap()
            .push((key.to_string(), expires_at));
        Ok(Url::parse(&format!(
            "https://blobs.example/{key}?expires={}",
            expires_at.timestamp()
        ))
        .unwrap())
    }
}
