use super::{BulkDownloadRequest, TableService};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::poller::JobStatus;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;
use urlencoding::encode;

/// [`TableService`] over the remote service's REST API
#[derive(Clone)]
pub struct HttpTableService {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CsvQueryRequest<'a> {
    sql: &'a str,
    write_header: bool,
    include_row_id_and_row_version: bool,
}

#[derive(Deserialize)]
struct JobToken {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CsvQueryResult {
    results_file_handle_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkDownloadResult {
    result_zip_file_handle_id: String,
}

impl HttpTableService {
    /// Create a client for `config.base_url`
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the base URL does not parse, or an error if
    /// the HTTP client cannot be created
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            Error::config(
                format!("invalid remote base URL '{}': {}", config.base_url, e),
                "remote.base_url",
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("userdata-export/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check an async job: 202 means still running, 200 carries the result
    async fn poll_job<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        url: String,
    ) -> Result<JobStatus<T>> {
        let response = self.authorized(self.client.get(url)).send().await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(JobStatus::NotReady);
        }
        let response = ensure_success(operation, response).await?;
        Ok(JobStatus::Ready(response.json().await?))
    }
}

impl std::fmt::Debug for HttpTableService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTableService")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

async fn ensure_success(operation: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = if body.trim().is_empty() {
        status.to_string()
    } else {
        body
    };
    Err(Error::remote(operation, Some(status.as_u16()), message))
}

#[async_trait]
impl TableService for HttpTableService {
    async fn start_table_query(&self, table_id: &str, sql: &str) -> Result<String> {
        let url = self.url(&format!(
            "/entity/{}/table/download/csv/async/start",
            encode(table_id)
        ));
        let body = CsvQueryRequest {
            sql,
            write_header: true,
            include_row_id_and_row_version: false,
        };
        let response = self
            .authorized(self.client.post(url).json(&body))
            .send()
            .await?;
        let token: JobToken = ensure_success("start table query", response)
            .await?
            .json()
            .await?;
        Ok(token.token)
    }

    async fn get_table_query_result(
        &self,
        table_id: &str,
        token: &str,
    ) -> Result<JobStatus<String>> {
        let url = self.url(&format!(
            "/entity/{}/table/download/csv/async/get/{}",
            encode(table_id),
            encode(token)
        ));
        let status: JobStatus<CsvQueryResult> = self.poll_job("check table query", url).await?;
        Ok(match status {
            JobStatus::Ready(result) => JobStatus::Ready(result.results_file_handle_id),
            JobStatus::NotReady => JobStatus::NotReady,
        })
    }

    async fn start_bulk_download(&self, request: &BulkDownloadRequest) -> Result<String> {
        let url = self.url("/file/bulk/async/start");
        let response = self
            .authorized(self.client.post(url).json(request))
            .send()
            .await?;
        let token: JobToken = ensure_success("start bulk download", response)
            .await?
            .json()
            .await?;
        Ok(token.token)
    }

    async fn get_bulk_download_result(&self, token: &str) -> Result<JobStatus<String>> {
        let url = self.url(&format!("/file/bulk/async/get/{}", encode(token)));
        let status: JobStatus<BulkDownloadResult> =
            self.poll_job("check bulk download", url).await?;
        Ok(match status {
            JobStatus::Ready(result) => JobStatus::Ready(result.result_zip_file_handle_id),
            JobStatus::NotReady => JobStatus::NotReady,
        })
    }

    async fn download_file_handle(&self, file_handle_id: &str) -> Result<Vec<u8>> {
        const OPERATION: &str = "download file handle";

        // The service answers with a short-lived storage URL instead of the bytes
        let url = self.url(&format!("/fileHandle/{}/url", encode(file_handle_id)));
        let response = self
            .authorized(self.client.get(url).query(&[("redirect", "false")]))
            .send()
            .await?;
        let location = ensure_success(OPERATION, response).await?.text().await?;
        let location = Url::parse(location.trim()).map_err(|e| {
            Error::remote(
                OPERATION,
                None,
                format!("file handle {file_handle_id} resolved to an invalid URL: {e}"),
            )
        })?;

        // Pre-signed, so no credentials go to the storage backend
        let response = self.client.get(location).send().await?;
        let bytes = ensure_success(OPERATION, response).await?.bytes().await?;
        tracing::debug!(file_handle_id, bytes = bytes.len(), "file handle downloaded");
        Ok(bytes.to_vec())
    }
}
