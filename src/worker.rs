//! Request processing
//!
//! Turns one raw export job into a delivered link (or a "no data" notice).
//! Identity lookup, the table catalog and notification delivery belong to the
//! embedding service and are reached only through the traits below.

use crate::error::{Error, Result};
use crate::orchestrator::ExportOrchestrator;
use crate::types::{
    CallerMetadata, DateRange, ExportOutcome, ExportRequest, PresignedLink, TableDescriptor,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// An export job as it arrives from the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    /// Study the caller belongs to
    pub study_id: String,
    /// Account id; preferred over `username` when both are present
    #[serde(default)]
    pub user_id: Option<String>,
    /// Login name
    #[serde(default)]
    pub username: Option<String>,
    /// First day requested
    pub start_date: NaiveDate,
    /// Last day requested
    pub end_date: NaiveDate,
}

impl ExportJob {
    /// Parse and check a job body
    ///
    /// # Errors
    /// [`Error::BadRequest`] for malformed JSON, a missing caller, or a start
    /// date after the end date.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let job: ExportJob = serde_json::from_slice(body)
            .map_err(|e| Error::BadRequest(format!("error parsing request: {}", e)))?;
        if job.study_id.trim().is_empty() {
            return Err(Error::BadRequest("studyId must be specified".into()));
        }
        job.caller()?;
        job.date_range()?;
        Ok(job)
    }

    /// Who the job is for
    pub fn caller(&self) -> Result<CallerRef> {
        match (non_blank(&self.user_id), non_blank(&self.username)) {
            (Some(user_id), _) => Ok(CallerRef::UserId(user_id.to_string())),
            (None, Some(username)) => Ok(CallerRef::Username(username.to_string())),
            (None, None) => Err(Error::BadRequest(
                "either userId or username must be specified".into(),
            )),
        }
    }

    /// Requested date range
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::new(self.start_date, self.end_date)
    }

    /// Identifier safe to log: the account id, or a hash of the username
    pub fn log_id(&self) -> String {
        match self.caller() {
            Ok(CallerRef::UserId(user_id)) => user_id,
            Ok(CallerRef::Username(username)) => {
                let digest = Sha256::digest(username.as_bytes());
                let short: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
                format!("hash:{short}")
            }
            Err(_) => "unknown".to_string(),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// How a job identifies its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerRef {
    /// Account id
    UserId(String),
    /// Login name
    Username(String),
}

/// A resolved caller
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    /// Value the tables are filtered on
    pub health_code: String,
    /// Opaque account handle the notifier uses to reach the caller
    pub account_id: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("health_code", &"<redacted>")
            .field("account_id", &self.account_id)
            .finish()
    }
}

/// Maps a caller to their identity filter value
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `Ok(None)` when the account exists but has no identity filter value
    async fn resolve(&self, study_id: &str, caller: &CallerRef) -> Result<Option<Identity>>;
}

/// Lists the tables that make up a study's data
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Every table to export for `study_id`, shared reference tables included
    async fn tables_for_study(&self, study_id: &str) -> Result<Vec<TableDescriptor>>;
}

/// Tells the caller how the export went
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver the download link
    async fn send_link(&self, study_id: &str, identity: &Identity, link: &PresignedLink)
    -> Result<()>;

    /// Tell the caller there was nothing to export
    async fn send_no_data(&self, study_id: &str, identity: &Identity) -> Result<()>;
}

/// Processes export jobs end to end
pub struct RequestProcessor {
    identity: Arc<dyn IdentityResolver>,
    catalog: Arc<dyn CatalogProvider>,
    notifier: Arc<dyn Notifier>,
    orchestrator: ExportOrchestrator,
}

impl RequestProcessor {
    /// Create a processor
    pub fn new(
        identity: Arc<dyn IdentityResolver>,
        catalog: Arc<dyn CatalogProvider>,
        notifier: Arc<dyn Notifier>,
        orchestrator: ExportOrchestrator,
    ) -> Self {
        Self {
            identity,
            catalog,
            notifier,
            orchestrator,
        }
    }

    /// Process one raw job body
    ///
    /// The error's [`QueueDisposition`](crate::error::QueueDisposition) tells the
    /// consumer whether to drop the message or leave it for redelivery.
    pub async fn process(&self, body: &[u8]) -> Result<ExportOutcome> {
        let job = ExportJob::parse(body)?;
        let log_id = job.log_id();
        let date_range = job.date_range()?;
        info!(
            log_id = %log_id,
            study_id = %job.study_id,
            start_date = %date_range.start(),
            end_date = %date_range.end(),
            "received export request"
        );

        let started = Instant::now();
        let result = self.export(&job, &log_id, date_range).await;
        info!(
            log_id = %log_id,
            study_id = %job.study_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "request finished"
        );
        result
    }

    async fn export(
        &self,
        job: &ExportJob,
        log_id: &str,
        date_range: DateRange,
    ) -> Result<ExportOutcome> {
        let identity = self
            .identity
            .resolve(&job.study_id, &job.caller()?)
            .await
            .map_err(client_error_is_bad_request)?
            .ok_or_else(|| {
                Error::IdentityNotFound(format!("no identity for account {}", log_id))
            })?;

        let tables = self
            .catalog
            .tables_for_study(&job.study_id)
            .await
            .map_err(client_error_is_bad_request)?;

        let request = ExportRequest::new(
            identity.health_code.clone(),
            date_range,
            CallerMetadata {
                study_id: job.study_id.clone(),
                log_id: log_id.to_string(),
            },
        )?;
        let outcome = self.orchestrator.run(tables, &request).await?;

        match &outcome {
            ExportOutcome::NoData => {
                info!(log_id, study_id = %job.study_id, "no data for request");
                self.notifier.send_no_data(&job.study_id, &identity).await?;
            }
            ExportOutcome::Published { link, .. } => {
                self.notifier
                    .send_link(&job.study_id, &identity, link)
                    .await?;
            }
        }
        Ok(outcome)
    }
}

/// A 4xx from an upstream lookup means the request names something that does not exist
fn client_error_is_bad_request(error: Error) -> Error {
    match error {
        Error::Remote {
            operation,
            status: Some(status),
            message,
        } if (400..500).contains(&status) => {
            Error::BadRequest(format!("{operation} rejected with {status}: {message}"))
        }
        other => other,
    }
}
