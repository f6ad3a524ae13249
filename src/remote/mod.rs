//! Remote table service
//!
//! The pipeline only needs five calls from the service that hosts the tables:
//! start and check a CSV query job, start and check an attachment bulk-download
//! job, and fetch the bytes behind a file handle. [`TableService`] is that
//! surface; [`HttpTableService`] implements it over the service's REST API.

mod http;

pub use http::HttpTableService;

use crate::error::Result;
use crate::poller::JobStatus;
use crate::types::{ExportRequest, RowFilter, TableDescriptor};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Async-job based access to remote tables
#[async_trait]
pub trait TableService: Send + Sync {
    /// Start a CSV query job against `table_id` and return its token
    async fn start_table_query(&self, table_id: &str, sql: &str) -> Result<String>;

    /// Check a query job; when ready, yields the file-handle id of the CSV
    async fn get_table_query_result(
        &self,
        table_id: &str,
        token: &str,
    ) -> Result<JobStatus<String>>;

    /// Start a bulk download of attachment file handles and return its token
    async fn start_bulk_download(&self, request: &BulkDownloadRequest) -> Result<String>;

    /// Check a bulk download job; when ready, yields the file-handle id of the zip
    async fn get_bulk_download_result(&self, token: &str) -> Result<JobStatus<String>>;

    /// Fetch the contents behind a file handle
    async fn download_file_handle(&self, file_handle_id: &str) -> Result<Vec<u8>>;
}

/// Kind of object a file handle is reached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssociateObjectType {
    /// The handle is referenced from a table cell
    TableEntity,
}

/// One file handle requested in a bulk download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHandleAssociation {
    /// Attachment file handle id, as found in the table
    pub file_handle_id: String,
    /// Table the handle was found in
    pub associate_object_id: String,
    /// Always [`AssociateObjectType::TableEntity`] for exports
    pub associate_object_type: AssociateObjectType,
}

/// Body of a bulk download request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDownloadRequest {
    /// Every requested handle
    pub requested_files: Vec<FileHandleAssociation>,
}

impl BulkDownloadRequest {
    /// Request each of `file_handle_ids` as referenced from `table_id`
    pub fn for_table<I, S>(table_id: &str, file_handle_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested_files: file_handle_ids
                .into_iter()
                .map(|id| FileHandleAssociation {
                    file_handle_id: id.into(),
                    associate_object_id: table_id.to_string(),
                    associate_object_type: AssociateObjectType::TableEntity,
                })
                .collect(),
        }
    }
}

/// Build the query selecting `request`'s rows from `table`
///
/// Dates are inclusive on both ends. Single quotes in the identity value are
/// doubled so it cannot terminate the string literal.
pub fn build_query(table: &TableDescriptor, request: &ExportRequest) -> String {
    match table.filter {
        RowFilter::All => format!("SELECT * FROM {}", table.table_id),
        RowFilter::Caller => format!(
            "SELECT * FROM {} WHERE healthCode = '{}' AND uploadDate >= '{}' AND uploadDate <= '{}'",
            table.table_id,
            request.health_code().replace('\'', "''"),
            request.date_range().start(),
            request.date_range().end(),
        ),
    }
}
