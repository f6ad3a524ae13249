//! Per-table export task
//!
//! One task owns one table: it runs the caller's query, downloads the result
//! CSV, scans it for attachment references and, when there are any, bulk
//! downloads them into a zip next to the CSV.

use crate::config::{PollConfig, RetryConfig};
use crate::error::{Error, Result};
use crate::poller::start_and_await;
use crate::remote::{BulkDownloadRequest, TableService, build_query};
use crate::retry::with_retry;
use crate::types::{ExportRequest, TableDescriptor, TaskResult};
use crate::workspace::Workspace;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Everything a task shares with the rest of the run
#[derive(Clone)]
pub struct TaskContext {
    /// Remote table service
    pub service: Arc<dyn TableService>,
    /// Run workspace all files are created in
    pub workspace: Arc<Workspace>,
    /// Poll budget for both async jobs
    pub poll: PollConfig,
    /// Retry policy for file-handle downloads
    pub retry: RetryConfig,
}

/// Export of a single table
pub struct TableExportTask {
    table: TableDescriptor,
    request: Arc<ExportRequest>,
    ctx: TaskContext,
}

impl TableExportTask {
    /// Create a task for `table`
    pub fn new(table: TableDescriptor, request: Arc<ExportRequest>, ctx: TaskContext) -> Self {
        Self {
            table,
            request,
            ctx,
        }
    }

    /// Run the export
    ///
    /// A table with no rows for the caller yields an empty [`TaskResult`];
    /// every other problem is returned as the task's error.
    pub async fn run(self) -> Result<TaskResult> {
        let table_id = self.table.table_id.as_str();
        let log_id = self.request.caller().log_id.as_str();
        let key = self.table.file_key();

        let started = Instant::now();
        let csv_file = self.ctx.workspace.new_file(&format!("{key}.csv"));
        let csv = self.download_query_results(&csv_file).await?;
        info!(
            table_id,
            log_id,
            bytes = csv.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query results downloaded"
        );

        let started = Instant::now();
        let table = self.table.clone();
        let scan = tokio::task::spawn_blocking(move || scan_rows(&table, &csv))
            .await
            .map_err(|e| Error::Other(format!("attachment scan task failed: {}", e)))??;
        let Some(file_handle_ids) = scan else {
            info!(table_id, log_id, "no rows for caller");
            return Ok(TaskResult::empty(table_id));
        };
        info!(
            table_id,
            attachments = file_handle_ids.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "attachment scan complete"
        );

        if file_handle_ids.is_empty() {
            return Ok(TaskResult {
                table_id: table_id.to_string(),
                csv_file: Some(csv_file),
                bundle_file: None,
            });
        }

        let started = Instant::now();
        let bundle_file = self.ctx.workspace.new_file(&format!("{key}-bundle.zip"));
        self.download_attachments(file_handle_ids, &bundle_file)
            .await?;
        info!(
            table_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "attachments bulk downloaded"
        );

        Ok(TaskResult {
            table_id: table_id.to_string(),
            csv_file: Some(csv_file),
            bundle_file: Some(bundle_file),
        })
    }

    async fn download_query_results(&self, target: &Path) -> Result<Vec<u8>> {
        let service = &self.ctx.service;
        let table_id = self.table.table_id.as_str();
        let sql = build_query(&self.table, &self.request);

        let file_handle_id = start_and_await(
            &self.ctx.poll,
            "table query",
            || service.start_table_query(table_id, &sql),
            |token| async move { service.get_table_query_result(table_id, &token).await },
        )
        .await?;

        let csv = self.fetch(&file_handle_id).await?;
        self.ctx.workspace.write_tracked(target, csv.clone()).await?;
        Ok(csv)
    }

    async fn download_attachments(
        &self,
        file_handle_ids: BTreeSet<String>,
        target: &Path,
    ) -> Result<()> {
        let service = &self.ctx.service;
        let request = BulkDownloadRequest::for_table(&self.table.table_id, file_handle_ids);

        let zip_handle_id = start_and_await(
            &self.ctx.poll,
            "bulk download",
            || service.start_bulk_download(&request),
            |token| async move { service.get_bulk_download_result(&token).await },
        )
        .await?;

        let bundle = self.fetch(&zip_handle_id).await?;
        self.ctx.workspace.write_tracked(target, bundle).await?;
        Ok(())
    }

    async fn fetch(&self, file_handle_id: &str) -> Result<Vec<u8>> {
        let service = &self.ctx.service;
        debug!(table_id = %self.table.table_id, file_handle_id, "downloading file handle");
        with_retry(&self.ctx.retry, || service.download_file_handle(file_handle_id)).await
    }
}

/// Attachment ids referenced by the rows, or `None` when there is no data row
///
/// Rows are CSV records, so a quoted field spanning lines is still one row.
fn scan_rows(table: &TableDescriptor, csv: &[u8]) -> Result<Option<BTreeSet<String>>> {
    if !has_data_rows(csv)? {
        return Ok(None);
    }
    attachment_ids(table, csv).map(Some)
}

/// A header record followed by at least one data record
fn has_data_rows(csv: &[u8]) -> Result<bool> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv);
    let mut record = csv::ByteRecord::new();
    Ok(reader.read_byte_record(&mut record)?)
}

/// Distinct non-empty values of the table's attachment columns
///
/// Columns the schema does not declare are treated as plain data.
fn attachment_ids(table: &TableDescriptor, csv: &[u8]) -> Result<BTreeSet<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv);

    let columns: Vec<usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .filter(|(_, name)| {
            table
                .field_type(name)
                .is_some_and(|field_type| field_type.is_attachment())
        })
        .map(|(idx, _)| idx)
        .collect();

    let mut ids = BTreeSet::new();
    if columns.is_empty() {
        return Ok(ids);
    }

    for record in reader.records() {
        let record = record?;
        for &idx in &columns {
            if let Some(value) = record.get(idx).map(str::trim)
                && !value.is_empty()
            {
                ids.insert(value.to_string());
            }
        }
    }
    Ok(ids)
}
