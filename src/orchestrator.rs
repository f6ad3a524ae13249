//! Export orchestration
//!
//! Fans a request out to one [`TableExportTask`] per table on a bounded
//! worker pool, waits for all of them, then packages and publishes whatever
//! they produced. Per-table failures are collected into an `error.log` that
//! ships inside the archive instead of failing the run.

use crate::archive::ArchiveBuilder;
use crate::config::{Config, PollConfig, RetryConfig};
use crate::error::{Error, Result, TableFailure};
use crate::fs::Filesystem;
use crate::publish::BlobPublisher;
use crate::remote::TableService;
use crate::task::{TableExportTask, TaskContext};
use crate::types::{ExportOutcome, ExportRequest, TableDescriptor, TaskResult};
use crate::workspace::Workspace;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Name of the per-table failure report inside the archive
pub const ERROR_LOG: &str = "error.log";

/// Runs complete exports
pub struct ExportOrchestrator {
    service: Arc<dyn TableService>,
    fs: Arc<dyn Filesystem>,
    publisher: BlobPublisher,
    poll: PollConfig,
    retry: RetryConfig,
    max_workers: usize,
}

impl ExportOrchestrator {
    /// Create an orchestrator
    pub fn new(
        config: &Config,
        service: Arc<dyn TableService>,
        fs: Arc<dyn Filesystem>,
        publisher: BlobPublisher,
    ) -> Self {
        Self {
            service,
            fs,
            publisher,
            poll: config.poll.clone(),
            retry: config.retry.clone(),
            max_workers: config.export.max_workers.max(1),
        }
    }

    /// Export `request`'s data from `tables`
    ///
    /// Returns [`ExportOutcome::NoData`] when there are no tables or none of
    /// them had rows for the caller, and [`Error::TablesFailed`] when every
    /// table that was tried failed. The workspace is removed whatever happens.
    pub async fn run(
        &self,
        tables: Vec<TableDescriptor>,
        request: &ExportRequest,
    ) -> Result<ExportOutcome> {
        let log_id = request.caller().log_id.as_str();
        if tables.is_empty() {
            info!(log_id, "no tables to export");
            return Ok(ExportOutcome::NoData);
        }
        ensure_distinct_keys(&tables)?;

        let started = Instant::now();
        let table_count = tables.len();
        let workspace = Arc::new(Workspace::create(self.fs.clone())?);

        let outcome = self.export(&workspace, tables, request).await;
        Arc::clone(&workspace).cleanup_blocking().await;

        match &outcome {
            Ok(ExportOutcome::NoData) => {
                info!(log_id, tables = table_count, "export found no data")
            }
            Ok(ExportOutcome::Published {
                archive_name,
                failures,
                ..
            }) => info!(
                log_id,
                tables = table_count,
                failed = failures.len(),
                archive = %archive_name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "export published"
            ),
            Err(e) => error!(log_id, tables = table_count, error = %e, "export failed"),
        }
        outcome
    }

    async fn export(
        &self,
        workspace: &Arc<Workspace>,
        tables: Vec<TableDescriptor>,
        request: &ExportRequest,
    ) -> Result<ExportOutcome> {
        let log_id = request.caller().log_id.as_str();
        let results = self.run_tasks(workspace, tables, request).await;

        let mut files: Vec<PathBuf> = Vec::new();
        let mut failures = Vec::new();
        for (table_id, result) in results {
            match result {
                Ok(task) => files.extend(task.into_files()),
                Err(e) => {
                    warn!(table_id = %table_id, log_id, error = %e, "table export failed");
                    failures.push(TableFailure::new(table_id, &e));
                }
            }
        }

        if files.is_empty() {
            if failures.is_empty() {
                return Ok(ExportOutcome::NoData);
            }
            return Err(Error::TablesFailed { failures });
        }

        if !failures.is_empty() {
            let report = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n");
            files.push(workspace.write_file(ERROR_LOG, report).await?);
        }

        let archive = ArchiveBuilder::build(&files, workspace, request.date_range()).await?;
        let link = self.publisher.publish(&archive).await?;

        Ok(ExportOutcome::Published {
            link,
            archive_name: archive.name,
            failures,
        })
    }

    /// Run every table on the pool; results come back in table order
    async fn run_tasks(
        &self,
        workspace: &Arc<Workspace>,
        tables: Vec<TableDescriptor>,
        request: &ExportRequest,
    ) -> Vec<(String, Result<TaskResult>)> {
        let request = Arc::new(request.clone());
        let ctx = TaskContext {
            service: Arc::clone(&self.service),
            workspace: Arc::clone(workspace),
            poll: self.poll.clone(),
            retry: self.retry.clone(),
        };

        let mut results: Vec<(usize, String, Result<TaskResult>)> = stream::iter(
            tables.into_iter().enumerate(),
        )
        .map(|(index, table)| {
            let ctx = ctx.clone();
            let request = Arc::clone(&request);
            let table_id = table.table_id.clone();

            async move {
                let handle = tokio::spawn(TableExportTask::new(table, request, ctx).run());
                let result = match handle.await {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => Err(Error::Other("table export panicked".into())),
                    Err(e) => Err(Error::Other(format!("table export did not complete: {}", e))),
                };
                (index, table_id, result)
            }
        })
        .buffer_unordered(self.max_workers)
        .collect()
        .await;

        results.sort_by_key(|(index, _, _)| *index);
        results
            .into_iter()
            .map(|(_, table_id, result)| (table_id, result))
            .collect()
    }
}

/// Tables must not write to the same file names
fn ensure_distinct_keys(tables: &[TableDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for table in tables {
        let key = table.file_key();
        if !seen.insert(key.clone()) {
            return Err(Error::Config {
                message: format!(
                    "table {} reuses file key '{}' already claimed by another table",
                    table.table_id, key
                ),
                key: None,
            });
        }
    }
    Ok(())
}
