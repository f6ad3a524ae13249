//! Archive builder
//!
//! Packs every file a run produced into a single zip inside the workspace.

use crate::error::{Error, Result};
use crate::types::{ArchiveDescriptor, DateRange};
use crate::workspace::Workspace;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task::spawn_blocking;
use tracing::info;
use uuid::Uuid;
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

/// Builds the per-run zip archive
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    /// Generated archive name
    ///
    /// Carries only the date range and a random id, never anything about the caller.
    pub fn archive_name(date_range: &DateRange) -> String {
        format!(
            "userdata-{}-to-{}-{}.zip",
            date_range.start(),
            date_range.end(),
            Uuid::new_v4()
        )
    }

    /// Zip `files` into a new archive registered with `workspace`
    ///
    /// Each input becomes one deflated entry named after its file name, in
    /// input order. Compression runs on the blocking pool.
    ///
    /// # Errors
    /// [`Error::EmptyArchive`] when `files` is empty, otherwise any read,
    /// write or zip failure.
    pub async fn build(
        files: &[PathBuf],
        workspace: &Workspace,
        date_range: &DateRange,
    ) -> Result<ArchiveDescriptor> {
        if files.is_empty() {
            return Err(Error::EmptyArchive);
        }

        let started = Instant::now();
        let name = Self::archive_name(date_range);
        let path = workspace.new_file(&name);

        let fs = workspace.fs().clone();
        let inputs = files.to_vec();
        let target = path.clone();
        let entries = inputs.len();
        spawn_blocking(move || -> Result<()> {
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

            for input in &inputs {
                writer.start_file(entry_name(input)?, options)?;
                writer.write_all(&fs.read(input)?)?;
            }

            let zipped = writer.finish()?.into_inner();
            fs.write(&target, &zipped)?;
            Ok(())
        })
        .await
        .map_err(|e| Error::Other(format!("archive task failed: {}", e)))??;

        info!(
            archive = %name,
            entries,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "archive built"
        );
        Ok(ArchiveDescriptor { path, name })
    }
}

fn entry_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Other(format!("{} has no file name", path.display())))
}
