//! Request-scoped workspace and its janitor
//!
//! Every file a run creates is registered here before it is written, so a
//! task that fails halfway still has its partial output removed. Cleanup
//! deletes the files in creation order and then the directory itself.

use crate::error::Result;
use crate::fs::{Filesystem, run_blocking};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// What a cleanup pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    /// Files removed by this pass
    pub deleted_files: usize,
    /// Registered files that were already gone
    pub skipped_files: usize,
    /// Files that could not be removed
    pub failed_files: usize,
    /// Whether the workspace directory was removed by this pass
    pub dir_removed: bool,
}

/// Temporary directory owned by one export run
///
/// Shared by the run's tasks behind an `Arc`. Registration is the only
/// mutable state and is guarded by a mutex.
pub struct Workspace {
    fs: Arc<dyn Filesystem>,
    dir: PathBuf,
    files: Mutex<Vec<PathBuf>>,
    cleaned: AtomicBool,
}

impl Workspace {
    /// Allocate a fresh workspace directory
    pub fn create(fs: Arc<dyn Filesystem>) -> Result<Self> {
        let dir = fs.create_temp_dir()?;
        debug!(dir = %dir.display(), "workspace created");
        Ok(Self {
            fs,
            dir,
            files: Mutex::new(Vec::new()),
            cleaned: AtomicBool::new(false),
        })
    }

    /// Directory all files live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Filesystem the workspace writes through
    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    /// Register `name` inside the workspace and return its path
    ///
    /// Registering the same name twice tracks it once.
    pub fn new_file(&self, name: &str) -> PathBuf {
        let path = self.dir.join(name);
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if !files.contains(&path) {
            files.push(path.clone());
        }
        path
    }

    /// Register `name` and write `contents` to it
    pub async fn write_file(&self, name: &str, contents: impl Into<Vec<u8>>) -> Result<PathBuf> {
        let path = self.new_file(name);
        self.write_tracked(&path, contents).await?;
        Ok(path)
    }

    /// Write `contents` to a path previously returned by [`Workspace::new_file`]
    ///
    /// The write runs on the blocking pool.
    pub async fn write_tracked(&self, path: &Path, contents: impl Into<Vec<u8>>) -> Result<()> {
        let target = path.to_path_buf();
        let contents = contents.into();
        run_blocking(&self.fs, move |fs| fs.write(&target, &contents)).await?;
        Ok(())
    }

    /// Every registered path, in registration order
    pub fn tracked_files(&self) -> Vec<PathBuf> {
        self.files.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Delete every registered file, then the directory
    ///
    /// Never fails: problems are logged and counted. Entries that no longer
    /// exist are skipped, so running it again is harmless.
    pub fn cleanup(&self) -> CleanupSummary {
        self.cleaned.store(true, Ordering::SeqCst);
        let mut summary = CleanupSummary::default();

        for file in self.tracked_files() {
            if !self.fs.exists(&file) {
                summary.skipped_files += 1;
                continue;
            }
            match self.fs.delete_file(&file) {
                Ok(()) => {
                    debug!(file = %file.display(), "deleted workspace file");
                    summary.deleted_files += 1;
                }
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "failed to delete workspace file");
                    summary.failed_files += 1;
                }
            }
        }

        if self.fs.exists(&self.dir) {
            match self.fs.delete_dir(&self.dir) {
                Ok(()) => summary.dir_removed = true,
                Err(e) => {
                    warn!(dir = %self.dir.display(), error = %e, "failed to delete workspace directory")
                }
            }
        }

        info!(
            deleted_files = summary.deleted_files,
            skipped_files = summary.skipped_files,
            failed_files = summary.failed_files,
            dir_removed = summary.dir_removed,
            "workspace cleanup complete"
        );
        summary
    }
}

impl Workspace {
    /// [`Workspace::cleanup`] on the blocking pool
    ///
    /// A cleanup task that dies is logged; the summary is then empty.
    pub async fn cleanup_blocking(self: Arc<Self>) -> CleanupSummary {
        match tokio::task::spawn_blocking(move || self.cleanup()).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "workspace cleanup task failed");
                CleanupSummary::default()
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if !self.cleaned.load(Ordering::SeqCst) {
            warn!(dir = %self.dir.display(), "workspace dropped without cleanup, cleaning now");
            self.cleanup();
        }
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("dir", &self.dir)
            .field("files", &self.tracked_files().len())
            .finish()
    }
}
