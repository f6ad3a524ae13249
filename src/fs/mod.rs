//! Filesystem capability
//!
//! Everything the pipeline writes goes through a [`Filesystem`] so the
//! workspace and cleanup behavior can be exercised without touching disk.

mod local;
mod memory;

pub use local::LocalFilesystem;
pub use memory::MemoryFilesystem;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Minimal filesystem surface used by the export pipeline
///
/// Calls are synchronous. Async code reaches them through [`run_blocking`]
/// so disk I/O never runs on a runtime worker thread.
pub trait Filesystem: Send + Sync {
    /// Create a fresh, uniquely named directory for one run
    fn create_temp_dir(&self) -> io::Result<PathBuf>;

    /// Whether a file or directory exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Read a whole file
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Create or truncate a file with `contents`
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Delete a single file
    fn delete_file(&self, path: &Path) -> io::Result<()>;

    /// Delete an empty directory
    fn delete_dir(&self, path: &Path) -> io::Result<()>;
}

/// Run `op` against `fs` on the blocking thread pool
pub async fn run_blocking<T, F>(fs: &Arc<dyn Filesystem>, op: F) -> io::Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Filesystem) -> io::Result<T> + Send + 'static,
{
    let fs = Arc::clone(fs);
    tokio::task::spawn_blocking(move || op(fs.as_ref()))
        .await
        .map_err(|e| io::Error::other(format!("filesystem task failed: {}", e)))?
}
