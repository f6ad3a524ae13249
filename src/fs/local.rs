use super::Filesystem;
use crate::config::ExportConfig;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// [`Filesystem`] backed by the real disk
///
/// Temp dirs are created as `export-<uuid>` under `root`.
#[derive(Debug, Clone)]
pub struct LocalFilesystem {
    root: PathBuf,
}

impl LocalFilesystem {
    /// Create temp dirs under `root` (created on demand)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Use `export.workspace_root`, falling back to the system temp dir
    pub fn from_config(config: &ExportConfig) -> Self {
        config
            .workspace_root
            .clone()
            .map(Self::new)
            .unwrap_or_default()
    }

    /// Parent directory of every temp dir
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for LocalFilesystem {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

impl Filesystem for LocalFilesystem {
    fn create_temp_dir(&self) -> io::Result<PathBuf> {
        std::fs::create_dir_all(&self.root)?;
        let dir = self.root.join(format!("export-{}", Uuid::new_v4()));
        std::fs::create_dir(&dir)?;
        Ok(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        std::fs::write(path, contents)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir(path)
    }
}
