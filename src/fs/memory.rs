use super::Filesystem;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// In-memory [`Filesystem`]
///
/// Behaves like a strict local disk: files need an existing parent directory
/// and only empty directories can be deleted. Deletes of chosen paths can be
/// made to fail, which is how cleanup error handling gets exercised.
#[derive(Debug, Default)]
pub struct MemoryFilesystem {
    state: Mutex<State>,
    next_dir: AtomicU64,
}

#[derive(Debug, Default)]
struct State {
    dirs: HashSet<PathBuf>,
    files: HashMap<PathBuf, Vec<u8>>,
    failing_deletes: HashSet<PathBuf>,
}

impl MemoryFilesystem {
    /// Create an empty filesystem
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not take the filesystem down with it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every later delete of `path` fail with `PermissionDenied`
    pub fn fail_deletes_of(&self, path: impl Into<PathBuf>) {
        self.state().failing_deletes.insert(path.into());
    }

    /// Number of files currently stored
    pub fn file_count(&self) -> usize {
        self.state().files.len()
    }

    /// Number of directories currently present
    pub fn dir_count(&self) -> usize {
        self.state().dirs.len()
    }

    /// Whether nothing at all is left behind
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.files.is_empty() && state.dirs.is_empty()
    }

    /// Paths of every stored file, sorted
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<_> = self.state().files.keys().cloned().collect();
        files.sort();
        files
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} does not exist", path.display()),
    )
}

fn check_delete_allowed(state: &State, path: &Path) -> io::Result<()> {
    if state.failing_deletes.contains(path) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("delete of {} denied", path.display()),
        ));
    }
    Ok(())
}

impl Filesystem for MemoryFilesystem {
    fn create_temp_dir(&self) -> io::Result<PathBuf> {
        let n = self.next_dir.fetch_add(1, Ordering::SeqCst);
        let dir = PathBuf::from(format!("/mem/export-{n}"));
        self.state().dirs.insert(dir.clone());
        Ok(dir)
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state();
        state.files.contains_key(path) || state.dirs.contains(path)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.state()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        match path.parent() {
            Some(parent) if state.dirs.contains(parent) => {
                state.files.insert(path.to_path_buf(), contents.to_vec());
                Ok(())
            }
            _ => Err(not_found(path.parent().unwrap_or(path))),
        }
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        check_delete_allowed(&state, path)?;
        state
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }

    fn delete_dir(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state();
        check_delete_allowed(&state, path)?;
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        let occupied = state.files.keys().any(|f| f.parent() == Some(path))
            || state.dirs.iter().any(|d| d.parent() == Some(path));
        if occupied {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{} is not empty", path.display()),
            ));
        }
        state.dirs.remove(path);
        Ok(())
    }
}
