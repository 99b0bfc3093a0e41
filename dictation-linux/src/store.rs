//! Recordings directory on local disk.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use dictation_core::recording::{has_extension, is_safe_file_name};
use dictation_core::{RecordingStore, StorageError};

/// Flat directory of recordings, created on first write.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Full path a recording named `name` lives at.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        if !is_safe_file_name(name) {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }

    fn ensure_root(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))
    }
}

impl RecordingStore for DirectoryStore {
    fn persist(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let dest = self.path_of(name)?;
        self.ensure_root()?;
        // Write beside the target, then rename, so a crash never leaves a partial recording.
        let partial = self.root.join(format!(".{}.part", name));
        std::fs::write(&partial, bytes).map_err(|e| StorageError::io(&partial, e))?;
        std::fs::rename(&partial, &dest).map_err(|e| StorageError::io(&dest, e))?;
        Ok(dest)
    }

    fn import(&mut self, name: &str, source: &Path) -> Result<PathBuf, StorageError> {
        let dest = self.path_of(name)?;
        self.ensure_root()?;
        if std::fs::rename(source, &dest).is_err() {
            // Different filesystem: copy, then drop the staged file.
            std::fs::copy(source, &dest).map_err(|e| StorageError::io(&dest, e))?;
            if let Err(e) = std::fs::remove_file(source) {
                tracing::debug!(path = %source.display(), error = %e, "staged file left behind");
            }
        }
        Ok(dest)
    }

    fn staged_len(&self, source: &Path) -> Result<u64, StorageError> {
        std::fs::metadata(source)
            .map(|m| m.len())
            .map_err(|e| StorageError::io(source, e))
    }

    fn discard(&mut self, source: &Path) {
        match std::fs::remove_file(source) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(path = %source.display(), error = %e, "staged file left behind"),
        }
    }

    fn list(&self, extension: &str) -> Result<Vec<String>, StorageError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io(&self.root, e))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if is_file && !name.starts_with('.') && has_extension(&name, extension) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_all(&mut self, extension: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        for name in self.list(extension)? {
            let path = self.root.join(&name);
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }
        Ok(removed)
    }
}
