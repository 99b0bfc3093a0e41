//! Recording store seam: the endpoint's own recordings directory.

use std::path::{Path, PathBuf};

/// Local storage for recordings. Each endpoint only mutates names it generated
/// or received, so implementations need no cross-process locking.
pub trait RecordingStore {
    /// Write `bytes` under `name`, creating the storage location if absent.
    fn persist(&mut self, name: &str, bytes: &[u8]) -> Result<PathBuf, StorageError>;

    /// Move or copy an already materialized file into the store under `name`.
    fn import(&mut self, name: &str, source: &Path) -> Result<PathBuf, StorageError>;

    /// Size in bytes of a materialized file waiting to be imported.
    fn staged_len(&self, source: &Path) -> Result<u64, StorageError>;

    /// Drop a materialized file that will not be imported. Best effort.
    fn discard(&mut self, source: &Path);

    /// Names of stored files ending in `extension`, sorted.
    fn list(&self, extension: &str) -> Result<Vec<String>, StorageError>;

    /// Remove every stored file ending in `extension`. Returns how many were removed;
    /// a store with nothing to remove returns 0, not an error.
    fn delete_all(&mut self, extension: &str) -> Result<usize, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid recording name: {0}")]
    InvalidName(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}
