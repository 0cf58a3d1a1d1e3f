//! Single-slot storage for the latest result batch.

use crate::record::ResultBatch;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Error from a result store.
#[derive(Debug)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    Io { path: PathBuf, source: std::io::Error },
    /// The batch could not be serialized.
    Serialize(serde_json::Error),
    /// The stored document is not a valid batch.
    Corrupt { path: PathBuf, source: serde_json::Error },
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "IO error on {}: {}", path.display(), source)
            }
            StorageError::Serialize(e) => write!(f, "Failed to serialize batch: {}", e),
            StorageError::Corrupt { path, source } => {
                write!(f, "Corrupt results file {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Serialize(e) => Some(e),
            StorageError::Corrupt { source, .. } => Some(source),
        }
    }
}

/// Holds the most recent result batch. `replace` must be atomic with
/// respect to `load`.
pub trait ResultStore: Send + Sync {
    /// Overwrite the latest batch.
    fn replace(&self, batch: &ResultBatch) -> Result<(), StorageError>;

    /// The latest batch, or `None` if no ingestion has completed.
    fn load(&self) -> Result<Option<ResultBatch>, StorageError>;

    /// Where the batch lives, for logging.
    fn describe(&self) -> String;
}

/// JSON file store. Writes go to a temp sibling that is renamed over the
/// target, so readers see either the old or the new document.
pub struct FileResultStore {
    path: PathBuf,
}

impl FileResultStore {
    /// Store backed by the JSON document at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the results document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ResultStore for FileResultStore {
    fn replace(&self, batch: &ResultBatch) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let raw = serde_json::to_string_pretty(batch).map_err(StorageError::Serialize)?;

        let tmp = self.temp_path();
        if let Err(e) = write_synced(&tmp, raw.as_bytes()) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(&tmp, e));
        }
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(&self.path, e));
        }

        debug!(path = %self.path.display(), records = batch.len(), "Result batch written");
        Ok(())
    }

    fn load(&self) -> Result<Option<ResultBatch>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let batch = serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(batch))
    }

    fn describe(&self) -> String {
        self.path().display().to_string()
    }
}

/// Write `contents` to `path` and flush it to disk before returning.
fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// In-process store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryResultStore {
    slot: RwLock<Option<ResultBatch>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for MemoryResultStore {
    fn replace(&self, batch: &ResultBatch) -> Result<(), StorageError> {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(batch.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ResultBatch>, StorageError> {
        let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
        Ok(slot.clone())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
