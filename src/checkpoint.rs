use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::errors::SyncError;
use crate::fsutil::{read_optional, write_atomic};
use crate::types::Identifier;

/// Persistence backend for the "newest fully archived identifier" cursor.
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint, `None` when nothing has been archived yet.
    fn load(&self) -> Result<Option<Identifier>, SyncError>;
    /// Durably record `id` as the newest archived identifier.
    fn store(&self, id: &str) -> Result<(), SyncError>;
    /// Forget the checkpoint so the next run processes the whole ledger.
    fn clear(&self) -> Result<(), SyncError>;
}

/// In-memory checkpoint for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    value: RwLock<Option<Identifier>>,
}

impl InMemoryCheckpointStore {
    /// Create a store seeded with `initial`.
    pub fn new(initial: Option<&str>) -> Self {
        Self {
            value: RwLock::new(initial.map(str::to_string)),
        }
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<Option<Identifier>, SyncError> {
        self.value
            .read()
            .map_err(|_| SyncError::Configuration("checkpoint lock poisoned".into()))
            .map(|guard| guard.clone())
    }

    fn store(&self, id: &str) -> Result<(), SyncError> {
        *self
            .value
            .write()
            .map_err(|_| SyncError::Configuration("checkpoint lock poisoned".into()))? =
            Some(id.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), SyncError> {
        *self
            .value
            .write()
            .map_err(|_| SyncError::Configuration("checkpoint lock poisoned".into()))? = None;
        Ok(())
    }
}

/// Single-line checkpoint file.
///
/// A missing or blank file means "no checkpoint".
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Bind to the checkpoint file at `path` (it need not exist yet).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<Identifier>, SyncError> {
        let value = read_optional(&self.path)?
            .as_deref()
            .and_then(|raw| raw.lines().next())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string);
        Ok(value)
    }

    fn store(&self, id: &str) -> Result<(), SyncError> {
        write_atomic(&self.path, format!("{id}\n").as_bytes())?;
        debug!(path = %self.path.display(), identifier = %id, "checkpoint advanced");
        Ok(())
    }

    fn clear(&self) -> Result<(), SyncError> {
        write_atomic(&self.path, b"")
    }
}
