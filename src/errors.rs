use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::SourceId;

/// Error type for persistence, pagination, and configuration failures.
///
/// Archival failures are not errors; they travel as
/// [`ArchiveOutcome::Failure`](crate::archive::ArchiveOutcome) values.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Writing the ledger or checkpoint failed.
    #[error("failed persisting state to {path}: {reason}")]
    Persistence {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },
    /// The pagination source could not be reached or stopped answering.
    #[error("pagination source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable {
        /// Offending source.
        source_id: SourceId,
        /// Underlying failure.
        reason: String,
    },
    /// The pagination source answered something unexpected.
    #[error("pagination source '{source_id}' violated its protocol: {details}")]
    Protocol {
        /// Offending source.
        source_id: SourceId,
        /// What was expected and what arrived.
        details: String,
    },
    /// Raw filesystem error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Invalid settings.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
