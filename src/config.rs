use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::collector::{
    ESCALATE_AFTER_EMPTY_BATCHES, PERSIST_EVERY_ITERATIONS, TERMINATE_AFTER_EMPTY_BATCHES,
};
use crate::constants::files::{
    DEFAULT_ARCHIVE_DIR, DEFAULT_CHECKPOINT_FILENAME, DEFAULT_LEDGER_FILENAME,
};
use crate::constants::processor::INTER_ITEM_DELAY;
use crate::errors::SyncError;

/// Controls when a collection run gives up on a feed that stopped yielding new items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StallPolicy {
    /// Consecutive empty batches before asking the source to jump ahead.
    pub escalate_after: usize,
    /// Empty batches since the last addition after which the run terminates.
    ///
    /// Not reset by escalation, so it must exceed `escalate_after` for any
    /// escalation to happen.
    pub terminate_after: usize,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            escalate_after: ESCALATE_AFTER_EMPTY_BATCHES,
            terminate_after: TERMINATE_AFTER_EMPTY_BATCHES,
        }
    }
}

impl StallPolicy {
    /// Validate threshold ordering.
    pub fn validated(self) -> Result<Self, SyncError> {
        if self.escalate_after == 0 {
            return Err(SyncError::Configuration(
                "stall escalation threshold must be greater than zero".into(),
            ));
        }
        if self.terminate_after <= self.escalate_after {
            return Err(SyncError::Configuration(format!(
                "stall termination threshold ({}) must exceed escalation threshold ({})",
                self.terminate_after, self.escalate_after
            )));
        }
        Ok(self)
    }
}

/// Collection run settings.
#[derive(Clone, Debug)]
pub struct CollectorConfig {
    /// Stall and termination thresholds.
    pub stall: StallPolicy,
    /// Persist the merged ledger every this many iterations (0 disables periodic persists).
    pub persist_every: usize,
    /// Optional cap on `advance` calls per run.
    pub max_batches: Option<usize>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            stall: StallPolicy::default(),
            persist_every: PERSIST_EVERY_ITERATIONS,
            max_batches: None,
        }
    }
}

/// Processing run settings.
#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    /// Blocking pause between successful items.
    pub delay: Duration,
    /// Optional cap on archival attempts per run.
    pub max_items: Option<usize>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            delay: INTER_ITEM_DELAY,
            max_items: None,
        }
    }
}

/// File locations shared by both phases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPaths {
    /// Ledger file.
    pub ledger: PathBuf,
    /// Checkpoint file.
    pub checkpoint: PathBuf,
    /// Output directory handed to archival actions.
    pub archive_dir: PathBuf,
}

impl Default for SyncPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl SyncPaths {
    /// Default file names rooted at `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            ledger: dir.join(DEFAULT_LEDGER_FILENAME),
            checkpoint: dir.join(DEFAULT_CHECKPOINT_FILENAME),
            archive_dir: dir.join(DEFAULT_ARCHIVE_DIR),
        }
    }
}
