//! Pagination source interfaces.
//!
//! Ownership model:
//! - `PaginationSource` is the collector-facing interface over a scroll-driven
//!   feed. It is stateful (the viewport moves) and used by one run at a time.
//! - Built-in sources live in [`sources`]; `InMemoryPager` replays scripted
//!   batches for tests and dry runs.

use tracing::debug;

use crate::errors::SyncError;
use crate::types::{Identifier, SourceId};

/// Source implementation modules.
pub mod sources;
pub use sources::batch_file::BatchFileSource;
pub use sources::process::{ProcessPager, ProcessPagerConfig};

/// Collector-facing pagination interface.
///
/// The feed is reverse-chronological and offers no reliable completion
/// signal. Batches are allowed to repeat, overlap, or come back empty.
pub trait PaginationSource {
    /// Stable source identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Move the viewport forward once and return every identifier now visible,
    /// in on-page order (newest first).
    fn advance(&mut self) -> Result<Vec<Identifier>, SyncError>;

    /// Best-effort signal that no further content is loading.
    ///
    /// Implementations should answer `false` when unsure.
    fn at_end(&mut self) -> bool;

    /// Jump further ahead than a normal `advance` after repeated stalls.
    fn escalate(&mut self) -> Result<(), SyncError> {
        Ok(())
    }
}

impl<T: PaginationSource + ?Sized> PaginationSource for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn advance(&mut self) -> Result<Vec<Identifier>, SyncError> {
        (**self).advance()
    }

    fn at_end(&mut self) -> bool {
        (**self).at_end()
    }

    fn escalate(&mut self) -> Result<(), SyncError> {
        (**self).escalate()
    }
}

/// One scripted step for [`InMemoryPager`].
#[derive(Clone, Debug)]
enum ScriptedBatch {
    Visible(Vec<Identifier>),
    Failure(String),
}

/// Scripted in-memory pager for tests and small replays.
///
/// Once the script is exhausted, `advance` keeps returning the last visible
/// batch, the way a stalled page keeps showing the same items.
#[derive(Clone, Debug)]
pub struct InMemoryPager {
    id: SourceId,
    script: Vec<ScriptedBatch>,
    next: usize,
    last_visible: Vec<Identifier>,
    end_when_exhausted: bool,
    advances: usize,
    escalations: usize,
}

impl InMemoryPager {
    /// Create a pager that yields `batches` in order.
    pub fn new<B, T>(id: impl Into<SourceId>, batches: impl IntoIterator<Item = B>) -> Self
    where
        B: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        Self {
            id: id.into(),
            script: batches
                .into_iter()
                .map(|batch| ScriptedBatch::Visible(batch.into_iter().map(Into::into).collect()))
                .collect(),
            next: 0,
            last_visible: Vec::new(),
            end_when_exhausted: false,
            advances: 0,
            escalations: 0,
        }
    }

    /// Append a failing `advance` to the script.
    pub fn then_fail(mut self, reason: impl Into<String>) -> Self {
        self.script.push(ScriptedBatch::Failure(reason.into()));
        self
    }

    /// Append a visible batch to the script.
    pub fn then_batch<T: Into<Identifier>>(mut self, batch: impl IntoIterator<Item = T>) -> Self {
        self.script.push(ScriptedBatch::Visible(
            batch.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Report `at_end` once the script is exhausted.
    pub fn with_end_signal(mut self, end_when_exhausted: bool) -> Self {
        self.end_when_exhausted = end_when_exhausted;
        self
    }

    /// Number of `advance` calls served.
    pub fn advances(&self) -> usize {
        self.advances
    }

    /// Number of escalations requested.
    pub fn escalations(&self) -> usize {
        self.escalations
    }
}

impl PaginationSource for InMemoryPager {
    fn id(&self) -> &str {
        &self.id
    }

    fn advance(&mut self) -> Result<Vec<Identifier>, SyncError> {
        self.advances += 1;
        let Some(step) = self.script.get(self.next).cloned() else {
            return Ok(self.last_visible.clone());
        };
        self.next += 1;
        match step {
            ScriptedBatch::Visible(batch) => {
                self.last_visible = batch.clone();
                Ok(batch)
            }
            ScriptedBatch::Failure(reason) => Err(SyncError::SourceUnavailable {
                source_id: self.id.clone(),
                reason,
            }),
        }
    }

    fn at_end(&mut self) -> bool {
        self.end_when_exhausted && self.next >= self.script.len()
    }

    fn escalate(&mut self) -> Result<(), SyncError> {
        self.escalations += 1;
        debug!(source = %self.id, escalations = self.escalations, "in-memory pager jump");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_pager_replays_then_repeats_last_batch() {
        let mut pager = InMemoryPager::new("mem", [vec!["3", "2"], vec!["2", "1"]]);
        assert_eq!(pager.advance().unwrap(), ["3", "2"]);
        assert_eq!(pager.advance().unwrap(), ["2", "1"]);
        assert_eq!(pager.advance().unwrap(), ["2", "1"]);
        assert!(!pager.at_end());
        assert_eq!(pager.advances(), 3);
    }

    #[test]
    fn in_memory_pager_scripts_failures_and_end() {
        let mut pager = InMemoryPager::new("mem", [vec!["1"]])
            .then_fail("timeout")
            .with_end_signal(true);
        assert!(pager.advance().is_ok());
        assert!(!pager.at_end());
        assert!(matches!(
            pager.advance(),
            Err(SyncError::SourceUnavailable { .. })
        ));
        assert!(pager.at_end());
    }
}
