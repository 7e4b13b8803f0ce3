//! Incremental collection of newly visible identifiers into the ledger.
//!
//! A run loads the ledger, repeatedly advances the pagination source, and
//! accumulates unseen identifiers in encounter order. It stops when a batch
//! overlaps already-known identifiers (primary signal), when the stall
//! policy gives up, when the source reports its end, on the optional batch
//! cap, or on cancellation. Every exit path, including errors and panics,
//! persists `ledger.merge(this_run)`.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::errors::SyncError;
use crate::interrupt::CancelFlag;
use crate::ledger::{Ledger, LedgerFile, normalize_identifier};
use crate::source::PaginationSource;
use crate::stall::{StallDecision, StallTracker};
use crate::types::{Identifier, SourceId};

/// Why a collection run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectStop {
    /// A batch contained an already-known identifier.
    Overlap,
    /// Too many batches in a row added nothing.
    Stalled,
    /// The source reported that no further content is loading.
    SourceEnd,
    /// `max_batches` was reached.
    BatchLimit,
    /// Cancellation was requested.
    Interrupted,
}

/// Summary of one collection run.
#[derive(Clone, Debug, Serialize)]
pub struct CollectReport {
    /// Source that was paginated.
    pub source_id: SourceId,
    /// Run start (UTC).
    pub started_at: DateTime<Utc>,
    /// Run end (UTC).
    pub finished_at: DateTime<Utc>,
    /// `advance` calls made, failed ones included.
    pub batches: usize,
    /// `advance` calls that failed and were treated as empty.
    pub failed_batches: usize,
    /// Escalations requested from the source.
    pub escalations: usize,
    /// Identifiers new to the ledger in this run.
    pub discovered: usize,
    /// Ledger size after the run.
    pub ledger_len: usize,
    /// Termination reason.
    pub stop: CollectStop,
}

/// Updated ledger plus run summary.
#[derive(Clone, Debug)]
pub struct CollectOutcome {
    /// Ledger as persisted at the end of the run.
    pub ledger: Ledger,
    /// Counters and stop reason.
    pub report: CollectReport,
}

/// Identifiers discovered during one run, distinct from the known ledger.
///
/// Created at run start and folded into the ledger at run end; it is the
/// only mutable scraping state a run carries.
#[derive(Clone, Debug, Default)]
pub struct RunAccumulator {
    discovered: IndexSet<Identifier>,
}

/// Effect of one batch on a [`RunAccumulator`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchEffect {
    /// Identifiers appended to the accumulator.
    pub added: usize,
    /// Whether the batch touched the known ledger.
    pub overlapped: bool,
}

impl RunAccumulator {
    /// Empty accumulator for a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unseen identifiers from `batch` in encounter order.
    ///
    /// Tokens are normalized first; blank or malformed ones are ignored.
    pub fn absorb(&mut self, known: &Ledger, batch: Vec<Identifier>) -> BatchEffect {
        let mut effect = BatchEffect::default();
        for id in batch.iter().filter_map(|raw| normalize_identifier(raw)) {
            if known.contains(&id) {
                effect.overlapped = true;
                continue;
            }
            if self.discovered.insert(id) {
                effect.added += 1;
            }
        }
        effect
    }

    /// Identifiers discovered so far.
    pub fn len(&self) -> usize {
        self.discovered.len()
    }

    /// Returns `true` before the first discovery.
    pub fn is_empty(&self) -> bool {
        self.discovered.is_empty()
    }

    /// Discovery-order iteration.
    pub fn iter(&self) -> impl Iterator<Item = &Identifier> {
        self.discovered.iter()
    }

    /// `known` with this run's discoveries prepended.
    pub fn merged_into(&self, known: &Ledger) -> Ledger {
        known.merge(self.discovered.iter().cloned())
    }
}

/// Persists the merged ledger when dropped unless the run finished normally.
///
/// Drop cannot return errors, so a failed persist there is logged; the
/// normal path goes through [`PersistGuard::finish`] and surfaces it.
struct PersistGuard<'a> {
    file: &'a LedgerFile,
    known: &'a Ledger,
    accumulator: RunAccumulator,
    persisted_len: usize,
    armed: bool,
}

impl<'a> PersistGuard<'a> {
    fn new(file: &'a LedgerFile, known: &'a Ledger) -> Self {
        Self {
            file,
            known,
            accumulator: RunAccumulator::new(),
            persisted_len: 0,
            armed: true,
        }
    }

    /// Periodic persist; skipped when nothing new arrived since the last one.
    fn checkpoint(&mut self) -> Result<(), SyncError> {
        if self.accumulator.len() == self.persisted_len {
            return Ok(());
        }
        self.file
            .persist(&self.accumulator.merged_into(self.known))?;
        self.persisted_len = self.accumulator.len();
        debug!(discovered = self.persisted_len, "periodic ledger persist");
        Ok(())
    }

    fn finish(mut self) -> Result<(Ledger, usize), SyncError> {
        self.armed = false;
        let merged = self.accumulator.merged_into(self.known);
        self.file.persist(&merged)?;
        Ok((merged, self.accumulator.len()))
    }
}

impl Drop for PersistGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let merged = self.accumulator.merged_into(self.known);
        match self.file.persist(&merged) {
            Ok(()) => warn!(
                discovered = self.accumulator.len(),
                "collection aborted; saved progress"
            ),
            Err(err) => error!(error = %err, "collection aborted and saving progress failed"),
        }
    }
}

/// Drives a [`PaginationSource`] and merges what it finds into the ledger file.
pub struct Collector {
    ledger_file: LedgerFile,
    config: CollectorConfig,
    cancel: CancelFlag,
}

impl Collector {
    /// Collector persisting to `ledger_file`, with its own cancel flag.
    pub fn new(ledger_file: LedgerFile, config: CollectorConfig) -> Self {
        Self {
            ledger_file,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag (for example one wired to Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Ledger file this collector reads and writes.
    pub fn ledger_file(&self) -> &LedgerFile {
        &self.ledger_file
    }

    /// Run one collection pass against `source`.
    pub fn run<S>(&self, source: &mut S) -> Result<CollectOutcome, SyncError>
    where
        S: PaginationSource + ?Sized,
    {
        let policy = self.config.stall.validated()?;
        let started_at = Utc::now();
        let known = self.ledger_file.load()?;
        info!(
            source = source.id(),
            known = known.len(),
            "collection started"
        );

        let mut guard = PersistGuard::new(&self.ledger_file, &known);
        let mut tracker = StallTracker::new(policy);
        let mut batches = 0usize;
        let mut failed_batches = 0usize;

        let stop = loop {
            if self.cancel.is_cancelled() {
                break CollectStop::Interrupted;
            }
            if self.config.max_batches.is_some_and(|max| batches >= max) {
                break CollectStop::BatchLimit;
            }

            let batch = match source.advance() {
                Ok(batch) => batch,
                Err(err) => {
                    failed_batches += 1;
                    warn!(source = source.id(), error = %err, "advance failed; counting as empty batch");
                    Vec::new()
                }
            };
            batches += 1;
            let visible = batch.len();
            let effect = guard.accumulator.absorb(&known, batch);
            debug!(
                batch = batches,
                visible,
                added = effect.added,
                total = guard.accumulator.len(),
                "batch absorbed"
            );

            if effect.overlapped {
                break CollectStop::Overlap;
            }
            match tracker.observe(effect.added) {
                StallDecision::Continue => {}
                StallDecision::Escalate => {
                    info!(
                        source = source.id(),
                        escalations = tracker.escalations(),
                        "no new identifiers for several batches; jumping ahead"
                    );
                    if let Err(err) = source.escalate() {
                        warn!(source = source.id(), error = %err, "escalation failed");
                    }
                }
                StallDecision::Terminate => break CollectStop::Stalled,
            }
            if source.at_end() {
                break CollectStop::SourceEnd;
            }
            if self.config.persist_every > 0 && batches % self.config.persist_every == 0 {
                guard.checkpoint()?;
            }
        };

        let (ledger, discovered) = guard.finish()?;
        let report = CollectReport {
            source_id: source.id().to_string(),
            started_at,
            finished_at: Utc::now(),
            batches,
            failed_batches,
            escalations: tracker.escalations(),
            discovered,
            ledger_len: ledger.len(),
            stop,
        };
        info!(
            source = %report.source_id,
            discovered,
            ledger = report.ledger_len,
            stop = ?stop,
            "collection finished"
        );
        Ok(CollectOutcome { ledger, report })
    }
}
