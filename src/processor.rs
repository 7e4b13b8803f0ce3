//! Checkpointed, fail-stop replay of the ledger through an archival action.
//!
//! Pending work is every ledger entry strictly newer than the checkpoint.
//! It is processed oldest-first, one item at a time, and the checkpoint is
//! persisted after each success before moving on. At any instant everything
//! at or older than the checkpoint is archived and everything newer is not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveAction, ArchiveOutcome};
use crate::checkpoint::CheckpointStore;
use crate::config::ProcessorConfig;
use crate::errors::SyncError;
use crate::interrupt::CancelFlag;
use crate::ledger::Ledger;
use crate::types::{DetailText, Identifier, LogMessage};

/// Longest single sleep while pausing between items, so cancellation stays responsive.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

/// Outstanding work for one processing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingWindow {
    /// Identifiers to archive, oldest first.
    pub items: Vec<Identifier>,
    /// Checkpoint the window was resolved against.
    pub checkpoint: Option<Identifier>,
    /// The checkpoint was set but not found in the ledger.
    pub dangling: bool,
}

impl PendingWindow {
    /// Resolve pending work for `ledger` given the stored `checkpoint`.
    ///
    /// A dangling checkpoint falls back to the whole ledger rather than to
    /// nothing, so no work is silently dropped.
    pub fn resolve(ledger: &Ledger, checkpoint: Option<&str>) -> Self {
        let (newer_than, dangling) = match checkpoint {
            None => (ledger.len(), false),
            Some(id) => match ledger.position(id) {
                Some(pos) => (pos, false),
                None => (ledger.len(), true),
            },
        };
        let items = ledger.iter().take(newer_than).rev().cloned().collect();
        Self {
            items,
            checkpoint: checkpoint.map(str::to_string),
            dangling,
        }
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-run state machine; `Completed` and `Halted` are terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Idle,
    /// Reading the checkpoint and computing pending work.
    Resolving,
    /// Archival action running for this identifier.
    Processing(Identifier),
    /// Persisting the checkpoint after this identifier succeeded.
    Advancing(Identifier),
    /// Pending work exhausted.
    Completed,
    /// Stopped on this identifier's failure.
    Halted(Identifier),
}

/// Why a processing run stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessStop {
    /// Every pending item was archived.
    Completed,
    /// The archival action failed; the checkpoint stays before `identifier`.
    Halted {
        /// Identifier whose archival failed.
        identifier: Identifier,
        /// Failure detail from the action.
        reason: DetailText,
    },
    /// `max_items` attempts were made.
    ItemLimit,
    /// Cancellation was requested between items.
    Interrupted,
}

/// Summary of one processing run.
#[derive(Clone, Debug, Serialize)]
pub struct ProcessReport {
    /// Run start (UTC).
    pub started_at: DateTime<Utc>,
    /// Run end (UTC).
    pub finished_at: DateTime<Utc>,
    /// Size of the pending window at run start.
    pub pending: usize,
    /// Items archived in this run.
    pub archived: usize,
    /// Checkpoint read at run start.
    pub checkpoint_before: Option<Identifier>,
    /// Checkpoint after the last success.
    pub checkpoint_after: Option<Identifier>,
    /// Termination reason.
    pub stop: ProcessStop,
    /// Anomalies worth surfacing (dangling checkpoint).
    pub warnings: Vec<LogMessage>,
}

impl ProcessReport {
    /// Whether all pending work was done.
    pub fn completed(&self) -> bool {
        self.stop == ProcessStop::Completed
    }
}

/// Ledger-size, checkpoint, and pending snapshot without running anything.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Ledger entries on disk.
    pub ledger_len: usize,
    /// Stored checkpoint, if any.
    pub checkpoint: Option<Identifier>,
    /// Newest-first ledger position of the checkpoint.
    pub checkpoint_position: Option<usize>,
    /// Items the next run would process.
    pub pending: usize,
    /// The checkpoint is set but missing from the ledger.
    pub dangling: bool,
}

impl StatusReport {
    /// Snapshot for `ledger` and the stored `checkpoint`.
    pub fn inspect(ledger: &Ledger, checkpoint: Option<&str>) -> Self {
        let window = PendingWindow::resolve(ledger, checkpoint);
        Self {
            ledger_len: ledger.len(),
            checkpoint: window.checkpoint.clone(),
            checkpoint_position: checkpoint.and_then(|id| ledger.position(id)),
            pending: window.len(),
            dangling: window.dangling,
        }
    }
}

/// Sequential, fail-stop archival worker.
pub struct Processor {
    checkpoint: Arc<dyn CheckpointStore>,
    config: ProcessorConfig,
    cancel: CancelFlag,
}

impl Processor {
    /// Processor advancing `checkpoint`, with its own cancel flag.
    pub fn new(checkpoint: Arc<dyn CheckpointStore>, config: ProcessorConfig) -> Self {
        Self {
            checkpoint,
            config,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag (for example one wired to Ctrl-C).
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Archive every pending item of `ledger` through `action`.
    ///
    /// Checkpoint persistence failures abort the run with an error; archival
    /// failures halt it with [`ProcessStop::Halted`].
    pub fn run<A>(&self, ledger: &Ledger, action: &mut A) -> Result<ProcessReport, SyncError>
    where
        A: ArchiveAction + ?Sized,
    {
        let started_at = Utc::now();
        let mut state = RunState::Idle;
        transition(&mut state, RunState::Resolving);

        let checkpoint_before = self.checkpoint.load()?;
        let window = PendingWindow::resolve(ledger, checkpoint_before.as_deref());
        let mut warnings = Vec::new();
        if window.dangling {
            let message = format!(
                "checkpoint '{}' not found in ledger; processing all {} items",
                checkpoint_before.as_deref().unwrap_or_default(),
                window.len()
            );
            warn!(action = action.name(), "{message}");
            warnings.push(message);
        }
        info!(
            action = action.name(),
            pending = window.len(),
            checkpoint = ?checkpoint_before,
            "processing started"
        );

        let total = window.len();
        let mut archived = 0usize;
        let mut attempted = 0usize;
        let mut checkpoint_after = checkpoint_before.clone();

        let stop = 'items: {
            for (idx, id) in window.items.iter().enumerate() {
                if self.cancel.is_cancelled() {
                    break 'items ProcessStop::Interrupted;
                }
                if self.config.max_items.is_some_and(|max| attempted >= max) {
                    break 'items ProcessStop::ItemLimit;
                }
                transition(&mut state, RunState::Processing(id.clone()));
                info!(item = idx + 1, total, identifier = %id, "archiving");
                attempted += 1;

                match action.archive(id) {
                    ArchiveOutcome::Success(detail) => {
                        transition(&mut state, RunState::Advancing(id.clone()));
                        self.checkpoint.store(id)?;
                        checkpoint_after = Some(id.clone());
                        archived += 1;
                        info!(identifier = %id, %detail, "archived");
                    }
                    ArchiveOutcome::Failure(reason) => {
                        transition(&mut state, RunState::Halted(id.clone()));
                        warn!(identifier = %id, %reason, "archival failed; halting");
                        break 'items ProcessStop::Halted {
                            identifier: id.clone(),
                            reason,
                        };
                    }
                }

                let limit_reached = self.config.max_items.is_some_and(|max| attempted >= max);
                if idx + 1 < total && !limit_reached {
                    self.pause();
                }
            }
            transition(&mut state, RunState::Completed);
            ProcessStop::Completed
        };

        let report = ProcessReport {
            started_at,
            finished_at: Utc::now(),
            pending: total,
            archived,
            checkpoint_before,
            checkpoint_after,
            stop,
            warnings,
        };
        info!(
            archived = report.archived,
            pending = report.pending,
            stop = ?report.stop,
            "processing finished"
        );
        Ok(report)
    }

    /// Blocking politeness delay, cut short by cancellation.
    fn pause(&self) {
        if self.config.delay.is_zero() {
            return;
        }
        debug!(delay_ms = self.config.delay.as_millis() as u64, "pausing before next item");
        let deadline = Instant::now() + self.config.delay;
        while !self.cancel.is_cancelled() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(PAUSE_SLICE));
        }
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug!(from = ?state, to = ?next, "processor state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::InMemoryCheckpointStore;
    use std::collections::HashSet;

    /// Records attempts; fails on the identifiers in `failing`.
    struct Recorder {
        attempts: Vec<Identifier>,
        failing: HashSet<Identifier>,
    }

    impl Recorder {
        fn new(failing: &[&str]) -> Self {
            Self {
                attempts: Vec::new(),
                failing: failing.iter().map(|id| id.to_string()).collect(),
            }
        }
    }

    impl ArchiveAction for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn archive(&mut self, id: &str) -> ArchiveOutcome {
            self.attempts.push(id.to_string());
            if self.failing.contains(id) {
                ArchiveOutcome::Failure(format!("cannot render {id}"))
            } else {
                ArchiveOutcome::Success("ok".into())
            }
        }
    }

    fn no_delay() -> ProcessorConfig {
        ProcessorConfig {
            delay: Duration::ZERO,
            max_items: None,
        }
    }

    fn ledger() -> Ledger {
        Ledger::from_newest_first(["30", "20", "10"])
    }

    #[test]
    fn pending_is_strictly_newer_than_checkpoint_oldest_first() {
        let window = PendingWindow::resolve(&ledger(), Some("10"));
        assert_eq!(window.items, ["20", "30"]);
        assert!(!window.dangling);

        let window = PendingWindow::resolve(&ledger(), Some("30"));
        assert!(window.is_empty());
    }

    #[test]
    fn pending_without_checkpoint_is_whole_ledger() {
        let window = PendingWindow::resolve(&ledger(), None);
        assert_eq!(window.items, ["10", "20", "30"]);
    }

    #[test]
    fn dangling_checkpoint_falls_back_to_everything() {
        let window = PendingWindow::resolve(&ledger(), Some("99"));
        assert!(window.dangling);
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn advances_checkpoint_then_second_run_is_empty() {
        let store = Arc::new(InMemoryCheckpointStore::new(Some("20")));
        let processor = Processor::new(store.clone(), no_delay());
        let mut action = Recorder::new(&[]);

        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.pending, 1);
        assert_eq!(report.archived, 1);
        assert!(report.completed());
        assert_eq!(store.load().unwrap().as_deref(), Some("30"));

        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.pending, 0);
        assert_eq!(report.archived, 0);
        assert!(report.completed());
        assert_eq!(action.attempts, ["30"]);
    }

    #[test]
    fn failure_halts_and_keeps_checkpoint_before_failing_item() {
        let store = Arc::new(InMemoryCheckpointStore::new(None));
        let processor = Processor::new(store.clone(), no_delay());
        let mut action = Recorder::new(&["20"]);

        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.archived, 1);
        assert_eq!(
            report.stop,
            ProcessStop::Halted {
                identifier: "20".into(),
                reason: "cannot render 20".into()
            }
        );
        assert_eq!(store.load().unwrap().as_deref(), Some("10"));
        assert_eq!(action.attempts, ["10", "20"]);

        // Next run retries the failing item first.
        let mut action = Recorder::new(&[]);
        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(action.attempts, ["20", "30"]);
        assert!(report.completed());
        assert_eq!(store.load().unwrap().as_deref(), Some("30"));
    }

    #[test]
    fn dangling_checkpoint_is_reported_as_warning() {
        let store = Arc::new(InMemoryCheckpointStore::new(Some("99")));
        let processor = Processor::new(store, no_delay());
        let mut action = Recorder::new(&[]);
        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.pending, 3);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("'99'"));
        assert_eq!(action.attempts, ["10", "20", "30"]);
    }

    #[test]
    fn item_limit_and_cancellation_stop_between_items() {
        let store = Arc::new(InMemoryCheckpointStore::new(None));
        let processor = Processor::new(
            store.clone(),
            ProcessorConfig {
                delay: Duration::ZERO,
                max_items: Some(2),
            },
        );
        let mut action = Recorder::new(&[]);
        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.stop, ProcessStop::ItemLimit);
        assert_eq!(store.load().unwrap().as_deref(), Some("20"));

        let cancel = CancelFlag::new();
        cancel.cancel();
        let processor = Processor::new(store.clone(), no_delay()).with_cancel_flag(cancel);
        let report = processor.run(&ledger(), &mut action).unwrap();
        assert_eq!(report.stop, ProcessStop::Interrupted);
        assert_eq!(report.archived, 0);
    }

    #[test]
    fn item_limit_does_not_wait_out_a_trailing_delay() {
        let store = Arc::new(InMemoryCheckpointStore::new(None));
        let processor = Processor::new(
            store,
            ProcessorConfig {
                delay: Duration::from_secs(5),
                max_items: Some(1),
            },
        );
        let started = Instant::now();
        let report = processor.run(&ledger(), &mut Recorder::new(&[])).unwrap();
        assert_eq!(report.stop, ProcessStop::ItemLimit);
        assert_eq!(report.archived, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn checkpoint_position_never_moves_toward_older() {
        let store = Arc::new(InMemoryCheckpointStore::new(None));
        let processor = Processor::new(store.clone(), no_delay());
        let mut growing = ledger();
        let mut last_position_from_oldest = None;
        for (round, fresh) in [vec!["40"], vec![], vec!["60", "50"]].into_iter().enumerate() {
            growing = growing.merge(fresh);
            let failing: &[&str] = if round == 0 { &["30"] } else { &[] };
            processor
                .run(&growing, &mut Recorder::new(failing))
                .unwrap();
            let checkpoint = store.load().unwrap().unwrap();
            let from_oldest = growing.len() - 1 - growing.position(&checkpoint).unwrap();
            if let Some(previous) = last_position_from_oldest {
                assert!(from_oldest >= previous);
            }
            last_position_from_oldest = Some(from_oldest);
        }
        assert_eq!(store.load().unwrap().as_deref(), Some("60"));
    }

    #[test]
    fn status_reports_pending_and_dangling() {
        let status = StatusReport::inspect(&ledger(), Some("20"));
        assert_eq!(status.pending, 1);
        assert_eq!(status.checkpoint_position, Some(1));
        assert!(!status.dangling);
        assert!(StatusReport::inspect(&ledger(), Some("x")).dangling);
    }
}
