#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Archival action interfaces and built-in actions.
pub mod archive;
/// Checkpoint persistence backends.
pub mod checkpoint;
/// Command-line entry points.
pub mod cli;
/// Incremental collector and run accumulator.
pub mod collector;
/// Collector, processor, and path configuration.
pub mod config;
/// Centralized constants used across collector, processor, and CLI.
pub mod constants;
/// Cooperative cancellation.
pub mod interrupt;
/// Identifier ledger and its flat-file persistence.
pub mod ledger;
/// Permalink parsing helpers.
pub mod permalink;
/// Resumable, checkpointed processor.
pub mod processor;
/// Pagination source traits and built-in sources.
pub mod source;
/// Stall detection state machine.
pub mod stall;
/// Shared type aliases.
pub mod types;

mod errors;
mod fsutil;

pub use archive::{ArchiveAction, ArchiveOutcome, CommandAction, CompositeAction};
pub use checkpoint::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use collector::{CollectOutcome, CollectReport, CollectStop, Collector, RunAccumulator};
pub use config::{CollectorConfig, ProcessorConfig, StallPolicy, SyncPaths};
pub use errors::SyncError;
pub use interrupt::CancelFlag;
pub use ledger::{Ledger, LedgerFile, normalize_identifier};
pub use processor::{PendingWindow, ProcessReport, ProcessStop, Processor, StatusReport};
pub use source::{InMemoryPager, PaginationSource};
pub use stall::{StallDecision, StallState, StallTracker};
pub use types::{DetailText, Identifier, LogMessage, SourceId};
