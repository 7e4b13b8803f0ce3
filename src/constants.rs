/// Constants used by the incremental collector and its stall policy.
pub mod collector {
    /// Consecutive batches without additions before the source is asked to jump ahead.
    pub const ESCALATE_AFTER_EMPTY_BATCHES: usize = 5;
    /// Empty batches since the last addition after which collection gives up.
    pub const TERMINATE_AFTER_EMPTY_BATCHES: usize = 15;
    /// Iterations between periodic ledger persists during a run.
    pub const PERSIST_EVERY_ITERATIONS: usize = 5;
}

/// Constants used by the resumable processor.
pub mod processor {
    use std::time::Duration;

    /// Pause between successful archival actions.
    pub const INTER_ITEM_DELAY: Duration = Duration::from_secs(5);
}

/// Default on-disk locations.
pub mod files {
    /// Ledger file name (newest-first, one identifier per line).
    pub const DEFAULT_LEDGER_FILENAME: &str = "liked_tweet_ids.txt";
    /// Checkpoint file name (single identifier line).
    pub const DEFAULT_CHECKPOINT_FILENAME: &str = "last_archived_id.txt";
    /// Directory handed to archival actions as `{out}`.
    pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
    /// Extension used for write-then-rename temp files.
    pub const TEMP_EXTENSION: &str = "tmp";
    /// Environment override for the ledger path.
    pub const ENV_LEDGER_PATH: &str = "FEEDSYNC_LEDGER";
    /// Environment override for the checkpoint path.
    pub const ENV_CHECKPOINT_PATH: &str = "FEEDSYNC_CHECKPOINT";
    /// Environment override for the archive output directory.
    pub const ENV_ARCHIVE_DIR: &str = "FEEDSYNC_ARCHIVE_DIR";
}

/// Constants used by permalink parsing and construction.
pub mod permalink {
    /// Pattern matching the identifier segment of an item permalink.
    pub const STATUS_PATTERN: &str = r"/status/(\d+)";
    /// Base URL for identifier-only item links.
    pub const ITEM_URL_PREFIX: &str = "https://x.com/i/web/status/";
}

/// Constants used by the external scraper line protocol.
pub mod protocol {
    use std::time::Duration;

    /// Request the next visible batch.
    pub const CMD_ADVANCE: &str = "advance";
    /// Request a larger forward jump.
    pub const CMD_JUMP: &str = "jump";
    /// Ask whether the feed reports no further content.
    pub const CMD_AT_END: &str = "end?";
    /// Acknowledgement for `jump`.
    pub const REPLY_OK: &str = "ok";
    /// Time a scraper gets to exit after its stdin closes before it is killed.
    pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);
    /// Exit-status polling interval during shutdown.
    pub const SHUTDOWN_POLL: Duration = Duration::from_millis(50);
}
