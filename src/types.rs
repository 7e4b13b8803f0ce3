/// Opaque, unique token naming one feed item.
///
/// Only equality is meaningful; ordering comes from the ledger position.
/// Example: `1899102031942381612`
pub type Identifier = String;
/// Identifier for the pagination source feeding a collection run.
/// Examples: `batch_file`, `process:scrape-likes`, `in_memory`
pub type SourceId = String;
/// Human-readable detail attached to archival outcomes.
/// Examples: `Screenshot completed`, `exit status 1: rate limited`
pub type DetailText = String;
/// Warning/log message text surfaced in run reports.
/// Example: `checkpoint '99' not found in ledger; processing all 3 items`
pub type LogMessage = String;
