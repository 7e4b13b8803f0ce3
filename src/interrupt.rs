use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::errors::SyncError;

/// Cooperative cancellation shared between a signal handler and a run.
///
/// Runs poll it between batches/items; the in-flight unit always finishes
/// and the run's persist step still executes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Flag that is not yet cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Install a process-wide Ctrl-C handler that sets this flag.
    ///
    /// Can only be installed once per process.
    pub fn install_ctrlc_handler(&self) -> Result<(), SyncError> {
        let flag = self.clone();
        ctrlc::set_handler(move || {
            warn!("interrupt received; finishing current step and saving progress");
            flag.cancel();
        })
        .map_err(|err| SyncError::Configuration(format!("failed installing Ctrl-C handler: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
