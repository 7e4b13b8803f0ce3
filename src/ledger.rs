//! Ordered, deduplicated record of every identifier ever discovered.
//!
//! Entries are kept newest-first, matching the reverse-chronological feed.
//! A later run only ever prepends; earlier entries keep their relative order.

use indexmap::IndexSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::SyncError;
use crate::fsutil::{read_optional, write_atomic};
use crate::types::Identifier;

/// Canonical form of a raw identifier token.
///
/// Surrounding whitespace is stripped. Empty tokens and tokens with inner
/// whitespace are rejected, since neither survives the one-per-line file.
pub fn normalize_identifier(raw: &str) -> Option<Identifier> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Newest-first identifier sequence without duplicates.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: IndexSet<Identifier>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}

impl Ledger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from newest-first identifiers, keeping first occurrences.
    ///
    /// Tokens go through [`normalize_identifier`]; rejected ones are skipped.
    pub fn from_newest_first<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        Self {
            entries: ids
                .into_iter()
                .filter_map(|id| normalize_identifier(&Into::<Identifier>::into(id)))
                .collect(),
        }
    }

    /// Number of identifiers recorded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been discovered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` was ever discovered.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains(id)
    }

    /// Position of `id` counted from the newest end.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    /// Identifier at newest-first position `idx`.
    pub fn get(&self, idx: usize) -> Option<&Identifier> {
        self.entries.get_index(idx)
    }

    /// Newest-first iteration.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Identifier> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Prepend every identifier from `fresh` not already present.
    ///
    /// `fresh` keeps its discovery order (duplicates collapse to the first
    /// occurrence) and the existing entries keep their full relative order.
    /// Tokens rejected by [`normalize_identifier`] are skipped.
    pub fn merge<I, T>(&self, fresh: I) -> Ledger
    where
        I: IntoIterator<Item = T>,
        T: Into<Identifier>,
    {
        let mut entries: IndexSet<Identifier> = fresh
            .into_iter()
            .filter_map(|id| normalize_identifier(&Into::<Identifier>::into(id)))
            .filter(|id| !self.entries.contains(id))
            .collect();
        entries.reserve(self.entries.len());
        entries.extend(self.entries.iter().cloned());
        debug_assert_eq!(
            entries.len(),
            entries.iter().collect::<std::collections::HashSet<_>>().len()
        );
        Ledger { entries }
    }

    /// Newest-first identifiers as an owned vector.
    pub fn to_vec(&self) -> Vec<Identifier> {
        self.entries.iter().cloned().collect()
    }

    fn encode(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 20);
        for id in &self.entries {
            out.push_str(id);
            out.push('\n');
        }
        out
    }

    fn decode(raw: &str) -> (Self, usize) {
        let mut entries = IndexSet::new();
        let mut duplicates = 0usize;
        for id in raw.lines().filter_map(normalize_identifier) {
            if !entries.insert(id) {
                duplicates += 1;
            }
        }
        (Self { entries }, duplicates)
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Identifier;
    type IntoIter = indexmap::set::Iter<'a, Identifier>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Flat-file persistence for a [`Ledger`].
///
/// One identifier per line, newest-first, no header. Rewritten in full on
/// every persist.
#[derive(Clone, Debug)]
pub struct LedgerFile {
    path: PathBuf,
}

impl LedgerFile {
    /// Bind to the ledger file at `path` (it need not exist yet).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted ledger, or an empty one when no file exists.
    pub fn load(&self) -> Result<Ledger, SyncError> {
        let Some(raw) = read_optional(&self.path)? else {
            debug!(path = %self.path.display(), "no ledger on disk; starting empty");
            return Ok(Ledger::new());
        };
        let (ledger, duplicates) = Ledger::decode(&raw);
        if duplicates > 0 {
            warn!(
                path = %self.path.display(),
                duplicates,
                "ledger file contained duplicate identifiers; keeping first occurrences"
            );
        }
        debug!(path = %self.path.display(), entries = ledger.len(), "loaded ledger");
        Ok(ledger)
    }

    /// Atomically overwrite the file with `ledger`.
    pub fn persist(&self, ledger: &Ledger) -> Result<(), SyncError> {
        write_atomic(&self.path, ledger.encode().as_bytes())?;
        debug!(path = %self.path.display(), entries = ledger.len(), "persisted ledger");
        Ok(())
    }
}
