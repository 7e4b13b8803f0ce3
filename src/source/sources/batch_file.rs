use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::SyncError;
use crate::permalink::extract_batch;
use crate::source::PaginationSource;
use crate::types::{Identifier, SourceId};

/// Replays pre-recorded batches from a text file.
///
/// Batches are separated by blank lines. Each whitespace-separated token is
/// a bare identifier or a permalink. Lines starting with `#` are ignored.
/// `at_end` turns true once every batch has been served.
#[derive(Clone, Debug)]
pub struct BatchFileSource {
    source_id: SourceId,
    path: PathBuf,
    batches: Vec<Vec<Identifier>>,
    next: usize,
}

impl BatchFileSource {
    /// Read and parse every batch in `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|err| SyncError::SourceUnavailable {
            source_id: format!("batch_file:{}", path.display()),
            reason: format!("failed reading batch file: {err}"),
        })?;
        let batches = parse_batches(&raw);
        debug!(path = %path.display(), batches = batches.len(), "loaded batch file");
        Ok(Self {
            source_id: format!("batch_file:{}", path.display()),
            path,
            batches,
            next: 0,
        })
    }

    /// Parsed batch file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of batches in the file.
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Returns `true` when the file held no batches.
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl PaginationSource for BatchFileSource {
    fn id(&self) -> &str {
        &self.source_id
    }

    fn advance(&mut self) -> Result<Vec<Identifier>, SyncError> {
        let batch = self.batches.get(self.next).cloned().unwrap_or_default();
        self.next = (self.next + 1).min(self.batches.len());
        Ok(batch)
    }

    fn at_end(&mut self) -> bool {
        self.next >= self.batches.len()
    }
}

fn parse_batches(raw: &str) -> Vec<Vec<Identifier>> {
    let mut batches = Vec::new();
    let mut current: Vec<Identifier> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        if line.is_empty() {
            if !current.is_empty() {
                batches.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.extend(extract_batch(line));
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_blank_line_separated_batches() {
        let batches = parse_batches(
            "# first screen\n7 6\nhttps://x.com/a/status/5\n\n\n6 5\n# tail\n4\n",
        );
        assert_eq!(batches, vec![vec!["7", "6", "5"], vec!["6", "5", "4"]]);
    }

    #[test]
    fn serves_batches_then_reports_end() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("batches.txt");
        fs::write(&path, "2 1\n\n1\n").unwrap();
        let mut source = BatchFileSource::open(&path).unwrap();
        assert_eq!(source.len(), 2);
        assert!(!source.at_end());
        assert_eq!(source.advance().unwrap(), ["2", "1"]);
        assert_eq!(source.advance().unwrap(), ["1"]);
        assert!(source.at_end());
        assert!(source.advance().unwrap().is_empty());
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let temp = tempdir().unwrap();
        let err = BatchFileSource::open(temp.path().join("none.txt")).unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable { .. }));
    }
}
