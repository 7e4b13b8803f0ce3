//! Identifier extraction from item permalinks.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::permalink::{ITEM_URL_PREFIX, STATUS_PATTERN};
use crate::types::Identifier;

static STATUS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(STATUS_PATTERN).expect("status pattern is a valid regex"));

/// Normalize one token to an identifier.
///
/// Bare digit tokens pass through; permalinks yield the digits after
/// `/status/`. Anything else is returned trimmed, unchanged.
pub fn extract_identifier(token: &str) -> Option<Identifier> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return Some(token.to_string());
    }
    match STATUS_RE.captures(token) {
        Some(caps) => caps.get(1).map(|m| m.as_str().to_string()),
        None => Some(token.to_string()),
    }
}

/// Every `/status/<digits>` identifier in `text`, in order of appearance.
///
/// Repeats are kept; callers dedupe through the ledger.
pub fn extract_all(text: &str) -> Vec<Identifier> {
    STATUS_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Identifiers in one raw batch line, in order of appearance.
///
/// Tokens carrying permalinks (including scraped anchor markup with several
/// links in one token) go through [`extract_all`]; other tokens through
/// [`extract_identifier`].
pub fn extract_batch(line: &str) -> Vec<Identifier> {
    let mut ids = Vec::new();
    for token in line.split_whitespace() {
        if STATUS_RE.is_match(token) {
            ids.extend(extract_all(token));
        } else {
            ids.extend(extract_identifier(token));
        }
    }
    ids
}

/// Canonical link for an identifier.
pub fn item_url(id: &str) -> String {
    format!("{ITEM_URL_PREFIX}{id}")
}
