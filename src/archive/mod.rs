//! Archival action interfaces.
//!
//! The processor hands one identifier at a time to an [`ArchiveAction`] and
//! treats every [`ArchiveOutcome::Failure`] as fail-stop.

use serde::Serialize;
use tracing::debug;

use crate::types::DetailText;

/// Command-backed archival action.
pub mod command;
pub use command::CommandAction;

/// Result of archiving one identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    /// Item archived; detail is a human-readable status.
    Success(DetailText),
    /// Item not archived; detail is the reason.
    Failure(DetailText),
}

impl ArchiveOutcome {
    /// Whether the item was archived.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Status or failure reason.
    pub fn detail(&self) -> &str {
        match self {
            Self::Success(detail) | Self::Failure(detail) => detail,
        }
    }

    /// `(success, detail)` pair.
    pub fn into_parts(self) -> (bool, DetailText) {
        match self {
            Self::Success(detail) => (true, detail),
            Self::Failure(detail) => (false, detail),
        }
    }
}

/// Performs capture/download for one identifier.
///
/// Implementations catch their own collaborator errors (network, rendering,
/// subprocess) and report them as `Failure`.
pub trait ArchiveAction {
    /// Short name used in logs and composite details.
    fn name(&self) -> &str;
    /// Archive `id`.
    fn archive(&mut self, id: &str) -> ArchiveOutcome;
}

impl<T: ArchiveAction + ?Sized> ArchiveAction for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn archive(&mut self, id: &str) -> ArchiveOutcome {
        (**self).archive(id)
    }
}

/// Runs several actions per item; succeeds when at least one succeeds.
///
/// Success details of the succeeding parts are joined with `", "`. Every
/// part runs even after an earlier success, so a screenshot failure does not
/// skip the media download.
pub struct CompositeAction {
    name: String,
    parts: Vec<Box<dyn ArchiveAction>>,
}

impl CompositeAction {
    /// Empty composite; add parts with [`CompositeAction::with_part`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
        }
    }

    /// Add a sub-action; parts run in insertion order.
    pub fn with_part(mut self, part: Box<dyn ArchiveAction>) -> Self {
        self.parts.push(part);
        self
    }

    /// Number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` when no parts were added.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl ArchiveAction for CompositeAction {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive(&mut self, id: &str) -> ArchiveOutcome {
        if self.parts.is_empty() {
            return ArchiveOutcome::Failure(format!("'{}' has no archival steps", self.name));
        }
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for part in &mut self.parts {
            match part.archive(id) {
                ArchiveOutcome::Success(detail) => successes.push(detail),
                ArchiveOutcome::Failure(reason) => {
                    debug!(identifier = %id, step = part.name(), %reason, "archival step failed");
                    failures.push(format!("{}: {reason}", part.name()));
                }
            }
        }
        if successes.is_empty() {
            ArchiveOutcome::Failure(format!(
                "all archival steps failed ({})",
                failures.join("; ")
            ))
        } else {
            ArchiveOutcome::Success(successes.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        outcome: ArchiveOutcome,
        calls: usize,
    }

    impl ArchiveAction for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn archive(&mut self, _id: &str) -> ArchiveOutcome {
            self.calls += 1;
            self.outcome.clone()
        }
    }

    fn fixed(name: &'static str, outcome: ArchiveOutcome) -> Box<dyn ArchiveAction> {
        Box::new(Fixed {
            name,
            outcome,
            calls: 0,
        })
    }

    #[test]
    fn composite_succeeds_when_any_part_succeeds() {
        let mut action = CompositeAction::new("tweet")
            .with_part(fixed(
                "screenshot",
                ArchiveOutcome::Failure("render timeout".into()),
            ))
            .with_part(fixed(
                "media",
                ArchiveOutcome::Success("Media download completed".into()),
            ));
        assert_eq!(
            action.archive("1"),
            ArchiveOutcome::Success("Media download completed".into())
        );
    }

    #[test]
    fn composite_joins_success_details() {
        let mut action = CompositeAction::new("tweet")
            .with_part(fixed("a", ArchiveOutcome::Success("one".into())))
            .with_part(fixed("b", ArchiveOutcome::Success("two".into())));
        assert_eq!(action.archive("1").detail(), "one, two");
    }

    #[test]
    fn composite_fails_when_every_part_fails() {
        let mut action = CompositeAction::new("tweet")
            .with_part(fixed("a", ArchiveOutcome::Failure("x".into())))
            .with_part(fixed("b", ArchiveOutcome::Failure("y".into())));
        let (ok, detail) = action.archive("1").into_parts();
        assert!(!ok);
        assert!(detail.contains("a: x"));
        assert!(detail.contains("b: y"));
    }

    #[test]
    fn empty_composite_fails() {
        assert!(!CompositeAction::new("none").archive("1").is_success());
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&ArchiveOutcome::Failure("boom".into())).unwrap();
        assert_eq!(json, r#"{"status":"failure","detail":"boom"}"#);
    }
}
