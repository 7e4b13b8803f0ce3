//! Stall detection for pagination that cannot reliably report its own end.
//!
//! Each batch is fed to [`StallTracker::observe`] with the number of new
//! identifiers it contributed. The tracker moves through
//! `Scanning -> Stalling(n) -> Escalating -> Scanning | Terminated` and tells
//! the collector whether to keep going, jump ahead, or stop.

use crate::config::StallPolicy;

/// Current phase of the stall state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallState {
    /// Last batch added something.
    Scanning,
    /// `n` consecutive batches added nothing.
    Stalling(usize),
    /// The source was just asked to jump ahead.
    Escalating,
    /// Give up; nothing new is arriving.
    Terminated,
}

/// Action the collector should take after a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallDecision {
    /// Request the next batch normally.
    Continue,
    /// Ask the source for a larger forward jump, then continue.
    Escalate,
    /// Stop the run.
    Terminate,
}

/// Tracks empty batches against a [`StallPolicy`].
#[derive(Clone, Debug)]
pub struct StallTracker {
    policy: StallPolicy,
    state: StallState,
    /// Consecutive empty batches, reset on escalation.
    consecutive: usize,
    /// Empty batches since the last addition, not reset on escalation.
    since_progress: usize,
    escalations: usize,
}

impl StallTracker {
    /// Tracker in `Scanning` for `policy`.
    pub fn new(policy: StallPolicy) -> Self {
        Self {
            policy,
            state: StallState::Scanning,
            consecutive: 0,
            since_progress: 0,
            escalations: 0,
        }
    }

    /// Current phase.
    pub fn state(&self) -> StallState {
        self.state
    }

    /// Number of escalations issued so far in this run.
    pub fn escalations(&self) -> usize {
        self.escalations
    }

    /// Feed one batch outcome. `added == 0` counts as a stalled batch.
    pub fn observe(&mut self, added: usize) -> StallDecision {
        if self.state == StallState::Terminated {
            return StallDecision::Terminate;
        }
        if added > 0 {
            self.consecutive = 0;
            self.since_progress = 0;
            self.state = StallState::Scanning;
            return StallDecision::Continue;
        }
        self.consecutive += 1;
        self.since_progress += 1;
        if self.since_progress >= self.policy.terminate_after {
            self.state = StallState::Terminated;
            return StallDecision::Terminate;
        }
        if self.consecutive >= self.policy.escalate_after {
            self.consecutive = 0;
            self.escalations += 1;
            self.state = StallState::Escalating;
            return StallDecision::Escalate;
        }
        self.state = StallState::Stalling(self.consecutive);
        StallDecision::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(escalate_after: usize, terminate_after: usize) -> StallTracker {
        StallTracker::new(StallPolicy {
            escalate_after,
            terminate_after,
        })
    }

    #[test]
    fn progress_keeps_scanning() {
        let mut t = tracker(2, 5);
        assert_eq!(t.observe(3), StallDecision::Continue);
        assert_eq!(t.state(), StallState::Scanning);
    }

    #[test]
    fn escalates_then_terminates_without_progress() {
        let mut t = tracker(2, 5);
        assert_eq!(t.observe(0), StallDecision::Continue);
        assert_eq!(t.state(), StallState::Stalling(1));
        assert_eq!(t.observe(0), StallDecision::Escalate);
        assert_eq!(t.state(), StallState::Escalating);
        assert_eq!(t.observe(0), StallDecision::Continue);
        assert_eq!(t.state(), StallState::Stalling(1));
        assert_eq!(t.observe(0), StallDecision::Escalate);
        assert_eq!(t.observe(0), StallDecision::Terminate);
        assert_eq!(t.state(), StallState::Terminated);
        assert_eq!(t.escalations(), 2);
        assert_eq!(t.observe(10), StallDecision::Terminate);
    }

    #[test]
    fn progress_after_escalation_resets_both_counters() {
        let mut t = tracker(2, 4);
        t.observe(0);
        assert_eq!(t.observe(0), StallDecision::Escalate);
        assert_eq!(t.observe(1), StallDecision::Continue);
        assert_eq!(t.state(), StallState::Scanning);
        // A full escalation cycle is needed again before terminating.
        assert_eq!(t.observe(0), StallDecision::Continue);
        assert_eq!(t.observe(0), StallDecision::Escalate);
        assert_eq!(t.observe(0), StallDecision::Continue);
        assert_eq!(t.observe(0), StallDecision::Terminate);
    }

    #[test]
    fn default_policy_escalates_twice_before_giving_up() {
        let mut t = StallTracker::new(StallPolicy::default());
        let decisions: Vec<_> = (0..15).map(|_| t.observe(0)).collect();
        let escalations = decisions
            .iter()
            .filter(|d| **d == StallDecision::Escalate)
            .count();
        assert_eq!(escalations, 2);
        assert_eq!(decisions.last(), Some(&StallDecision::Terminate));
    }
}
