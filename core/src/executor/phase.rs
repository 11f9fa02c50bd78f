//! Lifecycle of one execution
//!
//! `Idle → Annotating → SandboxBuilt → Running → (Completed | TimedOut |
//! Faulted) → ResultReturned`. Blank input goes straight from `Idle` to
//! `ResultReturned`; failures before the script starts go to `Faulted`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Annotating,
    SandboxBuilt,
    Running,
    Completed,
    TimedOut,
    Faulted,
    ResultReturned,
}

impl Phase {
    pub fn can_enter(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle, Annotating)
                | (Idle, ResultReturned)
                | (Annotating, SandboxBuilt)
                | (Annotating, Faulted)
                | (SandboxBuilt, Running)
                | (Running, Completed)
                | (Running, TimedOut)
                | (Running, Faulted)
                | (Completed, ResultReturned)
                | (TimedOut, ResultReturned)
                | (Faulted, ResultReturned)
        )
    }

    /// Outcome phases reached right before the result is built
    pub fn is_settled(self) -> bool {
        matches!(self, Phase::Completed | Phase::TimedOut | Phase::Faulted)
    }
}

/// Tracks and logs the phases one execution passes through
#[derive(Debug)]
pub struct PhaseTracker {
    current: Phase,
    history: Vec<Phase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            current: Phase::Idle,
            history: vec![Phase::Idle],
        }
    }

    pub fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.current.can_enter(next),
            "invalid phase transition {:?} -> {:?}",
            self.current,
            next
        );
        tracing::debug!(from = ?self.current, to = ?next, "phase");
        self.current = next;
        self.history.push(next);
    }

    pub fn current(&self) -> Phase {
        self.current
    }

    pub fn history(&self) -> &[Phase] {
        &self.history
    }
}
