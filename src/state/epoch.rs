use std::fmt;

use serde::Serialize;

use crate::error::EngineError;

/// Progress of a round, ordered so that later stages supersede earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Between rounds.
    Idle,
    /// `round_started` was applied.
    Started,
    /// Buzzes, hints and the like are flowing.
    Open,
    /// A result-class event closed the round.
    Closed,
    /// The game is over.
    Final,
}

/// `(round, stage)` pair used to discard events addressed to a past epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch {
    /// Round number; field order makes the round dominate the comparison.
    pub round: u32,
    /// Stage within the round.
    pub stage: Stage,
}

impl Epoch {
    /// Epoch of a freshly constructed engine.
    pub const INITIAL: Epoch = Epoch {
        round: 0,
        stage: Stage::Idle,
    };

    /// Build an epoch.
    pub fn new(round: u32, stage: Stage) -> Self {
        Self { round, stage }
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "round {} ({:?})", self.round, self.stage)
    }
}

/// Monotonic epoch tracker consulted before any staged event reaches the phase machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochGuard {
    current: Epoch,
}

impl Default for EpochGuard {
    fn default() -> Self {
        Self {
            current: Epoch::INITIAL,
        }
    }
}

impl EpochGuard {
    /// Current epoch.
    pub fn current(&self) -> Epoch {
        self.current
    }

    /// Reject `candidate` when it precedes the current epoch, otherwise advance to it.
    pub fn admit(&mut self, event: &str, candidate: Epoch) -> Result<(), EngineError> {
        if candidate < self.current {
            return Err(EngineError::Stale {
                event: event.to_string(),
                epoch: candidate,
                current: self.current,
            });
        }
        self.current = candidate;
        Ok(())
    }

    /// Replace the epoch wholesale; only snapshots may move it backwards.
    pub fn reset(&mut self, epoch: Epoch) {
        self.current = epoch;
    }
}
