use thiserror::Error;

use crate::state::model::BuzzRecord;

/// Discrete mode the engine is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Host is configuring content; nothing to play yet.
    Setup,
    /// Waiting for the next round.
    Lobby,
    /// A round is running and buzzing is possible.
    RoundActive,
    /// A buzz was accepted; audio and countdown are frozen.
    Locked(BuzzRecord),
    /// The host is judging the locked answer.
    Validating(BuzzRecord),
    /// Round result on screen until the lobby window elapses.
    Result,
    /// Trivia question open for answers.
    TriviaQuestion,
    /// Trivia answers revealed.
    TriviaResult,
    /// Terminal.
    Finished,
}

impl Phase {
    /// Whether a round is open for play (buzzing or answering).
    pub fn is_round_open(&self) -> bool {
        matches!(self, Phase::RoundActive | Phase::TriviaQuestion)
    }

    /// The live buzz when locked or validating.
    pub fn locked_buzz(&self) -> Option<&BuzzRecord> {
        match self {
            Phase::Locked(buzz) | Phase::Validating(buzz) => Some(buzz),
            _ => None,
        }
    }
}

/// Normalized signals that move the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Playlist or question set loaded.
    ContentLoaded,
    /// A new round began.
    RoundStarted {
        /// Whether the round runs the trivia cycle.
        trivia: bool,
    },
    /// A track started playing without a preceding round start.
    TrackStarted,
    /// The server locked the buzzer for a player.
    BuzzLocked(BuzzRecord),
    /// The host started judging the locked answer.
    AwaitValidation,
    /// Wrong answer or answer timeout; play resumes.
    Continue,
    /// Result-class event closed the round.
    RoundClosed,
    /// Trivia answers were revealed.
    TriviaClosed,
    /// The result display window elapsed.
    ResultElapsed,
    /// The game ended.
    GameFinished,
}

/// Error returned when an event does not fit the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the event arrived.
    pub from: Phase,
    /// The rejected event.
    pub event: PhaseEvent,
}

/// Phase state machine shared by every role.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
    version: usize,
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self {
            phase: Phase::Setup,
            version: 0,
        }
    }
}

impl PhaseMachine {
    /// Create a machine in the setup phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Number of transitions applied so far.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Apply `event`, returning the new phase or leaving the machine untouched on error.
    pub fn apply(&mut self, event: PhaseEvent) -> Result<&Phase, InvalidTransition> {
        let next = self.compute_transition(event)?;
        self.phase = next;
        self.version += 1;
        Ok(&self.phase)
    }

    /// Overwrite the phase from an authoritative snapshot.
    pub fn restore(&mut self, phase: Phase) {
        self.phase = phase;
        self.version += 1;
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(&self, event: PhaseEvent) -> Result<Phase, InvalidTransition> {
        let next = match (&self.phase, event) {
            (Phase::Finished, event) => {
                return Err(InvalidTransition {
                    from: Phase::Finished,
                    event,
                });
            }
            (_, PhaseEvent::GameFinished) => Phase::Finished,
            (_, PhaseEvent::RoundStarted { trivia: true }) => Phase::TriviaQuestion,
            (_, PhaseEvent::RoundStarted { trivia: false }) => Phase::RoundActive,
            (Phase::Setup | Phase::Lobby, PhaseEvent::ContentLoaded) => Phase::Lobby,
            (
                Phase::Setup | Phase::Lobby | Phase::Result | Phase::RoundActive,
                PhaseEvent::TrackStarted,
            ) => Phase::RoundActive,
            (Phase::TriviaQuestion, PhaseEvent::TrackStarted) => Phase::TriviaQuestion,
            (Phase::RoundActive | Phase::Locked(_), PhaseEvent::BuzzLocked(buzz)) => {
                Phase::Locked(buzz)
            }
            (Phase::Locked(buzz) | Phase::Validating(buzz), PhaseEvent::AwaitValidation) => {
                Phase::Validating(buzz.clone())
            }
            (Phase::Locked(_) | Phase::Validating(_), PhaseEvent::Continue) => Phase::RoundActive,
            (
                Phase::RoundActive | Phase::Locked(_) | Phase::Validating(_),
                PhaseEvent::RoundClosed,
            ) => Phase::Result,
            (Phase::TriviaQuestion, PhaseEvent::RoundClosed | PhaseEvent::TriviaClosed) => {
                Phase::TriviaResult
            }
            (Phase::Result | Phase::TriviaResult, PhaseEvent::ResultElapsed) => Phase::Lobby,
            (from, event) => {
                return Err(InvalidTransition {
                    from: from.clone(),
                    event,
                });
            }
        };

        Ok(next)
    }
}
