use serde::Serialize;

use crate::state::state_machine::Phase;

/// Phase exposed to the presentation layer.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisiblePhase {
    /// Host still configuring.
    Setup,
    /// Waiting for the next round.
    Lobby,
    /// Round running, buzzer open.
    Playing,
    /// A player buzzed; answer pending.
    Buzzed,
    /// Host judging the answer.
    Validating,
    /// Round result on screen.
    Result,
    /// Multiple choice question open.
    Question,
    /// Multiple choice answers revealed.
    QuestionResult,
    /// Final scores.
    Finished,
}

impl From<&Phase> for VisiblePhase {
    fn from(value: &Phase) -> Self {
        match value {
            Phase::Setup => VisiblePhase::Setup,
            Phase::Lobby => VisiblePhase::Lobby,
            Phase::RoundActive => VisiblePhase::Playing,
            Phase::Locked(_) => VisiblePhase::Buzzed,
            Phase::Validating(_) => VisiblePhase::Validating,
            Phase::Result => VisiblePhase::Result,
            Phase::TriviaQuestion => VisiblePhase::Question,
            Phase::TriviaResult => VisiblePhase::QuestionResult,
            Phase::Finished => VisiblePhase::Finished,
        }
    }
}
