//! Canonical inbound events produced by ingress normalization.

use std::time::Duration;

use crate::state::epoch::Stage;
use crate::state::model::{
    BuzzRecord, ContentInfo, GameMode, PlayMode, PlayerRecord, RoundSnapshot, ServerPhase,
    TeamRecord,
};
use crate::state::modes::ModeSignal;
use crate::state::roster::RosterUpdate;

/// Full authoritative state sent on (re)join.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    /// Room the snapshot describes.
    pub room_code: Option<String>,
    /// Coarse server phase.
    pub phase: ServerPhase,
    /// Active mode.
    pub mode: GameMode,
    /// Solo or team play.
    pub play_mode: PlayMode,
    /// Current round number, 0 before the first round.
    pub round_number: u32,
    /// Players in server order.
    pub players: Vec<PlayerRecord>,
    /// Teams in server order.
    pub teams: Vec<TeamRecord>,
    /// Active round, if any.
    pub round: Option<RoundSnapshot>,
    /// Buzzes already accepted in the active round.
    pub buzzes: Vec<BuzzRecord>,
    /// Buzz currently holding the lock.
    pub locked_buzz: Option<BuzzRecord>,
    /// Countdown remainder declared by the server.
    pub timer_remaining: Option<Duration>,
    /// Seconds of the track already played.
    pub track_elapsed_secs: Option<f64>,
    /// Loaded playlist or question set.
    pub content: Option<ContentInfo>,
}

/// Audio cue of a `play_track` event.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCue {
    /// Resource to play.
    pub source: String,
    /// Start offset in seconds.
    pub offset_secs: Option<f64>,
    /// Countdown declared for the guess.
    pub timer_duration: Option<Duration>,
    /// Track length in seconds.
    pub track_duration_secs: Option<f64>,
    /// Volume requested by the server.
    pub volume: Option<f32>,
}

/// How the host judged an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Right answer.
    Correct,
    /// Wrong answer.
    Wrong,
    /// Part of the answer was found.
    Partial {
        /// Whether the host still has to rule on the rest.
        waiting_for_host: bool,
    },
}

/// Outcome of a judged answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerJudgement {
    /// Judged player.
    pub player_id: Option<String>,
    /// Judged player's name.
    pub player_name: Option<String>,
    /// Signed point change.
    pub points: i64,
    /// Verdict.
    pub verdict: Verdict,
}

/// Why the round resumes after a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueReason {
    /// Wrong answer.
    WrongAnswer,
    /// The answer window ran out.
    Timeout,
    /// The host resumed the round.
    Manual,
}

/// Payload of every continue-class event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundContinue {
    /// Cause.
    pub reason: ContinueReason,
    /// Player whose answer was dismissed.
    pub player_id: Option<String>,
    /// Player name.
    pub player_name: Option<String>,
    /// Signed point change.
    pub points: Option<i64>,
}

/// Payload of `round_result` and `round_skipped`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundOutcome {
    /// Whether the round was skipped.
    pub skipped: bool,
    /// Whether someone found the answer.
    pub correct: Option<bool>,
    /// Winning player.
    pub winner_id: Option<String>,
    /// Winning player's name.
    pub winner_name: Option<String>,
    /// Points awarded to the winner.
    pub points: Option<i64>,
    /// Answer to display.
    pub answer: Option<String>,
    /// Authoritative player list replacing the roster.
    pub leaderboard: Option<Vec<PlayerRecord>>,
    /// Authoritative team list.
    pub team_leaderboard: Option<Vec<TeamRecord>>,
}

/// Normalized inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Full state dump.
    Snapshot(Box<GameSnapshot>),
    /// The server accepted our join.
    JoinAcknowledged {
        /// Our player id.
        player_id: Option<String>,
        /// Our buzzer sound.
        buzzer_sound: Option<u32>,
    },
    /// A game was created by this host.
    GameCreated {
        /// New room.
        room_code: String,
        /// Initial mode.
        mode: Option<GameMode>,
        /// Solo or team.
        play_mode: PlayMode,
    },
    /// Playlist or question set ready.
    ContentLoaded(ContentInfo),
    /// Server-side error message.
    ServerError {
        /// Message to show.
        message: String,
        /// Machine readable code.
        code: Option<String>,
    },
    /// Player or team change.
    Roster(RosterUpdate),
    /// New round.
    RoundStarted(Box<RoundSnapshot>),
    /// Start a track.
    TrackStarted(TrackCue),
    /// Pause audio and freeze the countdown.
    AudioStopped,
    /// Resume audio and re-anchor the countdown.
    AudioResumed,
    /// The buzzer was locked.
    BuzzLocked(BuzzRecord),
    /// Our buzz was accepted.
    BuzzAcknowledged {
        /// Our position.
        position: Option<u32>,
    },
    /// Our buzz was refused.
    BuzzRejected {
        /// Server reason.
        reason: Option<String>,
    },
    /// The host judged an answer.
    AnswerJudged(AnswerJudgement),
    /// Play resumes after a lock.
    RoundContinues(RoundContinue),
    /// Server warning before the deadline.
    TimeoutWarning {
        /// Seconds left.
        seconds_left: Option<u32>,
    },
    /// Server deadline reached.
    TimeoutExpired,
    /// The round closed.
    RoundClosed(RoundOutcome),
    /// Mode-specific signal.
    Mode(ModeSignal),
    /// The game ended.
    GameFinished {
        /// Final player list.
        leaderboard: Option<Vec<PlayerRecord>>,
        /// Final team list.
        team_leaderboard: Option<Vec<TeamRecord>>,
    },
}

/// A normalized event with the epoch data read from its payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Wire name, for logs and diagnostics.
    pub name: String,
    /// Round number carried by the payload.
    pub round: Option<u32>,
    /// Canonical event.
    pub event: InboundEvent,
}

impl Envelope {
    /// Stage implied by the event, `None` for events outside the epoch guard.
    pub fn stage(&self) -> Option<Stage> {
        match &self.event {
            InboundEvent::Snapshot(_)
            | InboundEvent::JoinAcknowledged { .. }
            | InboundEvent::GameCreated { .. }
            | InboundEvent::ContentLoaded(_)
            | InboundEvent::ServerError { .. }
            | InboundEvent::Roster(_) => None,
            InboundEvent::RoundStarted(_) => Some(Stage::Started),
            InboundEvent::RoundClosed(_)
            | InboundEvent::Mode(ModeSignal::QcmResolved { .. }) => Some(Stage::Closed),
            InboundEvent::GameFinished { .. } => Some(Stage::Final),
            _ => Some(Stage::Open),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event: InboundEvent) -> Envelope {
        Envelope {
            name: "test".into(),
            round: None,
            event,
        }
    }

    #[test]
    fn roster_events_bypass_the_guard() {
        let event = InboundEvent::Roster(RosterUpdate::PlayerLeft {
            player_id: "p1".into(),
            full: None,
        });
        assert_eq!(envelope(event).stage(), None);
    }

    #[test]
    fn results_close_the_round() {
        let event = InboundEvent::Mode(ModeSignal::QcmResolved {
            correct_index: Some(1),
            results: vec![],
            leaderboard: None,
        });
        assert_eq!(envelope(event).stage(), Some(Stage::Closed));
        assert_eq!(
            envelope(InboundEvent::Mode(ModeSignal::CountdownEnded)).stage(),
            Some(Stage::Open)
        );
        assert_eq!(envelope(InboundEvent::TimeoutExpired).stage(), Some(Stage::Open));
    }
}
