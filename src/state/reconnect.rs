//! Derives the entry state after a (re)join purely from the server snapshot.
//!
//! Anything cached locally before the gap is ignored: the snapshot alone decides the phase,
//! the buzz control, the countdown and what audio should be doing.

use std::time::Duration;

use crate::state::epoch::{Epoch, Stage};
use crate::state::events::GameSnapshot;
use crate::state::model::{BuzzRecord, ServerPhase};
use crate::state::role::Role;
use crate::state::state_machine::Phase;

/// What the audio controller should do on entry.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioPlan {
    /// Nothing to play.
    Silent,
    /// Play from the elapsed offset.
    Play {
        /// Resource.
        source: String,
        /// Seconds already played.
        offset_secs: Option<f64>,
    },
    /// Load paused at the elapsed offset, ready to resume after the lock.
    Prepare {
        /// Resource.
        source: String,
        /// Seconds already played.
        offset_secs: Option<f64>,
    },
}

/// Countdown to restore on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerPlan {
    /// Declared round duration.
    pub duration: Duration,
    /// Time left according to the server.
    pub remaining: Duration,
    /// Whether the countdown starts frozen.
    pub paused: bool,
}

/// Entry state derived from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Phase to restore.
    pub phase: Phase,
    /// Epoch to reset the guard to.
    pub epoch: Epoch,
    /// Whether the buzz control starts enabled.
    pub can_buzz: bool,
    /// Whether this client already buzzed in the active round.
    pub already_buzzed: bool,
    /// Countdown to restore.
    pub timer: Option<TimerPlan>,
    /// Audio to restore.
    pub audio: AudioPlan,
}

/// Resolve the entry state of `role` from `snapshot`.
pub fn resolve(snapshot: &GameSnapshot, role: &Role, fallback_duration: Duration) -> Resolution {
    let trivia = snapshot
        .round
        .as_ref()
        .is_some_and(|round| round.is_trivia());
    let own_buzz = snapshot
        .buzzes
        .iter()
        .find(|buzz| role.is_me(buzz.player_id.as_deref(), Some(buzz.player_name.as_str())))
        .cloned();
    let already_buzzed = own_buzz.is_some();
    let lock = || {
        snapshot
            .locked_buzz
            .clone()
            .or_else(|| own_buzz.clone())
            .or_else(|| snapshot.buzzes.first().cloned())
    };

    let (phase, stage) = match snapshot.phase {
        ServerPhase::Setup if snapshot.content.is_some() => (Phase::Lobby, Stage::Idle),
        ServerPhase::Setup => (Phase::Setup, Stage::Idle),
        ServerPhase::Lobby if snapshot.round_number > 0 => (Phase::Lobby, Stage::Closed),
        ServerPhase::Lobby => (Phase::Lobby, Stage::Idle),
        ServerPhase::Playing if trivia => (Phase::TriviaQuestion, Stage::Open),
        ServerPhase::Playing => match snapshot.locked_buzz.clone().or_else(|| own_buzz.clone()) {
            Some(buzz) => (Phase::Locked(buzz), Stage::Open),
            None => (Phase::RoundActive, Stage::Open),
        },
        ServerPhase::Validation if trivia => (Phase::TriviaQuestion, Stage::Open),
        ServerPhase::Validation => (
            Phase::Locked(lock().unwrap_or_else(BuzzRecord::unknown)),
            Stage::Open,
        ),
        ServerPhase::Result if trivia => (Phase::TriviaResult, Stage::Closed),
        ServerPhase::Result => (Phase::Result, Stage::Closed),
        ServerPhase::Ended => (Phase::Finished, Stage::Final),
    };

    let can_buzz = matches!(role, Role::Player(_)) && phase == Phase::RoundActive && !already_buzzed;

    let running = matches!(
        phase,
        Phase::RoundActive | Phase::Locked(_) | Phase::TriviaQuestion
    );
    let locked = matches!(phase, Phase::Locked(_));

    let timer = snapshot.round.as_ref().filter(|_| running).map(|round| {
        let duration = round.timer_duration.unwrap_or(fallback_duration);
        TimerPlan {
            duration,
            remaining: snapshot.timer_remaining.unwrap_or(duration).min(duration),
            paused: locked,
        }
    });

    let source = snapshot
        .round
        .as_ref()
        .and_then(|round| round.preview_url())
        .filter(|_| running)
        .map(str::to_string);
    let audio = match source {
        Some(source) if locked => AudioPlan::Prepare {
            source,
            offset_secs: snapshot.track_elapsed_secs,
        },
        Some(source) => AudioPlan::Play {
            source,
            offset_secs: snapshot.track_elapsed_secs,
        },
        None => AudioPlan::Silent,
    };

    Resolution {
        phase,
        epoch: Epoch::new(snapshot.round_number, stage),
        can_buzz,
        already_buzzed,
        timer,
        audio,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::model::{GameMode, PlayMode, RoundContent, RoundSnapshot, Track};

    fn buzz(id: &str, name: &str) -> BuzzRecord {
        BuzzRecord {
            player_id: Some(id.into()),
            player_name: name.into(),
            server_timestamp: None,
            position: None,
            buzzer_sound: None,
        }
    }

    fn snapshot(phase: ServerPhase, buzzes: Vec<BuzzRecord>) -> GameSnapshot {
        GameSnapshot {
            room_code: Some("AB12".into()),
            phase,
            mode: GameMode::Classic,
            play_mode: PlayMode::Solo,
            round_number: 3,
            players: vec![],
            teams: vec![],
            round: Some(RoundSnapshot {
                round_number: 3,
                mode: GameMode::Classic,
                timer_duration: Some(Duration::from_secs(30)),
                content: RoundContent::Track(Track {
                    id: None,
                    title: None,
                    artist: None,
                    preview_url: Some("https://cdn/t.mp3".into()),
                    duration_secs: Some(30.0),
                }),
                hints: vec![],
                bomb_holder: None,
                target_player: None,
            }),
            buzzes,
            locked_buzz: None,
            timer_remaining: Some(Duration::from_secs(12)),
            track_elapsed_secs: Some(18.0),
            content: None,
        }
    }

    fn me() -> Role {
        let mut role = Role::player("Alice");
        role.bind_player_id("p1".into());
        role
    }

    #[test]
    fn own_buzz_in_snapshot_yields_locked() {
        let snapshot = snapshot(ServerPhase::Playing, vec![buzz("p1", "Alice")]);
        let resolution = resolve(&snapshot, &me(), Duration::from_secs(10));

        assert_eq!(resolution.phase, Phase::Locked(buzz("p1", "Alice")));
        assert!(!resolution.can_buzz);
        assert!(resolution.already_buzzed);
        assert_eq!(resolution.epoch, Epoch::new(3, Stage::Open));
        assert_eq!(
            resolution.audio,
            AudioPlan::Prepare {
                source: "https://cdn/t.mp3".into(),
                offset_secs: Some(18.0),
            }
        );
        let timer = resolution.timer.unwrap();
        assert!(timer.paused);
        assert_eq!(timer.remaining, Duration::from_secs(12));
    }

    #[test]
    fn open_round_without_buzz_resumes_playing() {
        let snapshot = snapshot(ServerPhase::Playing, vec![]);
        let resolution = resolve(&snapshot, &me(), Duration::from_secs(10));

        assert_eq!(resolution.phase, Phase::RoundActive);
        assert!(resolution.can_buzz);
        assert!(matches!(resolution.audio, AudioPlan::Play { .. }));
    }

    #[test]
    fn validation_without_named_buzz_is_still_locked() {
        let snapshot = snapshot(ServerPhase::Validation, vec![]);
        let resolution = resolve(&snapshot, &Role::Display, Duration::from_secs(10));

        assert_eq!(resolution.phase, Phase::Locked(BuzzRecord::unknown()));
        assert!(!resolution.can_buzz);
    }

    #[test]
    fn result_phase_is_silent() {
        let snapshot = snapshot(ServerPhase::Result, vec![]);
        let resolution = resolve(&snapshot, &Role::Host, Duration::from_secs(10));

        assert_eq!(resolution.phase, Phase::Result);
        assert_eq!(resolution.audio, AudioPlan::Silent);
        assert!(resolution.timer.is_none());
        assert_eq!(resolution.epoch, Epoch::new(3, Stage::Closed));
    }
}
