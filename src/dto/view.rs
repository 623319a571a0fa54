//! Read-only projection published to the presentation layer after every step.

use std::time::Instant;

use serde::Serialize;

use crate::dto::phase::VisiblePhase;
use crate::error::Diagnostics;
use crate::state::audio::AudioState;
use crate::state::engine::SyncEngine;
use crate::state::epoch::Epoch;
use crate::state::events::RoundOutcome;
use crate::state::model::{
    BuzzRecord, ContentInfo, GameMode, PlayMode, PlayerRecord, RoundSnapshot, TeamRecord,
};
use crate::state::modes::ModeExtension;
use crate::state::role::Role;
use crate::state::timer::TimerDisplay;

/// Last round outcome, kept on screen during the result window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    /// Round ended without a winner.
    pub skipped: bool,
    /// Verdict of the last answer, when one was judged.
    pub correct: Option<bool>,
    /// Display name of the round winner.
    pub winner_name: Option<String>,
    /// Points awarded for the round.
    pub points: Option<i64>,
    /// Revealed answer text.
    pub answer: Option<String>,
}

impl From<&RoundOutcome> for ResultView {
    fn from(value: &RoundOutcome) -> Self {
        Self {
            skipped: value.skipped,
            correct: value.correct,
            winner_name: value.winner_name.clone(),
            points: value.points,
            answer: value.answer.clone(),
        }
    }
}

/// Everything a screen needs to render, for one role.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameView {
    /// Role this view is rendered for.
    pub role: Role,
    /// Normalized room code once joined.
    pub room_code: Option<String>,
    /// Phase as shown to the screen.
    pub phase: VisiblePhase,
    /// Latest admitted epoch.
    pub epoch: Epoch,
    /// Current round, 0 before the first one.
    pub round_number: u32,
    /// Mode of the current round.
    pub mode: GameMode,
    /// Individual or team play.
    pub play_mode: PlayMode,
    /// Players by descending score.
    pub leaderboard: Vec<PlayerRecord>,
    /// Teams by descending score.
    pub teams: Vec<TeamRecord>,
    /// Round metadata from the last `round_started` or snapshot.
    pub round: Option<RoundSnapshot>,
    /// Buzz currently holding the round.
    pub locked_buzz: Option<BuzzRecord>,
    /// Whether the buzz control is enabled for this role.
    pub can_buzz: bool,
    /// A buzz was sent and awaits acknowledgement.
    pub buzz_pending: bool,
    /// This player already buzzed in the current round.
    pub already_buzzed: bool,
    /// Round countdown.
    pub timer: Option<TimerDisplay>,
    /// Answer countdown while a buzz is locked.
    pub answer_timer: Option<TimerDisplay>,
    /// Playback state of the loaded track.
    pub audio: Option<AudioState>,
    /// Mode-specific state.
    pub extension: ModeExtension,
    /// Content shown alongside the round.
    pub content: Option<ContentInfo>,
    /// Outcome of the last finished round.
    pub last_result: Option<ResultView>,
    /// Last server error message.
    pub last_error: Option<String>,
    /// Dropped and failed event counters.
    pub diagnostics: Diagnostics,
}

impl GameView {
    pub(crate) fn build(engine: &SyncEngine, now: Instant) -> Self {
        let phase = engine.machine.phase();
        Self {
            role: engine.role.clone(),
            room_code: engine.room_code.clone(),
            phase: phase.into(),
            epoch: engine.guard.current(),
            round_number: engine.guard.current().round,
            mode: engine.modes.mode(),
            play_mode: engine.play_mode,
            leaderboard: engine.roster.leaderboard(),
            teams: engine.roster.team_leaderboard(),
            round: engine.round.clone(),
            locked_buzz: phase.locked_buzz().cloned(),
            can_buzz: engine.can_buzz(),
            buzz_pending: engine.buzz.pending().is_some(),
            already_buzzed: engine.already_buzzed,
            timer: engine.timer.display(now),
            answer_timer: engine.answer_timer.display(now),
            audio: engine.audio.state(),
            extension: engine.modes.extension().clone(),
            content: engine.content.clone(),
            last_result: engine.last_result.as_ref().map(ResultView::from),
            last_error: engine.last_error.clone(),
            diagnostics: engine.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::state::engine::tests::{alice, engine};

    #[test]
    fn view_reflects_locked_round() {
        let (mut engine, _backend) = engine(alice());
        let t0 = Instant::now();
        engine.handle_event(
            "game_state",
            json!({
                "phase": "lobby",
                "players": [
                    { "id": "p2", "name": "Bob", "score": 40 },
                    { "id": "p1", "name": "Alice", "score": 100 },
                ],
            }),
            t0,
        );
        engine.handle_event(
            "round_started",
            json!({ "roundNumber": 1, "mode": "accumul_points", "timerDuration": 20 }),
            t0,
        );
        let t2 = t0 + Duration::from_secs(2);
        engine.handle_event("buzz_locked", json!({ "playerId": "p2", "playerName": "Bob" }), t2);

        let view = engine.view(t2 + Duration::from_secs(1));
        assert_eq!(view.phase, VisiblePhase::Buzzed);
        assert_eq!(view.leaderboard[0].id, "p1");
        assert!(!view.can_buzz);
        let timer = view.timer.unwrap();
        assert!(timer.paused);
        assert_eq!(timer.seconds, 18);
        assert_eq!(view.answer_timer.unwrap().seconds, 7);

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["phase"], "buzzed");
        assert_eq!(json["role"]["role"], "player");
    }
}
