//! Local intents turned into outbound commands.
//!
//! A command is built, checked against the role, checked against the current view and
//! validated before any local state changes. Only then are optimistic effects committed.

use std::time::Instant;

use serde::Deserialize;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;
use validator::{ValidationError, ValidationErrors};

use crate::dto::outbound::{
    AssignTeamPayload, BuzzPayload, CreateGamePayload, CreateTeamPayload, JoinTeamPayload,
    LoadPlaylistPayload, OutboundCommand, PlayerTargetPayload, QcmAnswerPayload, RoomPayload,
    ValidateAnswerPayload,
};
use crate::error::CommandError;
use crate::state::engine::{Step, SyncEngine};
use crate::state::model::{GameMode, PlayMode};
use crate::state::modes::{ModeExtension, TriviaStage};
use crate::state::state_machine::Phase;

/// Something the local user asked for.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intent {
    /// Create a room (host).
    CreateGame {
        /// Mode tag, protocol id or alias.
        mode: String,
        /// `solo` or `team`.
        #[serde(default)]
        play_mode: Option<String>,
    },
    /// Load a playlist or question set (host).
    LoadContent {
        /// Provider id.
        playlist_id: String,
    },
    /// Start the next round (host).
    StartRound,
    /// Skip the running round (host).
    SkipRound,
    /// End the running round (host).
    EndRound,
    /// Resume after a wrong answer (host).
    ContinueRound,
    /// End the game (host).
    EndGame,
    /// Ask every client to resume audio (host).
    ResumeAudio,
    /// Buzz (player).
    Buzz,
    /// Judge the locked answer (host).
    ValidateAnswer {
        /// Verdict.
        is_correct: bool,
    },
    /// Answer the open question (player).
    SubmitQcmAnswer {
        /// Chosen option.
        option_index: usize,
    },
    /// Close answers before the countdown ends (host).
    ValidateQcmNow,
    /// Hand the bomb over (player holding it).
    PassBomb {
        /// Receiving player.
        target_player_id: String,
    },
    /// Pick a victim (player).
    SelectTarget {
        /// Chosen player.
        target_player_id: String,
    },
    /// Create a team.
    CreateTeam {
        /// Team name.
        name: String,
        /// Display color.
        #[serde(default)]
        color: Option<String>,
    },
    /// Join a team (player).
    JoinTeam {
        /// Team to join.
        team_id: String,
    },
    /// Leave the current team (player).
    LeaveTeam,
    /// Place a player in a team (host).
    AssignPlayerToTeam {
        /// Moving player.
        player_id: String,
        /// Destination team.
        team_id: String,
    },
    /// Leave the room.
    Leave,
    /// Local volume, never sent.
    SetVolume {
        /// `0.0..=1.0`.
        volume: f32,
    },
    /// Local mute, never sent.
    SetMuted {
        /// Whether output is muted.
        muted: bool,
    },
}

impl SyncEngine {
    /// Command announcing this client to `room_code`; binds the engine to that room.
    pub fn join_command(&mut self, room_code: &str) -> Result<OutboundCommand, CommandError> {
        let room_code = room_code.trim().to_ascii_uppercase();
        let command = self.role.join_command(&room_code);
        command.validate()?;
        self.room_code = Some(room_code);
        Ok(command)
    }

    /// Turn `intent` into the commands to emit.
    pub fn dispatch(&mut self, intent: Intent, now: Instant) -> Result<Step, CommandError> {
        match intent {
            Intent::SetVolume { volume } => {
                self.audio.set_volume(volume);
                return Ok(Step::default());
            }
            Intent::SetMuted { muted } => {
                self.audio.set_muted(muted);
                return Ok(Step::default());
            }
            _ => {}
        }

        let command = self.build_command(&intent)?;
        if !self.role.permits(&command) {
            return Err(CommandError::NotPermitted {
                command: command.name(),
                role: self.role.label(),
            });
        }
        self.ensure_available(&intent, command.name())?;
        command.validate()?;

        match (&intent, &command) {
            (Intent::Buzz, OutboundCommand::Buzz(payload)) => {
                let round = self.guard.current().round;
                self.buzz.request(payload.request_id, now, round);
            }
            (Intent::SubmitQcmAnswer { option_index }, _) => {
                self.modes.select_option(*option_index);
            }
            (Intent::ValidateQcmNow, _) => {
                self.modes.begin_validation();
            }
            (Intent::SelectTarget { target_player_id }, _) => {
                self.modes.select_target(target_player_id);
            }
            _ => {}
        }

        info!(command = command.name(), role = self.role.label(), "dispatching command");
        let mut step = Step::default();
        step.send(command);
        Ok(step)
    }

    fn room(&self, command: &'static str) -> Result<String, CommandError> {
        self.room_code.clone().ok_or_else(|| CommandError::Unavailable {
            command,
            reason: "not joined to a room".into(),
        })
    }

    fn build_command(&self, intent: &Intent) -> Result<OutboundCommand, CommandError> {
        let command = match intent {
            Intent::CreateGame { mode, play_mode } => {
                let Some(mode) = GameMode::from_tag(mode) else {
                    let mut errors = ValidationErrors::new();
                    let mut err = ValidationError::new("unknown_mode");
                    err.message = Some(format!("unknown game mode `{mode}`").into());
                    errors.add("mode", err);
                    return Err(CommandError::Invalid(errors));
                };
                let play_mode = match play_mode.as_deref().map(PlayMode::from_tag) {
                    Some(PlayMode::Team) => "team",
                    _ => "solo",
                };
                OutboundCommand::CreateGame(CreateGamePayload {
                    mode: mode.wire_tag().to_string(),
                    play_mode: play_mode.to_string(),
                })
            }
            Intent::LoadContent { playlist_id } => {
                OutboundCommand::LoadPlaylist(LoadPlaylistPayload {
                    room_code: self.room("load_playlist")?,
                    playlist_id: playlist_id.clone(),
                })
            }
            Intent::StartRound => OutboundCommand::StartRound(RoomPayload {
                room_code: self.room("start_round")?,
            }),
            Intent::SkipRound => OutboundCommand::SkipRound(RoomPayload {
                room_code: self.room("skip_round")?,
            }),
            Intent::EndRound => OutboundCommand::EndRound(RoomPayload {
                room_code: self.room("end_round")?,
            }),
            Intent::ContinueRound => OutboundCommand::ContinueRound(RoomPayload {
                room_code: self.room("continue_round")?,
            }),
            Intent::EndGame => OutboundCommand::EndGame(RoomPayload {
                room_code: self.room("end_game")?,
            }),
            Intent::ResumeAudio => OutboundCommand::ResumeAudio(RoomPayload {
                room_code: self.room("resume_audio")?,
            }),
            Intent::Buzz => OutboundCommand::Buzz(BuzzPayload {
                room_code: self.room("buzz")?,
                request_id: Uuid::new_v4(),
            }),
            Intent::ValidateAnswer { is_correct } => {
                let room_code = self.room("validate_answer")?;
                let player_id = self
                    .machine
                    .phase()
                    .locked_buzz()
                    .and_then(|buzz| {
                        buzz.player_id.clone().or_else(|| {
                            self.roster
                                .player_by_name(&buzz.player_name)
                                .map(|player| player.id.clone())
                        })
                    })
                    .ok_or_else(|| CommandError::Unavailable {
                        command: "validate_answer",
                        reason: "no locked answer to judge".into(),
                    })?;
                OutboundCommand::ValidateAnswer(ValidateAnswerPayload {
                    room_code,
                    player_id,
                    is_correct: *is_correct,
                })
            }
            Intent::SubmitQcmAnswer { option_index } => {
                OutboundCommand::SubmitQcmAnswer(QcmAnswerPayload {
                    room_code: self.room("submit_qcm_answer")?,
                    option_index: *option_index,
                    timestamp: (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000)
                        as i64,
                })
            }
            Intent::ValidateQcmNow => OutboundCommand::ValidateQcm(RoomPayload {
                room_code: self.room("validate_qcm")?,
            }),
            Intent::PassBomb { target_player_id } => {
                OutboundCommand::PassBomb(PlayerTargetPayload {
                    room_code: self.room("pass_bomb")?,
                    target_player_id: target_player_id.clone(),
                })
            }
            Intent::SelectTarget { target_player_id } => {
                OutboundCommand::SelectTarget(PlayerTargetPayload {
                    room_code: self.room("select_target")?,
                    target_player_id: target_player_id.clone(),
                })
            }
            Intent::CreateTeam { name, color } => OutboundCommand::CreateTeam(CreateTeamPayload {
                room_code: self.room("create_team")?,
                name: name.trim().to_string(),
                color: color.clone(),
            }),
            Intent::JoinTeam { team_id } => OutboundCommand::JoinTeam(JoinTeamPayload {
                room_code: self.room("join_team")?,
                team_id: team_id.clone(),
            }),
            Intent::LeaveTeam => OutboundCommand::LeaveTeam(RoomPayload {
                room_code: self.room("leave_team")?,
            }),
            Intent::AssignPlayerToTeam { player_id, team_id } => {
                OutboundCommand::AssignPlayerToTeam(AssignTeamPayload {
                    room_code: self.room("assign_player_to_team")?,
                    player_id: player_id.clone(),
                    team_id: team_id.clone(),
                })
            }
            Intent::Leave => OutboundCommand::LeaveGame(RoomPayload {
                room_code: self.room("leave_game")?,
            }),
            Intent::SetVolume { .. } | Intent::SetMuted { .. } => {
                return Err(CommandError::Unavailable {
                    command: "local",
                    reason: "handled locally".into(),
                });
            }
        };
        Ok(command)
    }

    /// Whether the current view exposes the control behind `intent`.
    fn ensure_available(&self, intent: &Intent, command: &'static str) -> Result<(), CommandError> {
        let phase = self.machine.phase();
        let in_round = matches!(
            phase,
            Phase::RoundActive | Phase::Locked(_) | Phase::Validating(_) | Phase::TriviaQuestion
        );
        let trivia_open = matches!(
            self.modes.extension(),
            ModeExtension::Trivia(trivia) if trivia.stage == TriviaStage::Open
        );

        let refusal = match intent {
            Intent::LoadContent { .. } if !matches!(phase, Phase::Setup | Phase::Lobby) => {
                Some("content can only change between rounds")
            }
            Intent::StartRound if *phase == Phase::Setup => Some("no content loaded"),
            Intent::StartRound if in_round => Some("a round is already running"),
            Intent::StartRound if *phase == Phase::Finished => Some("the game is over"),
            Intent::SkipRound | Intent::EndRound | Intent::ResumeAudio if !in_round => {
                Some("no round is running")
            }
            Intent::ContinueRound | Intent::ValidateAnswer { .. }
                if phase.locked_buzz().is_none() =>
            {
                Some("no locked answer")
            }
            Intent::EndGame if *phase == Phase::Finished => Some("the game is over"),
            Intent::Buzz if *phase != Phase::RoundActive => Some("no round open for buzzing"),
            Intent::Buzz if !self.buzz.can_buzz() => Some("buzzer is locked"),
            Intent::SubmitQcmAnswer { .. } | Intent::ValidateQcmNow
                if *phase != Phase::TriviaQuestion || !trivia_open =>
            {
                Some("answers are closed")
            }
            Intent::SubmitQcmAnswer { option_index } => match self.modes.extension() {
                ModeExtension::Trivia(trivia)
                    if trivia
                        .question
                        .as_ref()
                        .is_some_and(|question| *option_index >= question.options.len()) =>
                {
                    Some("no such option")
                }
                _ => None,
            },
            Intent::PassBomb { .. } => match self.modes.extension() {
                ModeExtension::Bomb(bomb)
                    if in_round && bomb.holder.as_deref() == self.role.player_id() =>
                {
                    None
                }
                _ => Some("not holding the bomb"),
            },
            Intent::SelectTarget { .. } => match self.modes.extension() {
                ModeExtension::Target(_) if in_round => None,
                _ => Some("no target round running"),
            },
            Intent::CreateTeam { .. }
            | Intent::JoinTeam { .. }
            | Intent::LeaveTeam
            | Intent::AssignPlayerToTeam { .. }
                if self.play_mode != PlayMode::Team =>
            {
                Some("the game is not played in teams")
            }
            _ => None,
        };

        match refusal {
            Some(reason) => Err(CommandError::Unavailable {
                command,
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::engine::tests::{alice, engine};
    use crate::state::role::Role;

    fn round_started() -> serde_json::Value {
        json!({
            "roundNumber": 1,
            "mode": "accumul_points",
            "track": { "previewUrl": "https://cdn/1.mp3" },
        })
    }

    #[test]
    fn display_cannot_buzz() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        engine.join_command("AB12").unwrap();
        engine.handle_event("round_started", round_started(), t0);

        assert!(matches!(
            engine.dispatch(Intent::Buzz, t0),
            Err(CommandError::NotPermitted { command: "buzz", role: "display" })
        ));
    }

    #[test]
    fn buzz_is_sent_once_until_answered() {
        let (mut engine, _backend) = engine(alice());
        let t0 = Instant::now();
        engine.join_command("AB12").unwrap();
        engine.handle_event("round_started", round_started(), t0);

        let step = engine.dispatch(Intent::Buzz, t0).unwrap();
        match step.commands().next() {
            Some(OutboundCommand::Buzz(payload)) => assert_eq!(payload.room_code, "AB12"),
            other => panic!("expected buzz command, got {other:?}"),
        }
        assert!(matches!(
            engine.dispatch(Intent::Buzz, t0),
            Err(CommandError::Unavailable { command: "buzz", .. })
        ));
    }

    #[test]
    fn host_judges_the_locked_player() {
        let (mut engine, _backend) = engine(Role::Host);
        let t0 = Instant::now();
        engine.join_command("AB12").unwrap();
        engine.handle_event("round_started", round_started(), t0);

        assert!(matches!(
            engine.dispatch(Intent::ValidateAnswer { is_correct: true }, t0),
            Err(CommandError::Unavailable { .. })
        ));

        engine.handle_event("buzz_locked", json!({ "playerId": "p2", "playerName": "Bob" }), t0);
        let step = engine
            .dispatch(Intent::ValidateAnswer { is_correct: false }, t0)
            .unwrap();
        assert_eq!(
            step.commands().next(),
            Some(&OutboundCommand::ValidateAnswer(ValidateAnswerPayload {
                room_code: "AB12".into(),
                player_id: "p2".into(),
                is_correct: false,
            }))
        );
    }

    #[test]
    fn answers_close_after_validation() {
        let (mut engine, _backend) = engine(alice());
        let t0 = Instant::now();
        engine.join_command("AB12").unwrap();
        engine.handle_event(
            "round_started",
            json!({
                "roundNumber": 1,
                "mode": "qcm",
                "qcm": { "question": "Year?", "options": ["1984", "1990"] },
            }),
            t0,
        );

        assert!(matches!(
            engine.dispatch(Intent::SubmitQcmAnswer { option_index: 5 }, t0),
            Err(CommandError::Unavailable { .. })
        ));
        engine
            .dispatch(Intent::SubmitQcmAnswer { option_index: 1 }, t0)
            .unwrap();
        match engine.modes.extension() {
            ModeExtension::Trivia(trivia) => assert_eq!(trivia.selected_option, Some(1)),
            other => panic!("expected trivia state, got {other:?}"),
        }

        assert!(engine.modes.begin_validation());
        assert!(matches!(
            engine.dispatch(Intent::SubmitQcmAnswer { option_index: 0 }, t0),
            Err(CommandError::Unavailable { .. })
        ));
    }

    #[test]
    fn join_rejects_malformed_room_code() {
        let (mut engine, _backend) = engine(Role::player("Alice"));
        assert!(matches!(
            engine.join_command("AB-1"),
            Err(CommandError::Invalid(_))
        ));
        assert_eq!(engine.room_code(), None);
    }

    #[test]
    fn team_commands_need_team_play() {
        let (mut engine, _backend) = engine(alice());
        let t0 = Instant::now();
        engine.join_command("AB12").unwrap();

        let join = Intent::JoinTeam {
            team_id: "t1".into(),
        };
        assert!(matches!(
            engine.dispatch(join.clone(), t0),
            Err(CommandError::Unavailable { .. })
        ));

        engine.handle_event("game_created", json!({ "roomCode": "AB12", "playMode": "team" }), t0);
        assert!(engine.dispatch(join, t0).is_ok());
    }

    #[test]
    fn volume_stays_local() {
        let (mut engine, _backend) = engine(Role::Display);
        let step = engine
            .dispatch(Intent::SetVolume { volume: 0.2 }, Instant::now())
            .unwrap();
        assert!(step.is_empty());
    }
}
