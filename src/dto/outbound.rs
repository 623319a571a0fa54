use serde::Serialize;
use serde_with::skip_serializing_none;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::dto::validation::validate_room_code;

/// Payload of commands that only name the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPayload {
    pub room_code: String,
}

/// Game creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGamePayload {
    pub mode: String,
    pub play_mode: String,
}

/// Player join request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGamePayload {
    pub room_code: String,
    pub player_name: String,
}

impl Validate for JoinGamePayload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_room_code(&self.room_code) {
            errors.add("room_code", e);
        }

        let name_len = self.player_name.trim().chars().count();
        if !(1..=20).contains(&name_len) {
            let mut err = validator::ValidationError::new("player_name_length");
            err.message = Some(
                format!("Player name must be 1 to 20 characters (got {name_len})").into(),
            );
            errors.add("player_name", err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Playlist or question set selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadPlaylistPayload {
    pub room_code: String,
    pub playlist_id: String,
}

/// Buzz request. `requestId` correlates logs; the server may ignore it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuzzPayload {
    pub room_code: String,
    pub request_id: Uuid,
}

/// Host verdict on the locked answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateAnswerPayload {
    pub room_code: String,
    pub player_id: String,
    pub is_correct: bool,
}

/// Multiple choice answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QcmAnswerPayload {
    pub room_code: String,
    pub option_index: usize,
    /// Client wall clock in Unix milliseconds.
    pub timestamp: i64,
}

/// Bomb pass or target selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerTargetPayload {
    pub room_code: String,
    pub target_player_id: String,
}

/// Team creation request.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamPayload {
    pub room_code: String,
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    pub color: Option<String>,
}

/// Join a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTeamPayload {
    pub room_code: String,
    pub team_id: String,
}

/// Host placing a player in a team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTeamPayload {
    pub room_code: String,
    pub player_id: String,
    pub team_id: String,
}

/// Commands emitted toward the game server, serialized as `{"event": .., "data": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundCommand {
    CreateGame(CreateGamePayload),
    JoinGame(JoinGamePayload),
    JoinAsHost(RoomPayload),
    JoinAsDisplay(RoomPayload),
    LeaveGame(RoomPayload),
    LoadPlaylist(LoadPlaylistPayload),
    StartRound(RoomPayload),
    SkipRound(RoomPayload),
    EndRound(RoomPayload),
    ContinueRound(RoomPayload),
    EndGame(RoomPayload),
    Buzz(BuzzPayload),
    ValidateAnswer(ValidateAnswerPayload),
    SubmitQcmAnswer(QcmAnswerPayload),
    ValidateQcm(RoomPayload),
    PassBomb(PlayerTargetPayload),
    SelectTarget(PlayerTargetPayload),
    CreateTeam(CreateTeamPayload),
    JoinTeam(JoinTeamPayload),
    LeaveTeam(RoomPayload),
    AssignPlayerToTeam(AssignTeamPayload),
    ResumeAudio(RoomPayload),
}

impl OutboundCommand {
    /// Wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateGame(_) => "create_game",
            Self::JoinGame(_) => "join_game",
            Self::JoinAsHost(_) => "join_as_host",
            Self::JoinAsDisplay(_) => "join_as_display",
            Self::LeaveGame(_) => "leave_game",
            Self::LoadPlaylist(_) => "load_playlist",
            Self::StartRound(_) => "start_round",
            Self::SkipRound(_) => "skip_round",
            Self::EndRound(_) => "end_round",
            Self::ContinueRound(_) => "continue_round",
            Self::EndGame(_) => "end_game",
            Self::Buzz(_) => "buzz",
            Self::ValidateAnswer(_) => "validate_answer",
            Self::SubmitQcmAnswer(_) => "submit_qcm_answer",
            Self::ValidateQcm(_) => "validate_qcm",
            Self::PassBomb(_) => "pass_bomb",
            Self::SelectTarget(_) => "select_target",
            Self::CreateTeam(_) => "create_team",
            Self::JoinTeam(_) => "join_team",
            Self::LeaveTeam(_) => "leave_team",
            Self::AssignPlayerToTeam(_) => "assign_player_to_team",
            Self::ResumeAudio(_) => "resume_audio",
        }
    }

    /// Run local payload validation where the command carries user input.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::JoinGame(payload) => payload.validate(),
            Self::CreateTeam(payload) => payload.validate(),
            _ => Ok(()),
        }
    }
}
