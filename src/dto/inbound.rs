//! Wire shapes of inbound server events.
//!
//! Payloads evolved over time, so most fields are optional and several exist under more
//! than one key. Numbers are accepted both as JSON numbers and as strings. These types never
//! leave ingress: [`crate::services::ingress`] folds them into the canonical events.

use serde::Deserialize;
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePlayer {
    pub(crate) id: Option<String>,
    pub(crate) player_id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) player_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) score: Option<i64>,
    pub(crate) color: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) buzzer_sound: Option<u32>,
    pub(crate) connected: Option<bool>,
    pub(crate) is_connected: Option<bool>,
    pub(crate) team_id: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTeam {
    pub(crate) id: Option<String>,
    pub(crate) team_id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) color: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) score: Option<i64>,
    pub(crate) member_ids: Option<Vec<String>>,
    pub(crate) members: Option<Vec<WireMember>>,
}

/// Team member given either as an id or as a player object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireMember {
    Id(String),
    Player(WirePlayer),
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireTrack {
    pub(crate) id: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) artist: Option<String>,
    pub(crate) preview_url: Option<String>,
    pub(crate) url: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) duration: Option<f64>,
}

/// Choice given either as bare text or with its correctness flag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireOption {
    Text(String),
    Detailed {
        text: String,
        #[serde(default, rename = "isCorrect")]
        is_correct: Option<bool>,
        #[serde(default)]
        correct: Option<bool>,
    },
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireQcm {
    pub(crate) question: Option<String>,
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) options: Vec<WireOption>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) correct_index: Option<usize>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoundStartedPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) mode: Option<String>,
    pub(crate) game_mode: Option<String>,
    /// Seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) timer_duration: Option<f64>,
    pub(crate) track: Option<WireTrack>,
    pub(crate) qcm: Option<WireQcm>,
    pub(crate) question: Option<WireQcm>,
    pub(crate) hints: Option<Vec<String>>,
    pub(crate) bomb_holder: Option<String>,
    pub(crate) target_player: Option<String>,
    pub(crate) target_player_id: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayTrackPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) preview_url: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) track: Option<WireTrack>,
    /// Track length in seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) duration: Option<f64>,
    /// Start offset in seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) start_time: Option<f64>,
    /// Guess countdown in seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) timer_duration: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) volume: Option<f32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuzzPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) player_id: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) player_name: Option<String>,
    pub(crate) name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) position: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) order: Option<u32>,
    /// RFC 3339 string or Unix milliseconds.
    pub(crate) timestamp: Option<Value>,
    pub(crate) server_timestamp: Option<Value>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) buzzer_sound: Option<u32>,
}

/// Buzz reference in a snapshot: a bare id or name, or a full buzz.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireBuzzRef {
    Name(String),
    Full(BuzzPayload),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MessagePayload {
    pub(crate) message: Option<String>,
    pub(crate) reason: Option<String>,
    pub(crate) error: Option<String>,
    pub(crate) code: Option<Value>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnswerPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) player_id: Option<String>,
    pub(crate) player_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_awarded: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_lost: Option<i64>,
    pub(crate) artist_found: Option<bool>,
    pub(crate) title_found: Option<bool>,
    pub(crate) waiting_for_host: Option<bool>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BuzzConfirmedPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) position: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) order: Option<u32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TimeoutPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) seconds_left: Option<u32>,
    /// Seconds, trivia countdown ticks.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) time_remaining: Option<f64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RoundResultPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) correct: Option<bool>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) winner_id: Option<String>,
    pub(crate) winner: Option<Value>,
    pub(crate) player: Option<Value>,
    pub(crate) player_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_awarded: Option<i64>,
    pub(crate) answer: Option<Value>,
    pub(crate) correct_answer: Option<Value>,
    pub(crate) leaderboard: Option<Vec<WirePlayer>>,
    pub(crate) players: Option<Vec<WirePlayer>>,
    pub(crate) team_leaderboard: Option<Vec<WireTeam>>,
    pub(crate) teams: Option<Vec<WireTeam>>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RankingLine {
    pub(crate) player_id: Option<String>,
    pub(crate) player_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) order: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) position: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points: Option<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RankingPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde(default)]
    pub(crate) ranking: Vec<RankingLine>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct HintPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) hint_index: Option<usize>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) index: Option<usize>,
    pub(crate) hint: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) bonus_points_left: Option<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BombPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) bomb_holder: Option<String>,
    pub(crate) holder: Option<String>,
    pub(crate) from_player_id: Option<String>,
    pub(crate) to_player_id: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) time_left: Option<u32>,
    pub(crate) victim_id: Option<String>,
    pub(crate) victim_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_lost: Option<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TargetPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    pub(crate) attacker_id: Option<String>,
    pub(crate) target_id: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_stolen: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points: Option<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QcmResultLine {
    pub(crate) player_id: Option<String>,
    pub(crate) player_name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) selected_index: Option<usize>,
    pub(crate) is_correct: Option<bool>,
    pub(crate) correct: Option<bool>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) points_awarded: Option<i64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) new_score: Option<i64>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QcmResultsPayload {
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) correct_index: Option<usize>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) correct_option: Option<usize>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) correct_answer: Option<usize>,
    #[serde(default)]
    pub(crate) results: Vec<QcmResultLine>,
    pub(crate) leaderboard: Option<Vec<WirePlayer>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameFinishedPayload {
    pub(crate) final_leaderboard: Option<Vec<WirePlayer>>,
    pub(crate) leaderboard: Option<Vec<WirePlayer>>,
    pub(crate) players: Option<Vec<WirePlayer>>,
    pub(crate) team_leaderboard: Option<Vec<WireTeam>>,
    pub(crate) teams: Option<Vec<WireTeam>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameCreatedPayload {
    pub(crate) room_code: Option<String>,
    pub(crate) code: Option<String>,
    pub(crate) mode: Option<String>,
    pub(crate) play_mode: Option<String>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlaylistPayload {
    pub(crate) playlist_id: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) playlist_name: Option<String>,
    pub(crate) name: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) track_count: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) question_count: Option<u32>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JoinedPayload {
    pub(crate) player_id: Option<String>,
    pub(crate) id: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) buzzer_sound: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PlayerEventPayload {
    pub(crate) player: Option<WirePlayer>,
    pub(crate) player_id: Option<String>,
    pub(crate) id: Option<String>,
    pub(crate) player_name: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) players: Option<Vec<WirePlayer>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TeamEventPayload {
    pub(crate) team: Option<WireTeam>,
    pub(crate) team_id: Option<String>,
    pub(crate) player_id: Option<String>,
    pub(crate) teams: Option<Vec<WireTeam>>,
}

#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GameStatePayload {
    pub(crate) room_code: Option<String>,
    pub(crate) phase: Option<String>,
    pub(crate) state: Option<String>,
    pub(crate) status: Option<String>,
    pub(crate) mode: Option<String>,
    pub(crate) play_mode: Option<String>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) round_number: Option<u32>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) current_round: Option<u32>,
    #[serde(default)]
    pub(crate) players: Vec<WirePlayer>,
    #[serde(default)]
    pub(crate) teams: Vec<WireTeam>,
    pub(crate) current_track: Option<WireTrack>,
    pub(crate) track: Option<WireTrack>,
    pub(crate) current_question: Option<WireQcm>,
    pub(crate) qcm: Option<WireQcm>,
    pub(crate) hints: Option<Vec<String>>,
    pub(crate) bomb_holder: Option<String>,
    /// Seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) timer_duration: Option<f64>,
    /// Seconds.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) time_remaining: Option<f64>,
    /// Seconds of track already played.
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) elapsed: Option<f64>,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub(crate) current_time: Option<f64>,
    pub(crate) buzzes: Option<Vec<WireBuzzRef>>,
    pub(crate) buzz_order: Option<Vec<WireBuzzRef>>,
    pub(crate) buzzed_players: Option<Vec<WireBuzzRef>>,
    pub(crate) locked_player: Option<WireBuzzRef>,
    pub(crate) current_buzzer: Option<WireBuzzRef>,
    pub(crate) playlist: Option<PlaylistPayload>,
}
