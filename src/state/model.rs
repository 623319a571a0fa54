//! Canonical domain records. Everything downstream of ingress only sees these shapes.

use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;

use crate::dto::serialize_timestamp;

/// Scoring sub-mode announced on `round_started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Buzz, then the host validates (`accumul_points`).
    #[default]
    Classic,
    /// Buzz order earns a medal (`reflexoquiz`).
    Ranked,
    /// Multiple choice question with its own countdown (`qcm`).
    Trivia,
    /// Progressive hints revealed by the server (`questions_rafale`).
    Hints,
    /// Hot potato bomb passed between players (`chaud_devant`).
    Bomb,
    /// Players pick a victim to steal points from (`tueurs_gages`).
    Target,
}

impl GameMode {
    /// Parse a wire tag, accepting both the protocol ids and their descriptive aliases.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let mode = match tag.trim().to_ascii_lowercase().as_str() {
            "accumul_points" | "classic" => Self::Classic,
            "reflexoquiz" | "ranked" => Self::Ranked,
            "qcm" | "trivia" => Self::Trivia,
            "questions_rafale" | "hints" => Self::Hints,
            "chaud_devant" | "bomb" => Self::Bomb,
            "tueurs_gages" | "target" => Self::Target,
            _ => return None,
        };
        Some(mode)
    }

    /// Protocol id sent back to the server.
    pub fn wire_tag(self) -> &'static str {
        match self {
            Self::Classic => "accumul_points",
            Self::Ranked => "reflexoquiz",
            Self::Trivia => "qcm",
            Self::Hints => "questions_rafale",
            Self::Bomb => "chaud_devant",
            Self::Target => "tueurs_gages",
        }
    }
}

/// Whether players compete alone or grouped in teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    /// Individual scoring.
    #[default]
    Solo,
    /// Team scoring.
    Team,
}

impl PlayMode {
    /// Parse the wire value; anything other than `team` is solo.
    pub fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("team") {
            Self::Team
        } else {
            Self::Solo
        }
    }
}

/// Coarse game state declared by the server in snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    /// Host still configuring.
    Setup,
    /// Waiting for the next round.
    Lobby,
    /// A round is running.
    Playing,
    /// A buzz is waiting for the host's verdict.
    Validation,
    /// The round result is on screen.
    Result,
    /// The game is over.
    Ended,
}

impl ServerPhase {
    /// Parse the wire value (`setup`, `lobby`, `playing`, `validation`, `result`, `ended`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        let phase = match tag.trim().to_ascii_lowercase().as_str() {
            "setup" => Self::Setup,
            "lobby" | "waiting" => Self::Lobby,
            "playing" => Self::Playing,
            "validation" | "buzzed" | "locked" => Self::Validation,
            "result" => Self::Result,
            "ended" | "finished" => Self::Ended,
            _ => return None,
        };
        Some(phase)
    }
}

/// A player as declared by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerRecord {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Server-declared score; only ever replaced or shifted by a [`ScoreDelta`](super::roster::ScoreDelta).
    pub score: i64,
    /// Display color.
    pub color: Option<String>,
    /// Index of the buzzer sound assigned to this player.
    pub buzzer_sound: Option<u32>,
    /// Whether the player's socket is currently connected.
    pub connected: bool,
    /// Team membership, when playing in teams.
    pub team_id: Option<String>,
}

/// A team as declared by the server. `score` is the server aggregate and never derived locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamRecord {
    /// Server-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: Option<String>,
    /// Server-declared aggregate score.
    pub score: i64,
    /// Members in server order.
    pub member_ids: Vec<String>,
}

/// Track metadata for an audio round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    /// Provider identifier.
    pub id: Option<String>,
    /// Title, only sent to roles allowed to see it.
    pub title: Option<String>,
    /// Artist, only sent to roles allowed to see it.
    pub artist: Option<String>,
    /// Playable preview URL.
    pub preview_url: Option<String>,
    /// Preview length in seconds.
    pub duration_secs: Option<f64>,
}

/// One choice of a multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QcmOption {
    /// Label shown to players.
    pub text: String,
    /// Whether the server flagged this option as the answer (hosts only).
    pub is_correct: bool,
}

/// Multiple choice question delivered with a trivia round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QcmQuestion {
    /// Question text.
    pub question: String,
    /// Choices in display order.
    pub options: Vec<QcmOption>,
    /// Index of the correct option when the server already disclosed it.
    pub correct_index: Option<usize>,
}

/// What a round asks the players to identify.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundContent {
    /// An audio excerpt.
    Track(Track),
    /// A multiple choice question.
    Qcm(QcmQuestion),
    /// The server sent neither (legacy displays).
    Empty,
}

/// Round data created at `round_started` and discarded at the next round or game end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSnapshot {
    /// 1-based round counter.
    pub round_number: u32,
    /// Scoring sub-mode for this round.
    pub mode: GameMode,
    /// Declared countdown; the engine falls back to its configured default when absent.
    #[serde(skip)]
    pub timer_duration: Option<Duration>,
    /// Track or question.
    pub content: RoundContent,
    /// Hint list for progressive-hint rounds.
    pub hints: Vec<String>,
    /// Initial bomb holder for bomb rounds.
    pub bomb_holder: Option<String>,
    /// Initial designated target for target rounds.
    pub target_player: Option<String>,
}

impl RoundSnapshot {
    /// Preview URL of the round's track, if any.
    pub fn preview_url(&self) -> Option<&str> {
        match &self.content {
            RoundContent::Track(track) => track.preview_url.as_deref(),
            _ => None,
        }
    }

    /// Question of a trivia round, if any.
    pub fn question(&self) -> Option<&QcmQuestion> {
        match &self.content {
            RoundContent::Qcm(question) => Some(question),
            _ => None,
        }
    }

    /// Whether this round runs the nested question/answer/result cycle.
    pub fn is_trivia(&self) -> bool {
        self.mode == GameMode::Trivia || matches!(self.content, RoundContent::Qcm(_))
    }
}

/// An accepted buzz. At most one is live per round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuzzRecord {
    /// Buzzing player, when the server included it.
    pub player_id: Option<String>,
    /// Buzzing player's display name.
    pub player_name: String,
    /// Server timestamp of the buzz.
    #[serde(serialize_with = "serialize_timestamp")]
    pub server_timestamp: Option<OffsetDateTime>,
    /// Rank in ranked rounds (1..=3).
    pub position: Option<u32>,
    /// Buzzer sound to play for this player.
    pub buzzer_sound: Option<u32>,
}

impl BuzzRecord {
    /// Placeholder used when a snapshot declares a lock without naming the buzzer.
    pub fn unknown() -> Self {
        Self {
            player_id: None,
            player_name: String::new(),
            server_timestamp: None,
            position: None,
            buzzer_sound: None,
        }
    }

    /// Whether two records describe the same buzz delivered twice.
    pub fn same_buzz(&self, other: &BuzzRecord) -> bool {
        let same_player = match (&self.player_id, &other.player_id) {
            (Some(left), Some(right)) => left == right,
            _ => self.player_name == other.player_name,
        };
        same_player
            && self.server_timestamp == other.server_timestamp
            && self.position == other.position
    }
}

/// Metadata of the loaded playlist or question set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    /// Provider identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Number of tracks or questions.
    pub item_count: u32,
}
