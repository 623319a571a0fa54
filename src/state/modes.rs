//! Per-mode extra state, reset wholesale whenever a round starts or the mode changes.

use std::time::Duration;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::error::EngineError;
use crate::state::model::{BuzzRecord, GameMode, PlayerRecord, QcmQuestion, RoundSnapshot};
use crate::state::roster::ScoreDelta;

/// Display-only reward for the first three buzzes of a ranked round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Medal {
    /// First buzz.
    Gold,
    /// Second buzz.
    Silver,
    /// Third buzz.
    Bronze,
}

impl Medal {
    /// Medal for a 1-based buzz position.
    pub fn from_position(position: u32) -> Option<Self> {
        match position {
            1 => Some(Self::Gold),
            2 => Some(Self::Silver),
            3 => Some(Self::Bronze),
            _ => None,
        }
    }

    /// Bonus shown next to the medal. Never applied to scores.
    pub fn bonus(self) -> i64 {
        match self {
            Self::Gold => 15,
            Self::Silver => 10,
            Self::Bronze => 5,
        }
    }
}

/// A buzz of a ranked round with its derived medal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedBuzz {
    /// Buzzing player, when known.
    pub player_id: Option<String>,
    /// Buzzing player's name.
    pub player_name: String,
    /// Server-assigned position.
    pub position: u32,
    /// Medal derived from the position.
    pub medal: Option<Medal>,
    /// Bonus label value derived from the medal.
    pub bonus: Option<i64>,
}

/// One line of the server ranking of a ranked round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingEntry {
    /// Ranked player.
    pub player_id: String,
    /// Buzz order.
    pub order: u32,
    /// Points announced by the server.
    pub points: i64,
}

/// Extension of ranked rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RankedState {
    /// Buzzes in arrival order.
    pub buzzes: Vec<RankedBuzz>,
    /// Server ranking, once published.
    pub ranking: Vec<RankingEntry>,
}

/// Extension of progressive-hint rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintState {
    /// Hint list delivered at round start.
    pub hints: Vec<String>,
    /// Index of the last revealed hint; only moves on explicit reveal events.
    pub current_hint_index: Option<usize>,
    /// Bonus still available to the next correct answer.
    pub bonus_points_left: Option<i64>,
}

impl HintState {
    /// Hints revealed so far.
    pub fn revealed(&self) -> &[String] {
        match self.current_hint_index {
            Some(index) => &self.hints[..index.saturating_add(1).min(self.hints.len())],
            None => &[],
        }
    }
}

/// Last explosion of a bomb round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Explosion {
    /// Player holding the bomb when it went off.
    pub victim_id: String,
    /// Victim display name.
    pub victim_name: Option<String>,
    /// Points removed by the server.
    pub points_lost: i64,
}

/// Extension of bomb rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BombState {
    /// Current holder; reassigned only by explicit events.
    pub holder: Option<String>,
    /// Fuse remaining as declared by the server, in seconds.
    pub time_left_secs: Option<u32>,
    /// Most recent explosion.
    pub last_explosion: Option<Explosion>,
}

/// Points moved between two players of a target round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Steal {
    /// Player gaining points.
    pub attacker_id: String,
    /// Player losing points.
    pub target_id: String,
    /// Amount moved.
    pub points: i64,
}

/// Extension of target rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetState {
    /// Local choice sent to the server and not yet confirmed.
    pub pending_selection: Option<String>,
    /// Target confirmed for the local player, or the round's designated target.
    pub confirmed_target: Option<String>,
    /// Confirmed `attacker -> target` pairs.
    pub selections: IndexMap<String, String>,
    /// Most recent steal.
    pub last_steal: Option<Steal>,
}

/// Sub-phase of the nested question cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriviaStage {
    /// Answers accepted.
    #[default]
    Open,
    /// Validation requested, waiting for results.
    Validating,
    /// Results published.
    Revealed,
}

/// One player's outcome on a question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriviaAnswer {
    /// Answering player.
    pub player_id: String,
    /// Chosen option.
    pub selected_index: Option<usize>,
    /// Whether the choice was right.
    pub is_correct: bool,
    /// Points awarded by the server.
    pub points: i64,
}

/// Extension of trivia rounds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriviaState {
    /// Current question.
    pub question: Option<QcmQuestion>,
    /// Sub-phase.
    pub stage: TriviaStage,
    /// Option chosen locally.
    pub selected_option: Option<usize>,
    /// Correct option once revealed.
    pub correct_index: Option<usize>,
    /// Per-player outcomes once revealed.
    pub results: Vec<TriviaAnswer>,
}

/// Extra state of the active mode. Exactly one slice exists at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ModeExtension {
    /// No extra state.
    Classic,
    /// Buzz order with medals.
    Ranked(RankedState),
    /// Progressive hints.
    Hints(HintState),
    /// Hot potato.
    Bomb(BombState),
    /// Point stealing.
    Target(TargetState),
    /// Multiple choice question.
    Trivia(TriviaState),
}

impl ModeExtension {
    fn empty(mode: GameMode) -> Self {
        match mode {
            GameMode::Classic => Self::Classic,
            GameMode::Ranked => Self::Ranked(RankedState::default()),
            GameMode::Hints => Self::Hints(HintState::default()),
            GameMode::Bomb => Self::Bomb(BombState::default()),
            GameMode::Target => Self::Target(TargetState::default()),
            GameMode::Trivia => Self::Trivia(TriviaState::default()),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Classic => "classic",
            Self::Ranked(_) => "ranked",
            Self::Hints(_) => "hints",
            Self::Bomb(_) => "bomb",
            Self::Target(_) => "target",
            Self::Trivia(_) => "trivia",
        }
    }
}

/// Normalized mode-specific server signals.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeSignal {
    /// Server buzz ranking of a ranked round.
    Ranking(Vec<RankingEntry>),
    /// A hint was revealed.
    HintRevealed {
        /// Index of the revealed hint.
        index: usize,
        /// Hint text, when sent along.
        hint: Option<String>,
        /// Remaining bonus.
        bonus_points_left: Option<i64>,
    },
    /// The bomb changed hands.
    BombHolderChanged {
        /// New holder.
        holder: Option<String>,
        /// Remaining fuse in seconds.
        time_left_secs: Option<u32>,
    },
    /// The bomb went off.
    BombExploded(Explosion),
    /// The server confirmed a target selection.
    TargetConfirmed {
        /// Selecting player.
        attacker_id: String,
        /// Selected player.
        target_id: String,
    },
    /// Points were stolen.
    PointsStolen(Steal),
    /// Question results were published.
    QcmResolved {
        /// Correct option.
        correct_index: Option<usize>,
        /// Per-player outcomes.
        results: Vec<TriviaAnswer>,
        /// Full leaderboard, sent by older servers instead of per-player points.
        leaderboard: Option<Vec<PlayerRecord>>,
    },
    /// Authoritative remaining time of the question countdown.
    CountdownTick {
        /// Time left.
        remaining: Duration,
    },
    /// The question countdown reached zero on the server.
    CountdownEnded,
}

impl ModeSignal {
    /// Wire-level label used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ranking(_) => "reflexo_ranking",
            Self::HintRevealed { .. } => "hint_revealed",
            Self::BombHolderChanged { .. } => "bomb_holder_changed",
            Self::BombExploded(_) => "bomb_exploded",
            Self::TargetConfirmed { .. } => "target_selected",
            Self::PointsStolen(_) => "points_stolen",
            Self::QcmResolved { .. } => "qcm_results",
            Self::CountdownTick { .. } => "countdown_tick",
            Self::CountdownEnded => "countdown_end",
        }
    }
}

/// Holds the extension slice of the active mode.
#[derive(Debug, Clone)]
pub struct ModeRegistry {
    mode: GameMode,
    extension: ModeExtension,
    own_player: Option<String>,
}

impl Default for ModeRegistry {
    fn default() -> Self {
        Self {
            mode: GameMode::Classic,
            extension: ModeExtension::Classic,
            own_player: None,
        }
    }
}

impl ModeRegistry {
    /// Active mode.
    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Active extension slice.
    pub fn extension(&self) -> &ModeExtension {
        &self.extension
    }

    /// Bind the local player's id, used to pick out its own target confirmation.
    pub fn bind_player(&mut self, player_id: Option<String>) {
        self.own_player = player_id;
    }

    /// Switch mode outside of a round. Keeps the slice when the mode is unchanged.
    pub fn set_mode(&mut self, mode: GameMode) {
        if mode != self.mode {
            self.mode = mode;
            self.extension = ModeExtension::empty(mode);
        }
    }

    /// Discard every slice and seed the new round's one.
    pub fn reset(&mut self, round: &RoundSnapshot) {
        let mode = if round.question().is_some() {
            GameMode::Trivia
        } else {
            round.mode
        };
        self.mode = mode;
        self.extension = match ModeExtension::empty(mode) {
            ModeExtension::Hints(_) => ModeExtension::Hints(HintState {
                hints: round.hints.clone(),
                ..HintState::default()
            }),
            ModeExtension::Bomb(_) => ModeExtension::Bomb(BombState {
                holder: round.bomb_holder.clone(),
                ..BombState::default()
            }),
            ModeExtension::Target(_) => ModeExtension::Target(TargetState {
                confirmed_target: round.target_player.clone(),
                ..TargetState::default()
            }),
            ModeExtension::Trivia(_) => ModeExtension::Trivia(TriviaState {
                question: round.question().cloned(),
                correct_index: round.question().and_then(|question| question.correct_index),
                ..TriviaState::default()
            }),
            other => other,
        };
        debug!(mode = self.extension.label(), "mode extension reset");
    }

    /// Record an accepted buzz; ranked rounds derive a display medal.
    pub fn record_buzz(&mut self, buzz: &BuzzRecord) -> Option<Medal> {
        let ModeExtension::Ranked(ranked) = &mut self.extension else {
            return None;
        };
        let position = buzz
            .position
            .unwrap_or(ranked.buzzes.len() as u32 + 1);
        if ranked.buzzes.iter().any(|existing| {
            existing.position == position && existing.player_name == buzz.player_name
        }) {
            return Medal::from_position(position);
        }
        let medal = Medal::from_position(position);
        ranked.buzzes.push(RankedBuzz {
            player_id: buzz.player_id.clone(),
            player_name: buzz.player_name.clone(),
            position,
            medal,
            bonus: medal.map(Medal::bonus),
        });
        medal
    }

    /// Remember a target choice sent to the server. Returns `false` outside target rounds.
    pub fn select_target(&mut self, target_id: &str) -> bool {
        match &mut self.extension {
            ModeExtension::Target(target) => {
                target.pending_selection = Some(target_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Remember the locally chosen option while answers are open.
    pub fn select_option(&mut self, index: usize) -> bool {
        match &mut self.extension {
            ModeExtension::Trivia(trivia) if trivia.stage == TriviaStage::Open => {
                trivia.selected_option = Some(index);
                true
            }
            _ => false,
        }
    }

    /// Move the question from open to validating.
    ///
    /// Returns `true` only for the first caller, so the countdown's auto-validate and a
    /// manual "validate now" can race without double submission.
    pub fn begin_validation(&mut self) -> bool {
        match &mut self.extension {
            ModeExtension::Trivia(trivia) if trivia.stage == TriviaStage::Open => {
                trivia.stage = TriviaStage::Validating;
                true
            }
            _ => false,
        }
    }

    /// Apply a mode signal, returning the score change it declares.
    pub fn apply(&mut self, signal: ModeSignal) -> Result<ScoreDelta, EngineError> {
        let label = signal.label();
        let mismatch = |extension: &ModeExtension| EngineError::Protocol {
            event: label.to_string(),
            reason: format!("not applicable to a {} round", extension.label()),
        };

        match (&mut self.extension, signal) {
            (ModeExtension::Ranked(ranked), ModeSignal::Ranking(ranking)) => {
                ranked.ranking = ranking;
                Ok(ScoreDelta::new())
            }
            (
                ModeExtension::Hints(hints),
                ModeSignal::HintRevealed {
                    index,
                    hint,
                    bonus_points_left,
                },
            ) => {
                if hints.current_hint_index.is_some_and(|current| index <= current) {
                    debug!(index, "hint already revealed");
                    return Ok(ScoreDelta::new());
                }
                let known = hints.hints.len();
                match hint {
                    Some(text) if index < known => hints.hints[index] = text,
                    Some(text) if index == known => hints.hints.push(text),
                    None if index < known => {}
                    _ => {
                        return Err(EngineError::Protocol {
                            event: label.to_string(),
                            reason: format!("hint {index} is outside the {known} delivered hints"),
                        });
                    }
                }
                hints.current_hint_index = Some(index);
                if bonus_points_left.is_some() {
                    hints.bonus_points_left = bonus_points_left;
                }
                Ok(ScoreDelta::new())
            }
            (
                ModeExtension::Bomb(bomb),
                ModeSignal::BombHolderChanged {
                    holder,
                    time_left_secs,
                },
            ) => {
                bomb.holder = holder;
                bomb.time_left_secs = time_left_secs;
                Ok(ScoreDelta::new())
            }
            (ModeExtension::Bomb(bomb), ModeSignal::BombExploded(explosion)) => {
                if bomb.last_explosion.as_ref() == Some(&explosion) {
                    return Ok(ScoreDelta::new());
                }
                let delta = ScoreDelta::single(explosion.victim_id.clone(), -explosion.points_lost);
                bomb.holder = None;
                bomb.time_left_secs = None;
                bomb.last_explosion = Some(explosion);
                Ok(delta)
            }
            (
                ModeExtension::Target(target),
                ModeSignal::TargetConfirmed {
                    attacker_id,
                    target_id,
                },
            ) => {
                if self.own_player.as_deref() == Some(attacker_id.as_str()) {
                    target.pending_selection = None;
                    target.confirmed_target = Some(target_id.clone());
                }
                target.selections.insert(attacker_id, target_id);
                Ok(ScoreDelta::new())
            }
            (ModeExtension::Target(target), ModeSignal::PointsStolen(steal)) => {
                if target.last_steal.as_ref() == Some(&steal) {
                    return Ok(ScoreDelta::new());
                }
                let mut delta = ScoreDelta::new();
                delta.add(steal.attacker_id.clone(), steal.points);
                delta.add(steal.target_id.clone(), -steal.points);
                target.last_steal = Some(steal);
                Ok(delta)
            }
            (
                ModeExtension::Trivia(trivia),
                ModeSignal::QcmResolved {
                    correct_index,
                    results,
                    leaderboard,
                },
            ) => {
                if trivia.stage == TriviaStage::Revealed {
                    debug!("question results already applied");
                    return Ok(ScoreDelta::new());
                }
                trivia.stage = TriviaStage::Revealed;
                if correct_index.is_some() {
                    trivia.correct_index = correct_index;
                }
                let delta = if leaderboard.is_some() {
                    ScoreDelta::new()
                } else {
                    results
                        .iter()
                        .map(|answer| (answer.player_id.clone(), answer.points))
                        .collect()
                };
                trivia.results = results;
                Ok(delta)
            }
            (ModeExtension::Trivia(_), ModeSignal::CountdownTick { .. })
            | (ModeExtension::Trivia(_), ModeSignal::CountdownEnded) => Ok(ScoreDelta::new()),
            (extension, _) => Err(mismatch(&*extension)),
        }
    }
}
