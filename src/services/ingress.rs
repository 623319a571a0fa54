//! Single normalization point between wire payloads and canonical events.
//!
//! Every legacy key, alias and lenient number is resolved here; nothing downstream ever
//! sees a wire shape.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::dto::inbound::{
    AnswerPayload, BombPayload, BuzzConfirmedPayload, BuzzPayload, GameCreatedPayload,
    GameFinishedPayload, GameStatePayload, HintPayload, JoinedPayload, MessagePayload,
    PlayTrackPayload, PlayerEventPayload, PlaylistPayload, QcmResultsPayload, RankingPayload,
    RoundResultPayload, RoundStartedPayload, TargetPayload, TeamEventPayload, TimeoutPayload,
    WireBuzzRef, WireMember, WireOption, WirePlayer, WireQcm, WireTeam, WireTrack,
};
use crate::error::EngineError;
use crate::state::events::{
    AnswerJudgement, ContinueReason, Envelope, GameSnapshot, InboundEvent, RoundContinue,
    RoundOutcome, TrackCue, Verdict,
};
use crate::state::model::{
    BuzzRecord, ContentInfo, GameMode, PlayMode, PlayerRecord, QcmOption, QcmQuestion,
    RoundContent, RoundSnapshot, ServerPhase, TeamRecord, Track,
};
use crate::state::modes::{Explosion, ModeSignal, RankingEntry, Steal, TriviaAnswer};
use crate::state::roster::RosterUpdate;

/// Turn a raw `(event name, payload)` pair into a canonical envelope.
pub fn normalize(name: &str, payload: Value) -> Result<Envelope, EngineError> {
    let protocol = |reason: String| EngineError::Protocol {
        event: name.to_string(),
        reason,
    };

    let (round, event) = match name {
        "game_state" | "game_snapshot" | "state_sync" => {
            let payload: GameStatePayload = parse(name, payload)?;
            (None, InboundEvent::Snapshot(Box::new(snapshot(payload).map_err(protocol)?)))
        }
        "joined" | "join_success" => {
            let payload: JoinedPayload = parse(name, payload)?;
            (
                None,
                InboundEvent::JoinAcknowledged {
                    player_id: payload.player_id.or(payload.id),
                    buzzer_sound: payload.buzzer_sound,
                },
            )
        }
        "game_created" => {
            let payload: GameCreatedPayload = parse(name, payload)?;
            let room_code = payload
                .room_code
                .or(payload.code)
                .ok_or_else(|| protocol("missing room code".into()))?;
            (
                None,
                InboundEvent::GameCreated {
                    room_code,
                    mode: payload.mode.as_deref().and_then(GameMode::from_tag),
                    play_mode: payload
                        .play_mode
                        .as_deref()
                        .map(PlayMode::from_tag)
                        .unwrap_or_default(),
                },
            )
        }
        "playlist_loaded" | "questions_loaded" => {
            let payload: PlaylistPayload = parse(name, payload)?;
            (None, InboundEvent::ContentLoaded(content_info(payload)))
        }
        "playlist_error" | "error" => {
            let payload: MessagePayload = parse(name, payload)?;
            let message = payload
                .message
                .or(payload.error)
                .or(payload.reason)
                .unwrap_or_else(|| "unknown server error".into());
            let code = payload.code.map(|code| match code {
                Value::String(code) => code,
                other => other.to_string(),
            });
            (None, InboundEvent::ServerError { message, code })
        }
        "player_joined" | "player_left" | "player_disconnected" => {
            let payload: PlayerEventPayload = parse(name, payload)?;
            (None, InboundEvent::Roster(player_update(name, payload).map_err(protocol)?))
        }
        "team_created" | "team_updated" | "team_deleted" | "teams_updated"
        | "player_joined_team" | "player_left_team" => {
            let payload: TeamEventPayload = parse(name, payload)?;
            (None, InboundEvent::Roster(team_update(name, payload).map_err(protocol)?))
        }
        "round_started" | "new_round" => {
            let payload: RoundStartedPayload = parse(name, payload)?;
            let round = payload.round_number;
            (
                round,
                InboundEvent::RoundStarted(Box::new(round_snapshot(payload).map_err(protocol)?)),
            )
        }
        "play_track" => {
            let payload: PlayTrackPayload = parse(name, payload)?;
            let round = payload.round_number;
            (round, InboundEvent::TrackStarted(track_cue(payload).map_err(protocol)?))
        }
        "stop_music" | "pause_music" => (round_of(&payload), InboundEvent::AudioStopped),
        "resume_audio" | "resume_music" => (round_of(&payload), InboundEvent::AudioResumed),
        "buzz_locked" | "player_buzzed" => {
            let payload: BuzzPayload = parse(name, payload)?;
            let round = payload.round_number;
            let buzz = buzz_record(payload)
                .ok_or_else(|| protocol("buzz without player".into()))?;
            (round, InboundEvent::BuzzLocked(buzz))
        }
        "buzz_confirmed" | "buzz_accepted" => {
            let payload: BuzzConfirmedPayload = parse(name, payload)?;
            (
                payload.round_number,
                InboundEvent::BuzzAcknowledged {
                    position: payload.position.or(payload.order),
                },
            )
        }
        "buzz_rejected" | "buzz_denied" => {
            let round = round_of(&payload);
            let payload: MessagePayload = parse(name, payload)?;
            (
                round,
                InboundEvent::BuzzRejected {
                    reason: payload.message.or(payload.reason),
                },
            )
        }
        "correct_answer" | "wrong_answer" | "partial_answer_validated" => {
            let payload: AnswerPayload = parse(name, payload)?;
            let verdict = match name {
                "correct_answer" => Verdict::Correct,
                "wrong_answer" => Verdict::Wrong,
                _ => Verdict::Partial {
                    waiting_for_host: payload.waiting_for_host.unwrap_or(false),
                },
            };
            let points = match verdict {
                Verdict::Wrong => payload
                    .points_lost
                    .map(|lost| -lost.abs())
                    .or(payload.points)
                    .unwrap_or(0),
                _ => payload.points.or(payload.points_awarded).unwrap_or(0),
            };
            (
                payload.round_number,
                InboundEvent::AnswerJudged(AnswerJudgement {
                    player_id: payload.player_id,
                    player_name: payload.player_name,
                    points,
                    verdict,
                }),
            )
        }
        "round_continuing" | "wrong_answer_continue" | "timeout_continue" => {
            let payload: AnswerPayload = parse(name, payload)?;
            let reason = match name {
                "wrong_answer_continue" => ContinueReason::WrongAnswer,
                "timeout_continue" => ContinueReason::Timeout,
                _ => ContinueReason::Manual,
            };
            (
                payload.round_number,
                InboundEvent::RoundContinues(RoundContinue {
                    reason,
                    player_id: payload.player_id,
                    player_name: payload.player_name,
                    points: payload
                        .points
                        .or(payload.points_awarded)
                        .or(payload.points_lost.map(|lost| -lost.abs())),
                }),
            )
        }
        "timeout_warning" => {
            let payload: TimeoutPayload = parse(name, payload)?;
            (
                payload.round_number,
                InboundEvent::TimeoutWarning {
                    seconds_left: payload.seconds_left,
                },
            )
        }
        "timeout_expired" | "time_up" => (round_of(&payload), InboundEvent::TimeoutExpired),
        "round_result" | "round_ended" | "round_skipped" => {
            let payload: RoundResultPayload = parse(name, payload)?;
            (
                payload.round_number,
                InboundEvent::RoundClosed(round_outcome(name == "round_skipped", payload)),
            )
        }
        "reflexo_ranking" => {
            let payload: RankingPayload = parse(name, payload)?;
            let ranking = payload
                .ranking
                .into_iter()
                .enumerate()
                .filter_map(|(index, line)| {
                    Some(RankingEntry {
                        player_id: line.player_id.or(line.player_name)?,
                        order: line.order.or(line.position).unwrap_or(index as u32 + 1),
                        points: line.points.unwrap_or(0),
                    })
                })
                .collect();
            (payload.round_number, InboundEvent::Mode(ModeSignal::Ranking(ranking)))
        }
        "hint_revealed" => {
            let payload: HintPayload = parse(name, payload)?;
            let index = payload
                .hint_index
                .or(payload.index)
                .ok_or_else(|| protocol("missing hint index".into()))?;
            (
                payload.round_number,
                InboundEvent::Mode(ModeSignal::HintRevealed {
                    index,
                    hint: payload.hint,
                    bonus_points_left: payload.bonus_points_left,
                }),
            )
        }
        "bomb_holder_changed" | "bomb_passed" => {
            let payload: BombPayload = parse(name, payload)?;
            (
                payload.round_number,
                InboundEvent::Mode(ModeSignal::BombHolderChanged {
                    holder: payload
                        .bomb_holder
                        .or(payload.to_player_id)
                        .or(payload.holder),
                    time_left_secs: payload.time_left,
                }),
            )
        }
        "bomb_exploded" => {
            let payload: BombPayload = parse(name, payload)?;
            let victim_id = payload
                .victim_id
                .or(payload.bomb_holder)
                .ok_or_else(|| protocol("explosion without victim".into()))?;
            (
                payload.round_number,
                InboundEvent::Mode(ModeSignal::BombExploded(Explosion {
                    victim_id,
                    victim_name: payload.victim_name,
                    points_lost: payload.points_lost.unwrap_or(0).abs(),
                })),
            )
        }
        "target_selected" | "target_confirmed" => {
            let payload: TargetPayload = parse(name, payload)?;
            match (payload.attacker_id, payload.target_id) {
                (Some(attacker_id), Some(target_id)) => (
                    payload.round_number,
                    InboundEvent::Mode(ModeSignal::TargetConfirmed {
                        attacker_id,
                        target_id,
                    }),
                ),
                _ => return Err(protocol("selection without attacker or target".into())),
            }
        }
        "points_stolen" => {
            let payload: TargetPayload = parse(name, payload)?;
            match (payload.attacker_id, payload.target_id) {
                (Some(attacker_id), Some(target_id)) => (
                    payload.round_number,
                    InboundEvent::Mode(ModeSignal::PointsStolen(Steal {
                        attacker_id,
                        target_id,
                        points: payload.points_stolen.or(payload.points).unwrap_or(0),
                    })),
                ),
                _ => return Err(protocol("steal without attacker or target".into())),
            }
        }
        "qcm_results" | "qcm_result" => {
            let payload: QcmResultsPayload = parse(name, payload)?;
            let results = payload
                .results
                .into_iter()
                .filter_map(|line| {
                    Some(TriviaAnswer {
                        player_id: line.player_id.or(line.player_name)?,
                        selected_index: line.selected_index,
                        is_correct: line.is_correct.or(line.correct).unwrap_or(false),
                        points: line.points.or(line.points_awarded).unwrap_or(0),
                    })
                })
                .collect();
            (
                payload.round_number,
                InboundEvent::Mode(ModeSignal::QcmResolved {
                    correct_index: payload
                        .correct_index
                        .or(payload.correct_option)
                        .or(payload.correct_answer),
                    results,
                    leaderboard: payload.leaderboard.map(players),
                }),
            )
        }
        "countdown_tick" => {
            let payload: TimeoutPayload = parse(name, payload)?;
            let remaining = payload
                .time_remaining
                .or(payload.seconds_left.map(f64::from))
                .and_then(secs)
                .ok_or_else(|| protocol("missing remaining time".into()))?;
            (
                payload.round_number,
                InboundEvent::Mode(ModeSignal::CountdownTick { remaining }),
            )
        }
        "countdown_end" => (round_of(&payload), InboundEvent::Mode(ModeSignal::CountdownEnded)),
        "game_finished" | "game_ended" => {
            let payload: GameFinishedPayload = parse(name, payload)?;
            (
                None,
                InboundEvent::GameFinished {
                    leaderboard: payload
                        .final_leaderboard
                        .or(payload.leaderboard)
                        .or(payload.players)
                        .map(players),
                    team_leaderboard: payload.team_leaderboard.or(payload.teams).map(teams),
                },
            )
        }
        other => return Err(protocol(format!("unknown event `{other}`"))),
    };

    Ok(Envelope {
        name: name.to_string(),
        round,
        event,
    })
}

fn parse<T: DeserializeOwned + Default>(name: &str, payload: Value) -> Result<T, EngineError> {
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|err| EngineError::Protocol {
        event: name.to_string(),
        reason: err.to_string(),
    })
}

fn round_of(payload: &Value) -> Option<u32> {
    let value = payload.get("roundNumber")?;
    value
        .as_u64()
        .and_then(|round| u32::try_from(round).ok())
        .or_else(|| value.as_str().and_then(|round| round.parse().ok()))
}

fn secs(value: f64) -> Option<Duration> {
    if value < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(value).ok()
}

/// Optional duration field; present but negative, NaN or out of range is rejected.
fn duration(value: Option<f64>, field: &str) -> Result<Option<Duration>, String> {
    match value {
        None => Ok(None),
        Some(seconds) => secs(seconds)
            .map(Some)
            .ok_or_else(|| format!("{field} out of range: {seconds}")),
    }
}

fn player(wire: WirePlayer) -> Option<PlayerRecord> {
    let id = wire
        .id
        .or(wire.player_id)
        .or_else(|| wire.name.clone())
        .or_else(|| wire.player_name.clone())?;
    let name = wire.name.or(wire.player_name).unwrap_or_else(|| id.clone());
    Some(PlayerRecord {
        id,
        name,
        score: wire.score.unwrap_or(0),
        color: wire.color,
        buzzer_sound: wire.buzzer_sound,
        connected: wire.connected.or(wire.is_connected).unwrap_or(true),
        team_id: wire.team_id,
    })
}

fn players(wire: Vec<WirePlayer>) -> Vec<PlayerRecord> {
    wire.into_iter().filter_map(player).collect()
}

fn team(wire: WireTeam) -> Option<TeamRecord> {
    let id = wire.id.or(wire.team_id).or_else(|| wire.name.clone())?;
    let member_ids = match (wire.member_ids, wire.members) {
        (Some(ids), _) => ids,
        (None, Some(members)) => members
            .into_iter()
            .filter_map(|member| match member {
                WireMember::Id(id) => Some(id),
                WireMember::Player(wire) => player(wire).map(|player| player.id),
            })
            .collect(),
        (None, None) => Vec::new(),
    };
    Some(TeamRecord {
        name: wire.name.unwrap_or_else(|| id.clone()),
        id,
        color: wire.color,
        score: wire.score.unwrap_or(0),
        member_ids,
    })
}

fn teams(wire: Vec<WireTeam>) -> Vec<TeamRecord> {
    wire.into_iter().filter_map(team).collect()
}

fn track(wire: WireTrack) -> Track {
    Track {
        id: wire.id,
        title: wire.title,
        artist: wire.artist,
        preview_url: wire.preview_url.or(wire.url),
        duration_secs: wire.duration,
    }
}

fn question(wire: WireQcm) -> QcmQuestion {
    let options: Vec<QcmOption> = wire
        .options
        .into_iter()
        .map(|option| match option {
            WireOption::Text(text) => QcmOption {
                text,
                is_correct: false,
            },
            WireOption::Detailed {
                text,
                is_correct,
                correct,
            } => QcmOption {
                text,
                is_correct: is_correct.or(correct).unwrap_or(false),
            },
        })
        .collect();
    let correct_index = wire
        .correct_index
        .or_else(|| options.iter().position(|option| option.is_correct));
    QcmQuestion {
        question: wire.question.or(wire.text).unwrap_or_default(),
        options,
        correct_index,
    }
}

fn content(track_wire: Option<WireTrack>, qcm: Option<WireQcm>) -> RoundContent {
    match (qcm, track_wire) {
        (Some(qcm), _) => RoundContent::Qcm(question(qcm)),
        (None, Some(wire)) => RoundContent::Track(track(wire)),
        (None, None) => RoundContent::Empty,
    }
}

fn content_info(payload: PlaylistPayload) -> ContentInfo {
    let id = payload.playlist_id.or(payload.id).unwrap_or_default();
    ContentInfo {
        name: payload
            .playlist_name
            .or(payload.name)
            .unwrap_or_else(|| id.clone()),
        id,
        item_count: payload
            .track_count
            .or(payload.question_count)
            .unwrap_or(0),
    }
}

fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    match value {
        Value::String(text) => OffsetDateTime::parse(text, &Rfc3339).ok().or_else(|| {
            text.parse::<i64>().ok().and_then(from_millis)
        }),
        Value::Number(number) => number.as_i64().and_then(from_millis),
        _ => None,
    }
}

fn from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

fn buzz_record(payload: BuzzPayload) -> Option<BuzzRecord> {
    let player_id = payload.player_id.or(payload.id);
    let player_name = payload
        .player_name
        .or(payload.name)
        .or_else(|| player_id.clone())?;
    Some(BuzzRecord {
        player_id,
        player_name,
        server_timestamp: payload
            .server_timestamp
            .or(payload.timestamp)
            .as_ref()
            .and_then(parse_timestamp),
        position: payload.position.or(payload.order),
        buzzer_sound: payload.buzzer_sound,
    })
}

fn buzz_ref(wire: WireBuzzRef, roster: &[PlayerRecord]) -> Option<BuzzRecord> {
    match wire {
        WireBuzzRef::Full(payload) => buzz_record(payload),
        WireBuzzRef::Name(key) => {
            let known = roster
                .iter()
                .find(|player| player.id == key)
                .or_else(|| roster.iter().find(|player| player.name == key));
            Some(BuzzRecord {
                player_id: known.map(|player| player.id.clone()),
                player_name: known.map(|player| player.name.clone()).unwrap_or(key),
                server_timestamp: None,
                position: None,
                buzzer_sound: known.and_then(|player| player.buzzer_sound),
            })
        }
    }
}

fn snapshot(payload: GameStatePayload) -> Result<GameSnapshot, String> {
    let tag = payload
        .phase
        .or(payload.state)
        .or(payload.status)
        .ok_or_else(|| "snapshot without phase".to_string())?;
    let phase = ServerPhase::from_tag(&tag).ok_or_else(|| format!("unknown phase `{tag}`"))?;
    let mode = payload
        .mode
        .as_deref()
        .and_then(GameMode::from_tag)
        .unwrap_or_default();
    let round_number = payload
        .round_number
        .or(payload.current_round)
        .unwrap_or(0);
    let roster = players(payload.players);

    let track_wire = payload.current_track.or(payload.track);
    let qcm = payload.current_question.or(payload.qcm);
    let timer_duration = duration(payload.timer_duration, "timerDuration")?;
    let round = (round_number > 0 && (track_wire.is_some() || qcm.is_some())).then(|| {
        RoundSnapshot {
            round_number,
            mode,
            timer_duration,
            content: content(track_wire, qcm),
            hints: payload.hints.unwrap_or_default(),
            bomb_holder: payload.bomb_holder,
            target_player: None,
        }
    });

    let buzzes = payload
        .buzzes
        .or(payload.buzz_order)
        .or(payload.buzzed_players)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|wire| buzz_ref(wire, &roster))
        .collect();
    let locked_buzz = payload
        .locked_player
        .or(payload.current_buzzer)
        .and_then(|wire| buzz_ref(wire, &roster));

    Ok(GameSnapshot {
        room_code: payload.room_code,
        phase,
        mode,
        play_mode: payload
            .play_mode
            .as_deref()
            .map(PlayMode::from_tag)
            .unwrap_or_default(),
        round_number,
        players: roster,
        teams: teams(payload.teams),
        round,
        buzzes,
        locked_buzz,
        timer_remaining: duration(payload.time_remaining, "timeRemaining")?,
        track_elapsed_secs: payload.elapsed.or(payload.current_time),
        content: payload.playlist.map(content_info),
    })
}

fn round_snapshot(payload: RoundStartedPayload) -> Result<RoundSnapshot, String> {
    let mode = match payload.mode.or(payload.game_mode) {
        Some(tag) => GameMode::from_tag(&tag).ok_or_else(|| format!("unknown mode `{tag}`"))?,
        None => GameMode::default(),
    };
    Ok(RoundSnapshot {
        round_number: payload.round_number.unwrap_or(0),
        mode,
        timer_duration: duration(payload.timer_duration, "timerDuration")?,
        content: content(payload.track, payload.qcm.or(payload.question)),
        hints: payload.hints.unwrap_or_default(),
        bomb_holder: payload.bomb_holder,
        target_player: payload.target_player.or(payload.target_player_id),
    })
}

fn track_cue(payload: PlayTrackPayload) -> Result<TrackCue, String> {
    let track = payload.track.map(track);
    let source = payload
        .preview_url
        .or(payload.url)
        .or_else(|| track.as_ref().and_then(|track| track.preview_url.clone()))
        .ok_or_else(|| "play_track without a source".to_string())?;
    Ok(TrackCue {
        source,
        offset_secs: payload.start_time.filter(|offset| offset.is_finite()),
        timer_duration: duration(payload.timer_duration, "timerDuration")?,
        track_duration_secs: payload
            .duration
            .or_else(|| track.as_ref().and_then(|track| track.duration_secs)),
        volume: payload.volume,
    })
}

fn player_update(name: &str, payload: PlayerEventPayload) -> Result<RosterUpdate, String> {
    let full = payload.players.map(players);
    let flat_id = payload.player_id.or(payload.id);
    match name {
        "player_joined" => {
            let joined = payload.player.and_then(player).or_else(|| {
                player(WirePlayer {
                    id: flat_id,
                    name: payload.player_name.or(payload.name),
                    ..WirePlayer::default()
                })
            });
            if joined.is_none() && full.is_none() {
                return Err("player_joined without player".into());
            }
            Ok(RosterUpdate::PlayerJoined {
                player: joined,
                full,
            })
        }
        _ => {
            let player_id = flat_id
                .or_else(|| payload.player.and_then(player).map(|player| player.id))
                .ok_or_else(|| format!("{name} without player id"))?;
            if name == "player_left" {
                Ok(RosterUpdate::PlayerLeft { player_id, full })
            } else {
                Ok(RosterUpdate::PlayerDisconnected { player_id, full })
            }
        }
    }
}

fn team_update(name: &str, payload: TeamEventPayload) -> Result<RosterUpdate, String> {
    let full = payload.teams.map(teams);
    let single = payload.team.and_then(team);
    match name {
        "player_joined_team" | "player_left_team" => {
            let player_id = payload
                .player_id
                .ok_or_else(|| format!("{name} without player id"))?;
            let team_id = if name == "player_joined_team" {
                Some(
                    payload
                        .team_id
                        .or_else(|| single.as_ref().map(|team| team.id.clone()))
                        .ok_or_else(|| format!("{name} without team id"))?,
                )
            } else {
                None
            };
            Ok(RosterUpdate::Membership {
                player_id,
                team_id,
                full,
            })
        }
        "team_deleted" => {
            let deleted = payload.team_id.or_else(|| single.map(|team| team.id));
            if deleted.is_none() && full.is_none() {
                return Err("team_deleted without team".into());
            }
            Ok(RosterUpdate::TeamsChanged {
                team: None,
                deleted,
                full,
            })
        }
        _ => {
            if single.is_none() && full.is_none() {
                return Err(format!("{name} without team"));
            }
            Ok(RosterUpdate::TeamsChanged {
                team: single,
                deleted: None,
                full,
            })
        }
    }
}

fn player_ref(value: Value) -> (Option<String>, Option<String>) {
    match value {
        Value::String(id) => (Some(id), None),
        Value::Object(_) => match serde_json::from_value::<WirePlayer>(value) {
            Ok(wire) => (
                wire.id.or(wire.player_id),
                wire.name.or(wire.player_name),
            ),
            Err(_) => (None, None),
        },
        _ => (None, None),
    }
}

fn answer_text(value: Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text),
        Value::Object(fields) => {
            let field = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
            match (field("title"), field("artist")) {
                (Some(title), Some(artist)) => Some(format!("{title} - {artist}")),
                (title, artist) => title.or(artist).or_else(|| field("text")),
            }
        }
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn round_outcome(skipped: bool, payload: RoundResultPayload) -> RoundOutcome {
    let (ref_id, ref_name) = payload
        .winner
        .or(payload.player)
        .map(player_ref)
        .unwrap_or((None, None));
    RoundOutcome {
        skipped,
        correct: payload.correct.or(payload.is_correct),
        winner_id: payload.winner_id.or(ref_id),
        winner_name: payload.player_name.or(ref_name),
        points: payload.points.or(payload.points_awarded),
        answer: payload
            .answer
            .or(payload.correct_answer)
            .and_then(answer_text),
        leaderboard: payload.leaderboard.or(payload.players).map(players),
        team_leaderboard: payload.team_leaderboard.or(payload.teams).map(teams),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::epoch::Stage;

    #[test]
    fn correctness_flag_is_read_from_either_key() {
        let legacy = normalize("round_result", json!({ "isCorrect": true })).unwrap();
        let current = normalize("round_result", json!({ "correct": true })).unwrap();

        for envelope in [legacy, current] {
            match envelope.event {
                InboundEvent::RoundClosed(outcome) => assert_eq!(outcome.correct, Some(true)),
                other => panic!("expected round outcome, got {other:?}"),
            }
        }
    }

    #[test]
    fn leaderboard_entries_become_players() {
        let envelope = normalize(
            "round_result",
            json!({ "roundNumber": "4", "leaderboard": [{ "id": "P1", "score": 115 }] }),
        )
        .unwrap();

        assert_eq!(envelope.round, Some(4));
        assert_eq!(envelope.stage(), Some(Stage::Closed));
        match envelope.event {
            InboundEvent::RoundClosed(outcome) => {
                let leaderboard = outcome.leaderboard.unwrap();
                assert_eq!(leaderboard[0].id, "P1");
                assert_eq!(leaderboard[0].name, "P1");
                assert_eq!(leaderboard[0].score, 115);
            }
            other => panic!("expected round outcome, got {other:?}"),
        }
    }

    #[test]
    fn mode_aliases_resolve_to_the_same_mode() {
        for tag in ["reflexoquiz", "ranked"] {
            let envelope = normalize("round_started", json!({ "mode": tag })).unwrap();
            match envelope.event {
                InboundEvent::RoundStarted(round) => assert_eq!(round.mode, GameMode::Ranked),
                other => panic!("expected round start, got {other:?}"),
            }
        }
    }

    #[test]
    fn unknown_events_and_modes_are_protocol_errors() {
        assert!(matches!(
            normalize("confetti", json!({})),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            normalize("round_started", json!({ "mode": "polka" })),
            Err(EngineError::Protocol { .. })
        ));
        assert!(matches!(
            normalize("play_track", json!({ "duration": 10 })),
            Err(EngineError::Protocol { .. })
        ));
    }

    #[test]
    fn play_track_offsets_and_durations_are_seconds() {
        let envelope = normalize(
            "play_track",
            json!({ "previewUrl": "https://cdn/a.mp3", "duration": 10, "startTime": 0, "timerDuration": "20" }),
        )
        .unwrap();

        match envelope.event {
            InboundEvent::TrackStarted(cue) => {
                assert_eq!(cue.source, "https://cdn/a.mp3");
                assert_eq!(cue.offset_secs, Some(0.0));
                assert_eq!(cue.timer_duration, Some(Duration::from_secs(20)));
                assert_eq!(cue.track_duration_secs, Some(10.0));
            }
            other => panic!("expected track cue, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_resolves_bare_buzz_names_against_roster() {
        let envelope = normalize(
            "game_state",
            json!({
                "phase": "playing",
                "roundNumber": 2,
                "players": [{ "id": "p1", "name": "Alice", "score": 30 }],
                "currentTrack": { "previewUrl": "https://cdn/a.mp3" },
                "buzzedPlayers": ["Alice"],
                "timeRemaining": 12,
            }),
        )
        .unwrap();

        match envelope.event {
            InboundEvent::Snapshot(snapshot) => {
                assert_eq!(snapshot.phase, ServerPhase::Playing);
                assert_eq!(snapshot.buzzes[0].player_id.as_deref(), Some("p1"));
                assert_eq!(snapshot.timer_remaining, Some(Duration::from_secs(12)));
                assert_eq!(
                    snapshot.round.as_ref().and_then(|round| round.preview_url()),
                    Some("https://cdn/a.mp3")
                );
            }
            other => panic!("expected snapshot, got {other:?}"),
        }
    }

    #[test]
    fn wrong_answer_points_are_negative() {
        let envelope = normalize(
            "wrong_answer",
            json!({ "playerId": "p1", "pointsLost": 5 }),
        )
        .unwrap();
        match envelope.event {
            InboundEvent::AnswerJudged(judgement) => {
                assert_eq!(judgement.points, -5);
                assert_eq!(judgement.verdict, Verdict::Wrong);
            }
            other => panic!("expected judgement, got {other:?}"),
        }
    }
}
