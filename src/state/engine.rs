//! Reducer tying every controller together.
//!
//! The engine never reads a clock: each entry point receives `now`, so the session loop
//! drives time in production and tests step it by hand. Every entry point returns a
//! [`Step`] listing the commands to emit and the cues to play; nothing is sent from here.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dto::outbound::{OutboundCommand, RoomPayload};
use crate::dto::view::GameView;
use crate::error::{Diagnostics, EngineError};
use crate::services::ingress;
use crate::state::audio::{AudioBackend, AudioController, AudioSignal};
use crate::state::buzz::BuzzControl;
use crate::state::epoch::{Epoch, EpochGuard};
use crate::state::events::{
    AnswerJudgement, ContinueReason, Envelope, GameSnapshot, InboundEvent, RoundContinue,
    RoundOutcome, TrackCue, Verdict,
};
use crate::state::model::{
    BuzzRecord, ContentInfo, PlayMode, PlayerRecord, RoundSnapshot, TeamRecord,
};
use crate::state::modes::{ModeRegistry, ModeSignal};
use crate::state::reconnect::{self, AudioPlan};
use crate::state::role::Role;
use crate::state::roster::{Roster, ScoreDelta};
use crate::state::state_machine::{InvalidTransition, Phase, PhaseEvent, PhaseMachine};
use crate::state::timer::{TimerBoundary, TimerController};

/// One-shot sound or visual effect the presentation layer should play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cue", rename_all = "snake_case")]
pub enum Cue {
    /// A buzz was locked.
    BuzzerSound {
        /// Who buzzed.
        player_name: String,
        /// Sound index assigned to that player.
        sound: Option<u32>,
    },
    /// Correct answer.
    Correct,
    /// Wrong answer.
    Wrong,
    /// A countdown ran out.
    Timeout,
    /// A countdown crossed its warning threshold.
    Warning,
    /// Winning result.
    Celebrate,
    /// Losing result or explosion.
    Shake,
}

/// Side effect produced by an engine step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", content = "payload", rename_all = "snake_case")]
pub enum Effect {
    /// Command to emit on the transport.
    Send(OutboundCommand),
    /// Cue to play.
    Cue(Cue),
}

/// Effects of a single engine call, in emission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Step {
    /// Ordered effects.
    pub effects: Vec<Effect>,
}

impl Step {
    pub(crate) fn send(&mut self, command: OutboundCommand) {
        self.effects.push(Effect::Send(command));
    }

    pub(crate) fn cue(&mut self, cue: Cue) {
        self.effects.push(Effect::Cue(cue));
    }

    /// Commands to emit.
    pub fn commands(&self) -> impl Iterator<Item = &OutboundCommand> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Send(command) => Some(command),
            Effect::Cue(_) => None,
        })
    }

    /// Cues to play.
    pub fn cues(&self) -> impl Iterator<Item = &Cue> {
        self.effects.iter().filter_map(|effect| match effect {
            Effect::Cue(cue) => Some(cue),
            Effect::Send(_) => None,
        })
    }

    /// Whether the step produced nothing.
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Client-side view synchronization engine for one role in one room.
#[derive(Debug)]
pub struct SyncEngine {
    pub(crate) role: Role,
    pub(crate) config: EngineConfig,
    pub(crate) room_code: Option<String>,
    pub(crate) machine: PhaseMachine,
    pub(crate) guard: EpochGuard,
    pub(crate) timer: TimerController,
    pub(crate) answer_timer: TimerController,
    pub(crate) audio: AudioController,
    pub(crate) modes: ModeRegistry,
    pub(crate) roster: Roster,
    pub(crate) buzz: BuzzControl,
    pub(crate) play_mode: PlayMode,
    pub(crate) round: Option<RoundSnapshot>,
    pub(crate) content: Option<ContentInfo>,
    /// Scheduled fall back to the lobby, with the epoch it was scheduled in.
    lobby_at: Option<(Instant, Epoch)>,
    /// Buzzes already answered by a continue; a late replay must not re-lock them.
    resolved_buzzes: Vec<BuzzRecord>,
    /// Whether an answer verdict already credited this round's points.
    round_credited: bool,
    /// Judgements applied this round, with the buzz locked when each arrived.
    judged: Vec<(Option<BuzzRecord>, AnswerJudgement)>,
    pub(crate) last_result: Option<RoundOutcome>,
    pub(crate) last_error: Option<String>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) already_buzzed: bool,
    pub(crate) own_buzzer_sound: Option<u32>,
}

impl SyncEngine {
    /// Engine for `role`, playing audio through `backend`.
    pub fn new(role: Role, config: EngineConfig, backend: Box<dyn AudioBackend>) -> Self {
        let mut modes = ModeRegistry::default();
        modes.bind_player(role.player_id().map(str::to_string));
        Self {
            timer: TimerController::new(config.timer_warning),
            answer_timer: TimerController::new(Duration::ZERO),
            audio: AudioController::new(backend, config.default_volume),
            buzz: BuzzControl::new(config.buzz_ack_timeout),
            role,
            config,
            room_code: None,
            machine: PhaseMachine::new(),
            guard: EpochGuard::default(),
            modes,
            roster: Roster::default(),
            play_mode: PlayMode::default(),
            round: None,
            content: None,
            lobby_at: None,
            resolved_buzzes: Vec::new(),
            round_credited: false,
            judged: Vec::new(),
            last_result: None,
            last_error: None,
            diagnostics: Diagnostics::default(),
            already_buzzed: false,
            own_buzzer_sound: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> &Phase {
        self.machine.phase()
    }

    /// Current epoch.
    pub fn epoch(&self) -> Epoch {
        self.guard.current()
    }

    /// Active role.
    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Player and team lists.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Recovered error counters.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Room this engine is bound to.
    pub fn room_code(&self) -> Option<&str> {
        self.room_code.as_deref()
    }

    /// Normalize and apply a raw server event.
    pub fn handle_event(&mut self, name: &str, payload: Value, now: Instant) -> Step {
        match ingress::normalize(name, payload) {
            Ok(envelope) => self.apply(envelope, now),
            Err(err) => {
                self.diagnostics.record(&err);
                Step::default()
            }
        }
    }

    /// Apply an already normalized event.
    pub fn apply(&mut self, envelope: Envelope, now: Instant) -> Step {
        let mut step = Step::default();

        if let Some(stage) = envelope.stage() {
            let round = self.epoch_round(&envelope);
            if let Err(err) = self.guard.admit(&envelope.name, Epoch::new(round, stage)) {
                self.diagnostics.record(&err);
                return step;
            }
        }

        debug!(event = %envelope.name, epoch = %self.guard.current(), "applying event");
        match envelope.event {
            InboundEvent::Snapshot(snapshot) => self.restore(*snapshot, now),
            InboundEvent::JoinAcknowledged {
                player_id,
                buzzer_sound,
            } => {
                if let Some(id) = player_id {
                    info!(player_id = %id, "join acknowledged");
                    self.role.bind_player_id(id.clone());
                    self.modes.bind_player(Some(id));
                }
                self.own_buzzer_sound = buzzer_sound;
            }
            InboundEvent::GameCreated {
                room_code,
                mode,
                play_mode,
            } => {
                info!(%room_code, ?mode, ?play_mode, "game created");
                self.room_code = Some(room_code);
                if let Some(mode) = mode {
                    self.modes.set_mode(mode);
                }
                self.play_mode = play_mode;
            }
            InboundEvent::ContentLoaded(content) => {
                info!(content = %content.name, items = content.item_count, "content loaded");
                self.content = Some(content);
                if *self.machine.phase() == Phase::Setup {
                    self.transition(PhaseEvent::ContentLoaded);
                }
            }
            InboundEvent::ServerError { message, code } => {
                warn!(%message, ?code, "server reported an error");
                self.last_error = Some(message);
            }
            InboundEvent::Roster(update) => self.roster.apply(update),
            InboundEvent::RoundStarted(round) => self.on_round_started(*round, now),
            InboundEvent::TrackStarted(cue) => self.on_track_started(cue, now),
            InboundEvent::AudioStopped => {
                self.audio.pause();
                self.timer.pause(now);
            }
            InboundEvent::AudioResumed => {
                if self.machine.phase().is_round_open() {
                    self.audio.resume();
                    self.timer.resume(now);
                }
            }
            InboundEvent::BuzzLocked(buzz) => self.on_buzz_locked(buzz, now, &mut step),
            InboundEvent::BuzzAcknowledged { position } => {
                debug!(?position, "buzz acknowledged");
                self.buzz.acknowledge();
            }
            InboundEvent::BuzzRejected { reason } => {
                info!(?reason, "buzz rejected");
                self.buzz.reject(self.machine.phase());
                self.last_error = reason;
            }
            InboundEvent::AnswerJudged(judgement) => self.on_answer_judged(judgement, &mut step),
            InboundEvent::RoundContinues(resume) => self.on_round_continues(resume, now, &mut step),
            InboundEvent::TimeoutWarning { seconds_left } => {
                debug!(?seconds_left, "server timeout warning");
                step.cue(Cue::Warning);
            }
            InboundEvent::TimeoutExpired => {
                if matches!(self.machine.phase(), Phase::Locked(_)) {
                    self.answer_timer.expire(now);
                } else {
                    self.timer.expire(now);
                }
            }
            InboundEvent::RoundClosed(outcome) => self.on_round_closed(outcome, now, &mut step),
            InboundEvent::Mode(signal) => self.on_mode_signal(signal, now, &mut step),
            InboundEvent::GameFinished {
                leaderboard,
                team_leaderboard,
            } => self.on_game_finished(leaderboard, team_leaderboard, &mut step),
        }

        step
    }

    /// Round an event is addressed to; events without one inherit the current round.
    fn epoch_round(&self, envelope: &Envelope) -> u32 {
        let current = self.guard.current().round;
        if let Some(round) = envelope.round {
            return round;
        }
        match &envelope.event {
            InboundEvent::RoundStarted(round) if self.is_current_round(round) => current,
            InboundEvent::RoundStarted(_) => current + 1,
            _ => current,
        }
    }

    /// Whether `round` re-announces the active round, ignoring an unnumbered replay.
    fn is_current_round(&self, round: &RoundSnapshot) -> bool {
        let Some(active) = self.round.as_ref() else {
            return false;
        };
        if round.round_number == 0 {
            let mut numbered = round.clone();
            numbered.round_number = active.round_number;
            &numbered == active
        } else {
            round == active
        }
    }

    fn on_round_started(&mut self, mut round: RoundSnapshot, now: Instant) {
        if self.is_current_round(&round) {
            debug!(round = round.round_number, "round already started");
            return;
        }
        round.round_number = self.guard.current().round;

        self.lobby_at = None;
        self.timer.clear();
        self.answer_timer.clear();
        self.audio.stop();
        self.modes.reset(&round);
        self.resolved_buzzes.clear();
        self.round_credited = false;
        self.judged.clear();
        self.already_buzzed = false;
        self.last_result = None;

        let trivia = round.is_trivia();
        if !self.transition(PhaseEvent::RoundStarted { trivia }) {
            return;
        }

        let warning = if trivia {
            self.config.trivia_warning
        } else {
            self.config.timer_warning
        };
        self.timer = TimerController::new(warning);
        let duration = round
            .timer_duration
            .unwrap_or(self.config.fallback_round_duration);
        self.timer.start(duration, now, self.guard.current());

        if let Some(source) = round.preview_url() {
            self.audio.play(source, None);
        }
        if !trivia && self.is_player() {
            self.buzz.enable();
        } else {
            self.buzz.disable();
        }

        info!(
            round = round.round_number,
            mode = ?round.mode,
            trivia,
            duration_ms = duration.as_millis() as u64,
            "round started"
        );
        self.round = Some(round);
    }

    fn on_track_started(&mut self, cue: TrackCue, now: Instant) {
        if self.audio.is_same_cue(&cue.source, cue.offset_secs) {
            debug!(source = %cue.source, "track already playing");
            return;
        }
        if !self.machine.phase().is_round_open() {
            if !self.transition(PhaseEvent::TrackStarted) {
                return;
            }
            if self.is_player() && !self.already_buzzed {
                self.buzz.enable();
            }
        }

        if let Some(volume) = cue.volume {
            self.audio.set_volume(volume);
        }
        self.audio.play(&cue.source, cue.offset_secs);

        let duration = cue
            .timer_duration
            .or_else(|| self.round.as_ref().and_then(|round| round.timer_duration))
            .or_else(|| {
                cue.track_duration_secs
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            })
            .unwrap_or(self.config.fallback_round_duration);
        self.timer.start(duration, now, self.guard.current());
        info!(source = %cue.source, offset = ?cue.offset_secs, "track started");
    }

    fn on_buzz_locked(&mut self, buzz: BuzzRecord, now: Instant, step: &mut Step) {
        if self.resolved_buzzes.iter().any(|resolved| resolved.same_buzz(&buzz)) {
            debug!(player = %buzz.player_name, "buzz already resolved by a continue");
            return;
        }
        if self
            .machine
            .phase()
            .locked_buzz()
            .is_some_and(|locked| locked.same_buzz(&buzz))
        {
            debug!(player = %buzz.player_name, "buzz already locked");
            return;
        }
        if !self.transition(PhaseEvent::BuzzLocked(buzz.clone())) {
            return;
        }

        self.buzz.disable();
        if self
            .role
            .is_me(buzz.player_id.as_deref(), Some(buzz.player_name.as_str()))
        {
            self.already_buzzed = true;
        }
        self.timer.pause(now);
        self.audio.pause();
        self.answer_timer
            .start(self.config.answer_window, now, self.guard.current());

        let medal = self.modes.record_buzz(&buzz);
        let sound = buzz.buzzer_sound.or_else(|| {
            buzz.player_id
                .as_deref()
                .and_then(|id| self.roster.player(id))
                .or_else(|| self.roster.player_by_name(&buzz.player_name))
                .and_then(|player| player.buzzer_sound)
        });
        info!(player = %buzz.player_name, ?medal, "buzz locked");
        step.cue(Cue::BuzzerSound {
            player_name: buzz.player_name,
            sound,
        });
    }

    fn on_answer_judged(&mut self, judgement: AnswerJudgement, step: &mut Step) {
        let lock = self.machine.phase().locked_buzz().cloned();
        if self
            .judged
            .iter()
            .any(|(locked, applied)| *locked == lock && *applied == judgement)
        {
            debug!(verdict = ?judgement.verdict, "answer already judged");
            return;
        }
        self.judged.push((lock, judgement.clone()));

        let player_id = self.resolve_player(
            judgement.player_id.as_deref(),
            judgement.player_name.as_deref(),
        );
        if let Some(id) = player_id {
            self.roster
                .apply_delta(&ScoreDelta::single(id, judgement.points));
        }

        match judgement.verdict {
            Verdict::Correct => {
                self.round_credited = true;
                self.transition(PhaseEvent::AwaitValidation);
                step.cue(Cue::Correct);
            }
            Verdict::Partial { waiting_for_host } => {
                if waiting_for_host {
                    self.transition(PhaseEvent::AwaitValidation);
                }
                step.cue(Cue::Correct);
            }
            Verdict::Wrong => step.cue(Cue::Wrong),
        }
    }

    fn on_round_continues(&mut self, resume: RoundContinue, now: Instant, step: &mut Step) {
        if *self.machine.phase() == Phase::RoundActive {
            // nothing to dismiss: resume playback, keep scores
            debug!(reason = ?resume.reason, "round already open");
            self.timer.resume(now);
            self.audio.resume();
            return;
        }
        let locked = self.machine.phase().locked_buzz().cloned();
        if !self.transition(PhaseEvent::Continue) {
            return;
        }
        if let Some(buzz) = locked {
            self.resolved_buzzes.push(buzz);
        }

        if let Some(points) = resume.points {
            let player_id =
                self.resolve_player(resume.player_id.as_deref(), resume.player_name.as_deref());
            if let Some(id) = player_id {
                self.roster.apply_delta(&ScoreDelta::single(id, points));
            }
        }

        self.answer_timer.clear();
        self.timer.resume(now);
        self.audio.resume();
        if self.is_player() && !self.already_buzzed {
            self.buzz.enable();
        }

        match resume.reason {
            ContinueReason::WrongAnswer => step.cue(Cue::Wrong),
            ContinueReason::Timeout => step.cue(Cue::Timeout),
            ContinueReason::Manual => {}
        }
        info!(reason = ?resume.reason, "round continues");
    }

    fn on_round_closed(&mut self, outcome: RoundOutcome, now: Instant, step: &mut Step) {
        if matches!(self.machine.phase(), Phase::Result | Phase::TriviaResult) {
            debug!("round already closed; refreshing lists");
            self.replace_lists(outcome.leaderboard, outcome.team_leaderboard);
            return;
        }
        if !self.transition(PhaseEvent::RoundClosed) {
            self.replace_lists(outcome.leaderboard, outcome.team_leaderboard);
            return;
        }

        let credited = outcome.leaderboard.is_none()
            && !self.round_credited
            && !outcome.skipped
            && outcome.correct != Some(false);
        if credited {
            let winner = self.resolve_player(
                outcome.winner_id.as_deref(),
                outcome.winner_name.as_deref(),
            );
            if let (Some(id), Some(points)) = (winner, outcome.points) {
                self.roster.apply_delta(&ScoreDelta::single(id, points));
            }
        }
        self.replace_lists(
            outcome.leaderboard.clone(),
            outcome.team_leaderboard.clone(),
        );
        self.close_round(now);

        if outcome.correct == Some(true) {
            step.cue(Cue::Celebrate);
        } else if !outcome.skipped {
            step.cue(Cue::Shake);
        }
        info!(
            skipped = outcome.skipped,
            correct = ?outcome.correct,
            winner = ?outcome.winner_name,
            "round closed"
        );
        self.last_result = Some(outcome);
    }

    fn on_mode_signal(&mut self, signal: ModeSignal, now: Instant, step: &mut Step) {
        let leaderboard = match &signal {
            ModeSignal::QcmResolved { leaderboard, .. } => leaderboard.clone(),
            _ => None,
        };
        let resolved = matches!(signal, ModeSignal::QcmResolved { .. });
        let exploded = matches!(signal, ModeSignal::BombExploded(_));
        let countdown = match &signal {
            ModeSignal::CountdownTick { remaining } => Some(Some(*remaining)),
            ModeSignal::CountdownEnded => Some(None),
            _ => None,
        };

        match self.modes.apply(signal) {
            Ok(delta) => {
                if !delta.is_empty() {
                    self.roster.apply_delta(&delta);
                }
            }
            Err(err) => {
                self.diagnostics.record(&err);
                return;
            }
        }

        match countdown {
            Some(Some(remaining)) => self.timer.reanchor(remaining, now),
            Some(None) => self.timer.expire(now),
            None => {}
        }
        if exploded {
            step.cue(Cue::Shake);
        }
        if resolved {
            if let Some(players) = leaderboard {
                self.roster.replace_players(players);
            }
            if *self.machine.phase() == Phase::TriviaQuestion
                && self.transition(PhaseEvent::TriviaClosed)
            {
                self.close_round(now);
            }
        }
    }

    fn on_game_finished(
        &mut self,
        leaderboard: Option<Vec<PlayerRecord>>,
        team_leaderboard: Option<Vec<TeamRecord>>,
        step: &mut Step,
    ) {
        if *self.machine.phase() == Phase::Finished {
            self.replace_lists(leaderboard, team_leaderboard);
            return;
        }
        if !self.transition(PhaseEvent::GameFinished) {
            return;
        }
        self.timer.clear();
        self.answer_timer.clear();
        self.audio.stop();
        self.buzz.disable();
        self.lobby_at = None;
        self.replace_lists(leaderboard, team_leaderboard);
        info!("game finished");
        step.cue(Cue::Celebrate);
    }

    /// Rebuild the whole view from an authoritative snapshot.
    fn restore(&mut self, snapshot: GameSnapshot, now: Instant) {
        let resolution =
            reconnect::resolve(&snapshot, &self.role, self.config.fallback_round_duration);
        info!(
            phase = ?resolution.phase,
            epoch = %resolution.epoch,
            can_buzz = resolution.can_buzz,
            "restoring from snapshot"
        );

        self.guard.reset(resolution.epoch);
        self.machine.restore(resolution.phase.clone());
        if let Some(room_code) = snapshot.room_code {
            self.room_code = Some(room_code);
        }
        if snapshot.content.is_some() {
            self.content = snapshot.content;
        }
        self.play_mode = snapshot.play_mode;
        self.roster = Roster::from_lists(snapshot.players, snapshot.teams);

        self.lobby_at = None;
        self.resolved_buzzes.clear();
        self.round_credited = false;
        self.judged.clear();
        self.last_result = None;
        self.already_buzzed = resolution.already_buzzed;

        match snapshot.round.as_ref() {
            Some(round) => self.modes.reset(round),
            None => self.modes.set_mode(snapshot.mode),
        }
        let trivia = snapshot.round.as_ref().is_some_and(RoundSnapshot::is_trivia);
        self.round = snapshot.round;

        let epoch = resolution.epoch;
        self.timer = TimerController::new(if trivia {
            self.config.trivia_warning
        } else {
            self.config.timer_warning
        });
        if let Some(plan) = resolution.timer {
            self.timer
                .start_with_remaining(plan.duration, plan.remaining, now, epoch);
            if plan.paused {
                self.timer.pause(now);
            }
        }
        self.answer_timer.clear();
        if matches!(resolution.phase, Phase::Locked(_)) {
            self.answer_timer
                .start(self.config.answer_window, now, epoch);
        }

        match resolution.audio {
            AudioPlan::Play {
                source,
                offset_secs,
            } => {
                if self.audio.is_active_source(&source) {
                    self.audio.resume();
                } else {
                    self.audio.play(&source, offset_secs);
                }
            }
            AudioPlan::Prepare {
                source,
                offset_secs,
            } => {
                if self.audio.is_active_source(&source) {
                    self.audio.pause();
                } else {
                    self.audio.prepare(&source, offset_secs);
                }
            }
            AudioPlan::Silent => self.audio.stop(),
        }

        if resolution.can_buzz {
            self.buzz.enable();
        } else {
            self.buzz.disable();
        }
        if matches!(resolution.phase, Phase::Result | Phase::TriviaResult) {
            self.lobby_at = Some((now + self.config.result_display, epoch));
        }
    }

    /// Advance countdowns and deadlines. Called on every tick of the session loop.
    pub fn tick(&mut self, now: Instant) -> Step {
        let mut step = Step::default();
        let epoch = self.guard.current();

        if let Some((deadline, scheduled)) = self.lobby_at {
            if scheduled != epoch {
                debug!(%scheduled, current = %epoch, "discarding lobby return");
                self.lobby_at = None;
            } else if now >= deadline {
                self.lobby_at = None;
                if self.transition(PhaseEvent::ResultElapsed) {
                    info!("result window elapsed; back to lobby");
                }
            }
        }

        for boundary in self.timer.tick(now, epoch) {
            match boundary {
                TimerBoundary::Entered => {}
                TimerBoundary::Warning => step.cue(Cue::Warning),
                TimerBoundary::Expired => self.on_timer_expired(&mut step),
            }
        }
        if self
            .answer_timer
            .tick(now, epoch)
            .contains(&TimerBoundary::Expired)
        {
            step.cue(Cue::Timeout);
        }

        if let Some(err) = self.buzz.check_timeout(now, self.machine.phase()) {
            self.diagnostics.record(&err);
        }
        step
    }

    fn on_timer_expired(&mut self, step: &mut Step) {
        match self.machine.phase() {
            Phase::RoundActive => {
                self.audio.pause();
                step.cue(Cue::Timeout);
            }
            Phase::TriviaQuestion => {
                if self.modes.begin_validation() && self.role == Role::Host {
                    if let Some(room_code) = self.room_code.clone() {
                        info!("question countdown over; validating");
                        step.send(OutboundCommand::ValidateQcm(RoomPayload { room_code }));
                    }
                }
                step.cue(Cue::Timeout);
            }
            _ => {}
        }
    }

    /// Feed an asynchronous audio backend signal.
    pub fn on_audio(&mut self, signal: AudioSignal) {
        if let Err(err) = self.audio.on_signal(signal) {
            self.last_error = Some(err.to_string());
            self.diagnostics.record(&EngineError::Media(err));
        }
    }

    /// Render-ready projection of the whole state.
    pub fn view(&self, now: Instant) -> GameView {
        GameView::build(self, now)
    }

    /// Release audio and drop every pending countdown and deadline.
    pub fn dispose(&mut self) {
        self.audio.stop();
        self.timer.clear();
        self.answer_timer.clear();
        self.buzz.disable();
        self.lobby_at = None;
        info!(role = self.role.label(), "engine disposed");
    }

    pub(crate) fn is_player(&self) -> bool {
        matches!(self.role, Role::Player(_))
    }

    /// Whether a buzz may be sent right now.
    pub fn can_buzz(&self) -> bool {
        self.is_player() && *self.machine.phase() == Phase::RoundActive && self.buzz.can_buzz()
    }

    fn transition(&mut self, event: PhaseEvent) -> bool {
        match self.machine.apply(event) {
            Ok(_) => true,
            Err(err) => {
                self.record_invalid(&err);
                false
            }
        }
    }

    fn record_invalid(&mut self, err: &InvalidTransition) {
        warn!(error = %err, "ignoring event that does not fit the current phase");
        self.diagnostics.invalid_transitions += 1;
    }

    fn close_round(&mut self, now: Instant) {
        self.timer.clear();
        self.answer_timer.clear();
        self.audio.stop();
        self.buzz.disable();
        self.lobby_at = Some((now + self.config.result_display, self.guard.current()));
    }

    fn replace_lists(
        &mut self,
        players: Option<Vec<PlayerRecord>>,
        teams: Option<Vec<TeamRecord>>,
    ) {
        if let Some(players) = players {
            self.roster.replace_players(players);
        }
        if let Some(teams) = teams {
            self.roster.replace_teams(teams);
        }
    }

    fn resolve_player(&self, id: Option<&str>, name: Option<&str>) -> Option<String> {
        id.map(str::to_string).or_else(|| {
            name.and_then(|name| self.roster.player_by_name(name))
                .map(|player| player.id.clone())
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::state::audio::testing::{AudioCall, RecordingBackend};
    use crate::state::epoch::Stage;
    use crate::state::modes::{Medal, ModeExtension};

    pub(crate) fn engine(role: Role) -> (SyncEngine, RecordingBackend) {
        let backend = RecordingBackend::default();
        let engine = SyncEngine::new(role, EngineConfig::default(), Box::new(backend.clone()));
        (engine, backend)
    }

    pub(crate) fn alice() -> Role {
        let mut role = Role::player("Alice");
        role.bind_player_id("p1".into());
        role
    }

    fn round_started(round: u32, mode: &str) -> Value {
        json!({
            "roundNumber": round,
            "mode": mode,
            "track": { "previewUrl": format!("https://cdn/{round}.mp3") },
        })
    }

    fn players() -> Value {
        json!([
            { "id": "p1", "name": "Alice", "score": 100 },
            { "id": "p2", "name": "Bob", "score": 40 },
        ])
    }

    fn score(engine: &SyncEngine, id: &str) -> i64 {
        engine.roster().player(id).map(|player| player.score).unwrap_or_default()
    }

    #[test]
    fn duplicate_round_started_is_idempotent() {
        let (mut engine, backend) = engine(alice());
        let t0 = Instant::now();

        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        let version = engine.machine.version();
        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);

        assert_eq!(engine.machine.version(), version);
        assert_eq!(engine.phase(), &Phase::RoundActive);
        assert_eq!(backend.live_handles().len(), 1);
        assert!(engine.can_buzz());
    }

    #[test]
    fn buzz_after_result_is_stale() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        engine.handle_event("round_started", round_started(4, "accumul_points"), t0);
        engine.handle_event("round_result", json!({ "roundNumber": 4, "correct": false }), t0);
        assert_eq!(engine.phase(), &Phase::Result);

        let step = engine.handle_event(
            "buzz_locked",
            json!({ "roundNumber": 4, "playerId": "p2", "playerName": "Bob" }),
            t0,
        );

        assert!(step.is_empty());
        assert_eq!(engine.phase(), &Phase::Result);
        assert_eq!(engine.epoch(), Epoch::new(4, Stage::Closed));
        assert_eq!(engine.diagnostics().stale_dropped, 1);
    }

    #[test]
    fn new_round_discards_previous_mode_state() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        let mut bomb = round_started(1, "chaud_devant");
        bomb["bombHolder"] = json!("p1");
        engine.handle_event("round_started", bomb, t0);
        assert!(matches!(
            engine.modes.extension(),
            ModeExtension::Bomb(state) if state.holder.as_deref() == Some("p1")
        ));

        engine.handle_event("round_started", round_started(2, "accumul_points"), t0);
        assert_eq!(engine.modes.extension(), &ModeExtension::Classic);

        engine.handle_event("bomb_passed", json!({ "bombHolder": "p2" }), t0);
        assert_eq!(engine.modes.extension(), &ModeExtension::Classic);
        assert_eq!(engine.diagnostics().protocol_errors, 1);
    }

    #[test]
    fn reconnection_with_own_buzz_restores_locked() {
        let (mut engine, backend) = engine(alice());
        let t0 = Instant::now();

        engine.handle_event(
            "game_state",
            json!({
                "roomCode": "AB12",
                "phase": "playing",
                "roundNumber": 3,
                "players": players(),
                "currentTrack": { "previewUrl": "https://cdn/3.mp3" },
                "timerDuration": 30,
                "timeRemaining": 12,
                "elapsed": 18,
                "buzzedPlayers": ["p1"],
            }),
            t0,
        );

        assert!(matches!(engine.phase(), Phase::Locked(buzz) if buzz.player_id.as_deref() == Some("p1")));
        assert!(!engine.can_buzz());
        assert!(engine.timer.is_paused());
        assert_eq!(engine.timer.remaining(t0), Some(Duration::from_secs(12)));
        let calls = backend.calls();
        assert!(matches!(calls.as_slice(), [AudioCall::Create(1, source, ..)] if source == "https://cdn/3.mp3"));
    }

    #[test]
    fn ranked_medal_then_leaderboard() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        engine.handle_event("game_state", json!({ "phase": "lobby", "players": players() }), t0);
        engine.handle_event("round_started", round_started(1, "reflexoquiz"), t0);
        let step = engine.handle_event(
            "buzz_locked",
            json!({ "playerId": "p1", "playerName": "Alice", "position": 1 }),
            t0,
        );

        assert_eq!(step.cues().count(), 1);
        match engine.modes.extension() {
            ModeExtension::Ranked(ranked) => assert_eq!(ranked.buzzes[0].medal, Some(Medal::Gold)),
            other => panic!("expected ranked state, got {other:?}"),
        }
        assert_eq!(score(&engine, "p1"), 100);

        engine.handle_event(
            "round_result",
            json!({
                "correct": true,
                "winnerId": "p1",
                "points": 15,
                "leaderboard": [
                    { "id": "p1", "name": "Alice", "score": 115 },
                    { "id": "p2", "name": "Bob", "score": 40 },
                ],
            }),
            t0,
        );

        assert_eq!(score(&engine, "p1"), 115);
        assert_eq!(engine.phase(), &Phase::Result);
    }

    #[test]
    fn buzz_freezes_audio_and_countdown() {
        let (mut engine, backend) = engine(alice());
        let t0 = Instant::now();

        engine.handle_event(
            "round_started",
            json!({ "roundNumber": 1, "mode": "accumul_points" }),
            t0,
        );
        engine.handle_event(
            "play_track",
            json!({ "previewUrl": "https://cdn/a.mp3", "duration": 10 }),
            t0,
        );
        let t3 = t0 + Duration::from_secs(3);
        engine.handle_event("buzz_locked", json!({ "playerId": "p2", "playerName": "Bob" }), t3);

        assert!(engine.timer.is_paused());
        assert_eq!(engine.timer.remaining(t3 + Duration::from_secs(5)), Some(Duration::from_secs(7)));
        assert_eq!(backend.calls().last(), Some(&AudioCall::Pause(1)));

        let t5 = t0 + Duration::from_secs(5);
        engine.handle_event("wrong_answer_continue", json!({ "playerId": "p2" }), t5);
        assert!(!engine.timer.is_paused());
        assert_eq!(engine.timer.remaining(t5), Some(Duration::from_secs(7)));
        assert_eq!(backend.calls().last(), Some(&AudioCall::Play(1)));
        assert!(engine.can_buzz());
    }

    #[test]
    fn continue_wins_over_replayed_buzz() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        let bob = json!({ "playerId": "p2", "playerName": "Bob", "timestamp": 1_700_000_000_000_i64 });

        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        engine.handle_event("buzz_locked", bob.clone(), t0);
        engine.handle_event("round_continuing", json!({}), t0);
        let step = engine.handle_event("buzz_locked", bob, t0);

        assert!(step.is_empty());
        assert_eq!(engine.phase(), &Phase::RoundActive);
    }

    #[test]
    fn unacknowledged_buzz_is_released() {
        let (mut engine, _backend) = engine(alice());
        let t0 = Instant::now();
        engine.room_code = Some("AB12".into());
        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);

        engine.dispatch(crate::state::commands::Intent::Buzz, t0).unwrap();
        assert!(!engine.can_buzz());

        engine.tick(t0 + Duration::from_millis(3_000));
        assert!(engine.can_buzz());
        assert_eq!(engine.diagnostics().command_timeouts, 1);
    }

    #[test]
    fn host_validates_question_once_on_expiry() {
        let (mut engine, _backend) = engine(Role::Host);
        let t0 = Instant::now();
        engine.room_code = Some("AB12".into());
        engine.handle_event(
            "round_started",
            json!({
                "roundNumber": 2,
                "mode": "qcm",
                "timerDuration": 10,
                "qcm": { "question": "Year?", "options": ["1984", "1990"] },
            }),
            t0,
        );
        assert_eq!(engine.phase(), &Phase::TriviaQuestion);

        let expired = engine.tick(t0 + Duration::from_secs(10));
        assert_eq!(
            expired.commands().collect::<Vec<_>>(),
            vec![&OutboundCommand::ValidateQcm(RoomPayload {
                room_code: "AB12".into()
            })]
        );

        let again = engine.tick(t0 + Duration::from_secs(11));
        assert_eq!(again.commands().count(), 0);
        assert!(matches!(
            engine.dispatch(crate::state::commands::Intent::ValidateQcmNow, t0),
            Err(crate::error::CommandError::Unavailable { .. })
        ));
    }

    #[test]
    fn lobby_return_is_cancelled_by_next_round() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        engine.handle_event("round_skipped", json!({}), t0);
        assert_eq!(engine.phase(), &Phase::Result);

        let t1 = t0 + Duration::from_secs(1);
        engine.handle_event("round_started", round_started(2, "accumul_points"), t1);
        engine.tick(t0 + Duration::from_secs(6));

        assert_eq!(engine.phase(), &Phase::RoundActive);
        assert_eq!(engine.epoch().round, 2);
    }

    #[test]
    fn result_falls_back_to_lobby_after_display_window() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        engine.handle_event("round_result", json!({ "correct": true }), t0);

        engine.tick(t0 + Duration::from_millis(4_999));
        assert_eq!(engine.phase(), &Phase::Result);
        engine.tick(t0 + Duration::from_secs(5));
        assert_eq!(engine.phase(), &Phase::Lobby);

        let step = engine.handle_event("play_track", json!({ "previewUrl": "https://cdn/x.mp3" }), t0);
        assert!(step.is_empty());
        assert_eq!(engine.phase(), &Phase::Lobby);
    }

    #[test]
    fn bomb_explosion_applies_once() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        engine.handle_event("game_state", json!({ "phase": "lobby", "players": players() }), t0);
        engine.handle_event("round_started", round_started(1, "chaud_devant"), t0);

        let explosion = json!({ "victimId": "p2", "victimName": "Bob", "pointsLost": 10 });
        engine.handle_event("bomb_exploded", explosion.clone(), t0);
        engine.handle_event("bomb_exploded", explosion, t0);

        assert_eq!(score(&engine, "p2"), 30);
    }

    #[test]
    fn repeated_verdict_credits_once() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        engine.handle_event("game_state", json!({ "phase": "lobby", "players": players() }), t0);
        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        engine.handle_event(
            "buzz_locked",
            json!({ "roundNumber": 1, "playerId": "p1", "playerName": "Alice" }),
            t0,
        );

        let verdict = json!({ "roundNumber": 1, "playerId": "p1", "points": 10 });
        let first = engine.handle_event("correct_answer", verdict.clone(), t0);
        let second = engine.handle_event("correct_answer", verdict, t0);

        assert_eq!(score(&engine, "p1"), 110);
        assert!(first.cues().any(|cue| *cue == Cue::Correct));
        assert!(second.is_empty());
        assert!(matches!(engine.phase(), Phase::Validating(_)));
    }

    #[test]
    fn repeated_continue_deducts_once() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        engine.handle_event("game_state", json!({ "phase": "lobby", "players": players() }), t0);
        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        engine.handle_event(
            "buzz_locked",
            json!({ "roundNumber": 1, "playerId": "p2", "playerName": "Bob" }),
            t0,
        );

        let dismissal = json!({ "roundNumber": 1, "playerId": "p2", "pointsLost": 5 });
        let first = engine.handle_event("wrong_answer_continue", dismissal.clone(), t0);
        let second = engine.handle_event("wrong_answer_continue", dismissal, t0);

        assert_eq!(score(&engine, "p2"), 35);
        assert!(first.cues().any(|cue| *cue == Cue::Wrong));
        assert!(second.is_empty());
        assert_eq!(engine.phase(), &Phase::RoundActive);
        assert_eq!(engine.diagnostics().invalid_transitions, 0);
    }

    #[test]
    fn out_of_range_durations_are_rejected_without_state_change() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();

        let step = engine.handle_event(
            "round_started",
            json!({ "roundNumber": 1, "mode": "accumul_points", "timerDuration": 1e30 }),
            t0,
        );
        assert!(step.is_empty());
        assert_eq!(engine.phase(), &Phase::Setup);
        assert_eq!(engine.diagnostics().protocol_errors, 1);

        engine.handle_event("round_started", round_started(1, "accumul_points"), t0);
        let remaining = engine.timer.remaining(t0);
        engine.handle_event("countdown_tick", json!({ "timeRemaining": 1e300 }), t0);
        assert_eq!(engine.diagnostics().protocol_errors, 2);
        assert_eq!(engine.timer.remaining(t0), remaining);
    }

    #[test]
    fn hint_index_beyond_delivered_list_is_rejected() {
        let (mut engine, _backend) = engine(Role::Display);
        let t0 = Instant::now();
        engine.handle_event(
            "round_started",
            json!({ "roundNumber": 1, "mode": "questions_rafale", "hints": ["1980s", "Synth"] }),
            t0,
        );

        engine.handle_event(
            "hint_revealed",
            json!({ "roundNumber": 1, "hintIndex": u64::MAX, "hint": "x" }),
            t0,
        );
        assert_eq!(engine.diagnostics().protocol_errors, 1);

        engine.handle_event("hint_revealed", json!({ "roundNumber": 1, "hintIndex": 0 }), t0);
        match engine.modes.extension() {
            ModeExtension::Hints(hints) => {
                assert_eq!(hints.current_hint_index, Some(0));
                assert_eq!(hints.revealed(), &["1980s".to_string()]);
            }
            other => panic!("expected hints extension, got {other:?}"),
        }
    }
}
