//! Cooperative session loop around a [`SyncEngine`].
//!
//! One task owns the engine. Inbound frames, user intents, audio backend signals and the
//! tick source are multiplexed with `tokio::select!`, so every engine call runs to
//! completion before the next one starts and no locking is needed.

use std::time::{Duration, Instant};

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::dto::outbound::OutboundCommand;
use crate::dto::view::GameView;
use crate::error::CommandError;
use crate::state::audio::AudioSignal;
use crate::state::commands::Intent;
use crate::state::engine::{Cue, Effect, Step, SyncEngine};

const CUE_CAPACITY: usize = 32;

/// Raw server event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Wire event name.
    pub event: String,
    /// Untyped payload.
    #[serde(default)]
    pub payload: Value,
}

/// Outbound half of the transport.
pub trait Connection: Send {
    /// Emit a command toward the server.
    fn emit(&mut self, command: &OutboundCommand) -> Result<(), CommandError>;
    /// Release the transport.
    fn close(&mut self);
}

/// In-process [`Connection`] forwarding commands over an mpsc channel.
#[derive(Debug)]
pub struct ChannelConnection {
    tx: Option<mpsc::UnboundedSender<OutboundCommand>>,
}

impl ChannelConnection {
    /// Connection and the receiver observing every emitted command.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutboundCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }
}

impl Connection for ChannelConnection {
    fn emit(&mut self, command: &OutboundCommand) -> Result<(), CommandError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(CommandError::Disconnected);
        };
        tx.send(command.clone())
            .map_err(|_| CommandError::Disconnected)
    }

    fn close(&mut self) {
        self.tx = None;
    }
}

/// Input streams consumed by [`GameSession::run`].
#[derive(Debug)]
pub struct SessionInputs {
    /// Server events.
    pub frames: mpsc::UnboundedReceiver<Frame>,
    /// Local user intents.
    pub intents: mpsc::UnboundedReceiver<Intent>,
    /// Audio backend notifications.
    pub audio: mpsc::UnboundedReceiver<AudioSignal>,
}

/// Engine, transport and view publication for one client.
pub struct GameSession<C: Connection> {
    engine: SyncEngine,
    connection: C,
    view_tx: watch::Sender<GameView>,
    cue_tx: broadcast::Sender<Cue>,
    tick_interval: Duration,
}

impl<C: Connection> GameSession<C> {
    /// Wrap `engine`, ticking every `tick_interval`.
    pub fn new(engine: SyncEngine, connection: C, tick_interval: Duration) -> Self {
        let (view_tx, _view_rx) = watch::channel(engine.view(Instant::now()));
        let (cue_tx, _cue_rx) = broadcast::channel(CUE_CAPACITY);
        Self {
            engine,
            connection,
            view_tx,
            cue_tx,
            tick_interval,
        }
    }

    /// Send the role's join command for `room_code`.
    pub fn connect(&mut self, room_code: &str) -> Result<(), CommandError> {
        let command = self.engine.join_command(room_code)?;
        self.connection.emit(&command)?;
        info!(room_code, role = self.engine.role().label(), "join sent");
        self.publish(Instant::now());
        Ok(())
    }

    /// Receiver of the latest view.
    pub fn subscribe(&self) -> watch::Receiver<GameView> {
        self.view_tx.subscribe()
    }

    /// Receiver of one-shot cues.
    pub fn subscribe_cues(&self) -> broadcast::Receiver<Cue> {
        self.cue_tx.subscribe()
    }

    /// Cues as a stream. A slow consumer skips lagged cues instead of ending the stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn cue_stream(&self) -> impl Stream<Item = Cue> + use<C> {
        let mut receiver = self.cue_tx.subscribe();
        let (tx, rx) = mpsc::channel::<Cue>(8);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    received = receiver.recv() => match received {
                        Ok(cue) => {
                            if tx.send(cue).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "cue consumer lagging");
                        }
                    },
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Wrapped engine.
    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Drive the engine until the transport closes or the user leaves, then dispose.
    pub async fn run(mut self, mut inputs: SessionInputs) -> SyncEngine {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = inputs.frames.recv() => {
                    let Some(frame) = frame else {
                        info!("transport closed; ending session");
                        break;
                    };
                    let now = Instant::now();
                    let step = self.engine.handle_event(&frame.event, frame.payload, now);
                    self.flush(step, now);
                }
                Some(intent) = inputs.intents.recv() => {
                    let now = Instant::now();
                    let leaving = matches!(intent, Intent::Leave);
                    match self.engine.dispatch(intent, now) {
                        Ok(step) => self.flush(step, now),
                        Err(err) => warn!(error = %err, "intent rejected"),
                    }
                    if leaving {
                        info!("left the room; ending session");
                        break;
                    }
                }
                Some(signal) = inputs.audio.recv() => {
                    self.engine.on_audio(signal);
                    self.publish(Instant::now());
                }
                _ = ticker.tick() => {
                    let now = Instant::now();
                    let step = self.engine.tick(now);
                    self.flush(step, now);
                }
            }
        }

        self.dispose();
        self.engine
    }

    /// Stop audio, drop pending deadlines and close the transport.
    pub fn dispose(&mut self) {
        self.engine.dispose();
        self.connection.close();
        self.publish(Instant::now());
    }

    fn flush(&mut self, step: Step, now: Instant) {
        for effect in step.effects {
            match effect {
                Effect::Send(command) => {
                    if let Err(err) = self.connection.emit(&command) {
                        warn!(command = command.name(), error = %err, "failed to emit command");
                    }
                }
                Effect::Cue(cue) => {
                    debug!(?cue, "cue");
                    // no subscriber is fine
                    let _ = self.cue_tx.send(cue);
                }
            }
        }
        self.publish(now);
    }

    fn publish(&self, now: Instant) {
        self.view_tx.send_replace(self.engine.view(now));
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::config::EngineConfig;
    use crate::dto::phase::VisiblePhase;
    use crate::state::audio::LoggingBackend;
    use crate::state::role::Role;

    fn frame(event: &str, payload: Value) -> Frame {
        Frame {
            event: event.into(),
            payload,
        }
    }

    #[tokio::test]
    async fn session_joins_buzzes_and_disposes() {
        let engine = SyncEngine::new(
            Role::player("Alice"),
            EngineConfig::default(),
            Box::new(LoggingBackend),
        );
        let (connection, mut outbound) = ChannelConnection::new();
        let mut session = GameSession::new(engine, connection, Duration::from_millis(20));
        session.connect("ab12").unwrap();
        let mut views = session.subscribe();
        let cues = session.cue_stream();
        tokio::pin!(cues);

        let (frames_tx, frames) = mpsc::unbounded_channel();
        let (intents_tx, intents) = mpsc::unbounded_channel();
        let (_audio_tx, audio) = mpsc::unbounded_channel();
        let task = tokio::spawn(session.run(SessionInputs {
            frames,
            intents,
            audio,
        }));

        frames_tx
            .send(frame("joined", json!({ "playerId": "p1" })))
            .unwrap();
        frames_tx
            .send(frame(
                "round_started",
                json!({ "roundNumber": 1, "mode": "accumul_points", "timerDuration": 30 }),
            ))
            .unwrap();
        views
            .wait_for(|view| view.phase == VisiblePhase::Playing)
            .await
            .unwrap();

        intents_tx.send(Intent::Buzz).unwrap();

        match outbound.recv().await {
            Some(OutboundCommand::JoinGame(payload)) => assert_eq!(payload.room_code, "AB12"),
            other => panic!("expected join command, got {other:?}"),
        }
        match outbound.recv().await {
            Some(OutboundCommand::Buzz(payload)) => assert_eq!(payload.room_code, "AB12"),
            other => panic!("expected buzz command, got {other:?}"),
        }

        frames_tx
            .send(frame(
                "buzz_locked",
                json!({ "roundNumber": 1, "playerId": "p1", "playerName": "Alice", "buzzerSound": 3 }),
            ))
            .unwrap();
        assert_eq!(
            cues.next().await,
            Some(Cue::BuzzerSound {
                player_name: "Alice".into(),
                sound: Some(3),
            })
        );
        views
            .wait_for(|view| view.phase == VisiblePhase::Buzzed)
            .await
            .unwrap();

        drop(frames_tx);
        let engine = task.await.unwrap();
        assert_eq!(engine.role().player_id(), Some("p1"));
        assert!(outbound.recv().await.is_none());
    }
}
