//! Transcript replayer: feeds a recorded JSON-lines session through the engine and prints
//! every resulting view.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context;
use blindtest_sync::{
    config::EngineConfig,
    dto::view::GameView,
    state::{
        audio::LoggingBackend,
        commands::Intent,
        engine::{Effect, Step, SyncEngine},
        role::Role,
    },
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, BufReader},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "blindtest-sync")]
#[command(about = "Blind-test view synchronization tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Replay a JSON-lines transcript and print every view")]
    Replay {
        #[arg(help = "Transcript file, one event or intent per line")]
        path: PathBuf,

        #[arg(long, default_value = "display", value_parser = parse_role)]
        #[arg(help = "host, display or player:<name>")]
        role: Role,

        #[arg(long)]
        #[arg(help = "Room code to join before replaying")]
        room: Option<String>,
    },
}

/// One transcript entry: either a server event or a local intent.
#[derive(Debug, Deserialize)]
struct TranscriptLine {
    at_ms: u64,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    intent: Option<Intent>,
}

#[derive(Debug, Serialize)]
struct ReplayOutput<'a> {
    at_ms: u64,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    effects: &'a [Effect],
    view: GameView,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let Commands::Replay { path, role, room } = Cli::parse().command;
    replay(&path, role, room.as_deref()).await
}

async fn replay(path: &Path, role: Role, room: Option<&str>) -> anyhow::Result<()> {
    let config = EngineConfig::load();
    let tick = config.tick_interval;

    let mut engine = SyncEngine::new(role, config, Box::new(LoggingBackend));
    let base = Instant::now();

    if let Some(room) = room {
        let command = engine.join_command(room).context("building join command")?;
        info!(command = command.name(), "join command");
    }

    let file = File::open(path)
        .await
        .with_context(|| format!("opening transcript {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut clock_ms: u64 = 0;
    let mut line_number = 0usize;
    while let Some(raw) = lines.next_line().await.context("reading transcript")? {
        line_number += 1;
        if raw.trim().is_empty() {
            continue;
        }
        let line: TranscriptLine = match serde_json::from_str(&raw) {
            Ok(line) => line,
            Err(err) => {
                warn!(line = line_number, error = %err, "skipping malformed transcript line");
                continue;
            }
        };

        clock_ms = advance(&mut engine, base, clock_ms, line.at_ms, tick)?;
        let now = base + Duration::from_millis(line.at_ms);

        match (line.event, line.intent) {
            (Some(event), _) => {
                let step = engine.handle_event(&event, line.payload, now);
                emit(&engine, line.at_ms, &event, None, &step, now)?;
            }
            (None, Some(intent)) => match engine.dispatch(intent, now) {
                Ok(step) => emit(&engine, line.at_ms, "intent", None, &step, now)?,
                Err(err) => {
                    warn!(line = line_number, error = %err, "intent rejected");
                    emit(
                        &engine,
                        line.at_ms,
                        "intent",
                        Some(err.to_string()),
                        &Step::default(),
                        now,
                    )?;
                }
            },
            (None, None) => {
                warn!(line = line_number, "transcript line has neither event nor intent");
            }
        }
    }

    engine.dispose();
    info!(lines = line_number, "replay finished");
    Ok(())
}

/// Tick the engine on its cadence from `from_ms` up to `to_ms`, printing non-empty steps.
fn advance(
    engine: &mut SyncEngine,
    base: Instant,
    from_ms: u64,
    to_ms: u64,
    tick: Duration,
) -> anyhow::Result<u64> {
    let step_ms = u64::try_from(tick.as_millis()).unwrap_or(u64::MAX).max(1);
    let mut at_ms = from_ms;
    while at_ms.saturating_add(step_ms) <= to_ms {
        at_ms += step_ms;
        let now = base + Duration::from_millis(at_ms);
        let step = engine.tick(now);
        if !step.is_empty() {
            emit(engine, at_ms, "tick", None, &step, now)?;
        }
    }
    Ok(at_ms)
}

fn emit(
    engine: &SyncEngine,
    at_ms: u64,
    source: &str,
    error: Option<String>,
    step: &Step,
    now: Instant,
) -> anyhow::Result<()> {
    let output = ReplayOutput {
        at_ms,
        source,
        error,
        effects: &step.effects,
        view: engine.view(now),
    };
    println!("{}", serde_json::to_string(&output).context("serializing view")?);
    Ok(())
}

fn parse_role(value: &str) -> Result<Role, String> {
    match value {
        "host" => Ok(Role::Host),
        "display" => Ok(Role::Display),
        other => match other.strip_prefix("player:") {
            Some(name) if !name.trim().is_empty() => Ok(Role::player(name.trim())),
            _ => Err(format!("invalid role `{other}`; expected host, display or player:<name>")),
        },
    }
}

/// Configure tracing subscribers; logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replay_args(args: &[&str]) -> Result<(PathBuf, Role, Option<String>), clap::Error> {
        let argv = std::iter::once("blindtest-sync").chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv)?;
        let Commands::Replay { path, role, room } = cli.command;
        Ok((path, role, room))
    }

    #[test]
    fn parses_player_role_and_room() {
        let (path, role, room) = replay_args(&[
            "replay",
            "session.jsonl",
            "--role",
            "player:Alice",
            "--room",
            "ab12",
        ])
        .unwrap();
        assert_eq!(path, PathBuf::from("session.jsonl"));
        assert_eq!(role.player_name(), Some("Alice"));
        assert_eq!(room.as_deref(), Some("ab12"));
    }

    #[test]
    fn role_defaults_to_display() {
        let (_, role, room) = replay_args(&["replay", "session.jsonl"]).unwrap();
        assert_eq!(role, Role::Display);
        assert!(room.is_none());
    }

    #[test]
    fn rejects_unknown_roles_and_commands() {
        assert!(replay_args(&["play", "x.jsonl"]).is_err());
        assert!(replay_args(&["replay", "x.jsonl", "--role", "player:"]).is_err());
        assert!(replay_args(&["replay", "x.jsonl", "--role", "judge"]).is_err());
    }

    #[test]
    fn transcript_lines_carry_events_or_intents() {
        let line: TranscriptLine =
            serde_json::from_str(r#"{"at_ms": 1200, "intent": {"type": "buzz"}}"#).unwrap();
        assert_eq!(line.at_ms, 1200);
        assert_eq!(line.intent, Some(Intent::Buzz));
        assert!(line.event.is_none());
    }
}
