//! Engine-level configuration loading: tick cadence, display windows and audio defaults.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/sync.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "BLINDTEST_SYNC_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq)]
/// Immutable runtime configuration shared by every controller of the engine.
pub struct EngineConfig {
    /// Cadence of the single tick source driving countdowns and deadlines.
    pub tick_interval: Duration,
    /// How long the round result stays on screen before falling back to the lobby.
    pub result_display: Duration,
    /// How long an optimistic buzz waits for an acknowledgment before re-enabling control.
    pub buzz_ack_timeout: Duration,
    /// Remaining time under which the round countdown fires its warning boundary.
    pub timer_warning: Duration,
    /// Answer countdown shown while a buzz is locked.
    pub answer_window: Duration,
    /// Remaining time under which the trivia countdown fires its warning boundary.
    pub trivia_warning: Duration,
    /// Round duration assumed when the server omits one.
    pub fallback_round_duration: Duration,
    /// Initial playback volume in `0.0..=1.0`.
    pub default_volume: f32,
}

impl EngineConfig {
    /// Load the engine configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        tick_ms = config.tick_interval.as_millis() as u64,
                        "loaded sync engine config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    tick_interval_ms: u64,
    result_display_ms: u64,
    buzz_ack_timeout_ms: u64,
    timer_warning_ms: u64,
    answer_window_ms: u64,
    trivia_warning_ms: u64,
    fallback_round_duration_ms: u64,
    default_volume: f32,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            result_display_ms: 5_000,
            buzz_ack_timeout_ms: 3_000,
            timer_warning_ms: 3_000,
            answer_window_ms: 8_000,
            trivia_warning_ms: 5_000,
            fallback_round_duration_ms: 10_000,
            default_volume: 0.7,
        }
    }
}

impl From<RawConfig> for EngineConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            // a zero tick would spin the session loop
            tick_interval: Duration::from_millis(value.tick_interval_ms.max(10)),
            result_display: Duration::from_millis(value.result_display_ms),
            buzz_ack_timeout: Duration::from_millis(value.buzz_ack_timeout_ms),
            timer_warning: Duration::from_millis(value.timer_warning_ms),
            answer_window: Duration::from_millis(value.answer_window_ms),
            trivia_warning: Duration::from_millis(value.trivia_warning_ms),
            fallback_round_duration: Duration::from_millis(value.fallback_round_duration_ms),
            default_volume: value.default_volume.clamp(0.0, 1.0),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "result_display_ms": 2500, "default_volume": 3.0 }"#)
                .unwrap();
        let config = EngineConfig::from(raw);

        assert_eq!(config.result_display, Duration::from_millis(2_500));
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.default_volume, 1.0);
    }

    #[test]
    fn zero_tick_is_clamped() {
        let raw: RawConfig = serde_json::from_str(r#"{ "tick_interval_ms": 0 }"#).unwrap();
        assert_eq!(
            EngineConfig::from(raw).tick_interval,
            Duration::from_millis(10)
        );
    }
}
