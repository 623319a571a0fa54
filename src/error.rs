use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use validator::ValidationErrors;

use crate::state::epoch::Epoch;

/// Failures reported by the audio backend. They never block phase progression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MediaError {
    /// The platform refused to start playback (autoplay policy and the like).
    #[error("playback blocked: {0}")]
    Blocked(String),
    /// The resource could not be loaded.
    #[error("failed to load media: {0}")]
    Load(String),
    /// Seeking to the requested offset failed; playback continues from the start.
    #[error("seek to {offset_secs}s failed: {reason}")]
    Seek {
        /// Requested offset in seconds.
        offset_secs: f64,
        /// Backend-provided reason.
        reason: String,
    },
}

/// Errors recovered inside the engine. None of them escapes to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Malformed or unexpected event shape; prior state is retained.
    #[error("protocol error in `{event}`: {reason}")]
    Protocol {
        /// Wire name of the offending event.
        event: String,
        /// Human readable cause.
        reason: String,
    },
    /// Event addressed to an epoch the engine already left.
    #[error("stale `{event}` for {epoch} dropped (current {current})")]
    Stale {
        /// Wire name of the dropped event.
        event: String,
        /// Epoch carried or inferred for the event.
        epoch: Epoch,
        /// Engine epoch at the time of receipt.
        current: Epoch,
    },
    /// No acknowledgment arrived within the bound; the outcome is unknown, not failed.
    #[error("no acknowledgment for `{command}` within {waited_ms} ms")]
    CommandTimeout {
        /// Wire name of the unacknowledged command.
        command: String,
        /// How long the engine waited.
        waited_ms: u64,
    },
    /// Playback or seek failure.
    #[error("media error: {0}")]
    Media(#[from] MediaError),
}

/// Errors returned when a local intent cannot be turned into an outbound command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The active role does not expose this command.
    #[error("`{command}` is not available to the {role} role")]
    NotPermitted {
        /// Wire name of the command.
        command: &'static str,
        /// Role label.
        role: &'static str,
    },
    /// The command exists for this role but the current view forbids it.
    #[error("`{command}` is unavailable: {reason}")]
    Unavailable {
        /// Wire name of the command.
        command: &'static str,
        /// Why the control is disabled.
        reason: String,
    },
    /// The payload failed local validation.
    #[error("invalid command payload: {0}")]
    Invalid(#[from] ValidationErrors),
    /// The transport is gone.
    #[error("connection closed")]
    Disconnected,
}

/// Counters for every locally recovered error, exposed on the view for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Events dropped by the epoch guard.
    pub stale_dropped: u64,
    /// Malformed or unknown events.
    pub protocol_errors: u64,
    /// Playback failures.
    pub media_errors: u64,
    /// Commands whose acknowledgment never arrived.
    pub command_timeouts: u64,
    /// Events that did not fit the current phase.
    pub invalid_transitions: u64,
}

impl Diagnostics {
    /// Log the error at its taxonomy level and bump the matching counter.
    pub fn record(&mut self, err: &EngineError) {
        match err {
            EngineError::Protocol { .. } => {
                warn!(error = %err, "ignoring malformed event");
                self.protocol_errors += 1;
            }
            EngineError::Stale { .. } => {
                debug!(error = %err, "dropping stale event");
                self.stale_dropped += 1;
            }
            EngineError::CommandTimeout { .. } => {
                info!(error = %err, "command outcome unknown; re-enabling control");
                self.command_timeouts += 1;
            }
            EngineError::Media(media) => {
                warn!(error = %media, "continuing without audio");
                self.media_errors += 1;
            }
        }
    }
}
