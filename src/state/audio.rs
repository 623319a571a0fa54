//! Audio playback controller owning at most one active handle.
//!
//! Backends are fire-and-forget: every call returns immediately and failures come
//! back later as [`AudioSignal::Failed`] through the session's side channel.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::MediaError;

/// Identifier of a handle created by the controller.
pub type HandleId = u64;

/// Platform audio primitives driven by the controller.
pub trait AudioBackend: Send {
    /// Create a handle for `source`. Metadata is reported asynchronously.
    fn create(&mut self, id: HandleId, source: &str, volume: f32, muted: bool);
    /// Start or resume playback.
    fn play(&mut self, id: HandleId);
    /// Pause playback, keeping the position.
    fn pause(&mut self, id: HandleId);
    /// Move the playback position.
    fn seek(&mut self, id: HandleId, offset_secs: f64);
    /// Apply volume and mute.
    fn set_volume(&mut self, id: HandleId, volume: f32, muted: bool);
    /// Release the handle.
    fn dispose(&mut self, id: HandleId);
}

/// Asynchronous notifications coming back from the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioSignal {
    /// Enough metadata is available to seek.
    MetadataLoaded {
        /// Handle the metadata belongs to.
        handle: HandleId,
        /// Resource length in seconds.
        duration_secs: f64,
    },
    /// Playback reached the end of the resource.
    Ended {
        /// Finished handle.
        handle: HandleId,
    },
    /// Playback or seek failed.
    Failed {
        /// Failing handle.
        handle: HandleId,
        /// What went wrong.
        error: MediaError,
    },
}

/// Playback status projected on the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    /// Created and asked to play.
    Playing,
    /// Paused, by an event or created paused.
    Paused,
    /// Reached the end of the resource.
    Ended,
    /// The platform refused playback; the round continues silently.
    Blocked,
    /// The resource failed to load; the round continues silently.
    Failed,
}

/// Read-only projection of the active handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioState {
    /// Active handle.
    pub handle: HandleId,
    /// Played resource.
    pub source: String,
    /// Current status.
    pub status: PlaybackStatus,
    /// Offset waiting for metadata before it can be applied.
    pub pending_offset_secs: Option<f64>,
    /// Resource length once known.
    pub duration_secs: Option<f64>,
    /// Effective volume.
    pub volume: f32,
    /// Whether output is muted.
    pub muted: bool,
}

#[derive(Debug, Clone)]
struct ActiveAudio {
    id: HandleId,
    source: String,
    status: PlaybackStatus,
    requested_offset: Option<f64>,
    pending_offset: Option<f64>,
    duration: Option<f64>,
}

/// Owns zero or one active audio handle. Starting a new one disposes the previous.
pub struct AudioController {
    backend: Box<dyn AudioBackend>,
    active: Option<ActiveAudio>,
    next_id: HandleId,
    volume: f32,
    muted: bool,
}

impl std::fmt::Debug for AudioController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioController")
            .field("active", &self.active)
            .field("volume", &self.volume)
            .field("muted", &self.muted)
            .finish()
    }
}

impl AudioController {
    /// Wrap `backend` with an initial volume.
    pub fn new(backend: Box<dyn AudioBackend>, volume: f32) -> Self {
        Self {
            backend,
            active: None,
            next_id: 1,
            volume: volume.clamp(0.0, 1.0),
            muted: false,
        }
    }

    /// Start playing `source`, seeking to `offset_secs` once metadata allows it.
    pub fn play(&mut self, source: &str, offset_secs: Option<f64>) -> HandleId {
        let id = self.open(source, offset_secs);
        self.backend.play(id);
        if let Some(active) = self.active.as_mut() {
            active.status = PlaybackStatus::Playing;
        }
        id
    }

    /// Create a paused handle for `source`; a later [`resume`](Self::resume) starts it.
    pub fn prepare(&mut self, source: &str, offset_secs: Option<f64>) -> HandleId {
        self.open(source, offset_secs)
    }

    fn open(&mut self, source: &str, offset_secs: Option<f64>) -> HandleId {
        self.stop();

        let id = self.next_id;
        self.next_id += 1;
        self.backend.create(id, source, self.volume, self.muted);
        let offset = offset_secs.filter(|offset| *offset > 0.0);
        self.active = Some(ActiveAudio {
            id,
            source: source.to_string(),
            status: PlaybackStatus::Paused,
            requested_offset: offset,
            pending_offset: offset,
            duration: None,
        });
        debug!(handle = id, source, ?offset, "audio handle created");
        id
    }

    /// Pause the active handle; no-op without one.
    pub fn pause(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if active.status == PlaybackStatus::Playing {
                self.backend.pause(active.id);
                active.status = PlaybackStatus::Paused;
            }
        }
    }

    /// Resume the active handle; no-op without one.
    pub fn resume(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if matches!(
                active.status,
                PlaybackStatus::Paused | PlaybackStatus::Blocked
            ) {
                self.backend.play(active.id);
                active.status = PlaybackStatus::Playing;
            }
        }
    }

    /// Dispose the active handle; no-op without one.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            self.backend.dispose(active.id);
            debug!(handle = active.id, "audio handle disposed");
        }
    }

    /// Set the volume for the current handle and every later one.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.push_volume();
    }

    /// Mute or unmute the current handle and every later one.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.push_volume();
    }

    fn push_volume(&mut self) {
        if let Some(active) = self.active.as_ref() {
            self.backend
                .set_volume(active.id, self.volume, self.muted);
        }
    }

    /// Whether `source` is the active handle's resource.
    pub fn is_active_source(&self, source: &str) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.source == source)
    }

    /// Whether `source` is active and was started at `offset_secs`.
    pub fn is_same_cue(&self, source: &str, offset_secs: Option<f64>) -> bool {
        let offset = offset_secs.filter(|offset| *offset > 0.0);
        self.active
            .as_ref()
            .is_some_and(|active| active.source == source && active.requested_offset == offset)
    }

    /// Feed a backend signal. Signals for disposed handles are ignored.
    pub fn on_signal(&mut self, signal: AudioSignal) -> Result<(), MediaError> {
        let handle = match &signal {
            AudioSignal::MetadataLoaded { handle, .. }
            | AudioSignal::Ended { handle }
            | AudioSignal::Failed { handle, .. } => *handle,
        };
        let Some(active) = self.active.as_mut().filter(|active| active.id == handle) else {
            debug!(handle, "ignoring signal for inactive audio handle");
            return Ok(());
        };

        match signal {
            AudioSignal::MetadataLoaded { duration_secs, .. } => {
                active.duration = Some(duration_secs);
                if let Some(offset) = active.pending_offset.take() {
                    if offset < duration_secs {
                        self.backend.seek(active.id, offset);
                    } else {
                        info!(
                            handle,
                            offset, duration_secs, "start offset beyond track end; playing from 0"
                        );
                    }
                }
                Ok(())
            }
            AudioSignal::Ended { .. } => {
                active.status = PlaybackStatus::Ended;
                Ok(())
            }
            AudioSignal::Failed { error, .. } => {
                match &error {
                    MediaError::Blocked(_) => active.status = PlaybackStatus::Blocked,
                    MediaError::Load(_) => active.status = PlaybackStatus::Failed,
                    // playback carries on from the start
                    MediaError::Seek { .. } => {}
                }
                Err(error)
            }
        }
    }

    /// Projection of the active handle.
    pub fn state(&self) -> Option<AudioState> {
        self.active.as_ref().map(|active| AudioState {
            handle: active.id,
            source: active.source.clone(),
            status: active.status,
            pending_offset_secs: active.pending_offset,
            duration_secs: active.duration,
            volume: self.volume,
            muted: self.muted,
        })
    }
}

/// Backend that only traces calls; used by the replay binary and headless clients.
#[derive(Debug, Default)]
pub struct LoggingBackend;

impl AudioBackend for LoggingBackend {
    fn create(&mut self, id: HandleId, source: &str, volume: f32, muted: bool) {
        info!(handle = id, source, volume, muted, "audio create");
    }

    fn play(&mut self, id: HandleId) {
        info!(handle = id, "audio play");
    }

    fn pause(&mut self, id: HandleId) {
        info!(handle = id, "audio pause");
    }

    fn seek(&mut self, id: HandleId, offset_secs: f64) {
        info!(handle = id, offset_secs, "audio seek");
    }

    fn set_volume(&mut self, id: HandleId, volume: f32, muted: bool) {
        info!(handle = id, volume, muted, "audio volume");
    }

    fn dispose(&mut self, id: HandleId) {
        info!(handle = id, "audio dispose");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::{AudioBackend, HandleId};

    /// Calls observed by [`RecordingBackend`].
    #[derive(Debug, Clone, PartialEq)]
    pub enum AudioCall {
        Create(HandleId, String, f32, bool),
        Play(HandleId),
        Pause(HandleId),
        Seek(HandleId, f64),
        Volume(HandleId, f32, bool),
        Dispose(HandleId),
    }

    /// Backend recording every call, with a shared log tests can inspect.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingBackend {
        pub calls: Arc<Mutex<Vec<AudioCall>>>,
    }

    impl RecordingBackend {
        pub fn calls(&self) -> Vec<AudioCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Handles created and not yet disposed.
        pub fn live_handles(&self) -> Vec<HandleId> {
            let mut live = Vec::new();
            for call in self.calls() {
                match call {
                    AudioCall::Create(id, ..) => live.push(id),
                    AudioCall::Dispose(id) => live.retain(|handle| *handle != id),
                    _ => {}
                }
            }
            live
        }

        fn push(&self, call: AudioCall) {
            self.calls.lock().unwrap().push(call);
        }
    }

    impl AudioBackend for RecordingBackend {
        fn create(&mut self, id: HandleId, source: &str, volume: f32, muted: bool) {
            self.push(AudioCall::Create(id, source.into(), volume, muted));
        }

        fn play(&mut self, id: HandleId) {
            self.push(AudioCall::Play(id));
        }

        fn pause(&mut self, id: HandleId) {
            self.push(AudioCall::Pause(id));
        }

        fn seek(&mut self, id: HandleId, offset_secs: f64) {
            self.push(AudioCall::Seek(id, offset_secs));
        }

        fn set_volume(&mut self, id: HandleId, volume: f32, muted: bool) {
            self.push(AudioCall::Volume(id, volume, muted));
        }

        fn dispose(&mut self, id: HandleId) {
            self.push(AudioCall::Dispose(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{AudioCall, RecordingBackend};
    use super::*;

    fn controller() -> (AudioController, RecordingBackend) {
        let backend = RecordingBackend::default();
        (AudioController::new(Box::new(backend.clone()), 0.7), backend)
    }

    #[test]
    fn starting_a_track_disposes_the_previous_handle() {
        let (mut audio, backend) = controller();
        let first = audio.play("https://cdn/a.mp3", None);
        let second = audio.play("https://cdn/b.mp3", None);

        assert_ne!(first, second);
        assert_eq!(backend.live_handles(), vec![second]);
        assert!(backend.calls().contains(&AudioCall::Dispose(first)));
    }

    #[test]
    fn controls_are_noops_without_a_handle() {
        let (mut audio, backend) = controller();
        audio.pause();
        audio.resume();
        audio.stop();

        assert!(backend.calls().is_empty());
        assert!(audio.state().is_none());
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let (mut audio, backend) = controller();
        let id = audio.play("https://cdn/a.mp3", None);
        audio.pause();
        audio.pause();
        audio.resume();
        audio.resume();

        let pauses = backend
            .calls()
            .into_iter()
            .filter(|call| *call == AudioCall::Pause(id))
            .count();
        assert_eq!(pauses, 1);
        assert_eq!(audio.state().unwrap().status, PlaybackStatus::Playing);
    }

    #[test]
    fn offset_is_applied_once_metadata_arrives() {
        let (mut audio, backend) = controller();
        let id = audio.play("https://cdn/a.mp3", Some(12.5));
        assert!(!backend.calls().contains(&AudioCall::Seek(id, 12.5)));

        audio
            .on_signal(AudioSignal::MetadataLoaded {
                handle: id,
                duration_secs: 30.0,
            })
            .unwrap();
        assert!(backend.calls().contains(&AudioCall::Seek(id, 12.5)));
        assert_eq!(audio.state().unwrap().pending_offset_secs, None);
    }

    #[test]
    fn offset_beyond_duration_falls_back_to_start() {
        let (mut audio, backend) = controller();
        let id = audio.play("https://cdn/a.mp3", Some(45.0));
        audio
            .on_signal(AudioSignal::MetadataLoaded {
                handle: id,
                duration_secs: 30.0,
            })
            .unwrap();

        assert!(
            !backend
                .calls()
                .iter()
                .any(|call| matches!(call, AudioCall::Seek(..)))
        );
        assert_eq!(audio.state().unwrap().status, PlaybackStatus::Playing);
    }

    #[test]
    fn volume_applies_to_current_and_future_handles() {
        let (mut audio, backend) = controller();
        let first = audio.play("https://cdn/a.mp3", None);
        audio.set_volume(0.3);
        audio.set_muted(true);
        let second = audio.play("https://cdn/b.mp3", None);

        let calls = backend.calls();
        assert!(calls.contains(&AudioCall::Volume(first, 0.3, true)));
        assert!(calls.contains(&AudioCall::Create(
            second,
            "https://cdn/b.mp3".into(),
            0.3,
            true
        )));
    }

    #[test]
    fn blocked_playback_is_reported_without_dropping_the_handle() {
        let (mut audio, _backend) = controller();
        let id = audio.play("https://cdn/a.mp3", None);

        let err = audio
            .on_signal(AudioSignal::Failed {
                handle: id,
                error: MediaError::Blocked("autoplay".into()),
            })
            .unwrap_err();
        assert_eq!(err, MediaError::Blocked("autoplay".into()));
        assert_eq!(audio.state().unwrap().status, PlaybackStatus::Blocked);
    }

    #[test]
    fn signals_for_disposed_handles_are_ignored() {
        let (mut audio, _backend) = controller();
        let stale = audio.play("https://cdn/a.mp3", None);
        audio.play("https://cdn/b.mp3", None);

        assert!(
            audio
                .on_signal(AudioSignal::Failed {
                    handle: stale,
                    error: MediaError::Load("404".into()),
                })
                .is_ok()
        );
        assert_eq!(audio.state().unwrap().status, PlaybackStatus::Playing);
    }
}
