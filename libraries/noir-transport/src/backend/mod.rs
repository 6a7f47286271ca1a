//! Audio backend boundary
//!
//! The backend is whatever actually decodes and plays audio: a dedicated
//! thread, a helper process, a platform media service. The transport talks to
//! it through [`AudioBackend`] commands and listens to it through
//! [`BackendEnvelope`] events. Commands complete with unpredictable latency and
//! events may arrive in any order relative to those completions.
//!
//! ```text
//!  TransportController ──commands──▶ AudioBackend
//!          ▲                              │
//!          └──── BackendEnvelope ◀────────┘  (progress ~10 Hz, seeking, ended…)
//! ```

mod mock;

pub use mock::{BackendCommand, CommandKind, MockBackend};

use crate::error::BackendError;
use crate::types::{TrackId, TrackRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result of a backend command
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Backend's own view of playback, returned by [`AudioBackend::query_state`]
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub is_playing: bool,
    pub position: f64,
    pub duration: f64,
}

/// Commands accepted by the audio backend
///
/// A failed command says nothing reliable about the backend's state afterwards;
/// callers re-query or fall back to a known-safe local state.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start playing a track from the beginning, replacing any current stream
    async fn play(&self, track: &TrackRef) -> BackendResult<()>;

    /// Start playing a track at an offset in seconds
    async fn play_at(&self, track: &TrackRef, position: f64) -> BackendResult<()>;

    async fn pause(&self) -> BackendResult<()>;

    async fn resume(&self) -> BackendResult<()>;

    /// Tear down the current stream
    async fn stop(&self) -> BackendResult<()>;

    /// Seek the current stream, in seconds
    async fn seek(&self, position: f64) -> BackendResult<()>;

    /// Set output volume, 0.0 to 1.0
    async fn set_volume(&self, volume: f32) -> BackendResult<()>;

    /// Hint the track likely to play next so it can be decoded ahead of time
    ///
    /// Best effort: the backend may swap to it gaplessly when the current
    /// track ends, and will then report progress tagged with its id.
    async fn preload_next(&self, track: &TrackRef) -> BackendResult<()>;

    /// Ask the backend what it is actually doing
    async fn query_state(&self) -> BackendResult<BackendSnapshot>;
}

/// Events pushed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BackendEvent {
    /// Periodic position report (~10 Hz)
    Progress { position: f64, duration: f64 },

    /// The backend started a seek, whether or not we asked for it
    Seeking { target: f64 },

    Paused,

    Resumed,

    /// The current stream reached its end
    Ended,

    /// Asynchronous failure on the stream
    Error { code: i32, message: String },

    /// The backend is (or stopped) opening and pre-filling a stream
    Loading(bool),
}

/// A backend event tagged with the stream that produced it
///
/// `track_id` is `None` for events not tied to a stream, such as device errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEnvelope {
    pub track_id: Option<TrackId>,
    pub event: BackendEvent,
}

impl BackendEnvelope {
    pub fn new(track_id: TrackId, event: BackendEvent) -> Self {
        Self {
            track_id: Some(track_id),
            event,
        }
    }

    pub fn untagged(event: BackendEvent) -> Self {
        Self {
            track_id: None,
            event,
        }
    }

    pub fn progress(track_id: TrackId, position: f64, duration: f64) -> Self {
        Self::new(track_id, BackendEvent::Progress { position, duration })
    }
}
