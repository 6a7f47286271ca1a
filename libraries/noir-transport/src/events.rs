//! Transport events and commands
//!
//! The UI talks to the transport through these two enums only. Events are
//! queued inside the controller as state changes and drained by whoever owns
//! it (the driver forwards them over a channel).

use crate::seek::SeekPhase;
use crate::types::{ContainerId, PlaybackState, RepeatMode, ShuffleMode, TrackId};
use serde::{Deserialize, Serialize};

/// Events emitted by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// Playback state changed
    StateChanged { state: PlaybackState },

    /// Current track changed, `None` once playback stops
    TrackChanged {
        track_id: Option<TrackId>,
        context: Option<ContainerId>,
    },

    /// Display position, emitted every render tick and on discontinuities
    PositionChanged { position: f64, duration: f64 },

    /// Queue contents changed
    QueueChanged { tracks: Vec<TrackId> },

    /// Shuffle or repeat changed
    ModesChanged {
        shuffle: ShuffleMode,
        repeat: RepeatMode,
    },

    /// Volume changed (0.0 to 1.0)
    VolumeChanged { volume: f32 },

    /// Seek lifecycle moved
    SeekChanged { phase: SeekPhase },

    /// Something the user should be told about
    Notification { message: String },
}

/// Commands accepted by the transport driver
///
/// Tracks are named by id and looked up in the current library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TransportCommand {
    Play { track_id: TrackId },
    PlayAt { track_id: TrackId, position: f64 },
    TogglePlayPause,
    Pause,
    Resume,
    Stop,
    SkipNext,
    SkipPrevious,
    SetShuffle { mode: ShuffleMode },
    SetRepeat { mode: RepeatMode },
    SetVolume { volume: f32 },
    Enqueue { track_id: TrackId },
    EnqueueNext { track_id: TrackId },
    Dequeue { index: usize },
    ReorderQueue { from: usize, to: usize },
    ClearQueue,
    BeginSeekDrag { position: f64 },
    UpdateSeekDrag { position: f64 },
    CommitSeek,
    SeekTo { position: f64 },
    RefreshBackendState,
}
