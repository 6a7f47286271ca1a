//! Noir - Playback Transport
//!
//! Playback transport and position synchronization for the Noir desktop
//! player.
//!
//! This crate provides:
//! - Next-track resolution (queue, album/library shuffle, repeat, global order)
//! - Smoothed 60 Hz position display from ~10 Hz backend reports
//! - Seek lifecycle with stale-event rejection and a safety timeout
//! - Playback history for "previous"
//! - Scoped timers cancelled with the operation that owns them
//! - A typed event/command channel for the UI
//! - A scriptable mock backend for headless tests
//!
//! # Architecture
//!
//! ```text
//!  TransportCommand ─▶ TransportDriver ─▶ TransportController ─▶ AudioBackend
//!                          ▲    │            │    │    │              │
//!                          │    │      SeekCoordinator  PositionSynchronizer
//!                          │    ▼                                      │
//!  TransportEvent ◀────────┘  render interval / timer deadlines        │
//!                          ▲                                           │
//!                          └───────────── BackendEnvelope ◀────────────┘
//! ```
//!
//! The audio engine itself (decoding, output) stays behind the
//! [`AudioBackend`] trait.
//!
//! # Example
//!
//! ```rust
//! use noir_transport::{
//!     Container, ContainerId, Library, MockBackend, PlaybackState, TransportConfig,
//!     TransportController, Track,
//! };
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> noir_transport::Result<()> {
//! let album_id = ContainerId::new("kind-of-blue");
//! let tracks = ["so-what", "freddie-freeloader"]
//!     .into_iter()
//!     .map(|id| Arc::new(Track::new(id, format!("/music/{id}.flac")).in_container(album_id.clone())))
//!     .collect();
//! let album = Arc::new(Container::new(album_id, "Kind of Blue", tracks));
//!
//! let backend = Arc::new(MockBackend::new());
//! let mut transport = TransportController::new(backend, TransportConfig::default())?;
//! transport
//!     .set_library(Library::from_containers(vec![album.clone()]), Instant::now())
//!     .await?;
//!
//! transport.play(album.tracks[0].clone(), Instant::now()).await?;
//! assert_eq!(transport.playback_state(), PlaybackState::Playing);
//!
//! transport.skip_next(Instant::now()).await?;
//! assert_eq!(transport.current_track().unwrap().id.as_str(), "freddie-freeloader");
//! # Ok(())
//! # }
//! ```

pub mod backend;
mod config;
mod controller;
mod driver;
mod error;
mod events;
mod history;
mod notify;
mod queue;
mod resolver;
mod seek;
mod shuffle;
mod sync;
mod timers;
pub mod types;

// Public exports
pub use backend::{
    AudioBackend, BackendCommand, BackendEnvelope, BackendEvent, BackendResult, BackendSnapshot,
    CommandKind, MockBackend,
};
pub use config::TransportConfig;
pub use controller::TransportController;
pub use driver::{TransportDriver, TransportHandle};
pub use error::{BackendError, BackendErrorKind, Result, TransportError};
pub use events::{TransportCommand, TransportEvent};
pub use history::{History, HistoryEntry};
pub use notify::ErrorCoalescer;
pub use queue::Queue;
pub use resolver::{NextSource, NextTrack, Resolution};
pub use seek::{Commit, RequestState, SeekCoordinator, SeekPhase, SeekRequest, Verdict};
pub use shuffle::pick_other;
pub use sync::PositionSynchronizer;
pub use timers::{OperationId, TimerHandle, TimerKind, TimerTable};
pub use types::{
    Container, ContainerId, ContainerRef, Library, PlaybackContext, PlaybackState,
    PositionSample, RepeatMode, ShuffleMode, Track, TrackId, TrackRef,
};
