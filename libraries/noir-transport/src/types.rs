//! Core types for the transport

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Track identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Album / collection identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerId(String);

impl ContainerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Track reference handed out by the library
///
/// Immutable. The transport only ever clones the `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique track identifier from the library
    pub id: TrackId,

    /// File path the backend decodes
    pub path: PathBuf,

    /// Display title
    pub title: String,

    /// Duration reported by the library scan, in seconds
    ///
    /// Only a hint: the backend's `progress` duration wins once playback starts.
    pub duration_hint: Option<f64>,

    /// Album (or other container) this track belongs to
    pub container: Option<ContainerId>,
}

pub type TrackRef = Arc<Track>;

impl Track {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id: TrackId::new(id),
            path: path.into(),
            duration_hint: None,
            container: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_hint = Some(seconds);
        self
    }

    #[must_use]
    pub fn in_container(mut self, container: ContainerId) -> Self {
        self.container = Some(container);
        self
    }
}

/// An ordered set of tracks a track can be launched from (album, playlist)
#[derive(Debug, Clone)]
pub struct Container {
    pub id: ContainerId,
    pub name: String,
    pub tracks: Vec<TrackRef>,
}

pub type ContainerRef = Arc<Container>;

/// The container the current track was launched from
pub type PlaybackContext = ContainerRef;

impl Container {
    pub fn new(id: ContainerId, name: impl Into<String>, tracks: Vec<TrackRef>) -> Self {
        Self {
            id,
            name: name.into(),
            tracks,
        }
    }

    /// Position of a track in container order
    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.tracks.iter().position(|t| &t.id == id)
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.position_of(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Snapshot of the library collaborator's view
///
/// `tracks` is the global sequence used when no container context is active
/// and as the candidate pool for library-wide shuffle.
#[derive(Debug, Clone, Default)]
pub struct Library {
    tracks: Vec<TrackRef>,
    containers: HashMap<ContainerId, ContainerRef>,
    index: HashMap<TrackId, usize>,
}

impl Library {
    pub fn new(tracks: Vec<TrackRef>, containers: Vec<ContainerRef>) -> Self {
        let index = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();
        let containers = containers.into_iter().map(|c| (c.id.clone(), c)).collect();
        Self {
            tracks,
            containers,
            index,
        }
    }

    /// Build a library whose global sequence is the containers laid end to end
    pub fn from_containers(containers: Vec<ContainerRef>) -> Self {
        let tracks = containers
            .iter()
            .flat_map(|c| c.tracks.iter().cloned())
            .collect();
        Self::new(tracks, containers)
    }

    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    pub fn get(&self, index: usize) -> Option<&TrackRef> {
        self.tracks.get(index)
    }

    pub fn position_of(&self, id: &TrackId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn track(&self, id: &TrackId) -> Option<&TrackRef> {
        self.position_of(id).and_then(|i| self.tracks.get(i))
    }

    pub fn container(&self, id: &ContainerId) -> Option<&ContainerRef> {
        self.containers.get(id)
    }

    /// Container a track declares membership of, if the library knows it
    pub fn container_of(&self, track: &Track) -> Option<&ContainerRef> {
        track.container.as_ref().and_then(|id| self.containers.get(id))
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    /// Nothing playing (initial, and after stop or exhausted resolution)
    #[default]
    Idle,

    /// Waiting for the backend to confirm a `play`
    Loading,

    /// Currently playing
    Playing,

    /// Paused mid-track
    Paused,

    /// Backend reported the end of the current track
    Ended,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when the container (or library) runs out
    #[default]
    Off,

    /// Wrap around to the first track
    All,

    /// Replay the current track when it ends
    One,
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShuffleMode {
    /// Sequential order
    #[default]
    Off,

    /// Random pick within the current album
    Album,

    /// Random pick across the whole library
    Library,
}

/// Last authoritative position reading from the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    /// Position in seconds, always within `0..=duration`
    pub position: f64,

    /// Track duration in seconds
    pub duration: f64,

    /// Monotonic capture time
    pub captured_at: Instant,
}

impl PositionSample {
    /// Build a sample, clamping the position into the track bounds
    pub fn new(position: f64, duration: f64, captured_at: Instant) -> Self {
        let duration = if duration.is_finite() {
            duration.max(0.0)
        } else {
            0.0
        };
        let position = if position.is_finite() { position } else { 0.0 };
        Self {
            position: position.clamp(0.0, duration),
            duration,
            captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn album(id: &str, n: usize) -> ContainerRef {
        let cid = ContainerId::new(id);
        let tracks = (0..n)
            .map(|i| {
                Arc::new(
                    Track::new(format!("{id}-{i}"), format!("/music/{id}/{i}.flac"))
                        .in_container(cid.clone()),
                )
            })
            .collect();
        Arc::new(Container::new(cid, id, tracks))
    }

    #[test]
    fn library_from_containers_keeps_album_order() {
        let lib = Library::from_containers(vec![album("x", 3), album("y", 2)]);

        assert_eq!(lib.len(), 5);
        assert_eq!(lib.get(3).unwrap().id.as_str(), "y-0");
        assert_eq!(lib.position_of(&TrackId::new("x-2")), Some(2));

        let track = lib.track(&TrackId::new("y-1")).unwrap();
        assert_eq!(lib.container_of(track).unwrap().id.as_str(), "y");
    }

    #[test]
    fn sample_is_clamped_into_track_bounds() {
        let now = Instant::now();

        let past_end = PositionSample::new(250.0, 200.0, now);
        assert_eq!(past_end.position, 200.0);

        let negative = PositionSample::new(-3.0, 200.0, now);
        assert_eq!(negative.position, 0.0);

        let garbage = PositionSample::new(f64::NAN, f64::INFINITY, now);
        assert_eq!(garbage.position, 0.0);
        assert_eq!(garbage.duration, 0.0);
    }

    #[test]
    fn modes_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ShuffleMode::Library).unwrap(),
            "\"library\""
        );
        assert_eq!(
            serde_json::from_str::<RepeatMode>("\"one\"").unwrap(),
            RepeatMode::One
        );
    }
}
