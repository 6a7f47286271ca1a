//! Explicit play queue
//!
//! Tracks the user asked to hear next. The front of the queue beats every
//! other source of "next track": shuffle, repeat and container order only
//! apply once it is empty.
//!
//! ```text
//! Currently Playing: Track A   (launched from Album X)
//! ─────────────────────────────
//! Queue (play next):
//!   - Track Q1 (user added)
//!   - Track Q2 (user added)
//! ─────────────────────────────
//! Then: resolved from Album X / library
//! ```

use crate::error::{Result, TransportError};
use crate::types::{TrackId, TrackRef};
use std::collections::VecDeque;

/// FIFO of explicitly queued tracks
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: VecDeque<TrackRef>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add track to the end of the queue
    pub fn enqueue(&mut self, track: TrackRef) {
        self.tracks.push_back(track);
    }

    /// Add track to the front of the queue (plays next)
    pub fn enqueue_next(&mut self, track: TrackRef) {
        self.tracks.push_front(track);
    }

    /// Remove track by index
    pub fn dequeue(&mut self, index: usize) -> Result<TrackRef> {
        self.tracks
            .remove(index)
            .ok_or(TransportError::IndexOutOfBounds(index))
    }

    /// Take the front track
    pub fn pop_front(&mut self) -> Option<TrackRef> {
        self.tracks.pop_front()
    }

    pub fn front(&self) -> Option<&TrackRef> {
        self.tracks.front()
    }

    /// Move track from `from` to `to`
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<()> {
        let len = self.tracks.len();
        if from >= len {
            return Err(TransportError::IndexOutOfBounds(from));
        }
        if to >= len {
            return Err(TransportError::IndexOutOfBounds(to));
        }
        if from == to {
            return Ok(());
        }

        if let Some(track) = self.tracks.remove(from) {
            self.tracks.insert(to, track);
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
    }

    /// Tracks in play order
    pub fn snapshot(&self) -> Vec<TrackRef> {
        self.tracks.iter().cloned().collect()
    }

    pub fn ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
