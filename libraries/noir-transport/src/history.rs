//! Playback history
//!
//! Bounded record of what played before, so `skip_previous` can go back to the
//! exact track and the container it was launched from.

use crate::types::{PlaybackContext, TrackId, TrackRef};
use std::collections::VecDeque;

/// One previously played track
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub track: TrackRef,
    pub context: Option<PlaybackContext>,
}

/// Playback history with bounded size
///
/// Ring buffer: once full, the oldest entry is discarded on push.
#[derive(Debug, Clone)]
pub struct History {
    /// Most recent at the back
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl History {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            entries: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, track: TrackRef, context: Option<PlaybackContext>) {
        if self.entries.len() >= self.max_size {
            self.entries.pop_front();
        }
        self.entries.push_back(HistoryEntry { track, context });
    }

    pub fn peek(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    /// Pop the most recent entry
    pub fn pop(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Track ids, oldest first
    pub fn ids(&self) -> Vec<TrackId> {
        self.entries.iter().map(|e| e.track.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Container, ContainerId, Track};
    use std::sync::Arc;

    fn create_test_track(id: &str) -> TrackRef {
        Arc::new(Track::new(id, format!("/music/{}.flac", id)))
    }

    fn ids(history: &History) -> Vec<String> {
        history.ids().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn create_history() {
        let history = History::new(10);
        assert_eq!(history.max_size(), 10);
        assert!(history.is_empty());
    }

    #[test]
    fn pop_returns_most_recent_first() {
        let mut history = History::new(10);
        history.push(create_test_track("1"), None);
        history.push(create_test_track("2"), None);
        history.push(create_test_track("3"), None);

        assert_eq!(history.pop().unwrap().track.id.as_str(), "3");
        assert_eq!(history.pop().unwrap().track.id.as_str(), "2");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn history_bounded() {
        let mut history = History::new(3);
        for id in ["1", "2", "3", "4"] {
            history.push(create_test_track(id), None);
        }

        assert_eq!(history.len(), 3);
        assert_eq!(ids(&history), vec!["2", "3", "4"]);
    }

    #[test]
    fn entry_keeps_its_context() {
        let album = Arc::new(Container::new(ContainerId::new("x"), "X", vec![]));
        let mut history = History::new(5);
        history.push(create_test_track("1"), Some(album.clone()));

        let entry = history.peek().unwrap();
        assert!(Arc::ptr_eq(entry.context.as_ref().unwrap(), &album));
    }

    #[test]
    fn zero_size_is_bumped_to_one() {
        let mut history = History::new(0);
        history.push(create_test_track("1"), None);
        history.push(create_test_track("2"), None);
        assert_eq!(ids(&history), vec!["2"]);
    }
}
