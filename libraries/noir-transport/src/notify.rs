//! User-facing error notifications
//!
//! A flapping device can reject the same command many times a second; the user
//! should hear about it once per window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Suppresses repeats of the same message within a window
#[derive(Debug, Clone)]
pub struct ErrorCoalescer {
    window: Duration,
    last_shown: HashMap<String, Instant>,
    suppressed: usize,
}

impl ErrorCoalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_shown: HashMap::new(),
            suppressed: 0,
        }
    }

    /// Whether `message` should be shown now
    ///
    /// A shown message opens a window; repeats inside it are counted and
    /// dropped without extending it.
    pub fn admit(&mut self, message: &str, now: Instant) -> bool {
        if let Some(&shown) = self.last_shown.get(message) {
            if now.saturating_duration_since(shown) < self.window {
                self.suppressed += 1;
                return false;
            }
        }

        // Expired keys would otherwise pile up for the life of the player
        let window = self.window;
        self.last_shown
            .retain(|_, shown| now.saturating_duration_since(*shown) < window);
        self.last_shown.insert(message.to_string(), now);
        true
    }

    /// Total repeats dropped so far
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}
