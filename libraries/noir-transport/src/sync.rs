//! Position synchronization
//!
//! The backend reports position about ten times a second. The display wants a
//! value every frame. Between samples the synchronizer extrapolates forward by
//! wall-clock time, capped so a stalled backend cannot drag the display far
//! ahead, then low-pass filters toward that target so corrections glide.
//!
//! ```text
//! elapsed = min(now - sample.captured_at, max_extrapolation)
//! target  = clamp(sample.position + elapsed, 0, duration)
//! display += clamp((target - display) * smoothing, ±max_extrapolation)
//! ```
//!
//! Discontinuities (a seek, a new track) go through [`PositionSynchronizer::snap`]
//! so the display jumps instead of gliding across the gap.

use crate::config::TransportConfig;
use crate::types::PositionSample;
use std::time::{Duration, Instant};

/// Smoothed play-head position
#[derive(Debug, Clone)]
pub struct PositionSynchronizer {
    sample: Option<PositionSample>,
    display: f64,
    max_extrapolation: Duration,
    smoothing_factor: f64,
}

impl PositionSynchronizer {
    pub fn new(config: &TransportConfig) -> Self {
        Self {
            sample: None,
            display: 0.0,
            max_extrapolation: config.max_extrapolation(),
            smoothing_factor: config.smoothing_factor,
        }
    }

    /// Replace the sample; the display glides toward it on later ticks
    pub fn on_backend_sample(&mut self, sample: PositionSample) {
        self.sample = Some(sample);
    }

    /// Replace the sample and jump the display to it
    pub fn snap(&mut self, sample: PositionSample) {
        self.display = sample.position;
        self.sample = Some(sample);
    }

    /// Re-anchor the sample at the displayed position
    ///
    /// Used when the clock stops or restarts (pause, resume) so extrapolation
    /// restarts from what the user currently sees.
    pub fn hold(&mut self, now: Instant) {
        if let Some(sample) = self.sample {
            self.sample = Some(PositionSample::new(self.display, sample.duration, now));
        }
    }

    /// Advance one frame and return the position to display
    pub fn render_tick(&mut self, now: Instant) -> f64 {
        let Some(sample) = self.sample else {
            return self.display;
        };

        let elapsed = now
            .saturating_duration_since(sample.captured_at)
            .min(self.max_extrapolation)
            .as_secs_f64();
        let target = (sample.position + elapsed).clamp(0.0, sample.duration);

        let limit = self.max_extrapolation.as_secs_f64();
        let delta = ((target - self.display) * self.smoothing_factor).clamp(-limit, limit);
        self.display = (self.display + delta).clamp(0.0, sample.duration);
        self.display
    }

    pub fn display_position(&self) -> f64 {
        self.display
    }

    pub fn sample(&self) -> Option<&PositionSample> {
        self.sample.as_ref()
    }

    pub fn duration(&self) -> f64 {
        self.sample.map_or(0.0, |s| s.duration)
    }

    /// Forget everything (track change, stop)
    pub fn reset(&mut self) {
        self.sample = None;
        self.display = 0.0;
    }
}
