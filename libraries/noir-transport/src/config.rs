//! Transport configuration
//!
//! The synchronization thresholds were tuned empirically on a handful of
//! devices, so every one of them is a setting rather than a constant.

use crate::error::{Result, TransportError};
use crate::types::{RepeatMode, ShuffleMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for the transport controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Upper bound on how far the display may extrapolate past the last
    /// backend sample (default: 150 ms)
    pub max_extrapolation_ms: u64,

    /// Exponential low-pass factor applied per render tick (default: 0.3)
    pub smoothing_factor: f64,

    /// Render loop rate (default: 60 Hz)
    pub render_hz: u32,

    /// A backend position within this distance of the seek target confirms
    /// the seek (default: 0.5 s)
    pub seek_confirm_tolerance: f64,

    /// Give up waiting for a seek confirmation after this long (default: 2 s)
    pub seek_timeout_ms: u64,

    /// Commits closer than this to the pending target reuse the live request
    /// (default: 0.1 s)
    pub seek_dedupe_threshold: f64,

    /// `skip_previous` restarts the track instead of going back when past
    /// this position (default: 3 s)
    pub previous_restart_threshold: f64,

    /// Maximum history size (default: 50)
    pub history_size: usize,

    /// Identical notifications inside this window are coalesced (default: 5 s)
    pub error_coalesce_window_ms: u64,

    /// Failed loads chained through `skip_next` before giving up (default: 5)
    pub max_consecutive_load_failures: u32,

    /// Initial volume, 0.0 to 1.0 (default: 1.0)
    pub volume: f32,

    /// Initial shuffle mode (default: Off)
    pub shuffle: ShuffleMode,

    /// Initial repeat mode (default: Off)
    pub repeat: RepeatMode,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_extrapolation_ms: 150,
            smoothing_factor: 0.3,
            render_hz: 60,
            seek_confirm_tolerance: 0.5,
            seek_timeout_ms: 2000,
            seek_dedupe_threshold: 0.1,
            previous_restart_threshold: 3.0,
            history_size: 50,
            error_coalesce_window_ms: 5000,
            max_consecutive_load_failures: 5,
            volume: 1.0,
            shuffle: ShuffleMode::Off,
            repeat: RepeatMode::Off,
        }
    }
}

impl TransportConfig {
    /// Load configuration from an optional TOML file and the environment
    ///
    /// Environment variables are prefixed with `NOIR_`, e.g.
    /// `NOIR_SEEK_TIMEOUT_MS=3000`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                settings = settings.add_source(config::File::from(path));
            } else {
                return Err(TransportError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("NOIR")
                .prefix_separator("_")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the synchronization invariants
    pub fn validate(&self) -> Result<()> {
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(TransportError::Config(format!(
                "smoothing_factor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if self.render_hz == 0 || self.render_hz > 240 {
            return Err(TransportError::Config(format!(
                "render_hz must be in 1..=240, got {}",
                self.render_hz
            )));
        }
        if !(self.seek_confirm_tolerance > 0.0 && self.seek_confirm_tolerance.is_finite()) {
            return Err(TransportError::Config(format!(
                "seek_confirm_tolerance must be positive, got {}",
                self.seek_confirm_tolerance
            )));
        }
        if !(self.seek_dedupe_threshold >= 0.0 && self.seek_dedupe_threshold.is_finite()) {
            return Err(TransportError::Config(format!(
                "seek_dedupe_threshold must be non-negative, got {}",
                self.seek_dedupe_threshold
            )));
        }
        if !(self.previous_restart_threshold >= 0.0 && self.previous_restart_threshold.is_finite())
        {
            return Err(TransportError::Config(format!(
                "previous_restart_threshold must be non-negative, got {}",
                self.previous_restart_threshold
            )));
        }
        if self.seek_timeout_ms == 0 {
            return Err(TransportError::Config(
                "seek_timeout_ms must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(TransportError::Config(format!(
                "volume must be in 0..=1, got {}",
                self.volume
            )));
        }
        if self.history_size == 0 {
            return Err(TransportError::Config(
                "history_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn max_extrapolation(&self) -> Duration {
        Duration::from_millis(self.max_extrapolation_ms)
    }

    pub fn seek_timeout(&self) -> Duration {
        Duration::from_millis(self.seek_timeout_ms)
    }

    pub fn error_coalesce_window(&self) -> Duration {
        Duration::from_millis(self.error_coalesce_window_ms)
    }

    pub fn render_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.render_hz.max(1)))
    }
}
