//! Error types for the transport

use thiserror::Error;

/// Why the audio backend rejected a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BackendErrorKind {
    /// Output device is held by someone else or not ready
    DeviceBusy,

    /// File missing or unreadable
    FileUnreadable,

    /// Decoder failed on the stream
    Decode,

    /// Backend thread or process is gone
    Disconnected,

    /// Anything the backend could not classify
    Other,
}

/// A rejected backend command
///
/// Transient by nature: the transport recovers locally and surfaces it to the
/// user as a notification, never as a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn device_busy(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::DeviceBusy, message)
    }

    pub fn unreadable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::FileUnreadable, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Disconnected, message)
    }
}

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Backend rejected a command
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// No track is currently loaded
    #[error("No track loaded")]
    NoTrackLoaded,

    /// Index out of bounds
    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// Invalid operation
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Configuration could not be loaded or is out of range
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for TransportError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
