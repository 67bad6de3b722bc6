// SPDX-License-Identifier: MPL-2.0
//! Error types for the playback core.
//!
//! Open-time failures are returned synchronously to the caller. Failures that
//! happen inside the pumps are handled locally (the controller pauses or the
//! audio pump exits) and are reported through logs and playback events.

use crate::domain::video::PlaybackState;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The decoder engine returned no session for the given path.
    #[error("Failed to open media: {}", path.display())]
    Open { path: PathBuf },

    /// The decoder rejected a seek request.
    #[error("Seek to {target_secs:.3}s failed")]
    Seek { target_secs: f64 },

    /// The audio output device failed to open or to accept samples.
    #[error("Audio device error: {0}")]
    Device(String),

    /// The operation is not valid in the current playback state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidState {
        operation: &'static str,
        state: PlaybackState,
    },

    /// A pump touched the session after the controller closed it.
    #[error("Decoder session is closed")]
    SessionClosed,

    /// The internal ticker needs a tokio runtime and none is running.
    #[error("Async runtime unavailable: {0}")]
    Runtime(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("I/O Error: {0}")]
    Io(String),
}

impl Error {
    /// Returns true for failures that leave the current session usable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Seek { .. } | Error::Device(_) | Error::InvalidState { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
