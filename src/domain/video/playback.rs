// SPDX-License-Identifier: MPL-2.0
//! Playback state machine vocabulary.
//!
//! This module defines the controller states and the small enums passed
//! across the decoder boundary (seek direction and stop mode).

use std::fmt;
use std::str::FromStr;

/// Represents the current playback state of a controller.
///
/// ```text
/// Closed ──open──▶ Opening ──▶ Playing ◀──play──▶ Paused
///   ▲                            │  ▲               │
///   │                          stop play          stop
///   │                            ▼  │               ▼
///   └─────────────close──────── Stopped ◀───────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No session is open.
    #[default]
    Closed,
    /// A session was returned by the decoder and is being queried.
    Opening,
    /// Both pumps are running.
    Playing,
    /// Pumps are halted, the session and the audio device stay open.
    Paused,
    /// Pumps are halted and the decoder received a soft stop.
    Stopped,
}

impl PlaybackState {
    /// Returns true if the video is currently playing.
    #[must_use]
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Returns true if the video is paused.
    #[must_use]
    pub fn is_paused(self) -> bool {
        matches!(self, Self::Paused)
    }

    /// Returns true if the video is stopped.
    #[must_use]
    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns true if a decoder session is held in this state.
    #[must_use]
    pub fn has_session(self) -> bool {
        !matches!(self, Self::Closed)
    }

    /// Returns true if seeking is allowed from this state.
    #[must_use]
    pub fn can_seek(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }

    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use PlaybackState::{Closed, Opening, Paused, Playing, Stopped};
        match (self, next) {
            (Closed, Opening) | (Opening, Playing) | (Opening, Closed) => true,
            (Playing, Paused) | (Paused, Playing) | (Stopped, Playing) => true,
            (Playing | Paused, Stopped) => true,
            (Playing | Paused | Stopped, Closed) => true,
            _ => false,
        }
    }
}

/// Direction of a relative seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Forward,
    Backward,
}

impl SeekDirection {
    /// Computes the absolute seek target from the current position.
    ///
    /// Backward targets are clamped at the start of the stream.
    #[must_use]
    pub fn target_from(self, current_secs: f64, offset_secs: f64) -> f64 {
        match self {
            Self::Forward => current_secs + offset_secs,
            Self::Backward => (current_secs - offset_secs).max(0.0),
        }
    }
}

/// Error returned when parsing an unknown seek direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSeekDirectionError(String);

impl fmt::Display for ParseSeekDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown seek direction: {}", self.0)
    }
}

impl std::error::Error for ParseSeekDirectionError {}

impl FromStr for SeekDirection {
    type Err = ParseSeekDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" | "f" => Ok(Self::Forward),
            "backward" | "b" => Ok(Self::Backward),
            other => Err(ParseSeekDirectionError(other.to_string())),
        }
    }
}

/// Decoder-level stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Flush decoder state and park on the final frame; the handle stays usable.
    Soft,
    /// Flush and rewind to the start in preparation for close.
    Hard,
}

impl StopMode {
    /// Integer flag understood by the native decoder.
    #[must_use]
    pub fn flag(self) -> i32 {
        match self {
            Self::Soft => 1,
            Self::Hard => 0,
        }
    }
}
