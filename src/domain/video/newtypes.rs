// SPDX-License-Identifier: MPL-2.0
//! Video playback newtypes.
//!
//! This module provides type-safe wrappers for values queried from a decoder
//! session, ensuring they are always usable by the pumps.

use std::time::Duration;

// =============================================================================
// FrameRate
// =============================================================================

/// Frame rate bounds in frames per second.
pub mod frame_rate_bounds {
    /// Slowest accepted rate (one frame every 1000 seconds).
    pub const MIN: f64 = 1e-3;
    /// Fastest accepted rate.
    pub const MAX: f64 = 1e4;
    /// Used when neither the stream nor the settings give a usable rate.
    pub const DEFAULT: f64 = 25.0;
}

/// Frame rate in frames per second, guaranteed within [`frame_rate_bounds`].
///
/// Decoders may report `0.0`, `NaN` or absurd values for streams without an
/// average frame rate; [`FrameRate::or_fallback`] replaces those with a
/// usable value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate(f64);

impl FrameRate {
    /// Creates a frame rate, returning `None` for non-finite values or
    /// values outside [`frame_rate_bounds`].
    #[must_use]
    pub fn new(fps: f64) -> Option<Self> {
        (frame_rate_bounds::MIN..=frame_rate_bounds::MAX)
            .contains(&fps)
            .then_some(Self(fps))
    }

    /// Creates a frame rate from a reported value, using `fallback` when it is unusable.
    #[must_use]
    pub fn or_fallback(reported: f64, fallback: f64) -> Self {
        Self::new(reported)
            .or_else(|| Self::new(fallback))
            .unwrap_or(Self(frame_rate_bounds::DEFAULT))
    }

    /// Returns the value in frames per second.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Returns the video pump interval (`1 / fps`).
    #[must_use]
    pub fn interval(self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.0)
            .unwrap_or_else(|_| Duration::from_secs_f64(1.0 / frame_rate_bounds::DEFAULT))
    }
}

// =============================================================================
// FrameSize
// =============================================================================

/// Bytes per packed RGB pixel.
pub const RGB_BYTES_PER_PIXEL: usize = 3;

/// Video geometry, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size in bytes of one packed RGB frame (`width * height * 3`).
    #[must_use]
    pub fn rgb_len(self) -> usize {
        self.width as usize * self.height as usize * RGB_BYTES_PER_PIXEL
    }

    /// Returns true if either dimension is zero.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

// =============================================================================
// SampleRate
// =============================================================================

/// Audio sample rate in Hz accepted by an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRate(u32);

impl SampleRate {
    #[must_use]
    pub fn new(hz: u32) -> Self {
        Self(hz)
    }

    /// Picks the device rate for a stream.
    ///
    /// Returns the reported rate when the device supports it, otherwise the
    /// fallback. The second value is true when the fallback was used.
    #[must_use]
    pub fn resolve(reported: u32, supported: &[u32], fallback: u32) -> (Self, bool) {
        if reported > 0 && supported.contains(&reported) {
            (Self(reported), false)
        } else {
            (Self(fallback), true)
        }
    }

    #[must_use]
    pub fn hz(self) -> u32 {
        self.0
    }
}

// =============================================================================
// SeekStep
// =============================================================================

/// Seek step bounds (0.5 to 60.0 seconds).
pub mod seek_step_bounds {
    /// Minimum seek step in seconds.
    pub const MIN: f64 = 0.5;
    /// Maximum seek step in seconds.
    pub const MAX: f64 = 60.0;
    /// Default seek step in seconds.
    pub const DEFAULT: f64 = 5.0;
}

/// Relative seek step in seconds used by [`seek_step`].
///
/// [`seek_step`]: crate::video_player::PlaybackController::seek_step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekStep(f64);

impl SeekStep {
    /// Creates a new seek step, clamping to valid range.
    #[must_use]
    pub fn new(value: f64) -> Self {
        Self(value.clamp(seek_step_bounds::MIN, seek_step_bounds::MAX))
    }

    /// Returns the value as f64.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Returns the step as a Duration.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::from_secs_f64(self.0)
    }
}

impl Default for SeekStep {
    fn default() -> Self {
        Self(seek_step_bounds::DEFAULT)
    }
}

// =============================================================================
// Tests
// =============================================================================
