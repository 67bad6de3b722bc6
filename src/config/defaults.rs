// SPDX-License-Identifier: MPL-2.0
//! Centralized default values for all configuration constants.
//!
//! This module serves as the single source of truth for default values
//! used across the crate. Constants are organized by category.
//!
//! # Categories
//!
//! - **Audio**: Output device rate fallback and buffering
//! - **Video**: Frame pump cadence and surface orientation
//! - **Seek**: Relative seek step bounds

// ==========================================================================
// Audio Defaults
// ==========================================================================

/// Sample rate used when the stream reports a rate the device cannot open.
pub const DEFAULT_FALLBACK_SAMPLE_RATE: u32 = 44_100;

/// Rates assumed supported when no device list is available.
pub const DEFAULT_SUPPORTED_SAMPLE_RATES: &[u32] = &[44_100, 48_000];

/// Output channel count. The decoder always delivers interleaved stereo.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Amount of audio the device buffers ahead of the hardware (in milliseconds).
pub const DEFAULT_AUDIO_BUFFER_MS: u32 = 200;

/// Minimum device buffer (in milliseconds).
pub const MIN_AUDIO_BUFFER_MS: u32 = 20;

/// Maximum device buffer (in milliseconds).
pub const MAX_AUDIO_BUFFER_MS: u32 = 2_000;

/// Slice a blocking write waits before re-checking cancellation (in milliseconds).
pub const DEFAULT_WRITE_SLICE_MS: u32 = 10;

// ==========================================================================
// Video Defaults
// ==========================================================================

/// Frame rate used when the stream reports none.
pub const DEFAULT_FALLBACK_FRAME_RATE: f64 = 25.0;

/// Decoder rows arrive top-down; most texture APIs expect bottom-up.
pub const DEFAULT_FLIP_VERTICAL: bool = true;

// ==========================================================================
// Seek Defaults
// ==========================================================================

/// Default relative seek step (in seconds).
pub const DEFAULT_SEEK_STEP_SECS: f64 = 5.0;

/// Minimum relative seek step (in seconds).
pub const MIN_SEEK_STEP_SECS: f64 = 0.5;

/// Maximum relative seek step (in seconds).
pub const MAX_SEEK_STEP_SECS: f64 = 60.0;
