// SPDX-License-Identifier: MPL-2.0
//! Video playback domain types.
//!
//! This module contains playback-related value objects and enums that are
//! independent of any decoder, device or presentation concerns.

pub mod newtypes;
pub mod playback;

// Re-export commonly used types
pub use newtypes::{FrameRate, FrameSize, SampleRate, SeekStep};
pub use playback::{ParseSeekDirectionError, PlaybackState, SeekDirection, StopMode};
