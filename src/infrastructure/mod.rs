// SPDX-License-Identifier: MPL-2.0
//! Infrastructure layer adapters.
//!
//! This module contains concrete implementations of the port traits defined in
//! `application::port`. Each adapter sits behind a cargo feature so the
//! playback core builds without native libraries.
//!
//! # Available Adapters
//!
//! - `ffmpeg` (feature `ffmpeg`): decoder sessions via `FFmpeg`
//!   (implements [`DecoderEngine`])
//! - `cpal` (feature `cpal`): audio output via `cpal` (implements [`AudioSink`])
//!
//! The display surface adapter lives in
//! [`video_player::surface`](crate::video_player::surface) since it has no
//! native dependency.
//!
//! [`DecoderEngine`]: crate::application::port::DecoderEngine
//! [`AudioSink`]: crate::application::port::AudioSink

#[cfg(feature = "cpal")]
pub mod cpal;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

#[cfg(feature = "cpal")]
pub use self::cpal::{CpalDevice, CpalSink, SampleQueue};
#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::{FfmpegEngine, FfmpegSession};
