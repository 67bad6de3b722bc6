// SPDX-License-Identifier: MPL-2.0
//! `vr_playback` keeps video frames, audio output and transport commands in
//! step while driving an external media decoder.
//!
//! The crate is split into layers:
//!
//! - [`domain`]: playback value objects (state, frame rate, seek direction)
//! - [`application`]: port traits for the decoder, audio sink and display
//!   surface
//! - [`video_player`]: the playback controller and its video/audio pumps
//! - [`infrastructure`]: `FFmpeg` and `cpal` adapters behind cargo features
//! - [`config`]: persisted player settings
//! - `testing`: scripted decoder, sink and surface doubles, compiled only
//!   with the `testing` feature
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//! use vr_playback::config::{Config, TickSource};
//! use vr_playback::domain::video::PlaybackState;
//! use vr_playback::testing::{RecordingSink, RecordingSurfaceFactory, ScriptedClip, ScriptedEngine};
//! use vr_playback::video_player::PlaybackController;
//!
//! let engine = ScriptedEngine::new().with_media("clip.mp4", ScriptedClip::new(1.0, 30.0, 44_100));
//! let mut config = Config::default();
//! config.video.tick_source = TickSource::External;
//!
//! let mut player = PlaybackController::new(
//!     Arc::new(engine),
//!     Arc::new(RecordingSink::new(vec![44_100])),
//!     Arc::new(RecordingSurfaceFactory::default()),
//!     config,
//! );
//! player.open(Path::new("clip.mp4")).expect("open");
//! assert_eq!(player.state(), PlaybackState::Playing);
//! player.close();
//! ```

#![doc(html_root_url = "https://docs.rs/vr_playback/0.1.0")]

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod video_player;

#[cfg(test)]
mod test_utils;
