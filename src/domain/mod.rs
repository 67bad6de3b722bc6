// SPDX-License-Identifier: MPL-2.0
//! Domain layer - playback value objects with no infrastructure dependencies.
//!
//! # Modules
//!
//! - [`video`]: Playback types ([`PlaybackState`](video::PlaybackState),
//!   [`SeekDirection`](video::SeekDirection), [`StopMode`](video::StopMode),
//!   [`FrameRate`](video::FrameRate), [`FrameSize`](video::FrameSize),
//!   [`SampleRate`](video::SampleRate), [`SeekStep`](video::SeekStep))

pub mod video;
