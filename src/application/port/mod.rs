// SPDX-License-Identifier: MPL-2.0
//! Port definitions (traits) for dependency inversion.
//!
//! The playback core never names a concrete decoder, audio API or GUI
//! toolkit. It drives these three boundaries instead:
//!
//! # Available Ports
//!
//! - [`video`]: Decoder engine and decoder session handle
//! - [`audio`]: Audio output sink and device
//! - [`surface`]: Display surface receiving RGB frames
//!
//! # Design Notes
//!
//! - Traits use domain types only (no `FFmpeg` or `cpal` types)
//! - Handles that are shared with worker threads are `Send`
//! - Buffers returned by the decoder are borrowed, never owned

pub mod audio;
pub mod surface;
pub mod video;

// Re-export main types for convenience
pub use audio::{AudioDevice, AudioDeviceConfig, AudioSink, SampleFormat, StereoFrame};
pub use surface::{DisplaySurface, PixelFormat, SurfaceFactory, SurfaceSpec};
pub use video::{DecoderEngine, DecoderSession, FrameStatus};
