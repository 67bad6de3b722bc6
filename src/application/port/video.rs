// SPDX-License-Identifier: MPL-2.0
//! Decoder session port definition.
//!
//! This module defines the [`DecoderEngine`] and [`DecoderSession`] traits
//! that mirror the native decoder's entry points. Infrastructure adapters
//! (like `FFmpeg`) implement these traits.
//!
//! # Design Notes
//!
//! - The session is **stateful**: video and audio reads advance internal cursors
//! - Buffers returned by [`DecoderSession::rgb`] and [`DecoderSession::audio`]
//!   are owned by the session and overwritten by the next read
//! - Seek targets are absolute positions in seconds, never deltas
//! - [`DecoderSession::close`] consumes the handle

use crate::domain::video::{SeekDirection, StopMode};
use std::path::Path;

/// Outcome of a video read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// A new frame is available through [`DecoderSession::rgb`].
    Decoded,
    /// No further frames can be decoded.
    EndOfStream,
}

/// Factory for decoder sessions.
pub trait DecoderEngine: Send + Sync {
    /// Opens a media file.
    ///
    /// Returns `None` when the decoder cannot produce a handle (missing file,
    /// unsupported container, no video stream).
    fn open(&self, path: &Path) -> Option<Box<dyn DecoderSession>>;
}

/// One open media stream inside the decoder.
///
/// # Thread Safety
///
/// Implementations must be `Send`: the video pump and the audio pump call
/// into the same session from different threads. The playback core
/// serializes every call behind one mutex, so implementations are **not**
/// required to be `Sync`.
///
/// # Lifecycle
///
/// 1. [`DecoderEngine::open`] returns a session
/// 2. Geometry, frame rate and sample rate are queried once
/// 3. `read_frame()` / `read_audio()` are called repeatedly by the pumps
/// 4. `seek()` and `stop()` reposition the read cursors
/// 5. `close()` releases the native resources
pub trait DecoderSession: Send {
    /// Frame width in pixels. Fixed for the session lifetime.
    fn width(&self) -> u32;

    /// Frame height in pixels. Fixed for the session lifetime.
    fn height(&self) -> u32;

    /// Average frame rate in frames per second. May be `0.0` if unknown.
    fn frame_rate(&self) -> f64;

    /// Audio sample rate in Hz. May be a rate the output device cannot open.
    fn sample_rate(&self) -> u32;

    /// Stream duration in seconds, if the container reports one.
    fn duration(&self) -> Option<f64>;

    /// Presentation timestamp of the most recently decoded frame, in seconds.
    fn pts(&self) -> f64;

    /// Decodes the next video frame into the session's RGB buffer.
    fn read_frame(&mut self) -> FrameStatus;

    /// Packed RGB24 pixels of the last decoded frame (`width * height * 3` bytes).
    ///
    /// Valid only until the next [`read_frame`](Self::read_frame).
    fn rgb(&self) -> &[u8];

    /// Decodes the next audio chunk. Returns false when none is available.
    fn read_audio(&mut self) -> bool;

    /// Interleaved stereo `i16` samples of the last decoded chunk, in native
    /// byte order. The slice length is the reported chunk size.
    ///
    /// Valid only until the next [`read_audio`](Self::read_audio).
    fn audio(&self) -> &[u8];

    /// Seeks to an absolute position. Returns false if the decoder refused.
    fn seek(&mut self, direction: SeekDirection, target_secs: f64) -> bool;

    /// Halts decoding without invalidating the handle. Returns false on failure.
    fn stop(&mut self, mode: StopMode) -> bool;

    /// Releases the session.
    fn close(self: Box<Self>);
}
