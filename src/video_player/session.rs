// SPDX-License-Identifier: MPL-2.0
//! Mutex-guarded facade over one decoder session.
//!
//! Both pumps and the controller reach the decoder through [`SharedSession`].
//! Every call happens while holding [`SessionGuard`], so video and audio reads
//! never interleave on the decoder's cursors. Buffer views borrow from the
//! guard and cannot outlive it.

use crate::application::port::{DecoderSession, FrameStatus, StereoFrame};
use crate::domain::video::{FrameSize, SeekDirection, StopMode};
use crate::error::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

/// Bytes in one interleaved stereo `i16` frame.
const STEREO_FRAME_BYTES: usize = std::mem::size_of::<StereoFrame>();

/// Cloneable, thread-safe handle to an open decoder session.
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Option<Box<dyn DecoderSession>>>>,
}

impl SharedSession {
    #[must_use]
    pub fn new(session: Box<dyn DecoderSession>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(session))),
        }
    }

    /// Acquires exclusive access to the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] once [`close`](Self::close) has run, or
    /// if a previous holder panicked while calling into the decoder.
    pub fn lock(&self) -> Result<SessionGuard<'_>> {
        let guard = self.inner.lock().map_err(|_| Error::SessionClosed)?;
        if guard.is_none() {
            return Err(Error::SessionClosed);
        }
        Ok(SessionGuard { guard })
    }

    /// Closes the session. Returns false if it was already closed.
    ///
    /// Waits for any in-flight decoder call to finish first.
    pub fn close(&self) -> bool {
        let session = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match session {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }
}

impl std::fmt::Debug for SharedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Exclusive access to the session for the duration of one pump step.
pub struct SessionGuard<'a> {
    guard: MutexGuard<'a, Option<Box<dyn DecoderSession>>>,
}

impl SessionGuard<'_> {
    /// Decodes the next video frame and borrows its pixels.
    ///
    /// `size` is the geometry fixed at open time; it is attached to the view
    /// rather than re-queried.
    pub fn next_frame(&mut self, size: FrameSize) -> FrameRead<'_> {
        match self.read_frame() {
            FrameStatus::EndOfStream => FrameRead::EndOfStream,
            FrameStatus::Decoded => {
                let pts = self.pts();
                FrameRead::Frame(FrameView {
                    pixels: self.rgb(),
                    size,
                    pts,
                })
            }
        }
    }

    /// Decodes the next audio chunk and borrows its bytes.
    ///
    /// Returns `None` when the decoder has no more audio.
    pub fn next_audio(&mut self) -> Option<AudioChunkView<'_>> {
        if !self.read_audio() {
            return None;
        }
        Some(AudioChunkView {
            bytes: self.audio(),
        })
    }

    /// Issues one seek to an absolute target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Seek`] if the decoder refused.
    pub fn seek_to(&mut self, direction: SeekDirection, target_secs: f64) -> Result<()> {
        if self.seek(direction, target_secs) {
            Ok(())
        } else {
            Err(Error::Seek { target_secs })
        }
    }

    /// Sends a decoder-level stop. Failure is logged, never fatal.
    pub fn signal_stop(&mut self, mode: StopMode) -> bool {
        let accepted = self.stop(mode);
        if !accepted {
            tracing::warn!(?mode, "Decoder rejected stop request");
        }
        accepted
    }
}

impl Deref for SessionGuard<'_> {
    type Target = dyn DecoderSession;

    fn deref(&self) -> &Self::Target {
        // `lock` never hands out a guard over an empty slot and nothing
        // takes the session while the guard is held.
        match self.guard.as_deref() {
            Some(session) => session,
            None => unreachable!("session guard over a closed session"),
        }
    }
}

impl DerefMut for SessionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.guard.as_deref_mut() {
            Some(session) => session,
            None => unreachable!("session guard over a closed session"),
        }
    }
}

/// Result of one video read.
#[derive(Debug)]
pub enum FrameRead<'a> {
    Frame(FrameView<'a>),
    EndOfStream,
}

/// Borrowed view of the decoder's RGB buffer.
///
/// Valid only while the [`SessionGuard`] that produced it is alive.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pixels: &'a [u8],
    size: FrameSize,
    pts: f64,
}

impl<'a> FrameView<'a> {
    #[must_use]
    pub fn pixels(&self) -> &'a [u8] {
        self.pixels
    }

    #[must_use]
    pub fn size(&self) -> FrameSize {
        self.size
    }

    #[must_use]
    pub fn pts(&self) -> f64 {
        self.pts
    }

    /// Returns true if the buffer holds exactly `width * height * 3` bytes.
    #[must_use]
    pub fn has_expected_len(&self) -> bool {
        self.pixels.len() == self.size.rgb_len()
    }
}

/// Borrowed view of the decoder's audio buffer.
#[derive(Debug, Clone, Copy)]
pub struct AudioChunkView<'a> {
    bytes: &'a [u8],
}

impl AudioChunkView<'_> {
    /// Reported chunk size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of complete stereo frames in the chunk.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.bytes.len() / STEREO_FRAME_BYTES
    }

    /// Copies the chunk into owned stereo frames.
    ///
    /// A trailing partial frame is dropped. The copy does not depend on the
    /// alignment of the decoder's buffer.
    #[must_use]
    pub fn to_frames(&self) -> Vec<StereoFrame> {
        let whole = self.frame_count() * STEREO_FRAME_BYTES;
        bytemuck::pod_collect_to_vec(&self.bytes[..whole])
    }
}
