// SPDX-License-Identifier: MPL-2.0
//! Audio pump: a dedicated thread draining decoded audio into the device.
//!
//! The thread borrows the device for one play cycle and hands it back when
//! joined. It only holds the session lock while reading a chunk, never while
//! writing to the device, so the video pump is not held up by device pacing.

use super::events::PlaybackShared;
use super::session::SharedSession;
use crate::application::port::AudioDevice;
use crate::error::{Error, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

/// Why the pump loop ended.
#[derive(Debug)]
pub(crate) enum AudioPumpExitReason {
    /// The play cycle was cancelled by pause, stop or close.
    Cancelled,
    /// The decoder has no more audio.
    Exhausted,
    /// The device rejected a write.
    DeviceFailed,
    /// The session was closed while the pump was running.
    SessionClosed,
}

pub(crate) struct AudioPumpExit {
    pub(crate) device: Box<dyn AudioDevice>,
    pub(crate) reason: AudioPumpExitReason,
}

/// Handle to a running audio pump thread.
pub(crate) struct AudioPump {
    handle: JoinHandle<AudioPumpExit>,
}

impl AudioPump {
    /// Starts a pump thread for one play cycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the OS refused to create the thread. The
    /// device is dropped in that case.
    pub(crate) fn spawn(
        session: SharedSession,
        device: Box<dyn AudioDevice>,
        cycle: CancellationToken,
        shared: Arc<PlaybackShared>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("vr-audio-pump".into())
            .spawn(move || run(&session, device, &cycle, &shared))?;
        Ok(Self { handle })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the thread and takes the device back.
    ///
    /// Returns `None` if the thread panicked; the device is lost with it.
    pub(crate) fn join(self) -> Option<AudioPumpExit> {
        match self.handle.join() {
            Ok(exit) => {
                tracing::debug!(reason = ?exit.reason, "Audio pump joined");
                Some(exit)
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(ToString::to_string)
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Audio pump panicked: {message}");
                None
            }
        }
    }
}

fn run(
    session: &SharedSession,
    mut device: Box<dyn AudioDevice>,
    cycle: &CancellationToken,
    shared: &PlaybackShared,
) -> AudioPumpExit {
    tracing::debug!("Audio pump started");
    let reason = loop {
        if cycle.is_cancelled() {
            break AudioPumpExitReason::Cancelled;
        }

        let frames = match session.lock() {
            Ok(mut guard) => match guard.next_audio() {
                Some(chunk) => chunk.to_frames(),
                None => break AudioPumpExitReason::Exhausted,
            },
            Err(_) => break AudioPumpExitReason::SessionClosed,
        };
        if frames.is_empty() {
            continue;
        }

        match device.write(&frames, cycle) {
            Ok(written) => shared.count_audio(written),
            Err(err) => {
                tracing::error!("Audio device write failed: {err}");
                shared.record_audio_error(match err {
                    Error::Device(_) => err,
                    other => Error::Device(other.to_string()),
                });
                break AudioPumpExitReason::DeviceFailed;
            }
        }
    };
    tracing::debug!(?reason, "Audio pump stopped");
    AudioPumpExit { device, reason }
}
