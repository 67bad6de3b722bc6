// SPDX-License-Identifier: MPL-2.0
//! Playback notifications and counters shared between the controller and
//! its pumps.

use crate::domain::video::PlaybackState;
use crate::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// Capacity of the event channel. Slow subscribers lose the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications published while a session is open.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StateChanged {
        from: PlaybackState,
        to: PlaybackState,
    },
    /// A frame was copied to the surface.
    FrameRendered { pts_secs: f64 },
    /// The video pump hit the end of the stream and paused playback.
    EndOfStream,
    SeekFailed { target_secs: f64 },
    /// The audio pump stopped because the output device failed.
    AudioDeviceFailed { message: String },
}

/// Snapshot of the pump counters since the last `open`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_rendered: u64,
    /// Frames whose buffer length did not match the session geometry.
    pub frames_rejected: u64,
    pub audio_chunks: u64,
    pub audio_frames_written: u64,
}

/// State shared by the controller, the ticker task and the audio pump thread.
///
/// Lock order: the session lock may be held while taking `state`, never the
/// reverse.
pub(crate) struct PlaybackShared {
    state: Mutex<PlaybackState>,
    events: broadcast::Sender<PlaybackEvent>,
    audio_error: Mutex<Option<Error>>,
    frames_rendered: AtomicU64,
    frames_rejected: AtomicU64,
    audio_chunks: AtomicU64,
    audio_frames_written: AtomicU64,
}

impl PlaybackShared {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(PlaybackState::Closed),
            events,
            audio_error: Mutex::new(None),
            frames_rendered: AtomicU64::new(0),
            frames_rejected: AtomicU64::new(0),
            audio_chunks: AtomicU64::new(0),
            audio_frames_written: AtomicU64::new(0),
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves to `next` and publishes the change. Returns the previous state.
    pub(crate) fn set_state(&self, next: PlaybackState) -> PlaybackState {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            if !previous.can_transition_to(next) {
                tracing::debug!(?previous, ?next, "Unusual playback transition");
            }
            tracing::info!(from = ?previous, to = ?next, "Playback state changed");
            self.publish(PlaybackEvent::StateChanged {
                from: previous,
                to: next,
            });
        }
        previous
    }

    /// Moves to `next` only if the current state is `expected`.
    pub(crate) fn transition_if(&self, expected: PlaybackState, next: PlaybackState) -> bool {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state != expected {
                return false;
            }
            *state = next;
        }
        tracing::info!(from = ?expected, to = ?next, "Playback state changed");
        self.publish(PlaybackEvent::StateChanged {
            from: expected,
            to: next,
        });
        true
    }

    pub(crate) fn publish(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub(crate) fn record_audio_error(&self, error: Error) {
        self.publish(PlaybackEvent::AudioDeviceFailed {
            message: error.to_string(),
        });
        *self
            .audio_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    pub(crate) fn take_audio_error(&self) -> Option<Error> {
        self.audio_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn count_rendered(&self) {
        self.frames_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn count_audio(&self, frames: usize) {
        self.audio_chunks.fetch_add(1, Ordering::Relaxed);
        self.audio_frames_written
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub(crate) fn stats(&self) -> PlaybackStats {
        PlaybackStats {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            audio_chunks: self.audio_chunks.load(Ordering::Relaxed),
            audio_frames_written: self.audio_frames_written.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn reset_stats(&self) {
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.frames_rejected.store(0, Ordering::Relaxed);
        self.audio_chunks.store(0, Ordering::Relaxed);
        self.audio_frames_written.store(0, Ordering::Relaxed);
        self.take_audio_error();
    }
}
