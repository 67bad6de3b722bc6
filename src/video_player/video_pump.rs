// SPDX-License-Identifier: MPL-2.0
//! Video pump: one decoded frame per tick, copied to the display surface.
//!
//! The pump never blocks on anything but the session lock. A tick that finds
//! its play cycle cancelled does nothing, so a tick racing a pause cannot
//! publish a frame or trigger end-of-stream handling afterwards.

use super::events::{PlaybackEvent, PlaybackShared};
use super::session::{FrameRead, SessionGuard, SharedSession};
use crate::application::port::{DisplaySurface, PixelFormat};
use crate::domain::video::{FrameRate, FrameSize, PlaybackState, StopMode};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a single pump step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A frame was copied to the surface.
    Rendered { pts_secs: f64 },
    /// A frame was decoded but its buffer had the wrong length.
    Rejected,
    /// The decoder reported end-of-stream.
    EndOfStream,
    /// The play cycle was cancelled before the tick ran.
    Skipped,
}

pub(crate) struct VideoPump {
    session: SharedSession,
    surface: Mutex<Box<dyn DisplaySurface>>,
    size: FrameSize,
    frame_rate: FrameRate,
    shared: Arc<PlaybackShared>,
    cycle: Mutex<CancellationToken>,
    at_end: AtomicBool,
}

impl VideoPump {
    pub(crate) fn new(
        session: SharedSession,
        surface: Box<dyn DisplaySurface>,
        size: FrameSize,
        frame_rate: FrameRate,
        shared: Arc<PlaybackShared>,
    ) -> Self {
        let idle = CancellationToken::new();
        idle.cancel();
        Self {
            session,
            surface: Mutex::new(surface),
            size,
            frame_rate,
            shared,
            cycle: Mutex::new(idle),
            at_end: AtomicBool::new(false),
        }
    }

    /// Interval between ticks (`1 / fps`).
    pub(crate) fn interval(&self) -> Duration {
        self.frame_rate.interval()
    }

    /// Installs the token of a new play cycle.
    pub(crate) fn arm(&self, cycle: CancellationToken) {
        *self.cycle.lock().unwrap_or_else(PoisonError::into_inner) = cycle;
    }

    fn cycle(&self) -> CancellationToken {
        self.cycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// True once the decoder reported end-of-stream and no seek moved away.
    pub(crate) fn at_end(&self) -> bool {
        self.at_end.load(Ordering::Acquire)
    }

    pub(crate) fn clear_end(&self) {
        self.at_end.store(false, Ordering::Release);
    }

    /// Scheduled step, driven by the ticker or the host clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`](crate::error::Error::SessionClosed)
    /// if the session was closed underneath the pump.
    pub(crate) fn tick(&self) -> Result<TickOutcome> {
        let cycle = self.cycle();
        if cycle.is_cancelled() {
            return Ok(TickOutcome::Skipped);
        }

        let mut session = self.session.lock()?;
        // Re-check under the lock: a pause that got the lock first wins.
        if cycle.is_cancelled() {
            return Ok(TickOutcome::Skipped);
        }

        Ok(self.advance(&mut session, &cycle))
    }

    /// Unscheduled step used after seek and stop.
    ///
    /// Ignores the play cycle. End-of-stream is recorded but only pauses
    /// playback if the controller is still `Playing`.
    pub(crate) fn render_now(&self) -> Result<TickOutcome> {
        let mut session = self.session.lock()?;
        Ok(self.advance(&mut session, &self.cycle()))
    }

    fn advance(&self, session: &mut SessionGuard<'_>, cycle: &CancellationToken) -> TickOutcome {
        match session.next_frame(self.size) {
            FrameRead::Frame(view) => {
                if !view.has_expected_len() {
                    return self.reject(view.pixels().len());
                }
                self.present(view.pixels(), view.pts());
                TickOutcome::Rendered {
                    pts_secs: view.pts(),
                }
            }
            FrameRead::EndOfStream => {
                self.at_end.store(true, Ordering::Release);
                if self
                    .shared
                    .transition_if(PlaybackState::Playing, PlaybackState::Paused)
                {
                    cycle.cancel();
                    session.signal_stop(StopMode::Soft);
                    tracing::info!("End of stream reached");
                    self.shared.publish(PlaybackEvent::EndOfStream);
                }
                TickOutcome::EndOfStream
            }
        }
    }

    /// Copies the frame into the surface. Called with the session lock held.
    fn present(&self, pixels: &[u8], pts_secs: f64) {
        {
            let mut surface = self.surface.lock().unwrap_or_else(PoisonError::into_inner);
            surface.blit(pixels, self.size, PixelFormat::Rgb24);
            surface.request_redraw();
        }
        self.shared.count_rendered();
        tracing::trace!(pts_secs, "Frame rendered");
        self.shared.publish(PlaybackEvent::FrameRendered { pts_secs });
    }

    fn reject(&self, len: usize) -> TickOutcome {
        tracing::warn!(
            len,
            expected = self.size.rgb_len(),
            "Dropping frame with unexpected buffer size"
        );
        self.shared.count_rejected();
        TickOutcome::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSurface, ScriptedClip, ScriptedSession, SessionProbe};

    fn pump_for(clip: ScriptedClip) -> (VideoPump, Arc<SessionProbe>, RecordingSurface) {
        let size = clip.size();
        let rate = FrameRate::or_fallback(clip.frame_rate, 25.0);
        let (session, probe) = ScriptedSession::new(clip);
        let surface = RecordingSurface::default();
        let shared = Arc::new(PlaybackShared::new());
        shared.set_state(PlaybackState::Playing);
        let pump = VideoPump::new(
            SharedSession::new(Box::new(session)),
            Box::new(surface.clone()),
            size,
            rate,
            shared,
        );
        (pump, probe, surface)
    }

    #[test]
    fn idle_pump_skips_ticks() {
        let (pump, probe, surface) = pump_for(ScriptedClip::new(1.0, 30.0, 44_100));
        assert_eq!(pump.tick().expect("tick"), TickOutcome::Skipped);
        assert_eq!(probe.frame_reads(), 0);
        assert_eq!(surface.blit_count(), 0);
    }

    #[test]
    fn tick_blits_full_frame_and_requests_redraw() {
        let (pump, _probe, surface) =
            pump_for(ScriptedClip::new(1.0, 30.0, 44_100).with_size(8, 6));
        pump.arm(CancellationToken::new());

        assert!(matches!(pump.tick(), Ok(TickOutcome::Rendered { .. })));
        assert_eq!(surface.blit_lens(), vec![8 * 6 * 3]);
        assert_eq!(surface.redraws(), 1);
    }

    #[test]
    fn end_of_stream_pauses_and_soft_stops_once() {
        let (pump, probe, _surface) = pump_for(ScriptedClip::new(0.1, 30.0, 44_100));
        let cycle = CancellationToken::new();
        pump.arm(cycle.clone());

        for _ in 0..3 {
            assert!(matches!(pump.tick(), Ok(TickOutcome::Rendered { .. })));
        }
        assert_eq!(pump.tick().expect("tick"), TickOutcome::EndOfStream);
        assert_eq!(pump.tick().expect("tick"), TickOutcome::Skipped);

        assert!(cycle.is_cancelled());
        assert!(pump.at_end());
        assert_eq!(pump.shared.state(), PlaybackState::Paused);
        assert_eq!(probe.stops(), vec![StopMode::Soft]);
    }

    #[test]
    fn wrong_sized_frames_are_rejected() {
        let (pump, _probe, surface) =
            pump_for(ScriptedClip::new(1.0, 30.0, 44_100).with_corrupt_frames());
        pump.arm(CancellationToken::new());

        assert_eq!(pump.tick().expect("tick"), TickOutcome::Rejected);
        assert_eq!(surface.blit_count(), 0);
        assert_eq!(pump.shared.stats().frames_rejected, 1);
    }

    #[test]
    fn render_now_ignores_cancelled_cycle() {
        let (pump, _probe, surface) = pump_for(ScriptedClip::new(1.0, 30.0, 44_100));
        assert!(matches!(pump.render_now(), Ok(TickOutcome::Rendered { .. })));
        assert_eq!(surface.blit_count(), 1);
    }

    #[test]
    fn interval_matches_frame_rate() {
        let (pump, _probe, _surface) = pump_for(ScriptedClip::new(1.0, 30.0, 44_100));
        assert_eq!(pump.interval(), Duration::from_secs_f64(1.0 / 30.0));
    }
}
