// SPDX-License-Identifier: MPL-2.0
//! Playback controller: the state machine driving both pumps.
//!
//! The controller owns the decoder session, the audio device and the workers
//! of the current play cycle. Every transition out of `Playing` cancels the
//! cycle token and joins the audio pump before anything else touches the
//! device or the session.

use super::audio_pump::AudioPump;
use super::events::{PlaybackEvent, PlaybackShared, PlaybackStats};
use super::session::SharedSession;
use super::ticker::Ticker;
use super::video_pump::{TickOutcome, VideoPump};
use crate::application::port::{
    AudioDevice, AudioDeviceConfig, AudioSink, DecoderEngine, DecoderSession, PixelFormat,
    SurfaceFactory, SurfaceSpec,
};
use crate::config::{Config, TickSource};
use crate::domain::video::{
    FrameRate, FrameSize, PlaybackState, SampleRate, SeekDirection, StopMode,
};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Stream properties queried once when a session is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub size: FrameSize,
    pub frame_rate: FrameRate,
    /// Rate the decoder reported, which the device may not support.
    pub reported_sample_rate: u32,
    /// Rate the audio device was opened with.
    pub sample_rate: SampleRate,
    pub duration_secs: Option<f64>,
}

impl MediaInfo {
    /// Video pump interval.
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        self.frame_rate.interval()
    }
}

struct ActiveSession {
    info: MediaInfo,
    session: SharedSession,
    pump: Arc<VideoPump>,
    /// `None` while lent to the audio pump, or after the pump lost it.
    device: Option<Box<dyn AudioDevice>>,
    audio: Option<AudioPump>,
    ticker: Option<Ticker>,
    cycle: CancellationToken,
}

impl ActiveSession {
    /// Cancels the play cycle and reclaims the device from the audio pump.
    fn halt_workers(&mut self) {
        self.cycle.cancel();
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        if let Some(pump) = self.audio.take() {
            match pump.join() {
                Some(exit) => self.device = Some(exit.device),
                None => tracing::error!("Audio device lost with the audio pump"),
            }
        }
    }
}

/// Drives one decoder session, one display surface and one audio device.
///
/// # Examples
///
/// ```
/// use vr_playback::config::{Config, TickSource};
/// use vr_playback::domain::video::PlaybackState;
/// use vr_playback::testing::{RecordingSink, RecordingSurfaceFactory, ScriptedClip, ScriptedEngine};
/// use vr_playback::video_player::PlaybackController;
/// use std::sync::Arc;
///
/// let engine = ScriptedEngine::new().with_media("clip.mp4", ScriptedClip::new(1.0, 30.0, 44_100));
/// let mut config = Config::default();
/// config.video.tick_source = TickSource::External;
///
/// let mut player = PlaybackController::new(
///     Arc::new(engine),
///     Arc::new(RecordingSink::new(vec![44_100])),
///     Arc::new(RecordingSurfaceFactory::default()),
///     config,
/// );
/// player.open("clip.mp4").unwrap();
/// assert_eq!(player.state(), PlaybackState::Playing);
/// player.tick().unwrap();
/// player.pause().unwrap();
/// ```
pub struct PlaybackController {
    engine: Arc<dyn DecoderEngine>,
    sink: Arc<dyn AudioSink>,
    surfaces: Arc<dyn SurfaceFactory>,
    config: Config,
    shared: Arc<PlaybackShared>,
    active: Option<ActiveSession>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(
        engine: Arc<dyn DecoderEngine>,
        sink: Arc<dyn AudioSink>,
        surfaces: Arc<dyn SurfaceFactory>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            sink,
            surfaces,
            config,
            shared: Arc::new(PlaybackShared::new()),
            active: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Properties of the open session.
    #[must_use]
    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.active.as_ref().map(|active| &active.info)
    }

    /// Receiver for playback events. Subscribe before `open` to see every
    /// transition.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> PlaybackStats {
        self.shared.stats()
    }

    /// Takes the last audio device failure reported by the audio pump.
    #[must_use]
    pub fn take_audio_error(&self) -> Option<Error> {
        self.shared.take_audio_error()
    }

    /// True while an audio pump thread of the current cycle is still looping.
    #[must_use]
    pub fn is_audio_running(&self) -> bool {
        self.active
            .as_ref()
            .and_then(|active| active.audio.as_ref())
            .is_some_and(|pump| !pump.is_finished())
    }

    /// Presentation timestamp of the last decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when no session is open.
    pub fn position(&self) -> Result<f64> {
        let active = self.active_ref("query position")?;
        let session = active.session.lock()?;
        Ok(session.pts())
    }

    /// Opens `path` and starts playback.
    ///
    /// Any previously open session is closed first.
    ///
    /// # Errors
    ///
    /// - [`Error::Open`] if the decoder returns no session or the stream has
    ///   no picture. No device is opened and no pump is started.
    /// - [`Error::Device`] if the audio device cannot be opened. The session
    ///   is closed again.
    /// - [`Error::Runtime`] if the internal ticker is configured but no tokio
    ///   runtime is running.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<MediaInfo> {
        let path = path.as_ref();
        if self.active.is_some() {
            tracing::debug!("Closing previous session before open");
            self.close();
        }

        self.shared.reset_stats();
        self.shared.set_state(PlaybackState::Opening);

        let Some(session) = self.engine.open(path) else {
            tracing::warn!(path = %path.display(), "Decoder returned no session");
            self.shared.set_state(PlaybackState::Closed);
            return Err(Error::Open {
                path: path.to_path_buf(),
            });
        };

        let info = self.query(path, &*session);
        if info.size.is_empty() {
            tracing::warn!(path = %path.display(), "Stream has no picture");
            session.close();
            self.shared.set_state(PlaybackState::Closed);
            return Err(Error::Open {
                path: path.to_path_buf(),
            });
        }

        let surface = self.surfaces.create(SurfaceSpec {
            size: info.size,
            format: PixelFormat::Rgb24,
            flip_vertical: self.config.video.flip_vertical,
        });
        let device = match self.sink.open(AudioDeviceConfig::stereo_i16(info.sample_rate)) {
            Ok(device) => device,
            Err(err) => {
                tracing::error!("Failed to open audio device: {err}");
                session.close();
                self.shared.set_state(PlaybackState::Closed);
                return Err(err);
            }
        };

        tracing::info!(
            path = %path.display(),
            width = info.size.width,
            height = info.size.height,
            fps = info.frame_rate.value(),
            sample_rate = info.sample_rate.hz(),
            "Media opened"
        );

        let session = SharedSession::new(session);
        let pump = Arc::new(VideoPump::new(
            session.clone(),
            surface,
            info.size,
            info.frame_rate,
            Arc::clone(&self.shared),
        ));
        let idle = CancellationToken::new();
        idle.cancel();
        self.active = Some(ActiveSession {
            info: info.clone(),
            session,
            pump,
            device: Some(device),
            audio: None,
            ticker: None,
            cycle: idle,
        });

        if let Err(err) = self.start_cycle() {
            self.close();
            return Err(err);
        }
        Ok(info)
    }

    fn query(&self, path: &Path, session: &dyn DecoderSession) -> MediaInfo {
        let reported_fps = session.frame_rate();
        let frame_rate =
            FrameRate::or_fallback(reported_fps, self.config.video.fallback_frame_rate);
        if FrameRate::new(reported_fps).is_none() {
            tracing::warn!(
                reported_fps,
                fallback = frame_rate.value(),
                "Stream has no usable frame rate"
            );
        }

        let reported_sample_rate = session.sample_rate();
        let supported = match &self.config.audio.supported_sample_rates {
            Some(rates) => rates.clone(),
            None => self.sink.supported_sample_rates(),
        };
        let (sample_rate, fell_back) = SampleRate::resolve(
            reported_sample_rate,
            &supported,
            self.config.audio.fallback_sample_rate,
        );
        if fell_back {
            tracing::warn!(
                reported = reported_sample_rate,
                fallback = sample_rate.hz(),
                "Sample rate not supported by the device"
            );
        }

        MediaInfo {
            path: path.to_path_buf(),
            size: FrameSize::new(session.width(), session.height()),
            frame_rate,
            reported_sample_rate,
            sample_rate,
            duration_secs: session.duration(),
        }
    }

    /// Starts a new play cycle: ticker (if internal) and audio pump.
    fn start_cycle(&mut self) -> Result<()> {
        let Some(active) = self.active.as_mut() else {
            return Err(Error::SessionClosed);
        };

        let cycle = CancellationToken::new();
        active.cycle = cycle.clone();
        active.pump.arm(cycle.clone());
        let previous = self.shared.set_state(PlaybackState::Playing);

        if self.config.video.tick_source == TickSource::Internal {
            match Ticker::spawn(Arc::clone(&active.pump), cycle.clone()) {
                Ok(ticker) => active.ticker = Some(ticker),
                Err(err) => {
                    cycle.cancel();
                    self.shared.set_state(previous);
                    return Err(err);
                }
            }
        }

        match active.device.take() {
            Some(device) => {
                match AudioPump::spawn(
                    active.session.clone(),
                    device,
                    cycle,
                    Arc::clone(&self.shared),
                ) {
                    Ok(pump) => active.audio = Some(pump),
                    Err(err) => tracing::error!("Failed to start audio pump: {err}"),
                }
            }
            None => tracing::warn!("No audio device, playing video only"),
        }
        Ok(())
    }

    /// Resumes playback.
    ///
    /// From `Stopped`, or when paused at end-of-stream, playback restarts
    /// from the beginning. Calling `play` while `Playing` does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] when no session is open.
    /// - [`Error::Seek`] if rewinding to the start failed.
    pub fn play(&mut self) -> Result<()> {
        let state = self.state();
        match state {
            PlaybackState::Playing => return Ok(()),
            PlaybackState::Paused | PlaybackState::Stopped => {}
            _ => {
                return Err(Error::InvalidState {
                    operation: "play",
                    state,
                })
            }
        }

        let active = active_mut(&mut self.active, "play")?;
        active.halt_workers();
        if state == PlaybackState::Stopped || active.pump.at_end() {
            let rewound = active
                .session
                .lock()
                .and_then(|mut session| session.seek_to(SeekDirection::Backward, 0.0));
            if let Err(err) = rewound {
                tracing::warn!("Failed to rewind: {err}");
                self.shared
                    .publish(PlaybackEvent::SeekFailed { target_secs: 0.0 });
                return Err(err);
            }
            active.pump.clear_end();
            tracing::debug!("Rewound to start");
        }
        self.start_cycle()
    }

    /// Pauses playback. The audio device stays open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless `Playing` or `Paused`.
    pub fn pause(&mut self) -> Result<()> {
        let state = self.state();
        if !matches!(state, PlaybackState::Playing | PlaybackState::Paused) {
            return Err(Error::InvalidState {
                operation: "pause",
                state,
            });
        }
        active_mut(&mut self.active, "pause")?.halt_workers();
        self.shared.set_state(PlaybackState::Paused);
        Ok(())
    }

    /// Pauses when playing, plays otherwise.
    ///
    /// # Errors
    ///
    /// See [`play`](Self::play) and [`pause`](Self::pause).
    pub fn toggle_pause(&mut self) -> Result<()> {
        if self.state().is_playing() {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Stops playback and shows the final frame the decoder parks on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless `Playing`, `Paused` or
    /// already `Stopped`.
    pub fn stop(&mut self) -> Result<()> {
        let state = self.state();
        match state {
            PlaybackState::Playing | PlaybackState::Paused => {}
            PlaybackState::Stopped => return Ok(()),
            _ => {
                return Err(Error::InvalidState {
                    operation: "stop",
                    state,
                })
            }
        }

        let active = active_mut(&mut self.active, "stop")?;
        active.halt_workers();
        if let Some(device) = active.device.as_mut() {
            if let Err(err) = device.stop() {
                tracing::warn!("Failed to stop audio device: {err}");
            }
        }
        self.shared.set_state(PlaybackState::Stopped);

        active.session.lock()?.signal_stop(StopMode::Soft);
        if let Err(err) = active.pump.render_now() {
            tracing::warn!("Failed to render final frame: {err}");
        }
        Ok(())
    }

    /// Seeks `offset_secs` from the current position and renders the frame
    /// found there. Returns the absolute target.
    ///
    /// Audio the device has buffered is discarded. While `Playing`, both
    /// pumps are halted for the jump and restarted afterwards unless the
    /// seek landed on end-of-stream.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless `Playing` or `Paused`.
    /// - [`Error::Seek`] if the decoder refused. No retry is attempted.
    pub fn seek(&mut self, direction: SeekDirection, offset_secs: f64) -> Result<f64> {
        let state = self.state();
        if !state.can_seek() {
            return Err(Error::InvalidState {
                operation: "seek",
                state,
            });
        }
        let offset = if offset_secs.is_finite() {
            offset_secs.abs()
        } else {
            0.0
        };

        let was_playing = state == PlaybackState::Playing;
        let active = active_mut(&mut self.active, "seek")?;
        if was_playing {
            active.halt_workers();
        }
        // Audio queued before the jump must not play after it.
        if let Some(device) = active.device.as_mut() {
            if let Err(err) = device.stop() {
                tracing::warn!("Failed to flush audio device: {err}");
            }
        }

        let result = Self::seek_session(active, &self.shared, direction, offset);
        if was_playing && self.state() == PlaybackState::Playing {
            self.start_cycle()?;
        }
        result
    }

    fn seek_session(
        active: &ActiveSession,
        shared: &PlaybackShared,
        direction: SeekDirection,
        offset: f64,
    ) -> Result<f64> {
        let target = {
            let mut session = active.session.lock()?;
            let target = direction.target_from(session.pts(), offset);
            if let Err(err) = session.seek_to(direction, target) {
                tracing::warn!(?direction, target, "Seek failed");
                shared.publish(PlaybackEvent::SeekFailed { target_secs: target });
                return Err(err);
            }
            target
        };
        active.pump.clear_end();
        tracing::debug!(?direction, target, "Seek complete");

        if let Err(err) = active.pump.render_now() {
            tracing::warn!("Failed to render after seek: {err}");
        }
        Ok(target)
    }

    /// Seeks by the configured step.
    ///
    /// # Errors
    ///
    /// See [`seek`](Self::seek).
    pub fn seek_step(&mut self, direction: SeekDirection) -> Result<f64> {
        let step = self.config.seek.step();
        self.seek(direction, step.value())
    }

    /// Runs one video pump step from the host's clock.
    ///
    /// Meant for [`TickSource::External`]; ticks outside `Playing` are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when no session is open.
    pub fn tick(&self) -> Result<TickOutcome> {
        self.active_ref("tick")?.pump.tick()
    }

    /// Stops the workers, closes the audio device, then closes the session.
    pub fn close(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };
        active.halt_workers();
        if let Some(device) = active.device.take() {
            device.close();
        }
        if let Ok(mut session) = active.session.lock() {
            session.signal_stop(StopMode::Hard);
        }
        active.session.close();
        self.shared.set_state(PlaybackState::Closed);
        tracing::info!(path = %active.info.path.display(), "Media closed");
    }

    fn active_ref(&self, operation: &'static str) -> Result<&ActiveSession> {
        self.active.as_ref().ok_or(Error::InvalidState {
            operation,
            state: PlaybackState::Closed,
        })
    }
}

/// Borrows only the session slot so callers can still reach other fields.
fn active_mut<'a>(
    active: &'a mut Option<ActiveSession>,
    operation: &'static str,
) -> Result<&'a mut ActiveSession> {
    active.as_mut().ok_or(Error::InvalidState {
        operation,
        state: PlaybackState::Closed,
    })
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("state", &self.state())
            .field("media", &self.media_info())
            .finish_non_exhaustive()
    }
}
