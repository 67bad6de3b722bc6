// SPDX-License-Identifier: MPL-2.0
//! Scripted test doubles for the decoder, audio and display ports.
//!
//! The doubles are deterministic: a [`ScriptedClip`] describes a synthetic
//! stream and every call made by the playback core is recorded in a probe
//! or log that tests can inspect after the fact.
//!
//! # Examples
//!
//! ```
//! use vr_playback::testing::{ScriptedClip, ScriptedEngine};
//! use vr_playback::application::port::DecoderEngine;
//! use std::path::Path;
//!
//! let engine = ScriptedEngine::new().with_media("clip.mp4", ScriptedClip::new(10.0, 30.0, 44_100));
//! assert!(engine.open(Path::new("clip.mp4")).is_some());
//! assert!(engine.open(Path::new("missing.mp4")).is_none());
//! ```

use crate::application::port::{
    AudioDevice, AudioDeviceConfig, AudioSink, DecoderEngine, DecoderSession, DisplaySurface,
    FrameStatus, PixelFormat, StereoFrame, SurfaceFactory, SurfaceSpec,
};
use crate::domain::video::{FrameSize, SeekDirection, StopMode};
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const DEFAULT_AUDIO_CHUNK_FRAMES: usize = 1024;

// =============================================================================
// Decoder
// =============================================================================

/// Description of a synthetic media stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedClip {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub audio_chunk_frames: usize,
    pub has_audio: bool,
    pub fail_seeks: bool,
    pub corrupt_frames: bool,
}

impl ScriptedClip {
    /// A 16x9 stereo clip.
    #[must_use]
    pub fn new(duration_secs: f64, frame_rate: f64, sample_rate: u32) -> Self {
        Self {
            width: 16,
            height: 9,
            frame_rate,
            duration_secs,
            sample_rate,
            audio_chunk_frames: DEFAULT_AUDIO_CHUNK_FRAMES,
            has_audio: true,
            fail_seeks: false,
            corrupt_frames: false,
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_audio_chunk(mut self, frames: usize) -> Self {
        self.audio_chunk_frames = frames.max(1);
        self
    }

    #[must_use]
    pub fn without_audio(mut self) -> Self {
        self.has_audio = false;
        self
    }

    /// Every seek call reports failure.
    #[must_use]
    pub fn failing_seeks(mut self) -> Self {
        self.fail_seeks = true;
        self
    }

    /// Decoded frames are one byte short of `width * height * 3`.
    #[must_use]
    pub fn with_corrupt_frames(mut self) -> Self {
        self.corrupt_frames = true;
        self
    }

    #[must_use]
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    /// Number of decodable video frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        if self.frame_rate > 0.0 {
            (self.duration_secs * self.frame_rate).round() as usize
        } else {
            0
        }
    }

    /// Number of decodable stereo audio frames.
    #[must_use]
    pub fn audio_frame_count(&self) -> usize {
        if self.has_audio {
            (self.duration_secs * f64::from(self.sample_rate)).round() as usize
        } else {
            0
        }
    }
}

/// Record of every call a [`ScriptedSession`] received.
#[derive(Debug, Default)]
pub struct SessionProbe {
    frame_reads: AtomicUsize,
    audio_reads: AtomicUsize,
    seeks: Mutex<Vec<(SeekDirection, f64)>>,
    stops: Mutex<Vec<StopMode>>,
    closed: AtomicBool,
}

impl SessionProbe {
    #[must_use]
    pub fn frame_reads(&self) -> usize {
        self.frame_reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn audio_reads(&self) -> usize {
        self.audio_reads.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn seeks(&self) -> Vec<(SeekDirection, f64)> {
        self.seeks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn stops(&self) -> Vec<StopMode> {
        self.stops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn soft_stops(&self) -> usize {
        self.stops()
            .into_iter()
            .filter(|mode| *mode == StopMode::Soft)
            .count()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Decoder session producing synthetic frames and audio.
///
/// Video and audio keep separate cursors. Frame `n` is filled with the byte
/// `n % 256` and reports `pts = n / fps`.
pub struct ScriptedSession {
    clip: ScriptedClip,
    probe: Arc<SessionProbe>,
    next_frame: usize,
    next_audio_frame: usize,
    pts: f64,
    rgb: Vec<u8>,
    audio: Vec<u8>,
}

impl ScriptedSession {
    #[must_use]
    pub fn new(clip: ScriptedClip) -> (Self, Arc<SessionProbe>) {
        let probe = Arc::new(SessionProbe::default());
        let len = clip.size().rgb_len();
        let rgb_len = if clip.corrupt_frames {
            len.saturating_sub(1)
        } else {
            len
        };
        let session = Self {
            clip,
            probe: Arc::clone(&probe),
            next_frame: 0,
            next_audio_frame: 0,
            pts: 0.0,
            rgb: vec![0; rgb_len],
            audio: Vec::new(),
        };
        (session, probe)
    }

    fn frame_pts(&self, index: usize) -> f64 {
        if self.clip.frame_rate > 0.0 {
            index as f64 / self.clip.frame_rate
        } else {
            0.0
        }
    }

    fn reposition(&mut self, target_secs: f64) {
        let target = target_secs.clamp(0.0, self.clip.duration_secs.max(0.0));
        self.next_frame =
            ((target * self.clip.frame_rate).round() as usize).min(self.clip.frame_count());
        self.next_audio_frame = ((target * f64::from(self.clip.sample_rate)).round() as usize)
            .min(self.clip.audio_frame_count());
        self.pts = target;
    }
}

impl DecoderSession for ScriptedSession {
    fn width(&self) -> u32 {
        self.clip.width
    }

    fn height(&self) -> u32 {
        self.clip.height
    }

    fn frame_rate(&self) -> f64 {
        self.clip.frame_rate
    }

    fn sample_rate(&self) -> u32 {
        self.clip.sample_rate
    }

    fn duration(&self) -> Option<f64> {
        Some(self.clip.duration_secs)
    }

    fn pts(&self) -> f64 {
        self.pts
    }

    fn read_frame(&mut self) -> FrameStatus {
        self.probe.frame_reads.fetch_add(1, Ordering::SeqCst);
        if self.next_frame >= self.clip.frame_count() {
            return FrameStatus::EndOfStream;
        }
        let fill = (self.next_frame % 256) as u8;
        self.rgb.iter_mut().for_each(|byte| *byte = fill);
        self.pts = self.frame_pts(self.next_frame);
        self.next_frame += 1;
        FrameStatus::Decoded
    }

    fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    fn read_audio(&mut self) -> bool {
        self.probe.audio_reads.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .clip
            .audio_frame_count()
            .saturating_sub(self.next_audio_frame);
        if remaining == 0 {
            self.audio.clear();
            return false;
        }
        let count = remaining.min(self.clip.audio_chunk_frames);
        let frames: Vec<StereoFrame> = (self.next_audio_frame..self.next_audio_frame + count)
            .map(|i| {
                let sample = (i % 2048) as i16 - 1024;
                [sample, -sample]
            })
            .collect();
        self.audio = bytemuck::cast_slice(&frames).to_vec();
        self.next_audio_frame += count;
        true
    }

    fn audio(&self) -> &[u8] {
        &self.audio
    }

    fn seek(&mut self, direction: SeekDirection, target_secs: f64) -> bool {
        self.probe
            .seeks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((direction, target_secs));
        if self.clip.fail_seeks {
            return false;
        }
        self.reposition(target_secs);
        true
    }

    fn stop(&mut self, mode: StopMode) -> bool {
        self.probe
            .stops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(mode);
        match mode {
            StopMode::Soft => {
                self.next_frame = self.clip.frame_count().saturating_sub(1);
                self.pts = self.frame_pts(self.next_frame);
            }
            StopMode::Hard => self.reposition(0.0),
        }
        true
    }

    fn close(self: Box<Self>) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

/// Engine that knows a fixed set of paths.
#[derive(Default)]
pub struct ScriptedEngine {
    media: HashMap<PathBuf, ScriptedClip>,
    attempts: AtomicUsize,
    probes: Mutex<Vec<Arc<SessionProbe>>>,
}

impl ScriptedEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_media(mut self, path: impl Into<PathBuf>, clip: ScriptedClip) -> Self {
        self.media.insert(path.into(), clip);
        self
    }

    /// Number of `open` calls, successful or not.
    #[must_use]
    pub fn open_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Probe of the most recently opened session.
    #[must_use]
    pub fn last_probe(&self) -> Option<Arc<SessionProbe>> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Probes of every session opened so far, oldest first.
    #[must_use]
    pub fn probes(&self) -> Vec<Arc<SessionProbe>> {
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DecoderEngine for ScriptedEngine {
    fn open(&self, path: &Path) -> Option<Box<dyn DecoderSession>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let clip = self.media.get(path)?.clone();
        let (session, probe) = ScriptedSession::new(clip);
        self.probes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(probe);
        Some(Box::new(session))
    }
}

// =============================================================================
// Audio
// =============================================================================

/// Record of every call a [`RecordingDevice`] received.
#[derive(Debug, Default)]
pub struct DeviceLog {
    frames_written: AtomicU64,
    writes_started: AtomicUsize,
    writes_finished: AtomicUsize,
    stops: AtomicUsize,
    closed: AtomicBool,
}

impl DeviceLog {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn writes_started(&self) -> usize {
        self.writes_started.load(Ordering::SeqCst)
    }

    /// Writes that have started but not returned.
    #[must_use]
    pub fn writes_in_flight(&self) -> usize {
        self.writes_started()
            .saturating_sub(self.writes_finished.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Device that counts frames instead of playing them.
pub struct RecordingDevice {
    log: Arc<DeviceLog>,
    write_delay: Duration,
    fail_after: Option<usize>,
}

impl RecordingDevice {
    #[must_use]
    pub fn new(log: Arc<DeviceLog>) -> Self {
        Self {
            log,
            write_delay: Duration::ZERO,
            fail_after: None,
        }
    }

    /// Each write blocks for `delay` unless cancelled.
    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Writes fail once `writes` writes have succeeded.
    #[must_use]
    pub fn failing_after(mut self, writes: usize) -> Self {
        self.fail_after = Some(writes);
        self
    }
}

impl AudioDevice for RecordingDevice {
    fn write(&mut self, block: &[StereoFrame], cancel: &CancellationToken) -> Result<usize> {
        let started = self.log.writes_started.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_after.is_some_and(|limit| started >= limit) {
            Err(Error::Device("scripted write failure".into()))
        } else {
            let deadline = Instant::now() + self.write_delay;
            let mut accepted = block.len();
            while Instant::now() < deadline {
                if cancel.is_cancelled() {
                    accepted = 0;
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
            self.log
                .frames_written
                .fetch_add(accepted as u64, Ordering::SeqCst);
            Ok(accepted)
        };
        self.log.writes_finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn stop(&mut self) -> Result<()> {
        self.log.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.log.closed.store(true, Ordering::SeqCst);
    }
}

/// Sink that opens [`RecordingDevice`]s and remembers each request.
pub struct RecordingSink {
    supported: Vec<u32>,
    log: Arc<DeviceLog>,
    opened: Mutex<Vec<AudioDeviceConfig>>,
    write_delay: Duration,
    fail_open: bool,
    fail_writes_after: Option<usize>,
}

impl RecordingSink {
    #[must_use]
    pub fn new(supported: Vec<u32>) -> Self {
        Self {
            supported,
            log: DeviceLog::new(),
            opened: Mutex::new(Vec::new()),
            write_delay: Duration::ZERO,
            fail_open: false,
            fail_writes_after: None,
        }
    }

    #[must_use]
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    #[must_use]
    pub fn failing_writes_after(mut self, writes: usize) -> Self {
        self.fail_writes_after = Some(writes);
        self
    }

    /// Log shared by every device this sink opened.
    #[must_use]
    pub fn log(&self) -> Arc<DeviceLog> {
        Arc::clone(&self.log)
    }

    /// Configurations passed to `open`, including failed attempts.
    #[must_use]
    pub fn opened(&self) -> Vec<AudioDeviceConfig> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AudioSink for RecordingSink {
    fn supported_sample_rates(&self) -> Vec<u32> {
        self.supported.clone()
    }

    fn open(&self, config: AudioDeviceConfig) -> Result<Box<dyn AudioDevice>> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config);
        if self.fail_open {
            return Err(Error::Device("no output device".into()));
        }
        let mut device =
            RecordingDevice::new(Arc::clone(&self.log)).with_write_delay(self.write_delay);
        device.fail_after = self.fail_writes_after;
        Ok(Box::new(device))
    }
}

// =============================================================================
// Display
// =============================================================================

#[derive(Debug, Default)]
struct SurfaceLog {
    blits: Vec<(usize, FrameSize)>,
    last_pixels: Vec<u8>,
    redraws: usize,
}

/// Surface that records blits. Clones share one log.
#[derive(Clone, Default)]
pub struct RecordingSurface {
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    fn log(&self) -> std::sync::MutexGuard<'_, SurfaceLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn blit_count(&self) -> usize {
        self.log().blits.len()
    }

    /// Byte length of every blitted buffer, in order.
    #[must_use]
    pub fn blit_lens(&self) -> Vec<usize> {
        self.log().blits.iter().map(|(len, _)| *len).collect()
    }

    #[must_use]
    pub fn blit_sizes(&self) -> Vec<FrameSize> {
        self.log().blits.iter().map(|(_, size)| *size).collect()
    }

    /// Copy of the most recent frame.
    #[must_use]
    pub fn last_pixels(&self) -> Vec<u8> {
        self.log().last_pixels.clone()
    }

    #[must_use]
    pub fn redraws(&self) -> usize {
        self.log().redraws
    }
}

impl DisplaySurface for RecordingSurface {
    fn blit(&mut self, pixels: &[u8], size: FrameSize, _format: PixelFormat) {
        let mut log = self.log();
        log.blits.push((pixels.len(), size));
        log.last_pixels = pixels.to_vec();
    }

    fn request_redraw(&mut self) {
        self.log().redraws += 1;
    }
}

/// Factory handing out one shared [`RecordingSurface`].
#[derive(Clone, Default)]
pub struct RecordingSurfaceFactory {
    surface: RecordingSurface,
    specs: Arc<Mutex<Vec<SurfaceSpec>>>,
}

impl RecordingSurfaceFactory {
    #[must_use]
    pub fn surface(&self) -> RecordingSurface {
        self.surface.clone()
    }

    /// Specs passed to `create`, oldest first.
    #[must_use]
    pub fn specs(&self) -> Vec<SurfaceSpec> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SurfaceFactory for RecordingSurfaceFactory {
    fn create(&self, spec: SurfaceSpec) -> Box<dyn DisplaySurface> {
        self.specs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec);
        Box::new(self.surface.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{assert_abs_diff_eq, PTS_EPSILON};

    #[test]
    fn clip_counts_follow_duration() {
        let clip = ScriptedClip::new(10.0, 30.0, 44_100);
        assert_eq!(clip.frame_count(), 300);
        assert_eq!(clip.audio_frame_count(), 441_000);
        assert_eq!(clip.without_audio().audio_frame_count(), 0);
    }

    #[test]
    fn soft_stop_parks_on_last_frame() {
        let (mut session, probe) = ScriptedSession::new(ScriptedClip::new(0.1, 30.0, 44_100));
        assert!(session.stop(StopMode::Soft));
        assert_eq!(session.read_frame(), FrameStatus::Decoded);
        assert_eq!(session.read_frame(), FrameStatus::EndOfStream);
        assert_eq!(probe.soft_stops(), 1);
    }

    #[test]
    fn hard_stop_rewinds() {
        let (mut session, _probe) = ScriptedSession::new(ScriptedClip::new(0.1, 30.0, 44_100));
        while session.read_frame() == FrameStatus::Decoded {}
        assert!(session.stop(StopMode::Hard));
        assert_eq!(session.read_frame(), FrameStatus::Decoded);
        assert_abs_diff_eq!(session.pts(), 0.0, epsilon = PTS_EPSILON);
    }

    #[test]
    fn seek_moves_both_cursors() {
        let (mut session, probe) =
            ScriptedSession::new(ScriptedClip::new(2.0, 10.0, 1_000).with_audio_chunk(2_000));
        assert!(session.seek(SeekDirection::Forward, 1.5));
        assert_abs_diff_eq!(session.pts(), 1.5, epsilon = PTS_EPSILON);

        assert!(session.read_audio());
        assert_eq!(session.audio().len(), 500 * 4);
        assert_eq!(probe.seeks(), vec![(SeekDirection::Forward, 1.5)]);
    }

    #[test]
    fn sink_records_failed_open() {
        let sink = RecordingSink::new(vec![44_100]).failing_open();
        let config = AudioDeviceConfig::stereo_i16(crate::domain::video::SampleRate::new(44_100));
        assert!(sink.open(config).is_err());
        assert_eq!(sink.opened(), vec![config]);
    }
}
