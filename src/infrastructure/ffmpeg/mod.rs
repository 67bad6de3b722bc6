// SPDX-License-Identifier: MPL-2.0
//! `FFmpeg` adapter implementing the [`DecoderEngine`] and [`DecoderSession`]
//! port traits.
//!
//! # Design Notes
//!
//! - One demuxer feeds both decoders. Packets belonging to the stream that
//!   is not currently being read are queued, so video and audio reads behave
//!   like independent cursors
//! - Video is converted to packed RGB24 with swscale, audio to interleaved
//!   stereo `i16` at the stream's own rate with swresample
//! - Forward seeks land on the first keyframe at or after the target,
//!   backward seeks on the last keyframe at or before it
//!
//! [`DecoderEngine`]: crate::application::port::DecoderEngine
//! [`DecoderSession`]: crate::application::port::DecoderSession

use crate::application::port::{DecoderEngine, DecoderSession, FrameStatus};
use crate::domain::video::{SeekDirection, StopMode};
use crate::error::{Error, Result};
use ffmpeg_next::format::sample::Type as SampleType;
use ffmpeg_next::format::Sample;
use ffmpeg_next::software::{resampling, scaling};
use ffmpeg_next::{codec, format, frame, media, ChannelLayout, Packet};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Once;

/// Packets of the idle stream kept before the oldest are dropped.
const MAX_PENDING_PACKETS: usize = 512;

static FFMPEG_INIT: Once = Once::new();

/// Initializes `FFmpeg` once and silences its warnings.
fn init_ffmpeg() -> Result<()> {
    let mut init_result: Result<()> = Ok(());

    FFMPEG_INIT.call_once(|| {
        if let Err(e) = ffmpeg_next::init() {
            init_result = Err(Error::Io(format!("FFmpeg initialization failed: {e}")));
            return;
        }

        // SAFETY: av_log_set_level is thread-safe and only affects logging
        unsafe {
            ffmpeg_next::ffi::av_log_set_level(ffmpeg_next::ffi::AV_LOG_ERROR);
        }
    });

    init_result
}

/// Opens media files with `FFmpeg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DecoderEngine for FfmpegEngine {
    fn open(&self, path: &Path) -> Option<Box<dyn DecoderSession>> {
        match FfmpegSession::open(path) {
            Ok(session) => Some(Box::new(session)),
            Err(err) => {
                tracing::warn!(path = %path.display(), "FFmpeg could not open media: {err}");
                None
            }
        }
    }
}

/// Demuxer with one pending queue per decoded stream.
struct Demuxer {
    input: format::context::Input,
    video_index: usize,
    audio_index: Option<usize>,
    video_pending: VecDeque<Packet>,
    audio_pending: VecDeque<Packet>,
    eof: bool,
}

impl Demuxer {
    /// Returns the next packet of `stream`, queueing packets of the other one.
    fn next_packet(&mut self, stream: usize) -> Option<Packet> {
        let pending = if stream == self.video_index {
            &mut self.video_pending
        } else {
            &mut self.audio_pending
        };
        if let Some(packet) = pending.pop_front() {
            return Some(packet);
        }

        while !self.eof {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    let index = packet.stream();
                    if index == stream {
                        return Some(packet);
                    }
                    if index == self.video_index {
                        Self::stash(&mut self.video_pending, packet);
                    } else if Some(index) == self.audio_index {
                        Self::stash(&mut self.audio_pending, packet);
                    }
                }
                Err(ffmpeg_next::Error::Eof) => self.eof = true,
                Err(err) => {
                    tracing::debug!("Stopping demux after read error: {err}");
                    self.eof = true;
                }
            }
        }
        None
    }

    fn stash(queue: &mut VecDeque<Packet>, packet: Packet) {
        if queue.len() >= MAX_PENDING_PACKETS {
            queue.pop_front();
        }
        queue.push_back(packet);
    }

    /// Seeks the container. `microseconds` is in `AV_TIME_BASE` units.
    fn seek(&mut self, direction: SeekDirection, microseconds: i64) -> bool {
        let result = match direction {
            SeekDirection::Forward => self.input.seek(microseconds, microseconds..),
            SeekDirection::Backward => self.input.seek(microseconds, ..microseconds),
        };
        match result {
            Ok(()) => {
                self.video_pending.clear();
                self.audio_pending.clear();
                self.eof = false;
                true
            }
            Err(err) => {
                tracing::debug!(microseconds, "Container seek failed: {err}");
                false
            }
        }
    }
}

struct AudioTrack {
    index: usize,
    decoder: codec::decoder::Audio,
    resampler: resampling::Context,
    decoded: frame::Audio,
    drained: bool,
}

/// One open media file.
pub struct FfmpegSession {
    demuxer: Demuxer,
    video: codec::decoder::Video,
    scaler: scaling::Context,
    decoded: frame::Video,
    converted: frame::Video,
    video_drained: bool,
    time_base: f64,
    width: u32,
    height: u32,
    frame_rate: f64,
    duration: Option<f64>,
    pts: f64,
    rgb: Vec<u8>,
    audio: Option<AudioTrack>,
    audio_bytes: Vec<u8>,
}

// SAFETY: FfmpegSession contains FFmpeg types with internal raw pointers.
// These are safe to send between threads because:
// 1. FFmpeg's decoder/format/scaler contexts are safe for single-threaded access per instance
// 2. We maintain exclusive access through Rust's ownership model
// 3. The playback core serializes every call behind one mutex
unsafe impl Send for FfmpegSession {}

impl FfmpegSession {
    /// Opens `path` and prepares both decoders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be demuxed or has no
    /// decodable video stream. A broken audio stream only disables audio.
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let input = format::input(&path)
            .map_err(|e| Error::Io(format!("Failed to open video: {e}")))?;

        let (video_index, time_base, frame_rate, video) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| Error::Io("No video stream found".to_string()))?;

            let rate = stream.avg_frame_rate();
            let frame_rate = if rate.denominator() != 0 {
                f64::from(rate.numerator()) / f64::from(rate.denominator())
            } else {
                0.0
            };
            let time_base = stream.time_base();
            let time_base =
                f64::from(time_base.numerator()) / f64::from(time_base.denominator());

            let decoder = codec::context::Context::from_parameters(stream.parameters())
                .map_err(|e| Error::Io(format!("Failed to create codec context: {e}")))?
                .decoder()
                .video()
                .map_err(|e| Error::Io(format!("Failed to create video decoder: {e}")))?;
            (stream.index(), time_base, frame_rate, decoder)
        };

        let audio = input
            .streams()
            .best(media::Type::Audio)
            .and_then(|stream| match Self::open_audio(&stream) {
                Ok(track) => Some(track),
                Err(err) => {
                    tracing::warn!("Audio disabled: {err}");
                    None
                }
            });

        #[allow(clippy::cast_precision_loss)]
        let duration = (input.duration() > 0)
            .then(|| input.duration() as f64 / f64::from(ffmpeg_next::ffi::AV_TIME_BASE));

        let width = video.width();
        let height = video.height();
        let scaler = scaling::Context::get(
            video.format(),
            width,
            height,
            format::Pixel::RGB24,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| Error::Io(format!("Failed to create scaler: {e}")))?;

        Ok(Self {
            demuxer: Demuxer {
                input,
                video_index,
                audio_index: audio.as_ref().map(|track| track.index),
                video_pending: VecDeque::new(),
                audio_pending: VecDeque::new(),
                eof: false,
            },
            video,
            scaler,
            decoded: frame::Video::empty(),
            converted: frame::Video::empty(),
            video_drained: false,
            time_base,
            width,
            height,
            frame_rate,
            duration,
            pts: 0.0,
            rgb: vec![0; width as usize * height as usize * 3],
            audio,
            audio_bytes: Vec::new(),
        })
    }

    fn open_audio(stream: &format::stream::Stream<'_>) -> Result<AudioTrack> {
        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| Error::Io(format!("Failed to create codec context: {e}")))?
            .decoder()
            .audio()
            .map_err(|e| Error::Io(format!("Failed to create audio decoder: {e}")))?;

        let resampler = resampling::Context::get(
            decoder.format(),
            decoder.channel_layout(),
            decoder.rate(),
            Sample::I16(SampleType::Packed),
            ChannelLayout::STEREO,
            decoder.rate(),
        )
        .map_err(|e| Error::Io(format!("Failed to create resampler: {e}")))?;

        Ok(AudioTrack {
            index: stream.index(),
            decoder,
            resampler,
            decoded: frame::Audio::empty(),
            drained: false,
        })
    }

    /// Copies the converted frame row by row, dropping stride padding.
    fn store_rgb(&mut self) {
        let row_len = self.width as usize * 3;
        let stride = self.converted.stride(0);
        let data = self.converted.data(0);

        self.rgb.clear();
        for y in 0..self.height as usize {
            let start = y * stride;
            self.rgb.extend_from_slice(&data[start..start + row_len]);
        }
    }

    fn reposition(&mut self, direction: SeekDirection, target_secs: f64) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let microseconds = (target_secs.max(0.0) * 1_000_000.0) as i64;
        if !self.demuxer.seek(direction, microseconds) {
            return false;
        }
        self.video.flush();
        self.video_drained = false;
        if let Some(audio) = self.audio.as_mut() {
            audio.decoder.flush();
            audio.drained = false;
        }
        self.pts = target_secs.max(0.0);
        true
    }
}

impl DecoderSession for FfmpegSession {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn sample_rate(&self) -> u32 {
        self.audio
            .as_ref()
            .map_or(0, |track| track.decoder.rate())
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn pts(&self) -> f64 {
        self.pts
    }

    #[allow(clippy::cast_precision_loss)]
    fn read_frame(&mut self) -> FrameStatus {
        loop {
            if self.video.receive_frame(&mut self.decoded).is_ok() {
                if let Err(err) = self.scaler.run(&self.decoded, &mut self.converted) {
                    tracing::debug!("Scaling failed: {err}");
                    continue;
                }
                if let Some(timestamp) = self.decoded.timestamp() {
                    self.pts = timestamp as f64 * self.time_base;
                }
                self.store_rgb();
                return FrameStatus::Decoded;
            }
            if self.video_drained {
                return FrameStatus::EndOfStream;
            }

            match self.demuxer.next_packet(self.demuxer.video_index) {
                Some(packet) => {
                    if let Err(err) = self.video.send_packet(&packet) {
                        tracing::debug!("Video packet rejected: {err}");
                    }
                }
                None => {
                    let _ = self.video.send_eof();
                    self.video_drained = true;
                }
            }
        }
    }

    fn rgb(&self) -> &[u8] {
        &self.rgb
    }

    fn read_audio(&mut self) -> bool {
        let Self {
            demuxer,
            audio,
            audio_bytes,
            ..
        } = self;
        let Some(track) = audio.as_mut() else {
            return false;
        };

        loop {
            if track.decoder.receive_frame(&mut track.decoded).is_ok() {
                let mut resampled = frame::Audio::empty();
                if let Err(err) = track.resampler.run(&track.decoded, &mut resampled) {
                    tracing::debug!("Resampling failed: {err}");
                    continue;
                }
                // Packed stereo i16: 4 bytes per frame.
                let len = resampled.samples() * 4;
                let data = resampled.data(0);
                audio_bytes.clear();
                audio_bytes.extend_from_slice(&data[..len.min(data.len())]);
                return true;
            }
            if track.drained {
                audio_bytes.clear();
                return false;
            }

            match demuxer.next_packet(track.index) {
                Some(packet) => {
                    if let Err(err) = track.decoder.send_packet(&packet) {
                        tracing::debug!("Audio packet rejected: {err}");
                    }
                }
                None => {
                    let _ = track.decoder.send_eof();
                    track.drained = true;
                }
            }
        }
    }

    fn audio(&self) -> &[u8] {
        &self.audio_bytes
    }

    fn seek(&mut self, direction: SeekDirection, target_secs: f64) -> bool {
        self.reposition(direction, target_secs)
    }

    fn stop(&mut self, mode: StopMode) -> bool {
        match mode {
            StopMode::Hard => self.reposition(SeekDirection::Backward, 0.0),
            StopMode::Soft => {
                let last_frame = match (self.duration, self.frame_rate > 0.0) {
                    (Some(duration), true) => (duration - 1.0 / self.frame_rate).max(0.0),
                    (Some(duration), false) => duration,
                    (None, _) => self.pts,
                };
                self.reposition(SeekDirection::Backward, last_frame)
            }
        }
    }

    fn close(self: Box<Self>) {
        tracing::debug!("FFmpeg session closed");
    }
}
