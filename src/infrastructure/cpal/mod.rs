// SPDX-License-Identifier: MPL-2.0
//! `cpal` adapter implementing the [`AudioSink`] and [`AudioDevice`] port
//! traits.
//!
//! A `cpal::Stream` cannot leave the thread that built it, so every device
//! owns a small output thread that builds the stream, plays it and parks
//! until the device is closed. Writes go through a bounded [`SampleQueue`]
//! that the stream callback drains; a full queue blocks the writer, which
//! is what paces the audio pump.
//!
//! [`AudioSink`]: crate::application::port::AudioSink
//! [`AudioDevice`]: crate::application::port::AudioDevice

use crate::application::port::{AudioDevice, AudioDeviceConfig, AudioSink, StereoFrame};
use crate::config::AudioConfig;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Rates probed against the device's supported ranges.
const PROBED_SAMPLE_RATES: &[u32] = &[8_000, 11_025, 16_000, 22_050, 32_000, 44_100, 48_000, 88_200, 96_000];

/// Opens devices on the default host's default output.
#[derive(Debug, Clone)]
pub struct CpalSink {
    buffer: Duration,
    write_slice: Duration,
}

impl CpalSink {
    #[must_use]
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            buffer: config.buffer_duration(),
            write_slice: config.write_slice(),
        }
    }
}

impl AudioSink for CpalSink {
    fn supported_sample_rates(&self) -> Vec<u32> {
        let Some(device) = cpal::default_host().default_output_device() else {
            tracing::warn!("No audio output device found");
            return Vec::new();
        };
        let ranges = match device.supported_output_configs() {
            Ok(ranges) => ranges.filter(|range| range.channels() == 2).collect::<Vec<_>>(),
            Err(err) => {
                tracing::warn!("Failed to query audio configs: {err}");
                return Vec::new();
            }
        };

        PROBED_SAMPLE_RATES
            .iter()
            .copied()
            .filter(|&rate| {
                ranges.iter().any(|range| {
                    range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0
                })
            })
            .collect()
    }

    fn open(&self, config: AudioDeviceConfig) -> Result<Box<dyn AudioDevice>> {
        let device = CpalDevice::open(config, self.buffer, self.write_slice)?;
        Ok(Box::new(device))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    samples: VecDeque<i16>,
    failure: Option<String>,
}

/// Bounded interleaved sample buffer shared with the stream callback.
#[derive(Debug)]
pub struct SampleQueue {
    state: Mutex<QueueState>,
    drained: Condvar,
    capacity: usize,
}

impl SampleQueue {
    /// Creates a queue holding at most `capacity` samples (not frames).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            drained: Condvar::new(),
            capacity: capacity.max(2),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends `block`, waiting in `slice` steps while the queue is full.
    ///
    /// Returns the number of frames accepted, which is less than the block
    /// length only when `cancel` fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] once the stream has reported a failure.
    pub fn push(
        &self,
        block: &[StereoFrame],
        cancel: &CancellationToken,
        slice: Duration,
    ) -> Result<usize> {
        let mut written = 0;
        let mut state = self.lock();

        while written < block.len() {
            if let Some(failure) = &state.failure {
                return Err(Error::Device(failure.clone()));
            }
            if cancel.is_cancelled() {
                break;
            }

            let free_frames = self.capacity.saturating_sub(state.samples.len()) / 2;
            if free_frames == 0 {
                state = self
                    .drained
                    .wait_timeout(state, slice)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
                continue;
            }

            let take = free_frames.min(block.len() - written);
            for frame in &block[written..written + take] {
                state.samples.extend(frame.iter().copied());
            }
            written += take;
        }

        Ok(written)
    }

    /// Moves queued samples into `out`, padding with silence.
    pub fn drain_into<T: cpal::SizedSample + cpal::FromSample<i16>>(&self, out: &mut [T]) {
        let mut state = self.lock();
        for sample in out.iter_mut() {
            *sample = T::from_sample(state.samples.pop_front().unwrap_or(0));
        }
        drop(state);
        self.drained.notify_all();
    }

    /// Discards everything queued.
    pub fn clear(&self) {
        self.lock().samples.clear();
        self.drained.notify_all();
    }

    /// Records a stream failure; later pushes return it.
    pub fn fail(&self, message: String) {
        self.lock().failure = Some(message);
        self.drained.notify_all();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An open output stream.
pub struct CpalDevice {
    queue: Arc<SampleQueue>,
    write_slice: Duration,
    shutdown: Option<mpsc::Sender<()>>,
    output: Option<JoinHandle<()>>,
}

impl CpalDevice {
    /// Builds and starts the stream on its own output thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`] if no device exists, the rate is not
    /// supported or the stream fails to start.
    pub fn open(config: AudioDeviceConfig, buffer: Duration, write_slice: Duration) -> Result<Self> {
        let rate = config.sample_rate.hz();
        let channels = usize::from(config.channels);
        #[allow(clippy::cast_possible_truncation)]
        let capacity = (buffer.as_millis() as usize * rate as usize / 1000) * channels;
        let queue = Arc::new(SampleQueue::new(capacity));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stream_queue = Arc::clone(&queue);

        let output = thread::Builder::new()
            .name("vr-audio-output".to_string())
            .spawn(move || {
                let stream = match build_stream(config, Arc::clone(&stream_queue)) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(Error::Device(format!(
                        "Failed to start audio stream: {err}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Returns once the sender is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|e| Error::Device(format!("Failed to spawn audio output thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                tracing::debug!(rate, channels, "Audio output started");
                Ok(Self {
                    queue,
                    write_slice,
                    shutdown: Some(shutdown_tx),
                    output: Some(output),
                })
            }
            Ok(Err(err)) => {
                let _ = output.join();
                Err(err)
            }
            Err(_) => {
                let _ = output.join();
                Err(Error::Device("Audio output thread exited".to_string()))
            }
        }
    }
}

fn build_stream(config: AudioDeviceConfig, queue: Arc<SampleQueue>) -> Result<cpal::Stream> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Device("No audio output device found".to_string()))?;

    let rate = cpal::SampleRate(config.sample_rate.hz());
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Device(format!("Failed to get audio config: {e}")))?
        .find(|range| {
            range.channels() == config.channels
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .ok_or_else(|| {
            Error::Device(format!(
                "Device cannot play {} channels at {} Hz",
                config.channels, rate.0
            ))
        })?
        .with_sample_rate(rate);

    let stream_config: cpal::StreamConfig = supported.config();
    match supported.sample_format() {
        cpal::SampleFormat::F32 => build_typed::<f32>(&device, &stream_config, queue),
        cpal::SampleFormat::I16 => build_typed::<i16>(&device, &stream_config, queue),
        cpal::SampleFormat::U16 => build_typed::<u16>(&device, &stream_config, queue),
        other => Err(Error::Device(format!("Unsupported audio sample format: {other:?}"))),
    }
}

fn build_typed<T: cpal::SizedSample + cpal::FromSample<i16>>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SampleQueue>,
) -> Result<cpal::Stream> {
    let error_queue = Arc::clone(&queue);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| queue.drain_into(data),
            move |err| {
                tracing::error!("Audio output error: {err}");
                error_queue.fail(err.to_string());
            },
            None,
        )
        .map_err(|e| Error::Device(format!("Failed to build audio stream: {e}")))
}

impl AudioDevice for CpalDevice {
    fn write(&mut self, block: &[StereoFrame], cancel: &CancellationToken) -> Result<usize> {
        self.queue.push(block, cancel, self.write_slice)
    }

    fn stop(&mut self) -> Result<()> {
        self.queue.clear();
        Ok(())
    }

    fn close(self: Box<Self>) {}
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(output) = self.output.take() {
            if output.join().is_err() {
                tracing::error!("Audio output thread panicked");
            }
        }
        tracing::debug!("Audio output closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_abs_diff_eq;

    const SLICE: Duration = Duration::from_millis(1);

    #[test]
    fn push_accepts_block_that_fits() {
        let queue = SampleQueue::new(8);
        let accepted = queue
            .push(&[[1, 1], [2, 2], [3, 3]], &CancellationToken::new(), SLICE)
            .expect("push");
        assert_eq!(accepted, 3);
        assert_eq!(queue.len(), 6);
    }

    #[test]
    fn cancelled_push_accepts_nothing() {
        let queue = SampleQueue::new(8);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let accepted = queue.push(&[[1, 1], [2, 2]], &cancel, SLICE).expect("push");
        assert_eq!(accepted, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_blocks_until_cancelled() {
        let queue = Arc::new(SampleQueue::new(4));
        let cancel = CancellationToken::new();

        let writer_queue = Arc::clone(&queue);
        let writer_cancel = cancel.clone();
        let writer = thread::spawn(move || {
            writer_queue.push(&[[1, -1], [2, -2], [3, -3]], &writer_cancel, SLICE)
        });

        while queue.len() < 4 {
            thread::sleep(SLICE);
        }
        cancel.cancel();
        let accepted = writer.join().expect("writer").expect("push");
        assert_eq!(accepted, 2);
    }

    #[test]
    fn drain_releases_blocked_writer() {
        let queue = Arc::new(SampleQueue::new(4));
        let writer_queue = Arc::clone(&queue);
        let writer = thread::spawn(move || {
            writer_queue.push(&[[1, -1], [2, -2], [3, -3]], &CancellationToken::new(), SLICE)
        });

        let mut played = Vec::new();
        while played.len() < 6 {
            let mut out = [0i16; 2];
            queue.drain_into(&mut out);
            if out != [0, 0] {
                played.extend_from_slice(&out);
            }
            thread::sleep(SLICE);
        }
        assert_eq!(writer.join().expect("writer").expect("push"), 3);
        assert_eq!(played, vec![1, -1, 2, -2, 3, -3]);
    }

    #[test]
    fn drain_pads_with_silence() {
        let queue = SampleQueue::new(16);
        queue
            .push(&[[7, 8]], &CancellationToken::new(), SLICE)
            .expect("push");
        let mut out = [1.0f32; 4];
        queue.drain_into(&mut out);
        assert!(out[0] > 0.0);
        assert_abs_diff_eq!(out[2], 0.0);
        assert!(queue.is_empty());
    }

    #[test]
    fn failure_surfaces_as_device_error() {
        let queue = SampleQueue::new(16);
        queue.fail("device unplugged".to_string());
        let result = queue.push(&[[0, 0]], &CancellationToken::new(), SLICE);
        assert!(matches!(result, Err(Error::Device(msg)) if msg == "device unplugged"));
    }

    #[test]
    fn clear_discards_queued_samples() {
        let queue = SampleQueue::new(16);
        queue
            .push(&[[1, 1], [2, 2]], &CancellationToken::new(), SLICE)
            .expect("push");
        queue.clear();
        assert!(queue.is_empty());
    }
}
