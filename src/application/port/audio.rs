// SPDX-License-Identifier: MPL-2.0
//! Audio output port definition.
//!
//! [`AudioSink`] opens devices; [`AudioDevice`] accepts blocks of interleaved
//! stereo frames. Writes block until the device has buffered the samples,
//! which is what paces the audio pump.

use crate::domain::video::SampleRate;
use crate::error::Result;
use tokio_util::sync::CancellationToken;

/// One interleaved stereo frame (left, right).
pub type StereoFrame = [i16; 2];

/// Sample format requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit integers.
    #[default]
    I16,
}

/// Parameters for opening an output device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDeviceConfig {
    pub sample_rate: SampleRate,
    pub channels: u16,
    pub format: SampleFormat,
}

impl AudioDeviceConfig {
    /// Stereo `i16` output at the given rate.
    #[must_use]
    pub fn stereo_i16(sample_rate: SampleRate) -> Self {
        Self {
            sample_rate,
            channels: 2,
            format: SampleFormat::I16,
        }
    }
}

/// Factory for output devices.
pub trait AudioSink: Send + Sync {
    /// Sample rates the device can be opened with.
    fn supported_sample_rates(&self) -> Vec<u32>;

    /// Opens a device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`](crate::error::Error::Device) if no device
    /// is available or it rejects the configuration.
    fn open(&self, config: AudioDeviceConfig) -> Result<Box<dyn AudioDevice>>;
}

/// An open output device.
///
/// Writes come from the audio pump thread only; `stop` and `close` come from
/// the controller after that thread has been joined.
pub trait AudioDevice: Send {
    /// Queues `block` for playback, blocking until it has been buffered.
    ///
    /// Returns early with the number of frames accepted so far once `cancel`
    /// is triggered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`](crate::error::Error::Device) if the device
    /// failed while writing.
    fn write(&mut self, block: &[StereoFrame], cancel: &CancellationToken) -> Result<usize>;

    /// Halts output and discards buffered samples. The device stays open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Device`](crate::error::Error::Device) if the device
    /// could not be paused.
    fn stop(&mut self) -> Result<()>;

    /// Releases the device.
    fn close(self: Box<Self>);
}
