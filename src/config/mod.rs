// SPDX-License-Identifier: MPL-2.0
//! This module handles the player configuration, including loading and saving
//! it to a `settings.toml` file.
//!
//! # Examples
//!
//! ```no_run
//! use vr_playback::config::{self, Config, TickSource};
//! use std::path::PathBuf;
//!
//! // Load existing configuration
//! let mut config = config::load().unwrap_or_default();
//!
//! // Let the host UI clock drive the video pump
//! config.video.tick_source = TickSource::External;
//!
//! // Save the modified configuration
//! config::save(&config).expect("Failed to save config");
//!
//! // To load/save from a specific path (e.g., for testing)
//! let temp_dir = PathBuf::from("./temp_config_dir");
//! std::fs::create_dir_all(&temp_dir).unwrap();
//! let temp_file = temp_dir.join("test_settings.toml");
//! config::save_to_path(&config, &temp_file).expect("Failed to save to path");
//! let loaded_config = config::load_from_path(&temp_file).expect("Failed to load from path");
//! assert_eq!(loaded_config.video.tick_source, TickSource::External);
//! std::fs::remove_dir_all(&temp_dir).unwrap();
//! ```

pub mod defaults;

pub use defaults::*;

use crate::domain::video::SeekStep;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "VrPlayback";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub seek: SeekConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub fallback_sample_rate: u32,
    /// Overrides the rates probed from the output device.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported_sample_rates: Option<Vec<u32>>,
    pub buffer_ms: u32,
    pub write_slice_ms: u32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            fallback_sample_rate: DEFAULT_FALLBACK_SAMPLE_RATE,
            supported_sample_rates: None,
            buffer_ms: DEFAULT_AUDIO_BUFFER_MS,
            write_slice_ms: DEFAULT_WRITE_SLICE_MS,
        }
    }
}

impl AudioConfig {
    /// Device buffer length, clamped to sane bounds.
    #[must_use]
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(u64::from(
            self.buffer_ms.clamp(MIN_AUDIO_BUFFER_MS, MAX_AUDIO_BUFFER_MS),
        ))
    }

    #[must_use]
    pub fn write_slice(&self) -> Duration {
        Duration::from_millis(u64::from(self.write_slice_ms.max(1)))
    }
}

/// Who drives the video pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickSource {
    /// A tokio interval task owned by the controller.
    #[default]
    Internal,
    /// The host calls `PlaybackController::tick` from its own clock.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub fallback_frame_rate: f64,
    pub flip_vertical: bool,
    pub tick_source: TickSource,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fallback_frame_rate: DEFAULT_FALLBACK_FRAME_RATE,
            flip_vertical: DEFAULT_FLIP_VERTICAL,
            tick_source: TickSource::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    pub step_secs: f64,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            step_secs: DEFAULT_SEEK_STEP_SECS,
        }
    }
}

impl SeekConfig {
    #[must_use]
    pub fn step(&self) -> SeekStep {
        SeekStep::new(self.step_secs)
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => {
            tracing::warn!(path = %path.display(), "Ignoring invalid settings: {err}");
            Ok(Config::default())
        }
    }
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
