// SPDX-License-Identifier: MPL-2.0
//! Application layer - boundaries of the playback core.
//!
//! - [`port`]: Trait definitions (interfaces) for dependency inversion
//!
//! # Dependency Rule
//!
//! - Application layer depends on domain layer (uses domain types)
//! - Infrastructure layer implements application layer ports
//! - The playback core (`video_player`) only talks to ports
//!
//! # Example
//!
//! ```ignore
//! use vr_playback::application::port::{DecoderEngine, DecoderSession};
//!
//! // Infrastructure implements the port trait
//! struct FfmpegEngine;
//! impl DecoderEngine for FfmpegEngine { /* ... */ }
//! ```

pub mod port;
