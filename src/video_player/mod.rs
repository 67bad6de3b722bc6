// SPDX-License-Identifier: MPL-2.0
//! Playback synchronization core.
//!
//! [`PlaybackController`] opens a decoder session and runs two pumps over it:
//! a periodic video pump (tokio interval or host clock) that copies one frame
//! per tick to the display surface, and an audio pump thread that drains
//! decoded audio into a blocking output device. Both reach the decoder
//! through one mutex-guarded [`SharedSession`].

mod audio_pump;
pub mod controller;
pub mod events;
pub mod session;
pub mod surface;
mod ticker;
pub mod video_pump;

pub use controller::{MediaInfo, PlaybackController};
pub use events::{PlaybackEvent, PlaybackStats, EVENT_CHANNEL_CAPACITY};
pub use session::{AudioChunkView, FrameRead, FrameView, SessionGuard, SharedSession};
pub use surface::{FrameReceiver, FrameSurface, FrameSurfaceFactory};
pub use video_pump::TickOutcome;
