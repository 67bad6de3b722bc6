// SPDX-License-Identifier: MPL-2.0
//! Display surface port definition.
//!
//! A surface receives one copied frame per video pump tick. The pump never
//! hands out the decoder's buffer; `blit` must copy before returning.

use crate::domain::video::FrameSize;

/// Pixel layout of a blitted buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// Packed 8-bit red, green, blue.
    #[default]
    Rgb24,
}

impl PixelFormat {
    #[must_use]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
        }
    }
}

/// Parameters fixed when a surface is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub size: FrameSize,
    pub format: PixelFormat,
    /// Flip rows so the decoder's top-down order matches a bottom-up origin.
    pub flip_vertical: bool,
}

/// Destination of decoded frames.
pub trait DisplaySurface: Send {
    /// Copies `pixels` into the surface.
    fn blit(&mut self, pixels: &[u8], size: FrameSize, format: PixelFormat);

    /// Asks the host to repaint.
    fn request_redraw(&mut self);
}

/// Allocates surfaces for newly opened sessions.
pub trait SurfaceFactory: Send + Sync {
    fn create(&self, spec: SurfaceSpec) -> Box<dyn DisplaySurface>;
}
