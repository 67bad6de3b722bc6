// SPDX-License-Identifier: MPL-2.0
//! In-memory display surface backed by an `RgbImage`.
//!
//! Hosts read the latest frame through a [`FrameReceiver`] and wait for
//! redraw requests on it; the video pump writes through [`FrameSurface`].

use crate::application::port::{DisplaySurface, PixelFormat, SurfaceFactory, SurfaceSpec};
use crate::domain::video::FrameSize;
use image_rs::RgbImage;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Creates [`FrameSurface`]s that all draw into one shared canvas.
#[derive(Clone)]
pub struct FrameSurfaceFactory {
    canvas: Arc<Mutex<RgbImage>>,
    redraw: watch::Sender<u64>,
}

impl FrameSurfaceFactory {
    #[must_use]
    pub fn new() -> Self {
        let (redraw, _) = watch::channel(0);
        Self {
            canvas: Arc::new(Mutex::new(RgbImage::new(0, 0))),
            redraw,
        }
    }

    /// Returns a reader for the frames drawn by surfaces of this factory.
    #[must_use]
    pub fn frames(&self) -> FrameReceiver {
        FrameReceiver {
            canvas: Arc::clone(&self.canvas),
            redraw: self.redraw.subscribe(),
        }
    }
}

impl Default for FrameSurfaceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceFactory for FrameSurfaceFactory {
    fn create(&self, spec: SurfaceSpec) -> Box<dyn DisplaySurface> {
        *self.canvas.lock().unwrap_or_else(PoisonError::into_inner) =
            RgbImage::new(spec.size.width, spec.size.height);
        Box::new(FrameSurface {
            canvas: Arc::clone(&self.canvas),
            redraw: self.redraw.clone(),
            spec,
        })
    }
}

/// Surface handed to the video pump.
pub struct FrameSurface {
    canvas: Arc<Mutex<RgbImage>>,
    redraw: watch::Sender<u64>,
    spec: SurfaceSpec,
}

impl DisplaySurface for FrameSurface {
    fn blit(&mut self, pixels: &[u8], size: FrameSize, format: PixelFormat) {
        if format != self.spec.format || size.is_empty() {
            tracing::warn!(?format, ?size, "Ignoring blit the surface cannot hold");
            return;
        }
        let row_len = size.width as usize * format.bytes_per_pixel();
        if pixels.len() != row_len * size.height as usize {
            tracing::warn!(len = pixels.len(), "Ignoring blit with short buffer");
            return;
        }

        let mut canvas = self.canvas.lock().unwrap_or_else(PoisonError::into_inner);
        if canvas.dimensions() != (size.width, size.height) {
            *canvas = RgbImage::new(size.width, size.height);
        }
        let target: &mut [u8] = &mut canvas;
        if self.spec.flip_vertical {
            for (dst, src) in target
                .chunks_exact_mut(row_len)
                .zip(pixels.chunks_exact(row_len).rev())
            {
                dst.copy_from_slice(src);
            }
        } else {
            target.copy_from_slice(pixels);
        }
    }

    fn request_redraw(&mut self) {
        self.redraw.send_modify(|generation| *generation += 1);
    }
}

/// Read side of a [`FrameSurfaceFactory`].
pub struct FrameReceiver {
    canvas: Arc<Mutex<RgbImage>>,
    redraw: watch::Receiver<u64>,
}

impl FrameReceiver {
    /// Copy of the most recent frame.
    #[must_use]
    pub fn snapshot(&self) -> RgbImage {
        self.canvas
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of redraws requested so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.redraw.borrow()
    }

    /// Waits for the next redraw request. Returns false once every surface
    /// and the factory are gone.
    pub async fn changed(&mut self) -> bool {
        self.redraw.changed().await.is_ok()
    }
}
