//! Display-side frame transforms.
//!
//! The capture loop never converts frames itself. Presentation code that
//! wants a mirrored or RGBA preview wraps its sink in a [`TransformSink`].

use super::{Frame, PixelFormat};
use crate::sink::FrameSink;

/// A pure `Frame -> Frame` conversion.
pub trait FrameTransform: Send + Sync {
    /// Converts one frame. Must not block.
    fn apply(&self, frame: Frame) -> Frame;
}

/// Flips a frame horizontally, like looking into a mirror.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mirror;

impl FrameTransform for Mirror {
    fn apply(&self, frame: Frame) -> Frame {
        let bpp = frame.format().bytes_per_pixel();
        let row_bytes = frame.width() as usize * bpp;
        if row_bytes == 0 || !frame.is_valid() {
            return frame;
        }

        let mut out = Vec::with_capacity(frame.pixels().len());
        for row in frame.pixels().chunks_exact(row_bytes) {
            for pixel in row.chunks_exact(bpp).rev() {
                out.extend_from_slice(pixel);
            }
        }
        frame.with_pixels(out, frame.format())
    }
}

/// Expands any frame to RGBA with an opaque alpha channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToRgba;

impl FrameTransform for ToRgba {
    fn apply(&self, frame: Frame) -> Frame {
        let out: Vec<u8> = match frame.format() {
            PixelFormat::Rgba8 => return frame,
            PixelFormat::Rgb8 => frame
                .pixels()
                .chunks_exact(3)
                .flat_map(|p| [p[0], p[1], p[2], 255])
                .collect(),
            PixelFormat::Gray8 => frame
                .pixels()
                .iter()
                .flat_map(|&v| [v, v, v, 255])
                .collect(),
        };
        frame.with_pixels(out, PixelFormat::Rgba8)
    }
}

/// Runs two transforms in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Chain<A, B>(pub A, pub B);

impl<A: FrameTransform, B: FrameTransform> FrameTransform for Chain<A, B> {
    fn apply(&self, frame: Frame) -> Frame {
        self.1.apply(self.0.apply(frame))
    }
}

/// Applies a transform before forwarding frames to another sink.
pub struct TransformSink<T, S> {
    transform: T,
    inner: S,
}

impl<T: FrameTransform, S: FrameSink> TransformSink<T, S> {
    /// Wraps `inner` so every frame passes through `transform` first.
    pub fn new(transform: T, inner: S) -> Self {
        Self { transform, inner }
    }

    /// The wrapped sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<T: FrameTransform, S: FrameSink> FrameSink for TransformSink<T, S> {
    fn accept(&self, frame: Frame) {
        self.inner.accept(self.transform.apply(frame));
    }

    fn clear(&self) {
        self.inner.clear();
    }
}
