// Latest-frame storage shared between the graph callback thread and the control thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;

use crate::error::GraphError;

/// Bytes per pixel of packed RGBA.
const RGBA_BYTES_PER_PIXEL: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed RGBA, 4 bytes per pixel.
    Rgba,
}

/// One decoded frame. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    /// Bytes per row, at least `width * 4`.
    stride: u32,
    format: PixelFormat,
    pts: Option<Duration>,
    data: Bytes,
}

impl VideoFrame {
    /// Wrap an RGBA payload. `stride` is the row pitch in bytes.
    pub fn rgba(width: u32, height: u32, stride: u32, data: Bytes) -> Result<Self, GraphError> {
        let row = width as usize * RGBA_BYTES_PER_PIXEL as usize;
        let stride_bytes = (stride as usize).max(row);
        // The last row does not need padding.
        let expected = if height == 0 {
            0
        } else {
            stride_bytes * (height as usize - 1) + row
        };
        if data.len() < expected {
            return Err(GraphError::FrameSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            stride: stride_bytes as u32,
            format: PixelFormat::Rgba,
            pts: None,
            data,
        })
    }

    pub fn with_pts(mut self, pts: Option<Duration>) -> Self {
        self.pts = pts;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Holds the most recently decoded frame.
///
/// Writers replace the whole `Arc`, so a reader either sees the previous frame
/// or the new one, never a mix of both.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: RwLock<Option<Arc<VideoFrame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame if `gate` is still open.
    ///
    /// The gate is checked under the write lock so a concurrent [`close`]
    /// cannot be followed by a late write.
    ///
    /// [`close`]: FrameSlot::close
    pub fn replace_if_open(&self, gate: &AtomicBool, frame: Arc<VideoFrame>) -> bool {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        if !gate.load(Ordering::Acquire) {
            return false;
        }
        *latest = Some(frame);
        true
    }

    /// Close the gate and drop the stored frame.
    pub fn close(&self, gate: &AtomicBool) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        gate.store(false, Ordering::Release);
        *latest = None;
    }

    pub fn clear(&self) {
        let mut latest = self.latest.write().unwrap_or_else(PoisonError::into_inner);
        *latest = None;
    }

    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.latest
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
