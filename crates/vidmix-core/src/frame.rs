//! Frame buffer types for decoded video frames in CPU memory.
//!
//! A stream is converted to a single packed format when it is opened, so
//! every picture of a session shares the same layout and byte size.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pixel format of converted pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit RGB (24 bits per pixel), used for opaque streams
    #[default]
    Rgb24,
    /// 8-bit RGBA (32 bits per pixel), used when the alpha channel is kept
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb24 => 3,
            Self::Rgba8 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8)
    }

    /// Tightly packed size of a frame in this format.
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    /// Like [`frame_size`](Self::frame_size), but `None` on overflow.
    pub fn checked_frame_size(self, width: u32, height: u32) -> Option<usize> {
        (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(self.bytes_per_pixel())
    }

    /// Name of the equivalent ffmpeg pixel format.
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Rgb24 => "rgb24",
            Self::Rgba8 => "rgba",
        }
    }
}

/// A video frame in CPU memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Bytes per row (may include padding)
    pub stride: usize,
    pub data: Vec<u8>,
}

impl FrameBuffer {
    /// Create a zeroed frame buffer with a 64-byte aligned stride.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let min_stride = width as usize * format.bytes_per_pixel();
        let stride = (min_stride + 63) & !63;
        Self {
            format,
            width,
            height,
            stride,
            data: vec![0u8; stride * height as usize],
        }
    }

    /// Wrap tightly packed pixel data, as produced by a raw video pipe.
    ///
    /// Returns `None` when `data` does not hold exactly one frame.
    pub fn from_packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        if data.len() != format.frame_size(width, height) {
            return None;
        }
        Some(Self {
            format,
            width,
            height,
            stride: width as usize * format.bytes_per_pixel(),
            data,
        })
    }

    /// An opaque black frame, or `None` when it cannot be allocated.
    pub fn black(width: u32, height: u32, format: PixelFormat) -> Option<Self> {
        let bytes = format.checked_frame_size(width, height)?;
        let mut data = Vec::new();
        data.try_reserve_exact(bytes).ok()?;
        data.resize(bytes, 0);
        if format.has_alpha() {
            data.chunks_exact_mut(4).for_each(|px| px[3] = 255);
        }
        Self::from_packed(width, height, format, data)
    }

    /// Color bars scrolled horizontally by `phase` bars, so successive frames
    /// of a synthetic stream differ.
    pub fn test_pattern(width: u32, height: u32, format: PixelFormat, phase: u32) -> Self {
        const BARS: [[u8; 3]; 8] = [
            [255, 255, 255],
            [255, 255, 0],
            [0, 255, 255],
            [0, 255, 0],
            [255, 0, 255],
            [255, 0, 0],
            [0, 0, 255],
            [0, 0, 0],
        ];
        let mut frame = Self::new(width, height, format);
        let bpp = format.bytes_per_pixel();
        for y in 0..height {
            let row = frame.row_mut(y);
            for x in 0..width {
                let bar = ((x * 8 / width.max(1)) + phase) % 8;
                let i = x as usize * bpp;
                row[i..i + 3].copy_from_slice(&BARS[bar as usize]);
                if bpp == 4 {
                    row[i + 3] = 255;
                }
            }
        }
        frame
    }

    /// Total memory usage of this frame in bytes.
    pub fn memory_size(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    #[inline]
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &mut self.data[start..start + len]
    }
}

/// Arc-wrapped frame buffer for shared ownership.
pub type SharedFrameBuffer = Arc<FrameBuffer>;
