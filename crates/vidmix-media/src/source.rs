//! Demuxer/decoder abstraction consumed by the decoding thread.
//!
//! A [`MediaSource`] yields compressed packets and turns them into decoded,
//! color-converted frames. Implementations exist for ffmpeg
//! ([`crate::ffmpeg::FfmpegSource`]) and for a deterministic test pattern
//! ([`crate::synthetic::SyntheticSource`]).

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use vidmix_core::{FrameBuffer, FrameRate, OpenError, PixelFormat, Result};

/// Description of the video stream of an opened media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub codec_name: String,
    pub width: u32,
    pub height: u32,
    /// Pixel format of the coded stream, e.g. `yuv420p`
    pub pixel_format: String,
    pub has_alpha: bool,
    pub frame_rate: FrameRate,
    /// Presentation time of the first frame, in seconds
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
    pub frame_count: u64,
    pub sample_aspect_ratio: f64,
    /// Reported by the container; frames are still handled as progressive.
    pub interlaced: bool,
}

impl StreamInfo {
    pub fn frame_duration(&self) -> f64 {
        self.frame_rate.frame_duration_secs()
    }

    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Display aspect ratio, corrected by the sample aspect ratio when known.
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            return 1.0;
        }
        let ratio = self.width as f64 / self.height as f64;
        if self.sample_aspect_ratio > 0.0 {
            ratio * self.sample_aspect_ratio
        } else {
            ratio
        }
    }
}

/// One compressed unit read from the demuxer.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Presentation time in seconds, when the container provides one
    pub pts: Option<f64>,
    pub payload: Vec<u8>,
}

/// A decoded frame, already converted to the session pixel format.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub buffer: FrameBuffer,
    pub pts: Option<f64>,
}

/// Why no packet could be read.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error("end of stream")]
    EndOfStream,

    /// Transient; the read may be retried.
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Options applied when a media is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Convert to an opaque format even if the stream has an alpha channel.
    pub ignore_alpha: bool,
}

impl OpenOptions {
    /// Session pixel format for a stream.
    pub fn output_format(&self, has_alpha: bool) -> PixelFormat {
        if has_alpha && !self.ignore_alpha {
            PixelFormat::Rgba8
        } else {
            PixelFormat::Rgb24
        }
    }
}

/// A video stream that can be read, decoded and repositioned.
///
/// A source is used by one thread at a time: the caller while opening and
/// while stopped, the decoding thread while playing.
pub trait MediaSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Pixel format of every decoded frame.
    fn output_format(&self) -> PixelFormat;

    fn read_packet(&mut self) -> std::result::Result<Packet, ReadError>;

    /// Decode a packet. `Ok(None)` means the decoder needs more input.
    fn decode(&mut self, packet: Packet) -> Result<Option<DecodedFrame>>;

    /// Reposition so the next packets start at or before `target`.
    fn seek(&mut self, target: f64) -> Result<()>;

    /// Drop any frames buffered inside the decoder.
    fn flush(&mut self);
}

/// Factory turning a path into a [`MediaSource`].
pub trait MediaOpener: Send + Sync {
    fn open(
        &self,
        path: &Path,
        options: &OpenOptions,
    ) -> std::result::Result<Box<dyn MediaSource>, OpenError>;
}
