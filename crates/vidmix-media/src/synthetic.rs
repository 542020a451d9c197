//! Deterministic test-pattern source.
//!
//! Produces scrolling color bars with exact timestamps (`start + i / fps`),
//! keyframes every `gop` frames and optional injected faults. Used by the
//! test suites and by `vidmix --synthetic`.

use crate::source::{DecodedFrame, MediaSource, Packet, ReadError, StreamInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vidmix_core::{FrameBuffer, FrameRate, PixelFormat, Result, VidmixError};

/// Shape and behaviour of a synthetic stream.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub frame_count: u64,
    pub start_time: f64,
    pub format: PixelFormat,
    /// Distance between keyframes; seeks land on the previous keyframe.
    pub gop: u64,
    /// Simulated cost of decoding one frame.
    pub decode_delay: Duration,
    /// Decoding this frame index fails.
    pub fail_at: Option<u64>,
    /// Reading this frame index fails once with an I/O error.
    pub io_error_at: Option<u64>,
    /// Reading keeps failing with I/O errors from this frame index on.
    pub broken_from: Option<u64>,
    /// Packets whose index is a multiple of this carry no timestamp.
    pub drop_pts_every: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            frame_rate: FrameRate::FPS_30,
            frame_count: 300,
            start_time: 0.0,
            format: PixelFormat::Rgb24,
            gop: 12,
            decode_delay: Duration::ZERO,
            fail_at: None,
            io_error_at: None,
            broken_from: None,
            drop_pts_every: None,
        }
    }
}

impl SyntheticConfig {
    pub fn stream_info(&self) -> StreamInfo {
        let fps = self.frame_rate.to_fps_f64();
        StreamInfo {
            codec_name: "testsrc".into(),
            width: self.width,
            height: self.height,
            pixel_format: self.format.ffmpeg_name().into(),
            has_alpha: self.format.has_alpha(),
            frame_rate: self.frame_rate,
            start_time: self.start_time,
            duration: self.frame_count as f64 / fps,
            frame_count: self.frame_count,
            sample_aspect_ratio: 1.0,
            interlaced: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    info: StreamInfo,
    next_index: u64,
    io_error_pending: bool,
    packets_read: Arc<AtomicU64>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let info = config.stream_info();
        Self {
            io_error_pending: config.io_error_at.is_some(),
            config,
            info,
            next_index: 0,
            packets_read: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Counter of packets successfully read, shared with the caller so it
    /// can be observed while the source is owned by the decoding thread.
    pub fn packets_read(&self) -> Arc<AtomicU64> {
        self.packets_read.clone()
    }

    fn pts_of(&self, index: u64) -> f64 {
        self.config.start_time + index as f64 * self.info.frame_duration()
    }
}

impl MediaSource for SyntheticSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn output_format(&self) -> PixelFormat {
        self.config.format
    }

    fn read_packet(&mut self) -> std::result::Result<Packet, ReadError> {
        let index = self.next_index;
        if index >= self.config.frame_count {
            return Err(ReadError::EndOfStream);
        }
        if self.config.broken_from.is_some_and(|from| index >= from)
            || (self.io_error_pending && self.config.io_error_at == Some(index))
        {
            self.io_error_pending = false;
            return Err(ReadError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                format!("injected read failure at frame {index}"),
            )));
        }

        self.next_index += 1;
        self.packets_read.fetch_add(1, Ordering::Relaxed);

        let stripped = self
            .config
            .drop_pts_every
            .is_some_and(|every| every > 0 && index > 0 && index % every == 0);
        Ok(Packet {
            pts: (!stripped).then(|| self.pts_of(index)),
            payload: index.to_le_bytes().to_vec(),
        })
    }

    fn decode(&mut self, packet: Packet) -> Result<Option<DecodedFrame>> {
        let bytes: [u8; 8] = packet
            .payload
            .as_slice()
            .try_into()
            .map_err(|_| VidmixError::Decode("corrupt synthetic packet".into()))?;
        let index = u64::from_le_bytes(bytes);
        if self.config.fail_at == Some(index) {
            return Err(VidmixError::Decode(format!(
                "injected decode failure at frame {index}"
            )));
        }
        if !self.config.decode_delay.is_zero() {
            std::thread::sleep(self.config.decode_delay);
        }
        let buffer = FrameBuffer::test_pattern(
            self.config.width,
            self.config.height,
            self.config.format,
            (index % 8) as u32,
        );
        Ok(Some(DecodedFrame {
            buffer,
            pts: packet.pts,
        }))
    }

    fn seek(&mut self, target: f64) -> Result<()> {
        let fps = self.config.frame_rate.to_fps_f64();
        let last = self.config.frame_count.saturating_sub(1);
        let frame = ((target - self.config.start_time) * fps + 1e-6).floor().max(0.0) as u64;
        let frame = frame.min(last);
        let gop = self.config.gop.max(1);
        self.next_index = frame - frame % gop;
        Ok(())
    }

    fn flush(&mut self) {}
}
