//! Media files decoded through the ffmpeg command line tools.
//!
//! - `ffprobe` describes the video stream (JSON output) when the file is opened
//! - `ffmpeg` (through ffmpeg-sidecar) decodes to raw `rgb24` / `rgba` frames
//! - seeking restarts the ffmpeg child with an input seek before the target

use crate::source::{
    DecodedFrame, MediaOpener, MediaSource, OpenOptions, Packet, ReadError, StreamInfo,
};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};
use vidmix_core::{FrameBuffer, FrameRate, OpenError, PixelFormat, Result, VidmixError};

/// Check if ffmpeg and ffprobe are on the `PATH`.
pub fn ffmpeg_available() -> bool {
    which::which("ffmpeg").is_ok() && which::which("ffprobe").is_ok()
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    start_time: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    sample_aspect_ratio: Option<String>,
    field_order: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    start_time: Option<String>,
}

/// Probe the first video stream of a file with `ffprobe`.
pub fn probe(path: &Path) -> std::result::Result<StreamInfo, OpenError> {
    if !path.exists() {
        return Err(OpenError::NotFound(path.display().to_string()));
    }
    let ffprobe = which::which("ffprobe").map_err(|e| {
        OpenError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("ffprobe is not available: {e}"),
        ))
    })?;

    let output = Command::new(ffprobe)
        .args(["-v", "quiet", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        return Err(OpenError::InvalidData(format!(
            "ffprobe could not read {}",
            path.display()
        )));
    }
    parse_probe_json(&output.stdout)
}

/// Build a [`StreamInfo`] from `ffprobe -print_format json` output.
pub fn parse_probe_json(json: &[u8]) -> std::result::Result<StreamInfo, OpenError> {
    let probe: ProbeOutput = serde_json::from_slice(json)
        .map_err(|e| OpenError::InvalidData(format!("unreadable ffprobe output: {e}")))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| OpenError::InvalidData("no video stream".into()))?;

    let codec_name = match stream.codec_name.as_deref() {
        Some(name) if !name.is_empty() && name != "none" => name.to_string(),
        _ => return Err(OpenError::UnsupportedCodec("unknown video codec".into())),
    };

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(OpenError::UnsupportedCodec(format!(
                "{codec_name} stream without picture size"
            )))
        }
    };

    let frame_rate = [&stream.avg_frame_rate, &stream.r_frame_rate]
        .into_iter()
        .flatten()
        .find_map(|rate| FrameRate::parse(rate))
        .ok_or_else(|| OpenError::InvalidData("stream has no frame rate".into()))?;

    let seconds = |value: &Option<String>| value.as_deref().and_then(|v| v.parse::<f64>().ok());
    let format = probe.format.as_ref();
    let start_time = seconds(&stream.start_time)
        .or_else(|| format.and_then(|f| seconds(&f.start_time)))
        .unwrap_or(0.0)
        .max(0.0);
    let frame_count_hint = stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok());
    let duration = seconds(&stream.duration)
        .or_else(|| format.and_then(|f| seconds(&f.duration)))
        .or_else(|| frame_count_hint.map(|n| n as f64 / frame_rate.to_fps_f64()))
        .ok_or_else(|| OpenError::InvalidData("stream has no duration".into()))?;
    let frame_count = frame_count_hint
        .filter(|&n| n > 0)
        .unwrap_or_else(|| (duration * frame_rate.to_fps_f64()).round() as u64);

    let pixel_format = stream.pix_fmt.clone().unwrap_or_default();
    Ok(StreamInfo {
        codec_name,
        width,
        height,
        has_alpha: pix_fmt_has_alpha(&pixel_format),
        pixel_format,
        frame_rate,
        start_time,
        duration,
        frame_count,
        sample_aspect_ratio: stream
            .sample_aspect_ratio
            .as_deref()
            .and_then(parse_ratio)
            .unwrap_or(1.0),
        interlaced: stream
            .field_order
            .as_deref()
            .is_some_and(|order| order != "progressive" && order != "unknown"),
    })
}

fn parse_ratio(text: &str) -> Option<f64> {
    let (num, den) = text.split_once(':')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    (num > 0.0 && den > 0.0).then(|| num / den)
}

/// Whether an ffmpeg pixel format name carries an alpha channel.
pub fn pix_fmt_has_alpha(pix_fmt: &str) -> bool {
    const ALPHA_PREFIXES: [&str; 8] = [
        "rgba", "bgra", "argb", "abgr", "yuva", "gbrap", "ya8", "ya16",
    ];
    ALPHA_PREFIXES.iter().any(|prefix| pix_fmt.starts_with(prefix))
}

/// Opens files with [`FfmpegSource`].
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl MediaOpener for FfmpegOpener {
    fn open(
        &self,
        path: &Path,
        options: &OpenOptions,
    ) -> std::result::Result<Box<dyn MediaSource>, OpenError> {
        Ok(Box::new(FfmpegSource::open(path, options)?))
    }
}

/// A video file decoded by an ffmpeg child process.
pub struct FfmpegSource {
    path: PathBuf,
    info: StreamInfo,
    format: PixelFormat,
    child: Option<FfmpegChild>,
    frames: Option<FfmpegIterator>,
    /// Position the running child was started from
    seek_origin: f64,
}

impl FfmpegSource {
    pub fn open(path: &Path, options: &OpenOptions) -> std::result::Result<Self, OpenError> {
        let info = probe(path)?;
        if info.interlaced {
            debug!(file = %path.display(), "Interlaced stream, frames are shown as progressive");
        }
        let format = options.output_format(info.has_alpha);
        info!(
            file = %path.display(),
            codec = %info.codec_name,
            width = info.width,
            height = info.height,
            fps = %info.frame_rate,
            "Probed video stream"
        );
        Ok(Self {
            path: path.to_path_buf(),
            seek_origin: info.start_time,
            info,
            format,
            child: None,
            frames: None,
        })
    }

    fn spawn(&mut self) -> std::io::Result<()> {
        let mut command = FfmpegCommand::new();
        command.hide_banner();
        if self.seek_origin > self.info.start_time {
            command.seek(format!("{:.6}", self.seek_origin - self.info.start_time));
        }
        command
            .input(&*self.path.to_string_lossy())
            .args(["-an", "-f", "rawvideo", "-pix_fmt", self.format.ffmpeg_name()])
            .output("-");

        let mut child = command.spawn()?;
        let frames = child
            .iter()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::BrokenPipe, e.to_string()))?;
        debug!(file = %self.path.display(), origin = self.seek_origin, "ffmpeg decoder started");
        self.child = Some(child);
        self.frames = Some(frames);
        Ok(())
    }

    fn kill(&mut self) {
        self.frames = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!(error = %e, "ffmpeg child already exited");
            }
            let _ = child.wait();
        }
    }
}

impl MediaSource for FfmpegSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn output_format(&self) -> PixelFormat {
        self.format
    }

    fn read_packet(&mut self) -> std::result::Result<Packet, ReadError> {
        if self.frames.is_none() {
            self.spawn()?;
        }
        let Some(frames) = self.frames.as_mut() else {
            return Err(ReadError::EndOfStream);
        };
        loop {
            match frames.next() {
                Some(FfmpegEvent::OutputFrame(frame)) => {
                    return Ok(Packet {
                        pts: Some(self.seek_origin + frame.timestamp as f64),
                        payload: frame.data,
                    })
                }
                Some(FfmpegEvent::Log(LogLevel::Error | LogLevel::Fatal, line))
                | Some(FfmpegEvent::Error(line)) => {
                    warn!(file = %self.path.display(), "ffmpeg: {}", line);
                }
                Some(FfmpegEvent::Done) | None => return Err(ReadError::EndOfStream),
                Some(_) => {}
            }
        }
    }

    fn decode(&mut self, packet: Packet) -> Result<Option<DecodedFrame>> {
        let buffer =
            FrameBuffer::from_packed(self.info.width, self.info.height, self.format, packet.payload)
                .ok_or_else(|| {
                    VidmixError::Decode(format!(
                        "ffmpeg frame does not match {}x{} {}",
                        self.info.width,
                        self.info.height,
                        self.format.ffmpeg_name()
                    ))
                })?;
        Ok(Some(DecodedFrame {
            buffer,
            pts: packet.pts,
        }))
    }

    fn seek(&mut self, target: f64) -> Result<()> {
        self.kill();
        // Start one frame early so the target frame itself is never skipped.
        self.seek_origin = (target - self.info.frame_duration()).max(self.info.start_time);
        Ok(())
    }

    fn flush(&mut self) {}
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.kill();
    }
}
