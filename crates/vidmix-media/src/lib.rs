//! Vidmix Media - threaded video decoding and frame-paced playback
//!
//! This crate handles:
//! - Opening streams (ffmpeg, or a synthetic test pattern)
//! - Decoding on a dedicated thread into a bounded picture queue
//! - Seeking, marks and looping
//! - Presenting pictures on time through a [`FrameSink`]

pub mod clock;
pub mod config;
pub mod events;
pub mod ffmpeg;
pub mod marks;
pub mod picture;
pub mod producer;
pub mod queue;
pub mod scheduler;
pub mod seek;
pub mod source;
mod state;
pub mod synthetic;
pub mod video_file;

pub use clock::Clock;
pub use config::PlaybackConfig;
pub use events::{ChannelSink, FrameSink, PlaybackEvent};
pub use ffmpeg::{FfmpegOpener, FfmpegSource};
pub use marks::Marks;
pub use picture::{Picture, PictureActions};
pub use queue::PictureQueue;
pub use scheduler::StopReason;
pub use seek::{ParsingMode, SeekControl};
pub use source::{MediaOpener, MediaSource, OpenOptions, StreamInfo};
pub use synthetic::{SyntheticConfig, SyntheticSource};
pub use video_file::VideoFile;

/// Log the decoding backends available (call once at startup).
pub fn init() {
    if ffmpeg::ffmpeg_available() {
        tracing::info!("Vidmix Media initialized");
    } else {
        tracing::warn!("Vidmix Media initialized without ffmpeg, only synthetic sources will open");
    }
}
