//! vidmix - headless player
//!
//! Opens a video (or a synthetic test pattern), plays it between the marks
//! and logs what the pipeline reports until playback stops.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vidmix_core::format_timecode;
use vidmix_media::{
    Picture, PictureActions, PlaybackConfig, PlaybackEvent, SyntheticConfig, SyntheticSource,
    VideoFile,
};

#[derive(Parser, Debug)]
#[command(name = "vidmix")]
#[command(about = "Play a video between its marks and log what the pipeline reports")]
#[command(version)]
struct Args {
    /// Video file to play
    #[arg(required_unless_present = "synthetic")]
    input: Option<PathBuf>,

    /// Play a generated test pattern instead of a file
    #[arg(long)]
    synthetic: bool,

    /// Playback settings as JSON
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mark-in, in seconds
    #[arg(long = "in", value_name = "SECS", allow_negative_numbers = true)]
    mark_in: Option<f64>,

    /// Mark-out, in seconds
    #[arg(long = "out", value_name = "SECS", allow_negative_numbers = true)]
    mark_out: Option<f64>,

    /// Play speed factor
    #[arg(long, value_name = "X")]
    speed: Option<f64>,

    /// Loop between the marks
    #[arg(long = "loop")]
    looping: bool,

    /// Decode without the alpha channel
    #[arg(long)]
    ignore_alpha: bool,

    /// Stop after this many seconds
    #[arg(long = "for", value_name = "SECS", value_parser = parse_seconds)]
    run_for: Option<Duration>,
}

fn parse_seconds(value: &str) -> std::result::Result<Duration, String> {
    let seconds: f64 = value.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("{e}"))
}

fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    vidmix_media::init();

    let mut config = match &args.config {
        Some(path) => PlaybackConfig::from_json_file(path)
            .with_context(|| format!("cannot read config {}", path.display()))?,
        None => PlaybackConfig::default(),
    };
    config.loop_by_default = args.looping;

    let shown = Arc::new(AtomicU64::new(0));
    let sink = {
        let shown = shown.clone();
        move |picture: Picture| {
            if picture.has(PictureActions::DELETE) {
                shown.fetch_add(1, Ordering::Relaxed);
            }
        }
    };
    let video = VideoFile::new(config, Arc::new(sink));
    let events = video.events();

    let mark_in = args.mark_in.unwrap_or(-1.0);
    let mark_out = args.mark_out.unwrap_or(-1.0);
    match &args.input {
        Some(path) if !args.synthetic => video
            .open(path, mark_in, mark_out, args.ignore_alpha)
            .with_context(|| format!("cannot open {}", path.display()))?,
        _ => video.open_source(
            Box::new(SyntheticSource::new(SyntheticConfig::default())),
            mark_in,
            mark_out,
        )?,
    }
    info!(
        file = %video.file_name().unwrap_or_default(),
        duration = %format_timecode(video.duration()),
        mark_in = %format_timecode(video.mark_in()),
        mark_out = %format_timecode(video.mark_out()),
        queue = video.queue_capacity(),
        "Ready"
    );

    if let Some(speed) = args.speed {
        video.set_play_speed(speed);
    }
    // the stopped state reported by open
    events.try_iter().for_each(drop);
    video.start()?;
    if !video.is_running() {
        info!("Nothing to play");
        return Ok(());
    }

    let started = Instant::now();
    let deadline = args.run_for.map(|d| started + d);
    loop {
        let wait = deadline.map_or(Duration::from_secs(1), |d| {
            d.saturating_duration_since(Instant::now()).min(Duration::from_secs(1))
        });
        match events.recv_timeout(wait) {
            Ok(PlaybackEvent::Running(false)) => break,
            Ok(PlaybackEvent::Failed(reason)) => warn!(%reason, "Playback failed"),
            Ok(event) => info!(?event, at = %video.time_string(video.current_frame_time()), "Event"),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    video.stop()?;
                    break;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    let elapsed = started.elapsed().as_secs_f64();
    let frames = shown.load(Ordering::Relaxed);
    info!(
        frames,
        seconds = elapsed,
        fps = frames as f64 / elapsed.max(f64::EPSILON),
        "Playback finished"
    );
    Ok(())
}
