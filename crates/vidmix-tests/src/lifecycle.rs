//! Integration tests for opening, stopping and failure handling.

use crate::support::{Harness, FD};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use vidmix_core::{OpenError, PixelFormat, VidmixError};
use vidmix_media::source::{DecodedFrame, Packet, ReadError};
use vidmix_media::{
    MediaOpener, MediaSource, OpenOptions, Picture, PictureActions, PlaybackConfig, PlaybackEvent,
    StreamInfo, SyntheticConfig, SyntheticSource, VideoFile,
};

// ── Helpers ────────────────────────────────────────────────────

/// Opens every path as a synthetic stream with alpha.
struct SyntheticOpener;

impl MediaOpener for SyntheticOpener {
    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Box<dyn MediaSource>, OpenError> {
        if path.extension().is_some_and(|ext| ext == "broken") {
            return Err(OpenError::UnsupportedCodec("broken".into()));
        }
        Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            format: options.output_format(true),
            ..Default::default()
        })))
    }
}

/// Synthetic stream whose teardown hangs once the end has been read.
struct SlowTeardown {
    inner: SyntheticSource,
    ended: bool,
}

impl MediaSource for SlowTeardown {
    fn info(&self) -> &StreamInfo {
        self.inner.info()
    }

    fn output_format(&self) -> PixelFormat {
        self.inner.output_format()
    }

    fn read_packet(&mut self) -> Result<Packet, ReadError> {
        let packet = self.inner.read_packet();
        self.ended |= matches!(packet, Err(ReadError::EndOfStream));
        packet
    }

    fn decode(&mut self, packet: Packet) -> vidmix_core::Result<Option<DecodedFrame>> {
        self.inner.decode(packet)
    }

    fn seek(&mut self, target: f64) -> vidmix_core::Result<()> {
        self.inner.seek(target)
    }

    fn flush(&mut self) {
        if self.ended {
            std::thread::sleep(Duration::from_millis(1500));
        }
        self.inner.flush();
    }
}

fn open_with(h: &Harness, stream: SyntheticConfig) {
    h.video
        .open_source(Box::new(SyntheticSource::new(stream)), -1.0, -1.0)
        .unwrap();
    h.drain();
}

// ── Opening ────────────────────────────────────────────────────

#[test]
fn missing_file_is_reported_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let h = Harness::new(PlaybackConfig::default());
    let result = h.video.open(&dir.path().join("missing.mp4"), -1.0, -1.0, false);
    assert!(matches!(result, Err(VidmixError::Open(OpenError::NotFound(_)))));
    assert!(!h.video.is_open());
}

#[test]
fn garbage_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(b"definitely not a video").unwrap();
    let h = Harness::new(PlaybackConfig::default());
    let result = h.video.open(file.path(), -1.0, -1.0, false);
    // without ffprobe on the PATH the probe itself fails
    assert!(matches!(
        result,
        Err(VidmixError::Open(OpenError::InvalidData(_) | OpenError::Io(_)))
    ));
}

#[test]
fn custom_opener_and_alpha_policy() {
    let (tx, _frames) = crossbeam_channel::unbounded();
    let sink = move |picture: Picture| {
        let _ = tx.send(picture);
    };
    let video = VideoFile::with_opener(
        PlaybackConfig::default(),
        std::sync::Arc::new(sink),
        Box::new(SyntheticOpener),
    );

    video.open(Path::new("/media/clip.mov"), -1.0, -1.0, false).unwrap();
    assert_eq!(video.file_name().as_deref(), Some("clip.mov"));
    assert!(video.has_alpha_channel());
    assert_eq!(video.reset_picture().unwrap().buffer().format, PixelFormat::Rgba8);

    video.open(Path::new("/media/clip.mov"), -1.0, -1.0, true).unwrap();
    assert!(!video.has_alpha_channel());

    let result = video.open(Path::new("/media/clip.broken"), -1.0, -1.0, false);
    assert!(matches!(result, Err(VidmixError::Open(OpenError::UnsupportedCodec(_)))));
    assert!(!video.is_open());
}

#[test]
fn reopening_replaces_running_stream() {
    let h = Harness::with_stream(PlaybackConfig::default(), SyntheticConfig::default(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();

    open_with(
        &h,
        SyntheticConfig {
            frame_count: 90,
            ..Default::default()
        },
    );
    assert!(!h.video.is_running());
    assert_eq!(h.video.num_frames(), 90);
    assert!((h.video.end() - 3.0).abs() < 1e-9);
}

// ── Stopping ───────────────────────────────────────────────────

#[test]
fn restarts_where_stopped() {
    let h = Harness::with_stream(PlaybackConfig::default(), SyntheticConfig::default(), -1.0, -1.0);
    h.video.start().unwrap();
    h.shown_for(Duration::from_millis(500));
    h.video.stop().unwrap();
    let stopped_at = h.video.current_frame_time();
    assert!(stopped_at > 0.2);

    // the poster is shown while stopped
    let poster = h.frames.try_iter().last().unwrap().1;
    assert!(poster.is_persistent());
    assert_eq!(poster.pts(), 0.0);

    h.video.start().unwrap();
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - stopped_at).abs() <= FD, "resumed at {}", landing.pts());
}

#[test]
fn restarts_at_mark_in_when_configured() {
    let config = PlaybackConfig {
        restart_where_stopped: false,
        ..Default::default()
    };
    let h = Harness::with_stream(config, SyntheticConfig::default(), 1.0, -1.0);
    h.video.start().unwrap();
    h.shown_for(Duration::from_millis(300));
    h.video.stop().unwrap();

    h.video.start().unwrap();
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - 1.0).abs() < 1e-9);
}

#[test]
fn reaching_the_end_stops_playback() {
    let h = Harness::with_stream(PlaybackConfig::default(), SyntheticConfig::default(), 9.5, -1.0);
    h.video.set_loop(false);
    h.video.set_play_speed(4.0);
    h.video.start().unwrap();

    let stopped = h.wait_event(Duration::from_secs(3), |e| *e == PlaybackEvent::Running(false));
    assert!(stopped.is_some());
    assert!(!h.video.is_running());
    assert_eq!(h.video.queue_len(), 0);

    // ended sessions start over from mark-in
    h.drain();
    h.video.start().unwrap();
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - 9.5).abs() < 1e-9);
}

#[test]
fn revert_to_black_when_stopped() {
    let h = Harness::with_stream(PlaybackConfig::default(), SyntheticConfig::default(), -1.0, -1.0);
    h.video.set_revert_to_black_when_stopped(true);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();
    h.video.stop().unwrap();

    let (_, reset) = h.frames.try_iter().last().unwrap();
    assert!(reset.is_persistent());
    assert!(reset.buffer().data.iter().all(|&b| b == 0));
}

#[test]
fn stop_is_bounded_and_reports_stuck_decoder() {
    let config = PlaybackConfig {
        stop_timeout_ms: 50,
        ..Default::default()
    };
    let stream = SyntheticConfig {
        decode_delay: Duration::from_millis(600),
        ..Default::default()
    };
    let h = Harness::with_stream(config, stream, -1.0, -1.0);
    h.video.start().unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let result = h.video.stop();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(matches!(result, Err(VidmixError::CancellationTimeout { timeout_ms: 100 })));
    assert!(!h.video.is_running());

    // the abandoned thread kept the decoder
    assert!(matches!(h.video.start(), Err(VidmixError::NotOpen)));
}

#[test]
fn stop_reports_timeout_of_a_session_that_ended_on_its_own() {
    let config = PlaybackConfig {
        stop_timeout_ms: 50,
        loop_by_default: false,
        ..Default::default()
    };
    let h = Harness::new(config);
    let source = SlowTeardown {
        inner: SyntheticSource::new(SyntheticConfig {
            frame_count: 10,
            ..Default::default()
        }),
        ended: false,
    };
    h.video.open_source(Box::new(source), -1.0, -1.0).unwrap();
    h.video.set_loop(false);
    h.drain();
    h.video.start().unwrap();

    let stopped = h.wait_event(Duration::from_secs(3), |e| *e == PlaybackEvent::Running(false));
    assert!(stopped.is_some());
    assert!(matches!(
        h.video.stop(),
        Err(VidmixError::CancellationTimeout { timeout_ms: 100 })
    ));
    // reported once
    assert!(h.video.stop().is_ok());
}

#[test]
fn dropping_a_running_player_joins_threads() {
    let h = Harness::with_stream(PlaybackConfig::default(), SyntheticConfig::default(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();

    let started = Instant::now();
    drop(h.video);
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(h
        .events
        .try_iter()
        .any(|e| e == PlaybackEvent::Running(false)));
}

// ── Failure and backpressure ───────────────────────────────────

#[test]
fn decode_failure_keeps_last_frame() {
    let stream = SyntheticConfig {
        fail_at: Some(20),
        ..Default::default()
    };
    let h = Harness::with_stream(PlaybackConfig::default(), stream, -1.0, -1.0);
    h.video.start().unwrap();

    let failed = h.wait_event(Duration::from_secs(3), |e| matches!(e, PlaybackEvent::Failed(_)));
    assert!(failed.is_some());
    let stopped = h.wait_event(Duration::from_secs(3), |e| *e == PlaybackEvent::Running(false));
    assert!(stopped.is_some());
    assert!(!h.video.is_running());

    // last delivery is the final decoded frame, kept on screen
    let (_, last) = h.frames.try_iter().last().unwrap();
    assert!(last.is_persistent());
    assert!(last.pts() > 0.0 && last.pts() < 20.0 * FD);
}

#[test]
fn paused_consumer_stalls_decoding() {
    let h = Harness::new(PlaybackConfig::default());
    let source = SyntheticSource::new(SyntheticConfig::default());
    let reads = source.packets_read();
    h.video.open_source(Box::new(source), -1.0, -1.0).unwrap();
    h.video.start().unwrap();
    h.video.pause(true);

    let capacity = h.video.queue_capacity();
    let deadline = Instant::now() + Duration::from_secs(2);
    while h.video.queue_len() < capacity && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(h.video.queue_len(), capacity);
    std::thread::sleep(Duration::from_millis(50));
    let settled = reads.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(reads.load(Ordering::Relaxed), settled);
    assert_eq!(h.video.queue_len(), capacity);
}

#[test]
fn memory_policy_resizes_queue() {
    let stream = SyntheticConfig {
        width: 3840,
        height: 2160,
        frame_count: 60,
        ..Default::default()
    };
    let h = Harness::with_stream(PlaybackConfig::default(), stream, -1.0, -1.0);
    let frame_bytes = h.video.reset_picture().unwrap().buffer_size();
    let full = h.video.queue_capacity();
    assert_eq!(full, (272 * 1024 * 1024 / frame_bytes).min(61).max(3));

    h.video.set_memory_usage_policy(0);
    let small = h.video.queue_capacity();
    assert_eq!(small, (32 * 1024 * 1024 / frame_bytes).max(3));
    assert!(small < full);
    assert_eq!(h.video.config().memory_usage_policy, 0);
}

#[test]
fn closed_player_reports_neutral_values() {
    let h = Harness::new(PlaybackConfig::default());
    assert!(!h.video.is_open());
    assert_eq!(h.video.duration(), 0.0);
    assert_eq!(h.video.num_frames(), 0);
    assert!(h.video.stream_info().is_none());
    assert!(h.video.reset_picture().is_none());
    h.video.seek_to_position(3.0);
    h.video.set_mark_in(1.0);
    assert!(h.events.try_recv().is_err());
    assert!(h.video.stop().is_ok());
}

#[test]
fn poster_has_persistent_flags() {
    let h = Harness::new(PlaybackConfig::default());
    h.video
        .open_source(Box::new(SyntheticSource::new(SyntheticConfig::default())), 4.0, -1.0)
        .unwrap();
    let (_, poster) = h.frames.try_recv().unwrap();
    assert_eq!(poster.actions(), PictureActions::SHOW | PictureActions::RESET_PTS);
    assert_eq!(poster.pts(), 4.0);
}
