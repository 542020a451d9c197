//! Integration tests for paced playback.
//!
//! Exercises vidmix-media end to end: decoding thread, picture queue,
//! seek slot and scheduler behind a `VideoFile`. Timing assertions are
//! tolerant of a loaded machine: a late picture may be skipped, never
//! shown out of order.

use crate::support::{frames_between, pts_of, Harness, FD};
use std::time::{Duration, Instant};
use vidmix_media::{PictureActions, PlaybackConfig, PlaybackEvent, SyntheticConfig};

fn stream() -> SyntheticConfig {
    SyntheticConfig::default()
}

/// Check that consecutive timestamps advance by whole frames, mostly one.
fn assert_paced(pts: &[f64]) {
    let steps: Vec<f64> = pts.windows(2).map(|w| frames_between(w[0], w[1])).collect();
    for step in &steps {
        let whole = step.round();
        assert!((step - whole).abs() < 1e-3, "not on the frame grid: {pts:?}");
        assert!((1.0..=3.0).contains(&whole), "bad step {step} in {pts:?}");
    }
    let single = steps.iter().filter(|s| s.round() == 1.0).count();
    assert!(single * 2 >= steps.len(), "too many skipped pictures: {pts:?}");
}

// ── Scenario A: plain playback ─────────────────────────────────

#[test]
fn plays_stream_in_order() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    assert_eq!(h.video.begin(), 0.0);
    assert!((h.video.end() - 10.0).abs() < 1e-9);

    h.video.start().unwrap();
    assert!(h.video.is_running());
    let first = h.next_reset(Duration::from_secs(2)).unwrap();
    assert_eq!(first.pts(), 0.0);

    let shown = h.shown_for(Duration::from_millis(400));
    assert!(shown.len() >= 6, "only {} pictures", shown.len());
    let mut pts = vec![0.0];
    pts.extend(pts_of(&shown));
    assert_paced(&pts);
}

#[test]
fn queue_stays_within_capacity() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    let capacity = h.video.queue_capacity();
    let deadline = Instant::now() + Duration::from_millis(300);
    while Instant::now() < deadline {
        assert!(h.video.queue_len() <= capacity);
        std::thread::sleep(Duration::from_millis(5));
    }
}

// ── Scenario B: looping between marks ──────────────────────────

#[test]
fn loops_between_marks() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.set_mark_in(2.0);
    h.video.set_mark_out(5.0);
    h.video.set_loop(true);
    h.video.set_play_speed(4.0);
    h.drain();
    h.video.start().unwrap();

    let shown = h.shown_for(Duration::from_millis(1800));
    let pts = pts_of(&shown);
    assert!(pts.iter().all(|&t| (2.0 - 1e-9..5.0).contains(&t)), "{pts:?}");

    let wraps: Vec<usize> = (1..shown.len()).filter(|&i| pts[i] < pts[i - 1]).collect();
    assert!(!wraps.is_empty(), "never looped: {pts:?}");
    for i in wraps {
        let (_, landing) = &shown[i];
        assert!((landing.pts() - 2.0).abs() < 1e-9);
        assert!(landing.has(PictureActions::RESET_PTS | PictureActions::MARK));
        assert!(pts[i - 1] > 5.0 - 4.0 * FD, "gap before wrap: {}", pts[i - 1]);
    }
}

#[test]
fn disabling_loop_stops_at_mark_out() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), 2.0, 3.0);
    h.video.set_loop(true);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();

    h.video.set_loop(false);
    let stopped = h.wait_event(Duration::from_secs(4), |e| *e == PlaybackEvent::Running(false));
    assert!(stopped.is_some());
    assert!(!h.video.is_running());
}

#[test]
fn enabling_loop_keeps_playing_past_mark_out() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), 2.0, 2.5);
    h.video.set_loop(false);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();

    h.video.set_loop(true);
    let shown = h.shown_for(Duration::from_millis(1200));
    assert!(h.video.is_running());
    assert!(pts_of(&shown).windows(2).any(|w| w[1] < w[0]), "never looped");
}

// ── Scenario C: seeking ────────────────────────────────────────

#[test]
fn seek_lands_near_target() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();
    h.events.try_iter().for_each(drop);

    h.video.seek_to_position(7.3);
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - 7.3).abs() <= FD, "landed at {}", landing.pts());
    assert!(h
        .wait_event(Duration::from_secs(1), |e| *e == PlaybackEvent::SeekEnabled(true))
        .is_some());

    // playback carries on from the landing
    let after = h.next_shown(Duration::from_secs(1)).unwrap().1;
    assert!(after.pts() > landing.pts());
}

#[test]
fn seek_inside_queue_skips_decoding() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while h.video.queue_len() < 60 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }

    let target = h.video.current_frame_time() + 1.0;
    h.video.seek_to_position(target);
    let landing = h.next_reset(Duration::from_secs(1)).unwrap();
    assert!((landing.pts() - target).abs() <= FD, "landed at {}", landing.pts());
}

#[test]
fn seek_by_seconds_wraps_when_looping() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), 2.0, 5.0);
    h.video.set_loop(true);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    h.video.pause(true);
    std::thread::sleep(Duration::from_millis(100));
    h.drain();

    // 1.5 lies before mark-in and folds back to 4.5
    h.video.seek_by_seconds(1.5 - h.video.current_frame_time());
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - 4.5).abs() <= FD, "landed at {}", landing.pts());
}

#[test]
fn seek_past_end_wraps_to_mark_in_when_looping() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), 2.0, 5.0);
    h.video.set_loop(true);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();

    // lands past the last frame, far beyond mark-out
    h.video.seek_to_position(10.0);
    let shown = h.shown_for(Duration::from_millis(800));
    let pts = pts_of(&shown);
    assert!(pts.iter().all(|&t| (2.0 - 1e-9..5.0).contains(&t)), "{pts:?}");
    assert!(shown
        .iter()
        .any(|(_, p)| p.has(PictureActions::RESET_PTS) && (p.pts() - 2.0).abs() < 1e-9));
    assert!(h.video.is_running());
}

#[test]
fn mark_out_before_position_returns_to_mark_in() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), 1.0, -1.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    h.shown_for(Duration::from_millis(300));

    h.video.set_mark_out(1.05);
    let landing = h.next_reset(Duration::from_secs(2)).unwrap();
    assert!((landing.pts() - 1.0).abs() <= FD, "landed at {}", landing.pts());
    assert!(h
        .wait_event(Duration::from_secs(1), |e| *e == PlaybackEvent::MarkingChanged)
        .is_some());
}

// ── Scenario D: pause ──────────────────────────────────────────

#[test]
fn pause_freezes_delivery_and_resumes_in_place() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    h.shown_for(Duration::from_millis(150));

    h.video.pause(true);
    assert!(h.video.is_paused());
    // a picture may still be in flight when the command lands
    h.shown_for(Duration::from_millis(100));
    let paused_at = h.video.current_frame_time();
    assert!(h.shown_for(Duration::from_millis(300)).is_empty());
    assert_eq!(h.video.current_frame_time(), paused_at);

    h.video.pause(false);
    let (_, resumed) = h.next_shown(Duration::from_secs(1)).unwrap();
    let step = frames_between(paused_at, resumed.pts());
    assert!(step > 0.5 && step < 3.5, "resumed at {} after {paused_at}", resumed.pts());

    let events: Vec<_> = h.events.try_iter().collect();
    let paused: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, PlaybackEvent::Paused(_)))
        .collect();
    assert_eq!(paused, [&PlaybackEvent::Paused(true), &PlaybackEvent::Paused(false)]);
}

#[test]
fn step_forward_while_paused() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();
    h.video.pause(true);
    std::thread::sleep(Duration::from_millis(100));
    h.drain();

    let before = h.video.current_frame_time();
    h.video.seek_forward_one_frame();
    let (_, stepped) = h.next_shown(Duration::from_secs(1)).unwrap();
    assert!((stepped.pts() - (before + FD)).abs() < 1e-6);
    assert!(h.shown_for(Duration::from_millis(200)).is_empty());
}

// ── Scenario E: play speed ─────────────────────────────────────

#[test]
fn double_speed_halves_frame_interval() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.set_play_speed(2.0);
    h.video.start().unwrap();
    h.next_reset(Duration::from_secs(1)).unwrap();

    let shown = h.shown_for(Duration::from_millis(1000));
    assert!(shown.len() >= 20, "only {} pictures", shown.len());
    let (t0, first) = &shown[0];
    let (t1, last) = &shown[shown.len() - 1];
    let wall = t1.duration_since(*t0).as_secs_f64();
    let stream_time = last.pts() - first.pts();
    let ratio = stream_time / wall;
    assert!((ratio - 2.0).abs() < 0.3, "stream/wall ratio {ratio}");
}

#[test]
fn speed_change_mid_playback_is_reported() {
    let h = Harness::with_stream(PlaybackConfig::default(), stream(), -1.0, -1.0);
    h.video.start().unwrap();
    h.next_shown(Duration::from_secs(1)).unwrap();

    h.video.set_play_speed_factor(100);
    assert_eq!(h.video.play_speed(), 5.0);
    assert!(h
        .wait_event(Duration::from_secs(1), |e| *e == PlaybackEvent::PlaySpeedChanged(5.0))
        .is_some());
    let shown = h.shown_for(Duration::from_millis(300));
    assert!(pts_of(&shown).windows(2).all(|w| w[1] > w[0]));
}
