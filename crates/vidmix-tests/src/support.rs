//! Shared harness: a `VideoFile` whose sink records when each picture
//! arrived.

use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vidmix_media::{
    Picture, PictureActions, PlaybackConfig, PlaybackEvent, SyntheticConfig, SyntheticSource,
    VideoFile,
};

/// Frame duration of the default synthetic stream (30 fps).
pub const FD: f64 = 1.0 / 30.0;

pub struct Harness {
    pub video: VideoFile,
    pub frames: Receiver<(Instant, Picture)>,
    pub events: Receiver<PlaybackEvent>,
}

impl Harness {
    pub fn new(config: PlaybackConfig) -> Self {
        let (tx, frames) = crossbeam_channel::unbounded();
        let sink = move |picture: Picture| {
            let _ = tx.send((Instant::now(), picture));
        };
        let video = VideoFile::new(config, Arc::new(sink));
        let events = video.events();
        Self {
            video,
            frames,
            events,
        }
    }

    /// Harness with a synthetic stream opened and the open notifications
    /// consumed.
    pub fn with_stream(config: PlaybackConfig, stream: SyntheticConfig, mark_in: f64, mark_out: f64) -> Self {
        let harness = Self::new(config);
        harness
            .video
            .open_source(Box::new(SyntheticSource::new(stream)), mark_in, mark_out)
            .expect("synthetic stream opens");
        harness.drain();
        harness
    }

    pub fn drain(&self) {
        self.frames.try_iter().for_each(drop);
        self.events.try_iter().for_each(drop);
    }

    /// Next picture delivered by the scheduler, skipping poster frames.
    pub fn next_shown(&self, timeout: Duration) -> Option<(Instant, Picture)> {
        let deadline = Instant::now() + timeout;
        loop {
            let (at, picture) = self.frames.recv_deadline(deadline).ok()?;
            if picture.has(PictureActions::DELETE) {
                return Some((at, picture));
            }
        }
    }

    /// Every scheduled picture delivered during `duration`.
    pub fn shown_for(&self, duration: Duration) -> Vec<(Instant, Picture)> {
        let deadline = Instant::now() + duration;
        let mut out = Vec::new();
        while let Ok((at, picture)) = self.frames.recv_deadline(deadline) {
            if picture.has(PictureActions::DELETE) {
                out.push((at, picture));
            }
        }
        out
    }

    /// Next delivered picture that re-anchored the clock.
    pub fn next_reset(&self, timeout: Duration) -> Option<Picture> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let (_, picture) = self.next_shown(remaining)?;
            if picture.has(PictureActions::RESET_PTS) {
                return Some(picture);
            }
        }
    }

    /// Wait for an event matching `accept`, dropping the others.
    pub fn wait_event(
        &self,
        timeout: Duration,
        accept: impl Fn(&PlaybackEvent) -> bool,
    ) -> Option<PlaybackEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let event = self.events.recv_deadline(deadline).ok()?;
            if accept(&event) {
                return Some(event);
            }
        }
    }
}

/// Timestamps of recorded pictures.
pub fn pts_of(shown: &[(Instant, Picture)]) -> Vec<f64> {
    shown.iter().map(|(_, p)| p.pts()).collect()
}

/// How many frame durations separate two timestamps.
pub fn frames_between(a: f64, b: f64) -> f64 {
    (b - a) / FD
}
