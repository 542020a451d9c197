//! Presentation clock mapping wall time to stream time.
//!
//! Owned by the scheduler thread. Every operation has an `_at` variant
//! taking the current instant, which keeps the arithmetic testable without
//! sleeping.

use std::time::Instant;

pub const MIN_PLAY_SPEED: f64 = 0.1;
pub const MAX_PLAY_SPEED: f64 = 10.0;

/// Bound a play speed to the supported range.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() {
        return 1.0;
    }
    speed.clamp(MIN_PLAY_SPEED, MAX_PLAY_SPEED)
}

#[derive(Debug, Clone)]
pub struct Clock {
    epoch: Instant,
    /// Wall seconds (since `epoch`) at which stream time was zero
    time_on_start: f64,
    /// Wall seconds at which the clock was paused
    time_on_pause: f64,
    paused: bool,
    speed: f64,
    requested_speed: Option<f64>,
    /// Stream seconds per frame
    frame_base: f64,
}

impl Clock {
    pub fn new(frame_base: f64) -> Self {
        Self::with_epoch(Instant::now(), frame_base)
    }

    pub fn with_epoch(epoch: Instant, frame_base: f64) -> Self {
        Self {
            epoch,
            time_on_start: 0.0,
            time_on_pause: 0.0,
            paused: false,
            speed: 1.0,
            requested_speed: None,
            frame_base: if frame_base > 0.0 { frame_base } else { 0.04 },
        }
    }

    fn wall(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.epoch).as_secs_f64()
    }

    /// Re-anchor so that `time() == offset` right now.
    pub fn reset(&mut self, offset: f64, frame_base: Option<f64>) {
        self.reset_at(Instant::now(), offset, frame_base);
    }

    pub fn reset_at(&mut self, now: Instant, offset: f64, frame_base: Option<f64>) {
        if let Some(base) = frame_base.filter(|b| b.is_finite() && *b > 0.0) {
            self.frame_base = base;
        }
        let now = self.wall(now);
        self.time_on_start = now - offset / self.speed;
        self.time_on_pause = now;
    }

    pub fn time(&self) -> f64 {
        self.time_at(Instant::now())
    }

    /// Stream time elapsed since the anchor, frozen while paused.
    pub fn time_at(&self, now: Instant) -> f64 {
        let reference = if self.paused {
            self.time_on_pause
        } else {
            self.wall(now)
        };
        (reference - self.time_on_start) * self.speed
    }

    pub fn pause(&mut self, on: bool) {
        self.pause_at(Instant::now(), on);
    }

    pub fn pause_at(&mut self, now: Instant, on: bool) {
        let now = self.wall(now);
        match (on, self.paused) {
            (true, false) => {
                self.time_on_pause = now;
                self.paused = true;
            }
            (false, true) => {
                self.time_on_start += now - self.time_on_pause;
                self.paused = false;
            }
            _ => {}
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Request a new speed, applied at the next frame boundary.
    /// Returns the clamped value.
    pub fn set_speed(&mut self, speed: f64) -> f64 {
        let speed = clamp_speed(speed);
        self.requested_speed = Some(speed);
        speed
    }

    pub fn requested_speed(&self) -> Option<f64> {
        self.requested_speed
    }

    pub fn apply_requested_speed(&mut self) -> bool {
        self.apply_requested_speed_at(Instant::now())
    }

    /// Switch to the requested speed without a jump in `time()`.
    pub fn apply_requested_speed_at(&mut self, now: Instant) -> bool {
        let Some(requested) = self.requested_speed.take() else {
            return false;
        };
        if requested == self.speed {
            return false;
        }
        let ratio = self.speed / requested;
        if self.paused {
            let frozen = self.time_on_pause - self.time_on_start;
            self.time_on_start = self.time_on_pause - frozen * ratio;
        } else {
            let now = self.wall(now);
            self.time_on_start = (1.0 - ratio) * now + ratio * self.time_on_start;
        }
        self.speed = requested;
        true
    }

    pub fn frame_base(&self) -> f64 {
        self.frame_base
    }

    /// Wall seconds per frame at the current speed.
    pub fn time_base(&self) -> f64 {
        self.frame_base / self.speed
    }

    pub fn min_frame_delay(&self) -> f64 {
        0.5 * self.time_base()
    }

    pub fn max_frame_delay(&self) -> f64 {
        2.0 * self.time_base()
    }
}
