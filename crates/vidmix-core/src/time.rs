//! Time representation for frame-accurate playback
//!
//! Stream rates are kept as rational numbers so that frame indices computed
//! from long durations do not drift. Presentation timestamps travelling
//! through the pipeline are plain `f64` seconds.

use num_rational::Rational64;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A rational time value representing a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RationalTime {
    /// Time value as a rational number (seconds)
    value: Rational64,
}

impl RationalTime {
    /// Create a RationalTime from seconds as a float, at microsecond precision.
    pub fn from_seconds_f64(seconds: f64) -> Self {
        const PRECISION: i64 = 1_000_000;
        Self {
            value: Rational64::new((seconds * PRECISION as f64).round() as i64, PRECISION),
        }
    }

    /// Index of the frame containing this time (floored).
    #[inline]
    pub fn to_frames(self, rate: FrameRate) -> i64 {
        let frames = self.value * Rational64::new(rate.numerator as i64, rate.denominator as i64);
        frames.floor().to_integer()
    }
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl FrameRate {
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Parse a rate the way stream probes report it: `"30000/1001"` or `"25"`.
    ///
    /// Returns `None` for zero or malformed rates (ffprobe prints `"0/0"`
    /// when a stream has no average rate).
    pub fn parse(text: &str) -> Option<Self> {
        let (num, den) = match text.trim().split_once('/') {
            Some((num, den)) => (num.trim().parse::<u32>().ok()?, den.trim().parse::<u32>().ok()?),
            None => (text.trim().parse::<u32>().ok()?, 1),
        };
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self::new(num, den))
    }

    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Duration of a single frame in seconds.
    #[inline]
    pub fn frame_duration_secs(self) -> f64 {
        self.denominator as f64 / self.numerator as f64
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_25
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}

/// Human readable time, e.g. `" 1h 02m 03.45s"`.
pub fn format_timecode(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let whole = seconds.trunc() as u64;
    let hundredths = ((seconds - whole as f64) * 100.0) as u64;
    let h = whole / 3600;
    let m = (whole % 3600) / 60;
    let s = whole % 60;
    format!("{h:>2}h {m:02}m {s:02}.{hundredths:02}s")
}

/// Frame label for a time measured from the start of the stream.
pub fn format_frame_index(seconds: f64, rate: FrameRate) -> String {
    let index = RationalTime::from_seconds_f64(seconds.max(0.0)).to_frames(rate);
    format!("Frame {index}")
}
