//! Vidmix Core - Foundation types for the playback pipeline
//!
//! This crate provides the fundamental types shared by the decoder and
//! the player:
//! - Time representation (RationalTime, FrameRate, timecode strings)
//! - Frame buffers and pixel formats
//! - Error types
//! - Queue sizing constants

pub mod error;
pub mod frame;
pub mod time;

pub use error::{OpenError, Result, VidmixError};
pub use frame::{FrameBuffer, PixelFormat, SharedFrameBuffer};
pub use time::{format_frame_index, format_timecode, FrameRate, RationalTime};

/// Memory budget constants for the decoded picture queue.
pub mod memory_budget {
    /// Lower bound of the queue budget, used for a 0% memory usage policy.
    pub const MIN_QUEUE_SIZE_MB: usize = 32;

    /// Upper bound of the queue budget, used for a 100% memory usage policy.
    pub const MAX_QUEUE_SIZE_MB: usize = 512;

    /// Policy applied when none is configured (percent).
    pub const DEFAULT_MEMORY_USAGE_POLICY: u32 = 50;

    /// Fewest pictures a queue may be sized to.
    pub const MIN_QUEUE_COUNT: usize = 3;

    /// Most pictures a queue may be sized to.
    pub const MAX_QUEUE_COUNT: usize = 100;

    /// Queue budget in bytes for a policy between 0 and 100 percent.
    pub fn memory_usage_maximum(policy: u32) -> usize {
        let policy = policy.min(100) as usize;
        let mb = MIN_QUEUE_SIZE_MB + policy * (MAX_QUEUE_SIZE_MB - MIN_QUEUE_SIZE_MB) / 100;
        mb * 1024 * 1024
    }

}
