//! Seek request slot shared by the controller and the decoding thread.
//!
//! One request is outstanding at a time. The controller moves the slot from
//! `None` to `Parsing`; only the decoding thread moves it on to `Decoding`
//! (request accepted, demuxer repositioned) and back to `None` (target
//! frame reached).

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bound on every cross-thread lock or wait taken by the controller.
pub const LOCKING_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ParsingMode {
    /// Normal decoding
    None = 0,
    /// A seek was requested and not yet picked up
    Parsing = 1,
    /// The demuxer jumped; frames before the target are discarded
    Decoding = 2,
}

impl ParsingMode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Parsing,
            2 => Self::Decoding,
            _ => Self::None,
        }
    }
}

struct SeekSlot {
    mode: ParsingMode,
    target: f64,
}

pub struct SeekControl {
    slot: Mutex<SeekSlot>,
    acknowledged: Condvar,
    /// Lock-free copy of `slot.mode`, readable under the queue lock
    mode: AtomicU8,
}

impl Default for SeekControl {
    fn default() -> Self {
        Self::new()
    }
}

impl SeekControl {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(SeekSlot {
                mode: ParsingMode::None,
                target: 0.0,
            }),
            acknowledged: Condvar::new(),
            mode: AtomicU8::new(ParsingMode::None as u8),
        }
    }

    pub fn mode(&self) -> ParsingMode {
        ParsingMode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// A request is waiting to be picked up by the decoding thread.
    pub fn is_pending(&self) -> bool {
        self.mode() == ParsingMode::Parsing
    }

    fn set_mode(&self, slot: &mut SeekSlot, mode: ParsingMode) {
        slot.mode = mode;
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Request a seek to `target`. See [`post_with`](Self::post_with).
    pub fn post(&self, target: f64, wait: bool) -> bool {
        self.post_with(wait, || Some(target))
    }

    /// Request a seek to the target computed by `prepare`.
    ///
    /// `prepare` runs under the seek lock with the request already visible as
    /// pending, so a producer cannot enqueue or pick up the request until it
    /// returns. Returning `None` withdraws the request. A request made while
    /// another is still pending replaces its target.
    ///
    /// With `wait`, blocks until the decoding thread picks the request up or
    /// [`LOCKING_TIMEOUT`] elapses. Returns false if no request was posted.
    pub fn post_with(&self, wait: bool, prepare: impl FnOnce() -> Option<f64>) -> bool {
        let Some(mut slot) = self.slot.try_lock_for(LOCKING_TIMEOUT) else {
            warn!("Seek request dropped, decoding thread holds the seek lock");
            return false;
        };
        let previous = slot.mode;
        self.mode.store(ParsingMode::Parsing as u8, Ordering::Release);
        let Some(target) = prepare() else {
            self.set_mode(&mut slot, previous);
            return false;
        };
        slot.target = target;
        self.set_mode(&mut slot, ParsingMode::Parsing);
        self.acknowledged.notify_all();
        debug!(target, "Seek requested");

        if wait {
            let deadline = Instant::now() + LOCKING_TIMEOUT;
            while slot.mode == ParsingMode::Parsing {
                if self.acknowledged.wait_until(&mut slot, deadline).timed_out() {
                    debug!(target, "Seek not acknowledged in time");
                    break;
                }
            }
        }
        true
    }

    /// Decoding thread: accept a pending request, moving to `Decoding`.
    pub fn take_request(&self) -> Option<f64> {
        if !self.is_pending() {
            return None;
        }
        let mut slot = self.slot.lock();
        if slot.mode != ParsingMode::Parsing {
            return None;
        }
        self.set_mode(&mut slot, ParsingMode::Decoding);
        self.acknowledged.notify_all();
        Some(slot.target)
    }

    /// Decoding thread: the target frame was reached. Fails if a newer
    /// request arrived meanwhile.
    pub fn finish(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.mode != ParsingMode::Decoding {
            return false;
        }
        self.set_mode(&mut slot, ParsingMode::None);
        true
    }

    /// Drop any request, e.g. before a new decoding thread starts.
    pub fn reset(&self) {
        let mut slot = self.slot.lock();
        self.set_mode(&mut slot, ParsingMode::None);
        self.acknowledged.notify_all();
    }

    /// Release a controller waiting for acknowledgement.
    pub fn wake_all(&self) {
        let _slot = self.slot.lock();
        self.acknowledged.notify_all();
    }

    /// Decoding thread: sleep until a request is pending or `timeout` elapses.
    pub fn wait_for_request(&self, timeout: Duration) -> bool {
        let mut slot = self.slot.lock();
        if slot.mode != ParsingMode::Parsing {
            let _ = self.acknowledged.wait_for(&mut slot, timeout);
        }
        slot.mode == ParsingMode::Parsing
    }
}
