//! State shared between the controller, the decoding thread and the scheduler.

use crate::events::{EventBus, PlaybackEvent};
use crate::marks::Marks;
use crate::queue::PictureQueue;
use crate::seek::SeekControl;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use vidmix_core::memory_budget::MIN_QUEUE_COUNT;

pub(crate) struct SharedState {
    pub queue: PictureQueue,
    pub seek: SeekControl,
    pub marks: RwLock<Marks>,
    pub looping: AtomicBool,
    /// Polite stop request for the decoding thread
    pub quit: AtomicBool,
    /// Escalated stop request, set when `quit` was not honoured in time
    pub force_quit: AtomicBool,
    /// The decoding thread ended on an error
    pub failed: AtomicBool,
    current_pts: AtomicU64,
    pub events: EventBus,
}

impl SharedState {
    pub fn new(marks: Marks, looping: bool) -> Self {
        Self {
            queue: PictureQueue::new(MIN_QUEUE_COUNT),
            seek: SeekControl::new(),
            marks: RwLock::new(marks),
            looping: AtomicBool::new(looping),
            quit: AtomicBool::new(true),
            force_quit: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            current_pts: AtomicU64::new(marks.mark_in().to_bits()),
            events: EventBus::new(),
        }
    }

    pub fn marks(&self) -> Marks {
        *self.marks.read()
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Acquire)
    }

    pub fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Acquire) || self.force_quit.load(Ordering::Acquire)
    }

    /// Timestamp of the picture presented last.
    pub fn current_pts(&self) -> f64 {
        f64::from_bits(self.current_pts.load(Ordering::Acquire))
    }

    pub fn set_current_pts(&self, pts: f64) {
        self.current_pts.store(pts.to_bits(), Ordering::Release);
    }

    /// Release every thread blocked on the queue or the seek slot.
    pub fn wake_all(&self) {
        self.queue.wake_all();
        self.seek.wake_all();
    }

    pub fn report_failure(&self, reason: String) {
        self.failed.store(true, Ordering::Release);
        self.events.emit(PlaybackEvent::Failed(reason));
    }
}
