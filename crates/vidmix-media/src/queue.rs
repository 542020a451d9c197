//! Bounded picture queue between the decoding thread and the scheduler.
//!
//! The decoding thread blocks in [`PictureQueue::push_blocking`] while the
//! queue is full; every removal signals `size_changed` so it re-evaluates.
//! Waits are bounded so a cancelled producer always notices.

use crate::picture::{Picture, PictureActions};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;
use vidmix_core::memory_budget::{MAX_QUEUE_COUNT, MIN_QUEUE_COUNT};

/// Longest single wait of a blocked producer before it re-checks cancellation.
pub const PUSH_WAIT_SLICE: Duration = Duration::from_millis(100);

/// Timestamp and actions of a queued picture, read without dequeuing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadInfo {
    pub pts: f64,
    pub actions: PictureActions,
}

impl HeadInfo {
    fn of(picture: &Picture) -> Self {
        Self {
            pts: picture.pts(),
            actions: picture.actions(),
        }
    }
}

/// A picture removed from the head, with the picture that now follows it.
#[derive(Debug)]
pub struct Dequeued {
    pub picture: Picture,
    pub next: Option<HeadInfo>,
}

/// Inputs of the capacity computation.
#[derive(Debug, Clone, Copy)]
pub struct CapacityParams {
    /// Size of one decoded picture in bytes
    pub frame_bytes: usize,
    pub frame_rate: f64,
    pub mark_in: f64,
    pub mark_out: f64,
    /// Memory the queue may use, in bytes
    pub budget_bytes: usize,
}

impl CapacityParams {
    /// Number of pictures allowed for these parameters.
    pub fn max_count(&self) -> usize {
        let by_memory = self.budget_bytes / self.frame_bytes.max(1);
        let span = (self.mark_out - self.mark_in).max(0.0);
        let by_range = 1 + (span * self.frame_rate) as usize;
        by_memory.min(by_range).clamp(MIN_QUEUE_COUNT, MAX_QUEUE_COUNT)
    }
}

/// Outcome of [`PictureQueue::truncate_from_mark`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Truncation {
    /// No picture matched, the queue is unchanged.
    NotFound,
    /// Pictures were dropped; decoding should resume from this timestamp.
    Resume(f64),
    /// The first queued picture matched, the queue is now empty.
    Emptied,
}

struct QueueState {
    pictures: VecDeque<Picture>,
    max_count: usize,
}

pub struct PictureQueue {
    state: Mutex<QueueState>,
    size_changed: Condvar,
}

impl PictureQueue {
    pub fn new(max_count: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pictures: VecDeque::with_capacity(max_count),
                max_count,
            }),
            size_changed: Condvar::new(),
        }
    }

    /// Appends a picture, waiting while the queue is full.
    ///
    /// `cancelled` is evaluated under the queue lock at every wake-up and once
    /// more before appending; when it returns true the picture is handed back.
    pub fn push_blocking(
        &self,
        picture: Picture,
        mut cancelled: impl FnMut() -> bool,
    ) -> Result<(), Picture> {
        let mut state = self.state.lock();
        while state.pictures.len() >= state.max_count {
            if cancelled() {
                return Err(picture);
            }
            self.size_changed.wait_for(&mut state, PUSH_WAIT_SLICE);
        }
        if cancelled() {
            return Err(picture);
        }
        state.pictures.push_back(picture);
        self.size_changed.notify_all();
        Ok(())
    }

    /// Removes the head if `accept` agrees, returning it with the new head.
    pub fn take_head_if(&self, accept: impl FnOnce(&Picture) -> bool) -> Option<Dequeued> {
        let mut state = self.state.lock();
        if !accept(state.pictures.front()?) {
            return None;
        }
        let picture = state.pictures.pop_front()?;
        let next = state.pictures.front().map(HeadInfo::of);
        self.size_changed.notify_all();
        Some(Dequeued { picture, next })
    }

    pub fn pop(&self) -> Option<Picture> {
        self.take_head_if(|_| true).map(|dequeued| dequeued.picture)
    }

    pub fn peek_head(&self) -> Option<HeadInfo> {
        self.state.lock().pictures.front().map(HeadInfo::of)
    }

    /// Drops every queued picture and releases a blocked producer.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.pictures.len();
        state.pictures.clear();
        self.size_changed.notify_all();
        dropped
    }

    /// Wakes any thread blocked in [`push_blocking`](Self::push_blocking).
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.size_changed.notify_all();
    }

    /// Clears `SHOW` on the head if it is still the picture stamped `pts`.
    pub fn skip_head_display(&self, pts: f64) -> bool {
        let mut state = self.state.lock();
        match state.pictures.front_mut() {
            Some(head) if head.pts() == pts => {
                head.remove(PictureActions::SHOW);
                true
            }
            _ => false,
        }
    }

    /// Adds actions to the head picture.
    pub fn tag_head(&self, actions: PictureActions) -> bool {
        let mut state = self.state.lock();
        match state.pictures.front_mut() {
            Some(head) => {
                head.add(actions);
                true
            }
            None => false,
        }
    }

    /// Whether a picture for `time` is already queued.
    ///
    /// A queue whose head is later than its tail has wrapped across the loop
    /// boundary: it holds `[head, mark_out)` followed by `[mark_in, tail]`.
    pub fn contains_time(&self, time: f64, mark_in: f64, mark_out: f64) -> bool {
        let state = self.state.lock();
        Self::covers(&state.pictures, time, mark_in, mark_out)
    }

    fn covers(pictures: &VecDeque<Picture>, time: f64, mark_in: f64, mark_out: f64) -> bool {
        let (Some(first), Some(last)) = (pictures.front(), pictures.back()) else {
            return false;
        };
        let (first, last) = (first.pts(), last.pts());
        if first > last {
            (time > first && time < mark_out) || (time > mark_in && time < last)
        } else {
            time > first && time < last
        }
    }

    /// Seeks inside the queue: drops the pictures before `time` and tags the
    /// new head `RESET_PTS`. Returns false if `time` is not queued.
    pub fn jump_to(&self, time: f64, mark_in: f64, mark_out: f64) -> bool {
        let mut state = self.state.lock();
        if !Self::covers(&state.pictures, time, mark_in, mark_out) {
            return false;
        }
        let pictures = &mut state.pictures;
        let wrapped = |p: &VecDeque<Picture>| match (p.front(), p.back()) {
            (Some(first), Some(last)) => first.pts() > last.pts(),
            _ => false,
        };
        if wrapped(pictures) && time > mark_in && time < pictures.back().map_or(time, Picture::pts) {
            // target is past the loop point, drop everything up to mark-out
            while pictures.len() > 1 && wrapped(pictures) {
                pictures.pop_front();
            }
        }
        while pictures.len() > 1 && pictures.front().is_some_and(|p| time > p.pts()) {
            pictures.pop_front();
        }
        if let Some(head) = pictures.front_mut() {
            head.add(PictureActions::RESET_PTS);
            debug!(target_pts = time, head_pts = head.pts(), "Seek served from picture queue");
        }
        self.size_changed.notify_all();
        true
    }

    /// Drops everything from the first `MARK` picture, or the first picture at
    /// or after `limit`, to the tail. The last remaining picture is dropped
    /// too and its timestamp returned so decoding can resume from it.
    pub fn truncate_from_mark(&self, limit: f64) -> Truncation {
        let mut state = self.state.lock();
        let pictures = &mut state.pictures;
        let Some(cut) = pictures
            .iter()
            .position(|p| p.has(PictureActions::MARK) || p.pts() >= limit)
        else {
            return Truncation::NotFound;
        };
        pictures.truncate(cut);
        let outcome = match pictures.pop_back() {
            Some(last) => Truncation::Resume(last.pts()),
            None => Truncation::Emptied,
        };
        debug!(kept = pictures.len(), ?outcome, "Picture queue truncated");
        self.size_changed.notify_all();
        outcome
    }

    /// Resizes the queue. Pictures above a smaller bound stay queued and
    /// drain naturally.
    pub fn recompute_capacity(&self, params: &CapacityParams) -> usize {
        let max_count = params.max_count();
        let mut state = self.state.lock();
        if state.max_count != max_count {
            debug!(
                from = state.max_count,
                to = max_count,
                queued = state.pictures.len(),
                "Picture queue resized"
            );
            state.max_count = max_count;
            self.size_changed.notify_all();
        }
        max_count
    }

    pub fn len(&self) -> usize {
        self.state.lock().pictures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().pictures.is_empty()
    }

    pub fn max_count(&self) -> usize {
        self.state.lock().max_count
    }

    /// Whether the producer would block on the next push.
    pub fn is_full(&self) -> bool {
        let state = self.state.lock();
        state.pictures.len() >= state.max_count
    }
}
