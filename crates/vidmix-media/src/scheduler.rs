//! Frame pacing.
//!
//! [`FrameScheduler`] owns the presentation [`Clock`] and moves one picture
//! per tick from the queue to the [`FrameSink`], computing how long to sleep
//! before the next one is due. [`SchedulerDriver`] runs it on its own thread
//! so the queue keeps draining whatever the controlling thread is doing.

use crate::clock::Clock;
use crate::events::{FrameSink, PlaybackEvent};
use crate::picture::{Picture, PictureActions};
use crate::queue::{Dequeued, HeadInfo};
use crate::state::SharedState;
use crossbeam_channel::{RecvTimeoutError, Sender};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use vidmix_core::Result;

/// Poll period while there is nothing to present.
pub const UPDATE_SLEEP_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stopped by the controller
    Requested,
    /// A picture tagged `STOP` was presented
    EndOfMedia,
    /// The decoding thread failed and the queue ran dry
    Failed,
}

/// Result of one scheduler step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// Time until the next step
    pub delay: Duration,
    pub stop: Option<StopReason>,
}

impl Tick {
    fn idle() -> Self {
        Self {
            delay: UPDATE_SLEEP_DELAY,
            stop: None,
        }
    }
}

pub(crate) struct FrameScheduler {
    state: Arc<SharedState>,
    clock: Clock,
    sink: Arc<dyn FrameSink>,
    /// Shown on failure when nothing was presented yet
    fallback: Picture,
    last_shown: Option<Picture>,
}

impl FrameScheduler {
    pub fn new(state: Arc<SharedState>, clock: Clock, sink: Arc<dyn FrameSink>, fallback: Picture) -> Self {
        Self {
            state,
            clock,
            sink,
            fallback,
            last_shown: None,
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn pause(&mut self, on: bool) {
        self.clock.pause(on);
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.clock.set_speed(speed);
    }

    pub fn tick(&mut self) -> Tick {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Tick {
        // a seek landing is processed even while paused
        let paused = self.clock.is_paused();
        let Some(Dequeued { mut picture, next }) = self
            .state
            .queue
            .take_head_if(|head| !paused || head.has(PictureActions::RESET_PTS))
        else {
            return self.idle_tick();
        };

        self.clock.apply_requested_speed_at(now);
        self.state.set_current_pts(picture.pts());

        if picture.has(PictureActions::RESET_PTS) {
            self.clock.reset_at(now, picture.pts(), None);
            self.state.events.emit(PlaybackEvent::SeekEnabled(true));
        }

        let stop = picture
            .has(PictureActions::STOP)
            .then_some(StopReason::EndOfMedia);

        let mut delay = UPDATE_SLEEP_DELAY;
        if picture.has(PictureActions::SHOW) {
            picture.add(PictureActions::DELETE);
            trace!(pts = picture.pts(), "Presenting picture");
            self.last_shown = Some(picture.clone());
            self.sink.frame_ready(picture);
            if let Some(next) = next {
                delay = self.delay_until(next, now);
            }
        }
        Tick { delay, stop }
    }

    /// Wall time until `next` is due. A picture already late loses its
    /// `SHOW` so playback catches up.
    fn delay_until(&self, next: HeadInfo, now: Instant) -> Duration {
        let min = self.clock.min_frame_delay();
        let seconds = if next.actions.contains(PictureActions::RESET_PTS) {
            self.clock.time_base()
        } else {
            let delay = (next.pts - self.clock.time_at(now)) / self.clock.speed();
            if delay <= min {
                if self.state.queue.skip_head_display(next.pts) {
                    debug!(pts = next.pts, late_by = min - delay, "Skipping late picture");
                }
                min
            } else {
                delay.min(self.clock.max_frame_delay())
            }
        };
        Duration::from_secs_f64(seconds.max(0.0))
    }

    fn idle_tick(&mut self) -> Tick {
        if !self.state.failed.load(Ordering::Acquire) || !self.state.queue.is_empty() {
            return Tick::idle();
        }
        // keep the last frame on screen
        let mut last = self.last_shown.take().unwrap_or_else(|| self.fallback.clone());
        last.remove(PictureActions::DELETE);
        self.sink.frame_ready(last);
        Tick {
            delay: UPDATE_SLEEP_DELAY,
            stop: Some(StopReason::Failed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum SchedulerCommand {
    Pause(bool),
    SetSpeed(f64),
    Halt,
}

/// Thread running a [`FrameScheduler`] until halted or until a tick stops.
pub(crate) struct SchedulerDriver {
    commands: Sender<SchedulerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerDriver {
    /// `on_stop` runs on the scheduler thread when a tick ends the session.
    pub fn spawn(
        mut scheduler: FrameScheduler,
        on_stop: impl FnOnce(StopReason) + Send + 'static,
    ) -> Result<Self> {
        let (commands, rx) = crossbeam_channel::unbounded();
        let thread = std::thread::Builder::new()
            .name("vidmix-scheduler".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                loop {
                    match rx.recv_deadline(deadline) {
                        Ok(SchedulerCommand::Halt) | Err(RecvTimeoutError::Disconnected) => break,
                        Ok(SchedulerCommand::Pause(on)) => scheduler.pause(on),
                        Ok(SchedulerCommand::SetSpeed(speed)) => scheduler.set_speed(speed),
                        Err(RecvTimeoutError::Timeout) => {
                            let tick = scheduler.tick();
                            if let Some(reason) = tick.stop {
                                debug!(?reason, "Scheduler stopping playback");
                                on_stop(reason);
                                break;
                            }
                            deadline = Instant::now() + tick.delay;
                        }
                    }
                }
                debug!("Scheduler thread stopped");
            })?;
        Ok(Self {
            commands,
            thread: Some(thread),
        })
    }

    /// Channel for commands executed on the scheduler thread.
    pub fn commands(&self) -> Sender<SchedulerCommand> {
        self.commands.clone()
    }

    /// Stop the thread and wait for it, unless called from the scheduler
    /// thread itself.
    pub fn halt(mut self) {
        let _ = self.commands.send(SchedulerCommand::Halt);
        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == std::thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            warn!("Scheduler thread panicked");
        }
    }
}
