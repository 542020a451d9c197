//! Playback controller for one video stream.
//!
//! A [`VideoFile`] opens a stream, keeps a poster frame for display while
//! stopped, and runs a decoding thread and a scheduler thread while playing.
//! Every control call is non-blocking or bounded by a timeout.

use crate::clock::{clamp_speed, Clock, MIN_PLAY_SPEED};
use crate::config::PlaybackConfig;
use crate::events::{FrameSink, PlaybackEvent};
use crate::ffmpeg::FfmpegOpener;
use crate::marks::Marks;
use crate::picture::{Picture, PictureActions};
use crate::producer::{DecodeProducer, ProducerHandle, MAX_SEEK_DISCARD, PTS_TOLERANCE};
use crate::queue::{CapacityParams, Truncation};
use crate::scheduler::{FrameScheduler, SchedulerCommand, SchedulerDriver, StopReason};
use crate::source::{MediaOpener, MediaSource, OpenOptions, ReadError, StreamInfo};
use crate::state::SharedState;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};
use vidmix_core::{
    format_frame_index, format_timecode, FrameBuffer, FrameRate, OpenError, PixelFormat, Result,
    VidmixError,
};

/// Play speed for a position on the 0-100 speed dial.
///
/// 0 is a tenth of normal speed, 50 normal speed and 100 five times faster,
/// exponential on each half.
pub fn speed_from_factor(factor: u32) -> f64 {
    let factor = factor.min(100) as f64;
    if factor <= 50.0 {
        MIN_PLAY_SPEED * 10f64.powf(factor / 50.0)
    } else {
        5f64.powf((factor - 50.0) / 50.0)
    }
}

/// Inverse of [`speed_from_factor`], saturating outside its range.
pub fn factor_from_speed(speed: f64) -> u32 {
    let speed = clamp_speed(speed);
    let factor = if speed <= 1.0 {
        50.0 * (speed / MIN_PLAY_SPEED).log10()
    } else {
        50.0 + 50.0 * speed.ln() / 5f64.ln()
    };
    factor.round().clamp(0.0, 100.0) as u32
}

/// What is known about the opened stream.
struct OpenedMedia {
    file_name: String,
    info: StreamInfo,
    format: PixelFormat,
    /// Frame at mark-in, shown while stopped
    first_picture: Picture,
    black_picture: Picture,
}

#[derive(Default)]
struct Lifecycle {
    /// Parked here while no decoding thread owns it
    source: Option<Box<dyn MediaSource>>,
    producer: Option<ProducerHandle>,
    scheduler: Option<SchedulerDriver>,
    /// Position playback stopped at
    mark_stop: f64,
}

struct Core {
    state: Arc<SharedState>,
    sink: Arc<dyn FrameSink>,
    opener: Box<dyn MediaOpener>,
    config: RwLock<PlaybackConfig>,
    lifecycle: Mutex<Lifecycle>,
    media: RwLock<Option<OpenedMedia>>,
    /// Command channel of the running scheduler
    control: RwLock<Option<Sender<SchedulerCommand>>>,
    /// Teardown error of a session that ended on its own, reported by the
    /// next `stop`
    stop_error: Mutex<Option<VidmixError>>,
    running: AtomicBool,
    paused: AtomicBool,
    /// f64 bits
    speed: AtomicU64,
}

/// A video stream with its playback machinery.
///
/// Pictures are delivered to the [`FrameSink`] given at construction;
/// state changes are reported on [`events`](Self::events).
pub struct VideoFile {
    core: Arc<Core>,
}

impl VideoFile {
    /// A player opening files with ffmpeg.
    pub fn new(config: PlaybackConfig, sink: Arc<dyn FrameSink>) -> Self {
        Self::with_opener(config, sink, Box::new(FfmpegOpener))
    }

    pub fn with_opener(
        config: PlaybackConfig,
        sink: Arc<dyn FrameSink>,
        opener: Box<dyn MediaOpener>,
    ) -> Self {
        let fd = FrameRate::default().frame_duration_secs();
        let state = SharedState::new(Marks::new(0.0, fd, fd), config.loop_by_default);
        Self {
            core: Arc::new(Core {
                state: Arc::new(state),
                sink,
                opener,
                config: RwLock::new(config),
                lifecycle: Mutex::new(Lifecycle::default()),
                media: RwLock::new(None),
                control: RwLock::new(None),
                stop_error: Mutex::new(None),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                speed: AtomicU64::new(1f64.to_bits()),
            }),
        }
    }

    /// Notifications of this player. Each call returns a new receiver that
    /// sees every event emitted from then on.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.core.state.events.subscribe()
    }

    pub fn config(&self) -> PlaybackConfig {
        self.core.config.read().clone()
    }

    // ---- opening ----

    /// Open a file. Negative marks leave the range at the stream bounds.
    pub fn open(&self, path: &Path, mark_in: f64, mark_out: f64, ignore_alpha: bool) -> Result<()> {
        self.close();
        let options = OpenOptions { ignore_alpha };
        let source = self.core.opener.open(path, &options).map_err(|e| {
            warn!(file = %path.display(), error = %e, "Cannot open media");
            e
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.open_named(source, name, mark_in, mark_out)
    }

    /// Use an already opened source, e.g. a [`crate::SyntheticSource`].
    pub fn open_source(&self, source: Box<dyn MediaSource>, mark_in: f64, mark_out: f64) -> Result<()> {
        let name = format!("<{}>", source.info().codec_name);
        self.open_named(source, name, mark_in, mark_out)
    }

    fn open_named(
        &self,
        mut source: Box<dyn MediaSource>,
        file_name: String,
        mark_in: f64,
        mark_out: f64,
    ) -> Result<()> {
        self.close();
        let core = &self.core;
        let info = source.info().clone();

        let prepared = prepare_media(source.as_mut(), &info, mark_in, mark_out);
        let (marks, first_picture, black_picture) = prepared.map_err(|e| {
            warn!(file = %file_name, error = %e, "Cannot open media");
            e
        })?;

        *core.state.marks.write() = marks;
        core.state
            .looping
            .store(core.config.read().loop_by_default, Ordering::Release);
        core.state.set_current_pts(marks.mark_in());

        info!(
            file = %file_name,
            codec = %info.codec_name,
            width = info.width,
            height = info.height,
            fps = info.frame_rate.to_fps_f64(),
            frames = info.frame_count,
            "Media opened"
        );
        *core.media.write() = Some(OpenedMedia {
            file_name,
            format: source.output_format(),
            info,
            first_picture,
            black_picture,
        });
        {
            let mut life = core.lifecycle.lock();
            life.source = Some(source);
            life.mark_stop = marks.mark_in();
        }
        core.recompute_capacity();
        core.deliver_reset_picture();
        core.state.events.emit(PlaybackEvent::Running(false));
        Ok(())
    }

    /// Stop playback and release the stream.
    pub fn close(&self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Stream closed with a stuck decoding thread");
        }
        let closed = self.core.media.write().take();
        self.core.lifecycle.lock().source = None;
        if let Some(media) = closed {
            info!(file = %media.file_name, "Media closed");
        }
    }

    // ---- running ----

    /// Start playback at mark-in, or where it last stopped. Does nothing for
    /// single-frame streams or when already running.
    pub fn start(&self) -> Result<()> {
        let core = &self.core;
        let mut life = core.lifecycle.lock();
        let (frame_count, frame_duration, file_name) = {
            let media = core.media.read();
            let media = media.as_ref().ok_or(VidmixError::NotOpen)?;
            (
                media.info.frame_count,
                media.info.frame_duration(),
                media.file_name.clone(),
            )
        };
        if frame_count < 2 {
            debug!(file = %file_name, "Single frame stream, nothing to play");
            return Ok(());
        }
        if core.running.load(Ordering::Acquire) {
            return Ok(());
        }
        let source = life.source.take().ok_or_else(|| {
            warn!(file = %file_name, "Decoder lost after a forced stop, reopen the media");
            VidmixError::NotOpen
        })?;

        let state = &core.state;
        state.quit.store(false, Ordering::Release);
        state.force_quit.store(false, Ordering::Release);
        state.failed.store(false, Ordering::Release);
        state.queue.clear();
        state.seek.reset();

        let marks = state.marks();
        let restart = core.config.read().restart_where_stopped;
        let target = if restart && life.mark_stop > marks.mark_in() && life.mark_stop < marks.mark_out() {
            life.mark_stop
        } else {
            marks.mark_in()
        };
        state.set_current_pts(target);
        state.seek.post(target, false);

        let producer = DecodeProducer::new(source, state.clone()).spawn()?;

        let mut clock = Clock::new(frame_duration);
        clock.set_speed(core.speed());
        clock.apply_requested_speed();
        clock.pause(core.paused.load(Ordering::Acquire));
        let fallback = core.reset_picture().ok_or(VidmixError::NotOpen)?;
        let scheduler = FrameScheduler::new(state.clone(), clock, core.sink.clone(), fallback);

        let weak: Weak<Core> = Arc::downgrade(&self.core);
        let driver = SchedulerDriver::spawn(scheduler, move |reason| {
            if let Some(core) = weak.upgrade() {
                let _ = core.finish_stop(reason);
            }
        });
        let driver = match driver {
            Ok(driver) => driver,
            Err(e) => {
                if let Ok(source) = producer.shutdown(state, core.config.read().stop_timeout()) {
                    life.source = Some(source);
                }
                return Err(e);
            }
        };

        *core.control.write() = Some(driver.commands());
        life.producer = Some(producer);
        life.scheduler = Some(driver);
        core.running.store(true, Ordering::Release);
        info!(file = %file_name, from = target, "Playback started");
        state.events.emit(PlaybackEvent::Running(true));
        Ok(())
    }

    /// Stop playback. Waits for both threads, bounded by the configured stop
    /// timeout; a decoding thread that does not stop is abandoned and
    /// reported as [`VidmixError::CancellationTimeout`], also when playback
    /// had already ended on its own.
    pub fn stop(&self) -> Result<()> {
        // the scheduler may itself be waiting for the lifecycle lock
        let driver = self.core.lifecycle.lock().scheduler.take();
        if let Some(driver) = driver {
            driver.halt();
        }
        self.core.finish_stop(StopReason::Requested)?;
        match self.core.stop_error.lock().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn play(&self, on: bool) -> Result<()> {
        if on {
            self.start()
        } else {
            self.stop()
        }
    }

    /// Freeze or resume the clock. Ignored while stopped. Decoding goes on
    /// filling the queue while paused.
    pub fn pause(&self, on: bool) {
        let core = &self.core;
        if !core.running.load(Ordering::Acquire) || core.paused.swap(on, Ordering::AcqRel) == on {
            return;
        }
        core.send(SchedulerCommand::Pause(on));
        core.state.events.emit(PlaybackEvent::Paused(on));
    }

    // ---- seeking ----

    /// Jump to `time`, clamped to the stream. Served from the queue when the
    /// picture is already decoded, otherwise by the decoding thread.
    pub fn seek_to_position(&self, time: f64) {
        let core = &self.core;
        if !core.running.load(Ordering::Acquire) {
            return;
        }
        let state = &core.state;
        let marks = state.marks();
        let time = marks.clamp_to_stream(time);
        if (time - state.current_pts()).abs() < marks.frame_duration() {
            return;
        }
        state.events.emit(PlaybackEvent::SeekEnabled(false));
        if state.queue.jump_to(time, marks.mark_in(), marks.mark_out()) {
            return;
        }
        state.seek.post_with(true, || {
            state.queue.clear();
            Some(time)
        });
    }

    /// Seek relative to the current picture, wrapping around the marks when
    /// looping and stopping at them otherwise.
    pub fn seek_by_seconds(&self, seconds: f64) {
        let state = &self.core.state;
        let marks = state.marks();
        let position = state.current_pts() + seconds;
        let position = if state.is_looping() {
            marks.wrap(position)
        } else {
            marks.clamp_to_marks(position)
        };
        self.seek_to_position(position);
    }

    pub fn seek_by_frames(&self, frames: i64) {
        let fd = self.core.state.marks().frame_duration();
        self.seek_by_seconds(frames as f64 * fd);
    }

    /// Present the next queued picture even while paused.
    pub fn seek_forward_one_frame(&self) {
        if self.core.running.load(Ordering::Acquire) {
            self.core.state.queue.tag_head(PictureActions::RESET_PTS);
        }
    }

    // ---- range and options ----

    pub fn set_loop(&self, on: bool) {
        let core = &self.core;
        core.state.looping.store(on, Ordering::Release);
        if core.running.load(Ordering::Acquire) {
            core.clean_until(f64::INFINITY);
        }
    }

    pub fn set_mark_in(&self, time: f64) {
        let core = &self.core;
        if !self.is_open() {
            return;
        }
        let (mark_in, outside) = {
            let mut marks = core.state.marks.write();
            let mark_in = marks.set_mark_in(time);
            (mark_in, mark_in >= core.state.current_pts())
        };
        if core.running.load(Ordering::Acquire) {
            if outside {
                self.seek_to_position(mark_in);
            } else {
                core.clean_until(f64::INFINITY);
            }
        } else {
            core.refresh_first_picture();
            core.deliver_reset_picture();
        }
        debug!(mark_in, "Mark in changed");
        core.recompute_capacity();
        core.state.events.emit(PlaybackEvent::MarkingChanged);
    }

    pub fn set_mark_out(&self, time: f64) {
        let core = &self.core;
        if !self.is_open() {
            return;
        }
        let (marks, outside) = {
            let mut marks = core.state.marks.write();
            let mark_out = marks.set_mark_out(time);
            (*marks, mark_out <= core.state.current_pts())
        };
        if core.running.load(Ordering::Acquire) {
            if outside {
                self.seek_to_position(marks.mark_in());
            } else {
                core.clean_until(marks.mark_out());
            }
        }
        debug!(mark_out = marks.mark_out(), "Mark out changed");
        core.recompute_capacity();
        core.state.events.emit(PlaybackEvent::MarkingChanged);
    }

    /// Set the play speed, clamped to [0.1, 10].
    pub fn set_play_speed(&self, speed: f64) {
        let core = &self.core;
        let speed = clamp_speed(speed);
        let previous = f64::from_bits(core.speed.swap(speed.to_bits(), Ordering::AcqRel));
        core.send(SchedulerCommand::SetSpeed(speed));
        if previous != speed {
            core.state.events.emit(PlaybackEvent::PlaySpeedChanged(speed));
        }
    }

    pub fn set_play_speed_factor(&self, factor: u32) {
        self.set_play_speed(speed_from_factor(factor));
    }

    pub fn set_memory_usage_policy(&self, percent: u32) {
        self.core.config.write().memory_usage_policy = percent.min(100);
        self.core.recompute_capacity();
    }

    pub fn set_restart_where_stopped(&self, on: bool) {
        self.core.config.write().restart_where_stopped = on;
    }

    pub fn set_revert_to_black_when_stopped(&self, on: bool) {
        self.core.config.write().revert_to_black_when_stopped = on;
        if !self.core.running.load(Ordering::Acquire) {
            self.core.deliver_reset_picture();
        }
    }

    // ---- queries ----

    pub fn is_open(&self) -> bool {
        self.core.media.read().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.core.paused.load(Ordering::Acquire)
    }

    pub fn is_looping(&self) -> bool {
        self.core.state.is_looping()
    }

    /// Timestamp of the picture presented last.
    pub fn current_frame_time(&self) -> f64 {
        self.core.state.current_pts()
    }

    fn opened_marks(&self) -> Option<Marks> {
        self.is_open().then(|| self.core.state.marks())
    }

    pub fn begin(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.begin())
    }

    pub fn end(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.end())
    }

    pub fn duration(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.duration())
    }

    pub fn mark_in(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.mark_in())
    }

    pub fn mark_out(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.mark_out())
    }

    pub fn frame_duration(&self) -> f64 {
        self.opened_marks().map_or(0.0, |m| m.frame_duration())
    }

    fn with_media<T>(&self, f: impl FnOnce(&OpenedMedia) -> T) -> Option<T> {
        self.core.media.read().as_ref().map(f)
    }

    pub fn frame_rate(&self) -> f64 {
        self.with_media(|m| m.info.frame_rate.to_fps_f64()).unwrap_or(0.0)
    }

    pub fn num_frames(&self) -> u64 {
        self.with_media(|m| m.info.frame_count).unwrap_or(0)
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.with_media(|m| m.info.clone())
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.with_media(|m| m.info.aspect_ratio()).unwrap_or(1.0)
    }

    /// Whether delivered pictures carry an alpha channel.
    pub fn has_alpha_channel(&self) -> bool {
        self.with_media(|m| m.format.has_alpha()).unwrap_or(false)
    }

    pub fn pixel_format_name(&self) -> Option<String> {
        self.with_media(|m| m.info.pixel_format.clone())
    }

    pub fn codec_name(&self) -> Option<String> {
        self.with_media(|m| m.info.codec_name.clone())
    }

    pub fn file_name(&self) -> Option<String> {
        self.with_media(|m| m.file_name.clone())
    }

    pub fn play_speed(&self) -> f64 {
        self.core.speed()
    }

    pub fn play_speed_factor(&self) -> u32 {
        factor_from_speed(self.play_speed())
    }

    pub fn queue_len(&self) -> usize {
        self.core.state.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.core.state.queue.max_count()
    }

    /// `time` as `" 0h 01m 02.50s"`.
    pub fn time_string(&self, time: f64) -> String {
        format_timecode(time)
    }

    /// Index of the frame shown at `time`, as `"Frame 42"`.
    pub fn frame_string(&self, time: f64) -> String {
        let rate = self.with_media(|m| m.info.frame_rate).unwrap_or_default();
        format_frame_index(time - self.begin(), rate)
    }

    /// Picture shown while stopped.
    pub fn reset_picture(&self) -> Option<Picture> {
        self.core.reset_picture()
    }
}

impl Drop for VideoFile {
    fn drop(&mut self) {
        self.close();
    }
}

impl Core {
    fn speed(&self) -> f64 {
        f64::from_bits(self.speed.load(Ordering::Acquire))
    }

    fn send(&self, command: SchedulerCommand) {
        if let Some(control) = self.control.read().as_ref() {
            // a closed channel means the scheduler is stopping
            let _ = control.send(command);
        }
    }

    fn reset_picture(&self) -> Option<Picture> {
        let black = self.config.read().revert_to_black_when_stopped;
        self.media.read().as_ref().map(|media| {
            if black {
                media.black_picture.clone()
            } else {
                media.first_picture.clone()
            }
        })
    }

    fn deliver_reset_picture(&self) {
        if let Some(picture) = self.reset_picture() {
            self.sink.frame_ready(picture);
        }
    }

    fn recompute_capacity(&self) {
        let Some((frame_bytes, frame_rate)) = self
            .media
            .read()
            .as_ref()
            .map(|m| (m.first_picture.buffer_size(), m.info.frame_rate.to_fps_f64()))
        else {
            return;
        };
        let marks = self.state.marks();
        self.state.queue.recompute_capacity(&CapacityParams {
            frame_bytes,
            frame_rate,
            mark_in: marks.mark_in(),
            mark_out: marks.mark_out(),
            budget_bytes: self.config.read().queue_budget_bytes(),
        });
    }

    /// Drop queued pictures from the next `MARK` (or `limit`) on, and have
    /// decoding resume after what is kept.
    fn clean_until(&self, limit: f64) {
        let state = &self.state;
        let marks = state.marks();
        state.seek.post_with(false, || match state.queue.truncate_from_mark(limit) {
            Truncation::NotFound => None,
            Truncation::Resume(pts) => Some(pts),
            Truncation::Emptied => {
                Some(marks.clamp_to_stream(state.current_pts() + marks.frame_duration()))
            }
        });
    }

    /// Decode the frame at mark-in again for the poster.
    fn refresh_first_picture(&self) {
        let mut life = self.lifecycle.lock();
        let Some(source) = life.source.as_mut() else {
            return;
        };
        match decode_first_frame(source.as_mut(), self.state.marks().mark_in()) {
            Ok((buffer, pts)) => {
                if let Some(media) = self.media.write().as_mut() {
                    media.first_picture = Picture::from_frame(buffer, pts, poster_actions());
                }
            }
            Err(e) => warn!(error = %e, "Cannot refresh first picture"),
        }
    }

    /// Tear down a running session. Called by [`VideoFile::stop`] and by the
    /// scheduler thread when playback ends on its own.
    fn finish_stop(&self, reason: StopReason) -> Result<()> {
        let mut life = self.lifecycle.lock();
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.control.write().take();
        if let Some(driver) = life.scheduler.take() {
            driver.halt();
        }

        let timeout = self.config.read().stop_timeout();
        let mut result = Ok(());
        if let Some(producer) = life.producer.take() {
            match producer.shutdown(&self.state, timeout) {
                Ok(source) => life.source = Some(source),
                Err(e) => result = Err(e),
            }
        }

        let marks = self.state.marks();
        life.mark_stop = match reason {
            StopReason::EndOfMedia => marks.mark_in(),
            _ => self.state.current_pts(),
        };
        self.state.queue.clear();
        self.state.seek.reset();
        let restart = self.config.read().restart_where_stopped;
        drop(life);

        if !restart {
            self.refresh_first_picture();
        }
        // a failed session keeps its last frame on screen
        if reason != StopReason::Failed {
            self.deliver_reset_picture();
        }
        // nobody awaits a session that ended on its own; keep its error for `stop`
        let result = match result {
            Err(e) if reason != StopReason::Requested => {
                warn!(error = %e, ?reason, "Playback stopped with errors");
                *self.stop_error.lock() = Some(e);
                Ok(())
            }
            other => other,
        };
        info!(?reason, at = self.state.current_pts(), "Playback stopped");
        self.state.events.emit(PlaybackEvent::Running(false));
        result
    }
}

fn poster_actions() -> PictureActions {
    PictureActions::SHOW | PictureActions::RESET_PTS
}

/// Validate the stream and build its marks, poster and black pictures.
fn prepare_media(
    source: &mut dyn MediaSource,
    info: &StreamInfo,
    mark_in: f64,
    mark_out: f64,
) -> std::result::Result<(Marks, Picture, Picture), OpenError> {
    if info.width == 0 || info.height == 0 {
        return Err(OpenError::InvalidData(format!(
            "invalid frame size {}x{}",
            info.width, info.height
        )));
    }
    let fd = info.frame_duration();
    if !(fd.is_finite() && fd > 0.0) {
        return Err(OpenError::InvalidData("invalid frame rate".into()));
    }
    let marks = Marks::with_marks(
        info.start_time,
        info.end_time(),
        fd,
        (mark_in >= 0.0).then_some(mark_in),
        (mark_out >= 0.0).then_some(mark_out),
    );

    let black = allocate_black(info.width, info.height, source.output_format())?;
    let (first, pts) = decode_first_frame(source, marks.mark_in())?;
    Ok((
        marks,
        Picture::from_frame(first, pts, poster_actions()),
        Picture::from_frame(black, marks.mark_in(), poster_actions()),
    ))
}

fn allocate_black(
    width: u32,
    height: u32,
    format: PixelFormat,
) -> std::result::Result<FrameBuffer, OpenError> {
    FrameBuffer::black(width, height, format)
        .ok_or_else(|| OpenError::OutOfMemory(format!("cannot allocate a {width}x{height} picture")))
}

/// First frame at or after `target`, or the last one decoded before the
/// stream ended.
fn decode_first_frame(
    source: &mut dyn MediaSource,
    target: f64,
) -> std::result::Result<(FrameBuffer, f64), OpenError> {
    source
        .seek(target)
        .map_err(|e| OpenError::InvalidData(e.to_string()))?;
    source.flush();

    let mut last = None;
    for _ in 0..MAX_SEEK_DISCARD {
        let packet = match source.read_packet() {
            Ok(packet) => packet,
            Err(ReadError::EndOfStream) => break,
            Err(ReadError::Io(e)) => return Err(OpenError::Io(e)),
        };
        let frame = match source.decode(packet) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(e) => return Err(OpenError::InvalidData(e.to_string())),
        };
        let pts = frame.pts.unwrap_or(target);
        if pts + PTS_TOLERANCE >= target {
            return Ok((frame.buffer, pts));
        }
        last = Some((frame.buffer, pts));
    }
    last.ok_or_else(|| OpenError::InvalidData("no frame could be decoded".into()))
}
