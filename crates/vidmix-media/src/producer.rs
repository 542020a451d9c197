//! Decoding thread: reads and decodes the stream into the picture queue.
//!
//! Each iteration accepts a pending seek, reads one packet, decodes it,
//! classifies the frame against the seek target and the marks, then
//! enqueues it (blocking while the queue is full). The thread owns the
//! [`MediaSource`] and hands it back when joined.

use crate::picture::{Picture, PictureActions};
use crate::seek::ParsingMode;
use crate::source::{MediaSource, ReadError};
use crate::state::SharedState;
use crossbeam_channel::RecvTimeoutError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use vidmix_core::{Result, SharedFrameBuffer, VidmixError};

/// Pause between retries after a failed read, and the idle poll period.
pub const PARSING_SLEEP_DELAY: Duration = Duration::from_millis(100);

/// Consecutive read errors tolerated before decoding is abandoned.
pub const MAX_READ_ERRORS: u32 = 20;

/// Frames discarded while looking for a seek target before settling for the
/// nearest one.
pub const MAX_SEEK_DISCARD: u32 = 500;

/// Timestamps closer than this are considered equal.
pub(crate) const PTS_TOLERANCE: f64 = 1e-6;

pub(crate) struct DecodeProducer {
    source: Box<dyn MediaSource>,
    state: Arc<SharedState>,
    frame_duration: f64,
    seek_target: f64,
    discarded: u32,
    read_errors: u32,
    /// Timestamp given to the next frame that has none
    predicted_pts: f64,
    last_frame: Option<(SharedFrameBuffer, f64)>,
    /// A STOP picture was queued; nothing to do until a seek or quit
    ended: bool,
}

impl DecodeProducer {
    pub fn new(source: Box<dyn MediaSource>, state: Arc<SharedState>) -> Self {
        let frame_duration = state.marks().frame_duration();
        let start = state.marks().mark_in();
        Self {
            source,
            state,
            frame_duration,
            seek_target: start,
            discarded: 0,
            read_errors: 0,
            predicted_pts: start,
            last_frame: None,
            ended: false,
        }
    }

    /// Start decoding on a dedicated thread.
    pub fn spawn(self) -> Result<ProducerHandle> {
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(0);
        let thread = std::thread::Builder::new()
            .name("vidmix-decode".into())
            .spawn(move || {
                // dropping the sender tells the handle the thread is done
                let _done = done_tx;
                self.run()
            })?;
        Ok(ProducerHandle {
            thread: Some(thread),
            done: done_rx,
        })
    }

    pub fn run(mut self) -> Box<dyn MediaSource> {
        debug!("Decoding thread started");
        while !self.state.should_quit() {
            if let Some(target) = self.state.seek.take_request() {
                if let Err(e) = self.accept_seek(target) {
                    self.fail(e);
                    break;
                }
            }

            if self.ended {
                self.state.seek.wait_for_request(PARSING_SLEEP_DELAY);
                continue;
            }

            let packet = match self.source.read_packet() {
                Ok(packet) => {
                    self.read_errors = 0;
                    packet
                }
                Err(ReadError::EndOfStream) => {
                    self.end_of_stream();
                    continue;
                }
                Err(ReadError::Io(e)) => {
                    self.read_errors += 1;
                    if self.read_errors >= MAX_READ_ERRORS {
                        self.fail(VidmixError::Io(e));
                        break;
                    }
                    warn!(error = %e, attempt = self.read_errors, "Read failed, retrying");
                    std::thread::sleep(PARSING_SLEEP_DELAY);
                    continue;
                }
            };

            let frame = match self.source.decode(packet) {
                Ok(Some(frame)) => frame,
                Ok(None) => continue,
                Err(e) => {
                    self.fail(e);
                    break;
                }
            };
            let pts = self.synchronize(frame.pts);
            let buffer: SharedFrameBuffer = Arc::new(frame.buffer);
            self.last_frame = Some((buffer.clone(), pts));

            if let Some(picture) = self.classify(buffer, pts) {
                self.enqueue(picture);
            }
        }

        // a failed session still presents what was decoded before the error
        if self.state.should_quit() {
            self.state.queue.clear();
        }
        self.source.flush();
        if self.state.force_quit.load(Ordering::Acquire) {
            warn!("Decoding interrupted unexpectedly");
        } else {
            info!("Decoding thread stopped");
        }
        self.source
    }

    fn accept_seek(&mut self, target: f64) -> Result<()> {
        debug!(target, "Seek accepted by decoding thread");
        self.source.seek(target)?;
        self.source.flush();
        self.seek_target = target;
        self.predicted_pts = target;
        self.discarded = 0;
        self.ended = false;
        Ok(())
    }

    /// Timestamp of a decoded frame, predicted from the previous one when
    /// the stream does not carry it.
    fn synchronize(&mut self, pts: Option<f64>) -> f64 {
        let pts = match pts {
            Some(pts) if pts.is_finite() => pts,
            _ => self.predicted_pts,
        };
        self.predicted_pts = pts + self.frame_duration;
        pts
    }

    /// Decide what happens to a decoded frame. `None` drops it.
    fn classify(&mut self, buffer: SharedFrameBuffer, pts: f64) -> Option<Picture> {
        let marks = self.state.marks();
        let mut actions = PictureActions::SHOW;

        if self.state.seek.is_pending() {
            // superseded by a newer request, picked up at the top of the loop
            return None;
        }
        if self.state.seek.mode() == ParsingMode::Decoding {
            if pts + PTS_TOLERANCE < self.seek_target {
                self.discarded += 1;
                if self.discarded < MAX_SEEK_DISCARD {
                    return None;
                }
                let miss = VidmixError::SeekMiss {
                    target: self.seek_target,
                    landed: pts,
                };
                warn!(error = %miss, "Seek target not reached, using nearest frame");
            }
            if !self.state.seek.finish() {
                return None;
            }
            actions |= PictureActions::RESET_PTS;
            if marks.is_at_mark_in(self.seek_target) {
                actions |= PictureActions::MARK;
            }
        }

        let actions = self.apply_mark_out(pts, actions)?;
        Some(Picture::new(buffer, pts, actions))
    }

    /// Frames at or past mark-out wrap to mark-in when looping (`None`),
    /// otherwise they end the session.
    fn apply_mark_out(&self, pts: f64, actions: PictureActions) -> Option<PictureActions> {
        let marks = self.state.marks();
        if pts < marks.mark_out() - PTS_TOLERANCE {
            return Some(actions);
        }
        if self.state.is_looping() {
            self.state.seek.post(marks.mark_in(), false);
            return None;
        }
        Some(actions | PictureActions::STOP | PictureActions::MARK)
    }

    fn end_of_stream(&mut self) {
        if self.state.seek.mode() == ParsingMode::Decoding {
            // the target lies past the last frame: land on the last one
            if let Some((buffer, pts)) = self.last_frame.clone() {
                let miss = VidmixError::SeekMiss {
                    target: self.seek_target,
                    landed: pts,
                };
                warn!(error = %miss, "Seek target past end of stream");
                if self.state.seek.finish() {
                    let landing = PictureActions::SHOW | PictureActions::RESET_PTS;
                    if let Some(actions) = self.apply_mark_out(pts, landing) {
                        self.enqueue(Picture::new(buffer, pts, actions));
                    }
                }
                return;
            }
            self.state.seek.finish();
        }

        if self.state.is_looping() {
            debug!("End of stream, looping to mark-in");
            self.state.seek.post(self.state.marks().mark_in(), false);
            return;
        }

        debug!("End of stream");
        match self.last_frame.clone() {
            Some((buffer, pts)) => {
                let stop = Picture::new(
                    buffer,
                    pts + self.frame_duration,
                    PictureActions::STOP | PictureActions::MARK,
                );
                self.enqueue(stop);
            }
            None => self.ended = true,
        }
    }

    /// Blocking push, abandoned on quit or when a seek is requested.
    fn enqueue(&mut self, picture: Picture) -> bool {
        let stops = picture.has(PictureActions::STOP);
        let state = &self.state;
        let queued = state
            .queue
            .push_blocking(picture, || state.should_quit() || state.seek.is_pending())
            .is_ok();
        if queued && stops {
            self.ended = true;
        }
        queued
    }

    fn fail(&self, e: VidmixError) {
        error!(error = %e, "Decoding failed");
        self.state.report_failure(e.to_string());
    }
}

/// Join handle of the decoding thread.
pub(crate) struct ProducerHandle {
    thread: Option<JoinHandle<Box<dyn MediaSource>>>,
    done: crossbeam_channel::Receiver<()>,
}

impl ProducerHandle {
    pub fn is_finished(&self) -> bool {
        matches!(
            self.done.try_recv(),
            Err(crossbeam_channel::TryRecvError::Disconnected)
        )
    }

    fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.done.recv_timeout(timeout),
            Err(RecvTimeoutError::Disconnected)
        )
    }

    /// Stop the thread and take the source back.
    ///
    /// Asks politely and waits `timeout`, then forces and waits again. A
    /// thread still running after that is abandoned and reported as
    /// [`VidmixError::CancellationTimeout`].
    pub fn shutdown(mut self, state: &SharedState, timeout: Duration) -> Result<Box<dyn MediaSource>> {
        state.quit.store(true, Ordering::Release);
        state.wake_all();

        if !self.wait(timeout) {
            warn!(timeout_ms = timeout.as_millis() as u64, "Decoding thread slow to stop, forcing");
            state.force_quit.store(true, Ordering::Release);
            state.wake_all();
            if !self.wait(timeout) {
                self.thread.take();
                error!("Decoding thread abandoned, decoding interrupted unexpectedly");
                return Err(VidmixError::CancellationTimeout {
                    timeout_ms: 2 * timeout.as_millis() as u64,
                });
            }
        }

        let thread = self
            .thread
            .take()
            .ok_or_else(|| VidmixError::Internal("decoding thread already joined".into()))?;
        let source = thread
            .join()
            .map_err(|_| VidmixError::Internal("decoding thread panicked".into()))?;
        info!("Decoding thread joined");
        Ok(source)
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            debug!("Decoding thread detached");
        }
    }
}
