//! Notifications and frame delivery to the embedding application.

use crate::picture::Picture;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

/// State changes reported by a [`crate::VideoFile`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Running(bool),
    Paused(bool),
    MarkingChanged,
    /// `false` when a seek is issued, `true` once its frame is presented
    SeekEnabled(bool),
    PlaySpeedChanged(f64),
    /// Decoding stopped on an unrecoverable error
    Failed(String),
}

/// Receives decoded pictures for display.
///
/// Called on the scheduler thread for playback frames and on the calling
/// thread for the poster frame. A picture carrying
/// [`PictureActions::DELETE`](crate::PictureActions::DELETE) is only valid for
/// the current delivery; one without it may be kept.
pub trait FrameSink: Send + Sync {
    fn frame_ready(&self, picture: Picture);
}

impl<F> FrameSink for F
where
    F: Fn(Picture) + Send + Sync,
{
    fn frame_ready(&self, picture: Picture) {
        self(picture)
    }
}

/// Forwards pictures to a channel.
pub struct ChannelSink {
    tx: Sender<Picture>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<Picture>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn frame_ready(&self, picture: Picture) {
        // a dropped receiver only means nobody is watching
        let _ = self.tx.send(picture);
    }
}

/// Fan-out point for [`PlaybackEvent`]s. Each subscriber gets its own
/// channel and sees every event emitted after it subscribed.
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<PlaybackEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, event: PlaybackEvent) {
        tracing::trace!(?event, "Playback event");
        // dropped receivers unsubscribe
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Receiver<PlaybackEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }
}
