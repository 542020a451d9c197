//! Decoded pictures travelling from the decoding thread to the renderer.

use bitflags::bitflags;
use std::sync::Arc;
use vidmix_core::{FrameBuffer, SharedFrameBuffer};

bitflags! {
    /// What the scheduler does with a picture when it reaches the queue head.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PictureActions: u8 {
        /// Deliver to the renderer.
        const SHOW = 1;
        /// Re-anchor the clock on this picture's timestamp.
        const RESET_PTS = 1 << 1;
        /// Halt playback once this picture is processed.
        const STOP = 1 << 2;
        /// Marks a boundary of the playback range (mark-in landing, end, mark-out).
        const MARK = 1 << 3;
        /// Transient: the renderer must not keep the picture past delivery.
        const DELETE = 1 << 4;
    }
}

/// One decoded, color-converted frame with its timestamp and actions.
///
/// Cloning shares the pixel buffer.
#[derive(Debug, Clone)]
pub struct Picture {
    buffer: SharedFrameBuffer,
    pts: f64,
    actions: PictureActions,
}

impl Picture {
    pub fn new(buffer: SharedFrameBuffer, pts: f64, actions: PictureActions) -> Self {
        Self {
            buffer,
            pts,
            actions,
        }
    }

    pub fn from_frame(buffer: FrameBuffer, pts: f64, actions: PictureActions) -> Self {
        Self::new(Arc::new(buffer), pts, actions)
    }

    pub fn buffer(&self) -> &SharedFrameBuffer {
        &self.buffer
    }

    /// Presentation timestamp in seconds.
    pub fn pts(&self) -> f64 {
        self.pts
    }

    pub fn actions(&self) -> PictureActions {
        self.actions
    }

    pub fn has(&self, action: PictureActions) -> bool {
        self.actions.contains(action)
    }

    pub fn add(&mut self, action: PictureActions) {
        self.actions.insert(action);
    }

    pub fn remove(&mut self, action: PictureActions) {
        self.actions.remove(action);
    }

    /// Whether the renderer may keep this picture after delivery.
    pub fn is_persistent(&self) -> bool {
        !self.has(PictureActions::DELETE)
    }

    pub fn width(&self) -> u32 {
        self.buffer.width
    }

    pub fn height(&self) -> u32 {
        self.buffer.height
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer.memory_size()
    }
}
