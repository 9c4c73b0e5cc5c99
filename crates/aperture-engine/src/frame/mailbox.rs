use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{CameraFrame, FrameId};

/// Anything that can hand the render thread the most recent frame.
pub trait FrameSource {
    /// Removes and returns the pending frame, if any.
    fn take_latest(&self) -> Option<CameraFrame>;
}

/// Counters for the frame handoff.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct MailboxStats {
    /// Frames deposited by the producer.
    pub deposited: u64,
    /// Frames overwritten (or discarded) before the render thread took them.
    pub superseded: u64,
}

/// Single-slot, latest-frame-wins handoff between the camera thread and the
/// render thread.
///
/// A deposit replaces whatever is pending; nothing ever queues. The lock only
/// guards the swap itself and is never held across GPU work.
#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Option<CameraFrame>>,
    deposited: AtomicU64,
    superseded: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `frame`, returning the id of the pending frame it replaced.
    pub fn deposit(&self, frame: CameraFrame) -> Option<FrameId> {
        let previous = self.slot.lock().replace(frame);
        self.deposited.fetch_add(1, Ordering::Relaxed);

        let previous = previous.map(|f| f.id());
        if let Some(id) = previous {
            self.superseded.fetch_add(1, Ordering::Relaxed);
            log::trace!("frame {id} superseded before presentation");
        }
        previous
    }

    pub fn take(&self) -> Option<CameraFrame> {
        self.slot.lock().take()
    }

    /// Discards the pending frame without presenting it.
    pub fn clear(&self) -> Option<FrameId> {
        let dropped = self.take().map(|f| f.id());
        if dropped.is_some() {
            self.superseded.fetch_add(1, Ordering::Relaxed);
        }
        dropped
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            deposited: self.deposited.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
        }
    }
}

impl FrameSource for FrameMailbox {
    fn take_latest(&self) -> Option<CameraFrame> {
        self.take()
    }
}
