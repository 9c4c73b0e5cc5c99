//! Camera frames and the producer → render-thread handoff.
//!
//! The camera side never blocks: it deposits into a single-slot
//! [`FrameMailbox`] that keeps only the newest frame. The render thread drains
//! the slot whenever it is ready to present.

mod camera;
mod mailbox;

pub use camera::{CameraFrame, FrameError, FrameId, PixelFormat};
pub use mailbox::{FrameMailbox, FrameSource, MailboxStats};
