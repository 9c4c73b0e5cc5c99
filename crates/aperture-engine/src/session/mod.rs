//! Preview sessions.
//!
//! A [`RenderSession`] owns one rendering context on a dedicated render
//! thread. Hosts drive it through lifecycle calls and surface notifications;
//! the camera feeds it through a [`FrameSink`]. [`SessionCore`] is the
//! thread-free state machine behind it.

mod boundary;
mod command;
mod config;
mod core;
mod event;
mod handle;
mod state;

pub use boundary::{HostError, HostResult};
pub use command::{SurfaceEvent, SurfaceEventKind, SurfaceSequencer};
pub use config::SessionConfig;
pub use self::core::{SessionCore, SessionStatus};
pub use event::SessionEvent;
pub use handle::{FrameSink, RenderSession};
pub use state::{SessionState, SessionStats};
