use crate::coords::Extent;
use crate::device::{ContextIdentity, SurfaceId};
use crate::frame::FrameId;

use super::HostError;

/// Notifications sent from the render thread to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Initialized { context: ContextIdentity },
    SurfaceBound { surface: SurfaceId, extent: Extent },
    FramePresented { frame: Option<FrameId>, index: u64 },
    /// A frame failed to bind or present; the session keeps running.
    FrameDropped { frame: Option<FrameId>, error: HostError },
    /// The drawable went away; presentation resumes on the next surface.
    Paused,
    Error(HostError),
    Destroyed,
}

impl SessionEvent {
    /// Events reporting a failure the host has to see.
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionEvent::Error(_) | SessionEvent::FrameDropped { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::ErrorKind;

    #[test]
    fn failures_are_errors_and_drops() {
        let error = HostError::new(ErrorKind::Present, "swap failed");
        assert!(SessionEvent::Error(error.clone()).is_failure());
        assert!(SessionEvent::FrameDropped { frame: None, error }.is_failure());
        assert!(!SessionEvent::Paused.is_failure());
        assert!(!SessionEvent::FramePresented { frame: None, index: 0 }.is_failure());
    }
}
