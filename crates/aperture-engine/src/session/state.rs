use crate::frame::FrameId;

/// Lifecycle of a [`RenderSession`](super::RenderSession).
///
/// `Uninitialized → ContextReady → SurfaceBound → Presenting ⇄ SurfaceLost`,
/// and from anywhere to the terminal `Destroyed`.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum SessionState {
    #[default]
    Uninitialized,
    /// Context created; no drawable yet.
    ContextReady,
    /// Drawable attached, nothing presented on it yet.
    SurfaceBound,
    Presenting,
    /// Drawable gone; textures and context survive until a new one arrives.
    SurfaceLost,
    Destroyed,
}

impl SessionState {
    /// Frames are presented in this state.
    pub fn is_presenting(self) -> bool {
        matches!(self, SessionState::SurfaceBound | SessionState::Presenting)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::ContextReady => "context-ready",
            SessionState::SurfaceBound => "surface-bound",
            SessionState::Presenting => "presenting",
            SessionState::SurfaceLost => "surface-lost",
            SessionState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Counters describing what happened to camera frames.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub presented: u64,
    /// Frames that failed to bind or present.
    pub dropped: u64,
    /// Frames handed to the frame sink.
    pub deposited: u64,
    /// Frames overwritten by a newer one before the render thread took them.
    pub superseded: u64,
    /// Smoothed present rate.
    pub fps: f32,
    pub last_presented: Option<FrameId>,
}
