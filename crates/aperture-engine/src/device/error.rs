use thiserror::Error;

/// Failure reported by a [`Driver`](super::Driver) call.
///
/// Codes follow the EGL error numbering so diagnostics read the same regardless
/// of which backend produced them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("display or context not initialized: {0}")]
    NotInitialized(String),

    #[error("resource busy or owned elsewhere: {0}")]
    BadAccess(String),

    #[error("device resources exhausted")]
    OutOfResources,

    #[error("no compatible configuration: {0}")]
    BadConfig(String),

    #[error("unknown or destroyed context")]
    BadContext,

    #[error("surface does not match context: {0}")]
    BadMatch(String),

    #[error("unknown or destroyed surface")]
    BadSurface,

    #[error("native window rejected: {0}")]
    BadNativeWindow(String),

    #[error("surface lost")]
    SurfaceLost,

    #[error("surface outdated; skip and retry")]
    Outdated,

    #[error("timed out acquiring the next image")]
    Timeout,

    #[error("malformed frame: {0}")]
    BadFrame(String),

    #[error("draw pass failed: {0}")]
    Draw(String),

    #[error("driver failure: {0}")]
    Other(String),
}

impl DriverError {
    /// Diagnostic code carried across the host boundary.
    pub fn code(&self) -> u32 {
        match self {
            DriverError::NotInitialized(_) => 0x3001,
            DriverError::BadAccess(_) => 0x3002,
            DriverError::OutOfResources => 0x3003,
            DriverError::BadConfig(_) => 0x3005,
            DriverError::BadContext => 0x3006,
            DriverError::BadMatch(_) => 0x3009,
            DriverError::BadNativeWindow(_) => 0x300B,
            DriverError::BadSurface => 0x300D,
            DriverError::SurfaceLost => 0x300E,
            DriverError::Outdated | DriverError::Timeout => 0x3100,
            DriverError::BadFrame(_) => 0x3101,
            DriverError::Draw(_) => 0x3102,
            DriverError::Other(_) => 0x3FFF,
        }
    }
}

/// Stable error classification used at the host boundary.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    ContextCreation,
    ContextBinding,
    TextureAllocation,
    StaleResource,
    FrameBind,
    Present,
    Precondition,
    Snapshot,
}

impl ErrorKind {
    /// Integer code for foreign callers. Values are part of the host contract.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::ContextCreation => 1,
            ErrorKind::ContextBinding => 2,
            ErrorKind::TextureAllocation => 3,
            ErrorKind::StaleResource => 4,
            ErrorKind::FrameBind => 5,
            ErrorKind::Present => 6,
            ErrorKind::Precondition => 7,
            ErrorKind::Snapshot => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::ContextCreation => "context_creation",
            ErrorKind::ContextBinding => "context_binding",
            ErrorKind::TextureAllocation => "texture_allocation",
            ErrorKind::StaleResource => "stale_resource",
            ErrorKind::FrameBind => "frame_bind",
            ErrorKind::Present => "present",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Snapshot => "snapshot_failed",
        }
    }
}

/// Errors produced by the preview core.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphicsError {
    /// No compatible configuration, or the driver refused to create a context.
    #[error("context creation failed (code {code:#06x}): {message}")]
    ContextCreation { code: u32, message: String },

    /// The context could not be made current on this thread.
    #[error("context binding failed: {0}")]
    ContextBinding(String),

    /// The driver returned no texture handle.
    #[error("texture allocation failed: {0}")]
    TextureAllocation(String),

    /// A resource was used with a context that did not create it, or after release.
    #[error("stale resource: {0}")]
    StaleResource(String),

    /// A camera frame could not be attached to its texture. Never fatal.
    #[error("frame bind failed: {0}")]
    FrameBind(String),

    /// Draw or swap failed. `surface_lost` marks the recoverable loss case.
    #[error("present failed{}: {message}", lost_suffix(.surface_lost))]
    Present { surface_lost: bool, message: String },

    /// Integration misuse: an operation was called out of order.
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// No presented image to copy, or the copy itself failed.
    #[error("snapshot failed: {0}")]
    Snapshot(String),
}

impl GraphicsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphicsError::ContextCreation { .. } => ErrorKind::ContextCreation,
            GraphicsError::ContextBinding(_) => ErrorKind::ContextBinding,
            GraphicsError::TextureAllocation(_) => ErrorKind::TextureAllocation,
            GraphicsError::StaleResource(_) => ErrorKind::StaleResource,
            GraphicsError::FrameBind(_) => ErrorKind::FrameBind,
            GraphicsError::Present { .. } => ErrorKind::Present,
            GraphicsError::Precondition(_) => ErrorKind::Precondition,
            GraphicsError::Snapshot(_) => ErrorKind::Snapshot,
        }
    }

    /// Per-frame failures the session absorbs instead of surfacing.
    pub fn is_per_frame(&self) -> bool {
        matches!(self, GraphicsError::FrameBind(_) | GraphicsError::Present { .. })
    }

    pub fn is_surface_lost(&self) -> bool {
        matches!(self, GraphicsError::Present { surface_lost: true, .. })
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        GraphicsError::Precondition(message.into())
    }

    pub(crate) fn stale(message: impl Into<String>) -> Self {
        GraphicsError::StaleResource(message.into())
    }

    pub(crate) fn creation(err: DriverError) -> Self {
        GraphicsError::ContextCreation {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

fn lost_suffix(surface_lost: &bool) -> &'static str {
    if *surface_lost { " (surface lost)" } else { "" }
}
