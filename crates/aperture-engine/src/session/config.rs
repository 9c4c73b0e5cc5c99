use crate::coords::ResizeMode;
use crate::device::{ContextConfig, TextureTarget};

/// Session parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Requirements for the rendering context.
    pub context: ContextConfig,

    /// Kind of the preview texture created at initialization.
    pub texture_target: TextureTarget,

    /// Name of the render thread, as shown by debuggers and profilers.
    pub thread_name: String,

    pub resize_mode: ResizeMode,

    /// Flip the preview horizontally (front cameras).
    pub mirrored: bool,

    /// Session events buffered for the host. Events beyond this are dropped
    /// when the host does not drain them.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context: ContextConfig::default(),
            texture_target: TextureTarget::External,
            thread_name: "aperture-render".to_owned(),
            resize_mode: ResizeMode::Cover,
            mirrored: false,
            event_capacity: 256,
        }
    }
}
