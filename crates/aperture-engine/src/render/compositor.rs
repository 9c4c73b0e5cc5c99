use crate::coords::{Extent, PreviewTransform};
use crate::device::{Driver, Texture};
use crate::frame::FrameId;

/// Everything a compositor needs to draw one preview image.
#[derive(Debug, Copy, Clone)]
pub struct CompositePass {
    /// Texture holding the camera frame.
    pub texture: Texture,
    /// Frame currently attached to `texture`; `None` before the first upload.
    pub frame: Option<FrameId>,
    pub frame_extent: Option<Extent>,
    pub target_extent: Extent,
    /// Placement of the frame on the target.
    pub transform: PreviewTransform,
}

/// The drawing layer. Records the commands that put the camera texture on
/// the acquired image; the presenter swaps afterwards.
pub trait Compositor<D: Driver>: Send + 'static {
    fn composite(&mut self, canvas: &mut D::Canvas<'_>, pass: &CompositePass) -> anyhow::Result<()>;
}

/// Draws nothing. The swap still happens.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullCompositor;

impl<D: Driver> Compositor<D> for NullCompositor {
    fn composite(
        &mut self,
        _canvas: &mut D::Canvas<'_>,
        _pass: &CompositePass,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
