use crate::coords::Extent;
use crate::frame::{CameraFrame, PixelFormat};

use super::{DriverError, NativeWindow};

/// Display connection handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct DisplayId(pub u64);

/// Framebuffer configuration handle, scoped to a display.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ConfigId(pub u32);

/// Rendering context handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ContextId(pub u64);

/// Drawable surface handle.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SurfaceId(pub u64);

/// Integer texture name, unique within its context's lifetime.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Sampling target of a texture.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum TextureTarget {
    /// Backing memory supplied by the camera pipeline.
    #[default]
    External,
    /// Ordinary 2D texture.
    Texture2d,
}

/// A framebuffer configuration advertised by a display.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ConfigDesc {
    pub id: ConfigId,
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    /// Color values are encoded sRGB.
    pub srgb: bool,
    /// Camera-sourced (external) images can be sampled.
    pub external_sampling: bool,
}

impl ConfigDesc {
    pub fn min_color_bits(&self) -> u8 {
        self.red_bits.min(self.green_bits).min(self.blue_bits)
    }

    pub fn total_bits(&self) -> u32 {
        self.red_bits as u32
            + self.green_bits as u32
            + self.blue_bits as u32
            + self.alpha_bits as u32
    }
}

/// Tightly packed copy of the image held by a texture.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Readback {
    pub extent: Extent,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// Low-level graphics API used by the preview core.
///
/// The shape mirrors EGL/GLES: integer handles, an explicit current context,
/// and a draw-then-swap present. Every method except `share_handle` is only
/// called on the render thread that holds the context current.
pub trait Driver: Send + 'static {
    /// Handle that lets another context share this context's object namespace.
    type Share: Clone + Send;

    /// Drawing surface handed to the compositor during a present.
    type Canvas<'a>;

    fn open_display(&mut self) -> Result<DisplayId, DriverError>;

    /// Configurations the display supports, in driver preference order.
    fn configs(&mut self, display: DisplayId) -> Result<Vec<ConfigDesc>, DriverError>;

    fn create_context(
        &mut self,
        display: DisplayId,
        config: ConfigId,
        share: Option<&Self::Share>,
    ) -> Result<ContextId, DriverError>;

    fn share_handle(&self, context: ContextId) -> Option<Self::Share>;

    /// Binds `context` (and optionally a drawable) to the calling thread.
    fn make_current(
        &mut self,
        context: ContextId,
        surface: Option<SurfaceId>,
    ) -> Result<(), DriverError>;

    fn release_current(&mut self, context: ContextId);

    fn destroy_context(&mut self, context: ContextId);

    fn close_display(&mut self, display: DisplayId);

    fn create_texture(
        &mut self,
        context: ContextId,
        target: TextureTarget,
    ) -> Result<TextureId, DriverError>;

    fn delete_texture(&mut self, context: ContextId, texture: TextureId);

    /// Attaches the frame's backing buffer to `texture` for sampling.
    fn upload_frame(
        &mut self,
        context: ContextId,
        texture: TextureId,
        frame: &CameraFrame,
    ) -> Result<(), DriverError>;

    /// Copies the image last uploaded into `texture` back to the CPU.
    /// Blocks until the copy has completed.
    fn read_back(
        &mut self,
        context: ContextId,
        texture: TextureId,
    ) -> Result<Readback, DriverError>;

    /// Creates a drawable for `window`.
    ///
    /// A live drawable of the same context on the same window is handed over
    /// to the returned id; releasing the old id afterwards is a no-op.
    fn create_surface(
        &mut self,
        context: ContextId,
        window: &NativeWindow,
        extent: Extent,
    ) -> Result<SurfaceId, DriverError>;

    fn destroy_surface(&mut self, context: ContextId, surface: SurfaceId);

    /// Acquires the next image of `surface`, runs `draw` against it with
    /// `texture` available for sampling, then swaps.
    ///
    /// A `draw` failure skips the swap and is reported as [`DriverError::Draw`].
    fn render<F>(
        &mut self,
        context: ContextId,
        surface: SurfaceId,
        texture: TextureId,
        draw: F,
    ) -> Result<(), DriverError>
    where
        F: for<'c> FnOnce(&mut Self::Canvas<'c>) -> anyhow::Result<()>;
}
