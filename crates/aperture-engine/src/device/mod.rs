//! GPU context, texture and surface management.
//!
//! This module is responsible for:
//! - the [`Driver`] seam and its wgpu and headless implementations
//! - creating the rendering context and binding it to the render thread
//! - the textures camera frames are uploaded into
//! - binding platform windows to presentable surfaces

mod context;
mod driver;
mod error;
mod gpu;
mod headless;
mod init;
mod surface;
mod texture;
mod window;

pub use context::{choose_config, ContextIdentity, CurrentContext, GraphicsContext};
pub use driver::{
    ConfigDesc, ConfigId, ContextId, DisplayId, Driver, Readback, SurfaceId, TextureId,
    TextureTarget,
};
pub use error::{DriverError, ErrorKind, GraphicsError};
pub use gpu::{WgpuCanvas, WgpuDriver, WgpuShare};
pub use headless::{
    default_headless_configs, HeadlessCanvas, HeadlessDriver, HeadlessProbe, HeadlessShare,
};
pub use init::{ContextConfig, WgpuDriverConfig};
pub use surface::{SurfaceBinding, SurfaceTarget};
pub use texture::{Texture, TextureRegistry, TextureState};
pub use window::NativeWindow;
