//! Frame presentation.
//!
//! The presenter drives one draw-then-swap per frame; what gets drawn is up to
//! a [`Compositor`]. `BlitCompositor` is the stock wgpu implementation.
//!
//! Convention:
//! - surface geometry is in physical pixels (top-left origin, +Y down).
//! - the vertex shader maps the unit quad to NDC using the preview transform.

mod blit;
mod compositor;
mod presenter;

pub use blit::BlitCompositor;
pub use compositor::{CompositePass, Compositor, NullCompositor};
pub use presenter::{FramePresenter, PresentReport};
