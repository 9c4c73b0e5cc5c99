//! Geometry types shared by the presenter and compositors.
//!
//! Canonical CPU space:
//! - Physical pixels
//! - Origin top-left
//! - +X right, +Y down
//!
//! Camera frame positions are normalized (`0..1`) in the same orientation.

mod extent;
mod rect;
mod transform;
mod vec2;

pub use extent::Extent;
pub use rect::Rect;
pub use transform::{PreviewTransform, ResizeMode};
pub use vec2::Vec2;
