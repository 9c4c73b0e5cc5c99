//! Aperture engine crate.
//!
//! Renders a live camera preview onto a host-provided window with wgpu. The
//! host drives a [`session::RenderSession`] through lifecycle calls and
//! surface notifications; camera frames arrive through a
//! [`session::FrameSink`] and are presented on a dedicated render thread.

pub mod coords;
pub mod device;
pub mod frame;
pub mod logging;
pub mod render;
pub mod session;
pub mod time;
