//! Present timing.
//!
//! Provides testable present statistics without coupling to the render loop.
//! Intended usage:
//! - one `PresentClock` per presenter
//! - call `tick()` once per completed swap to obtain a `PresentSample`

mod present_clock;

pub use present_clock::{PresentClock, PresentSample, PresentStats};
