//! Continuous time to frame mapping

mod clock;
mod position;

pub use clock::FrameClock;
pub use position::{next_frame, FramePosition};
