use serde::{Deserialize, Serialize};

/// Largest `f32` strictly below 1.0
const MAX_MIX: f32 = 1.0 - f32::EPSILON / 2.0;

/// A resolved position in a frame sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FramePosition {
    /// Real-valued frame in `[0, frame_count)`
    pub frame: f64,
    /// `floor(frame)`
    pub floored: usize,
    /// Frame blended towards, wrapping to 0 after the last frame
    pub next: usize,
    /// Blend weight between `floored` and `next`, in `[0, 1)`
    pub mix: f32,
}

impl FramePosition {
    pub(crate) fn from_frame(frame: f64, frame_count: usize) -> Self {
        let floored = (frame.floor() as usize).min(frame_count.saturating_sub(1));
        let mix = ((frame - floored as f64) as f32).clamp(0.0, MAX_MIX);
        Self {
            frame,
            floored,
            next: next_frame(floored, frame_count),
            mix,
        }
    }
}

/// Index of the frame following `frame`, wrapping around
pub fn next_frame(frame: usize, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    (frame + 1) % frame_count
}
