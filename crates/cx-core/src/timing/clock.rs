//! Frame clock driving movie playback

use super::FramePosition;
use crate::error::{DatasetError, Result};

/// Maps playback time onto a looping frame sequence.
///
/// `frame = ((time + delay) * rate) mod frame_count`, with the modulo taken
/// as a Euclidean remainder so negative times wrap backwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameClock {
    frame_count: usize,
    rate: f64,
    delay: f64,
}

impl FrameClock {
    /// Create a clock for `frame_count` frames played at `rate` frames per time unit
    pub fn new(frame_count: usize, rate: f64, delay: f64) -> Result<Self> {
        if frame_count == 0 {
            return Err(DatasetError::config("a frame clock needs at least one frame"));
        }
        if !rate.is_finite() || !delay.is_finite() {
            return Err(DatasetError::config(format!(
                "rate ({}) and delay ({}) must be finite",
                rate, delay
            )));
        }
        Ok(Self {
            frame_count,
            rate,
            delay,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn delay(&self) -> f64 {
        self.delay
    }

    /// Playback length of one loop in time units
    pub fn duration(&self) -> f64 {
        self.frame_count as f64 / self.rate
    }

    /// Resolve the frame shown at `time`
    pub fn locate(&self, time: f64) -> FramePosition {
        let count = self.frame_count as f64;
        let mut frame = ((time + self.delay) * self.rate).rem_euclid(count);

        // rem_euclid rounds up to `count` for tiny negative inputs
        if !frame.is_finite() || frame >= count {
            frame = 0.0;
        }

        FramePosition::from_frame(frame, self.frame_count)
    }
}
