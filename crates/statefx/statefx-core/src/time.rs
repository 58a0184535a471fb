//! Frame timing supplied by the host scheduler.

use serde::{Deserialize, Serialize};

/// Timing facts for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameTime {
    /// Tick index, starting at 1 for the first processed tick.
    pub frame: u64,
    /// Monotonic seconds.
    pub now: f32,
    /// Seconds since the previous tick.
    pub dt: f32,
}

/// Accumulates deltas into monotonic time for hosts that only report dt.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock {
    frame: u64,
    now: f32,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `dt` seconds. Negative deltas are clamped to zero so time never runs backwards.
    pub fn tick(&mut self, dt: f32) -> FrameTime {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.frame = self.frame.wrapping_add(1);
        self.now += dt;
        FrameTime {
            frame: self.frame,
            now: self.now,
            dt,
        }
    }

    /// Adopt externally supplied time.
    pub fn sync(&mut self, time: FrameTime) {
        self.frame = time.frame;
        self.now = time.now;
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn now(&self) -> f32 {
        self.now
    }
}
