// Speed estimation from a ring buffer of angle samples
//
// The speed is the difference between the newest and an older sample, so no
// floating point error accumulates however long the motor runs.

use crate::angle::Angle;
use crate::error::{Error, Result};

pub struct Differentiator<const SIZE: usize> {
    history: [Angle; SIZE],
    index: usize,
    loop_time_ms: u32,
}

impl<const SIZE: usize> Differentiator<SIZE> {
    /// Create a differentiator sampled every `loop_time_ms`
    pub fn new(loop_time_ms: u32) -> Self {
        Self {
            history: [Angle::default(); SIZE],
            index: 0,
            loop_time_ms: loop_time_ms.max(1),
        }
    }

    /// Fill the whole history with one angle, so the speed reads zero
    pub fn reset(&mut self, angle: &Angle) {
        self.history = [*angle; SIZE];
        self.index = 0;
    }

    /// Store a new sample and return the speed (mdeg/s) over the full buffer
    pub fn update_and_get_speed(&mut self, angle: &Angle) -> i32 {
        // The write index always points at the oldest sample.
        let delta = angle.diff_mdeg(&self.history[self.index]) as i64;
        self.history[self.index] = *angle;
        self.index = (self.index + 1) % SIZE;

        (delta * 1000 / (SIZE as i64 * self.loop_time_ms as i64)) as i32
    }

    /// Speed (mdeg/s) over the most recent `window_ms`
    pub fn get_speed(&self, window_ms: u32) -> Result<i32> {
        let span = window_ms / self.loop_time_ms;
        if window_ms == 0 || window_ms % self.loop_time_ms != 0 || span as usize >= SIZE {
            return Err(Error::InvalidArgument("differentiator window out of range"));
        }

        let newest = (self.index + SIZE - 1) % SIZE;
        let older = (newest + SIZE - span as usize) % SIZE;
        let delta = self.history[newest].diff_mdeg(&self.history[older]) as i64;

        Ok((delta * 1000 / window_ms as i64) as i32)
    }
}
