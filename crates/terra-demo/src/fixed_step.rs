//! Fixed-rate simulation stepping decoupled from the frame rate.

use std::time::Instant;

use tracing::warn;

/// Longest frame accounted for; slower frames drop time instead of
/// queueing an ever-growing number of steps.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Accumulator that turns variable frame times into whole simulation steps.
pub struct FixedStep {
    step: f64,
    previous: Instant,
    accumulator: f64,
    steps: u64,
    frames: u64,
}

impl FixedStep {
    /// `step` is the simulation interval in seconds.
    pub fn new(step: f64) -> Self {
        Self {
            step: step.max(f64::EPSILON),
            previous: Instant::now(),
            accumulator: 0.0,
            steps: 0,
            frames: 0,
        }
    }

    /// Measure wall-clock time since the last frame and run the steps it covers.
    pub fn tick(&mut self, update: impl FnMut(f64)) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.previous).as_secs_f64();
        self.previous = now;
        if elapsed > MAX_FRAME_TIME {
            warn!(
                frame_ms = elapsed * 1000.0,
                clamp_ms = MAX_FRAME_TIME * 1000.0,
                "frame too slow; dropping simulation time"
            );
        }
        self.advance(elapsed, update)
    }

    /// Account `frame_time` seconds and call `update(step)` once per whole
    /// step. Returns how many steps ran.
    pub fn advance(&mut self, frame_time: f64, mut update: impl FnMut(f64)) -> u32 {
        self.accumulator += frame_time.clamp(0.0, MAX_FRAME_TIME);
        let mut ran = 0;
        while self.accumulator >= self.step {
            update(self.step);
            self.accumulator -= self.step;
            ran += 1;
        }
        self.steps += u64::from(ran);
        self.frames += 1;
        ran
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
