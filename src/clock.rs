//! Frame timing and the fixed-rate step clock.
//!
//! [`FrameClock`] measures real time between frames. [`StepClock`] turns
//! those frame deltas into a whole number of steps at a target rate,
//! carrying the leftover fraction into the next frame so the long-run rate
//! does not drift.
//!
//! # Example
//!
//! ```ignore
//! let mut frames = FrameClock::new();
//! let mut steps = StepClock::new();
//!
//! // In the frame loop:
//! let dt = frames.update();
//! for _ in 0..steps.advance(dt, 2000, None) {
//!     session.step();
//! }
//! ```

use std::time::{Duration, Instant};

/// Converts elapsed time into steps at a fixed rate.
#[derive(Debug, Clone, Default)]
pub struct StepClock {
    /// Elapsed seconds not yet turned into steps.
    carry: f64,
}

impl StepClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `elapsed` and return how many whole steps at `rate` per second
    /// are now due.
    ///
    /// With `cap` set, at most `cap` steps are returned and any further
    /// backlog is dropped rather than carried.
    pub fn advance(&mut self, elapsed: Duration, rate: u32, cap: Option<u64>) -> u64 {
        if rate == 0 {
            return 0;
        }
        let rate = rate as f64;
        self.carry += elapsed.as_secs_f64();

        let due = (self.carry * rate).floor();
        self.carry -= due / rate;
        // Rounding can leave a hair below zero.
        self.carry = self.carry.max(0.0);
        let due = due as u64;

        match cap {
            Some(max) if due > max => {
                log::warn!("step clock fell {} steps behind, running {} and dropping the rest", due, max);
                self.carry = 0.0;
                max
            }
            _ => due,
        }
    }

    /// Seconds accumulated toward the next step.
    pub fn carry(&self) -> f64 {
        self.carry
    }

    /// Forget any accumulated time.
    pub fn reset(&mut self) {
        self.carry = 0.0;
    }
}

/// Time tracking for the render loop: frame delta and FPS.
#[derive(Debug)]
pub struct FrameClock {
    /// When the last frame occurred.
    last_frame: Instant,
    /// Total frames since start.
    frame_count: u64,
    /// Calculated FPS (updated periodically).
    fps: f32,
    /// Frame count at last FPS update.
    fps_frame_count: u64,
    /// Time of last FPS calculation.
    fps_update_time: Instant,
    /// How often to update FPS calculation.
    fps_update_interval: Duration,
}

impl FrameClock {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            last_frame: now,
            frame_count: 0,
            fps: 0.0,
            fps_frame_count: 0,
            fps_update_time: now,
            fps_update_interval: Duration::from_millis(500),
        }
    }

    /// Update timing values. Call once per frame; returns the frame delta.
    pub fn update(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.duration_since(self.last_frame);
        self.last_frame = now;
        self.frame_count += 1;

        let fps_elapsed = now.duration_since(self.fps_update_time);
        if fps_elapsed >= self.fps_update_interval {
            let frames_since = self.frame_count - self.fps_frame_count;
            self.fps = frames_since as f32 / fps_elapsed.as_secs_f32();
            self.fps_frame_count = self.frame_count;
            self.fps_update_time = now;
        }

        delta
    }

    #[inline]
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Measure the next delta from now, e.g. after the window was hidden.
    pub fn restart(&mut self) {
        self.last_frame = Instant::now();
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
