// SPDX-License-Identifier: CEPL-1.0
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// Frames per second over one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        Self {
            frames: 0,
            window_start: start,
        }
    }

    pub fn tick(&mut self) -> Option<f64> {
        self.tick_at(Instant::now())
    }

    /// Counts one frame. Once a full window has elapsed, returns the rate and
    /// starts a new window.
    pub fn tick_at(&mut self, now: Instant) -> Option<f64> {
        self.frames = self.frames.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < WINDOW {
            return None;
        }
        let fps = f64::from(self.frames) / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Drops the partial window, e.g. after a pause.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.window_start = Instant::now();
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}
