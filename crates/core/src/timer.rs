//! Frame and animation clock.

use std::time::{Duration, Instant};

/// Monotonic clock owned by whoever drives the frame loop.
///
/// The start instant is an explicit field rather than hidden state, so the
/// animation origin is created and dropped together with its owner and can
/// be reset (e.g. after a long stall) without touching globals.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Start the clock now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Time since the clock was started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds since the clock was started. Drives time-based animation.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Time since the previous `tick` (or since start for the first call).
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Restart the clock from the current instant.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_monotonic() {
        let timer = Timer::new();
        let a = timer.elapsed();
        let b = timer.elapsed();
        assert!(b >= a);
    }

    #[test]
    fn tick_measures_since_last_tick() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        let first = timer.tick();
        assert!(first >= Duration::from_millis(5));

        std::thread::sleep(Duration::from_millis(5));
        let second = timer.tick();
        assert!(second >= Duration::from_millis(5));
        // Only the interval since the previous tick, not since creation.
        assert!(timer.elapsed() >= second + Duration::from_millis(4));
    }

    #[test]
    fn reset_rewinds_elapsed() {
        let mut timer = Timer::new();
        std::thread::sleep(Duration::from_millis(5));
        timer.reset();
        assert!(timer.elapsed() < Duration::from_millis(5));
    }
}
