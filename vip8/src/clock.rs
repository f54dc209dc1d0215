//! CPU clock.
use std::{
    thread,
    time::{Duration, Instant},
};

/// Timer to synchronize the calling thread with the software clock of the
/// virtual CPU.
///
/// Designed for the cooperative pattern of the interpreter loop: time
/// elapses while control is with the host, and the elapsed time is taken
/// into account when the next cycle is due.
pub(crate) struct Clock {
    interval: Duration,
    last: Instant,
}

impl Clock {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Set the clock state back to zero.
    pub(crate) fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Block the current thread until the next clock cycle.
    pub(crate) fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        while self.last.elapsed() < self.interval {
            // Sleeping does not have enough resolution, and spinning
            // causes high CPU usage. Yielding in a loop is the middle
            // ground.
            thread::yield_now();
        }

        // Reset to zero rather than catching up. A machine paused for
        // debugging should continue at its usual speed when resumed.
        self.reset();
    }
}
