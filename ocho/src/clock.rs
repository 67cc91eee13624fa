//! Frame clock.
use std::{
    thread,
    time::{Duration, Instant},
};

/// Timer to synchronize a frontend thread with the tick rate of the
/// virtual machine.
///
/// It is designed to work with the yielding cooperative pattern of the
/// interpreter loop. The VM itself owns no wall-clock pacing; the
/// frontend waits on this clock, then invokes one cycle.
pub struct Clock {
    start: Instant,
    interval: Duration,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    pub fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval,
        }
    }

    /// Set the clock state back to zero.
    pub fn reset(&mut self) {
        self.start = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub fn wait(&mut self) {
        loop {
            if self.start.elapsed() < self.interval {
                // Sleep does not have enough resolution at 60Hz, and
                // spinning burns a core. Yielding in a loop is the
                // usable middle ground.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                // If a large amount of time elapsed since the last
                // cycle, the machine continues at its usual pace.
                self.reset();
                return;
            }
        }
    }
}
