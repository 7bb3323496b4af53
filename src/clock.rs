//! Time source shared by the broker client, the presentation controller and
//! the driver loop.
//!
//! Everything that waits or compares deadlines goes through [`Clock`] so the
//! retry loops and the idle timer can be driven by a manual clock in tests.

use std::time::{Duration, Instant};

/// Monotonic time plus the ability to wait.
pub trait Clock {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Blocks the calling thread for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`] and `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
