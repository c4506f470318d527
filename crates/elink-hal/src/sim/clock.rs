//! Simulated clock.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::clock::Clock;

/// A microsecond-resolution clock for tests.
///
/// Every observation advances time by `auto_step` ticks, so bounded waits in
/// the driver always make progress without a background thread. Tests can
/// also advance time explicitly with [`advance`](SimClock::advance).
pub struct SimClock {
    now: AtomicU64,
    auto_step: u64,
}

impl SimClock {
    /// One tick equals one microsecond.
    pub const TICK_HZ: u64 = 1_000_000;

    /// Creates a clock at tick zero with the default auto-step of 1.
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_step(1)
    }

    /// Creates a clock that advances `auto_step` ticks per observation.
    #[must_use]
    pub fn with_auto_step(auto_step: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            auto_step,
        }
    }

    /// Advances time by `ticks`.
    pub fn advance(&self, ticks: u64) {
        self.now.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SimClock {
    fn ticks(&self) -> u64 {
        self.now.fetch_add(self.auto_step, Ordering::Relaxed)
    }

    fn tick_hz(&self) -> u64 {
        Self::TICK_HZ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_advances() {
        let clock = SimClock::new();
        let a = clock.ticks();
        let b = clock.ticks();
        assert!(b > a);
    }

    #[test]
    fn explicit_advance_is_visible() {
        let clock = SimClock::new();
        let a = clock.ticks();
        clock.advance(500);
        assert!(clock.ticks() >= a + 500);
    }
}
