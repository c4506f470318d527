//! Monotonic tick source and bounded-wait helpers.
//!
//! Every hardware wait in the driver is bounded (spec rule: no infinite loop
//! on any status bit). [`Deadline`] is the one idiom used everywhere: derive
//! a deadline from the clock, poll until the condition holds or the deadline
//! expires.

/// A monotonic tick source.
pub trait Clock {
    /// Current tick count. Monotonically non-decreasing.
    fn ticks(&self) -> u64;

    /// Ticks per second.
    fn tick_hz(&self) -> u64;

    /// Converts microseconds to ticks, rounding up so short waits are never
    /// truncated to zero.
    fn micros_to_ticks(&self, micros: u64) -> u64 {
        let hz = self.tick_hz();
        (micros.saturating_mul(hz)).div_ceil(1_000_000).max(1)
    }
}

/// An absolute point on a [`Clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: u64,
}

impl Deadline {
    /// A deadline `micros` microseconds from now.
    #[must_use]
    pub fn after_micros(clock: &dyn Clock, micros: u64) -> Self {
        Self {
            at: clock.ticks().saturating_add(clock.micros_to_ticks(micros)),
        }
    }

    /// A deadline `millis` milliseconds from now.
    #[must_use]
    pub fn after_millis(clock: &dyn Clock, millis: u64) -> Self {
        Self::after_micros(clock, millis.saturating_mul(1_000))
    }

    /// True once the clock has passed this deadline.
    #[must_use]
    pub fn expired(&self, clock: &dyn Clock) -> bool {
        clock.ticks() >= self.at
    }
}

/// Polls `condition` until it returns `Some` or `micros` elapse.
///
/// Returns `None` on timeout. This is the only busy-wait shape the driver
/// uses against hardware.
pub fn poll_until<T>(
    clock: &dyn Clock,
    micros: u64,
    mut condition: impl FnMut() -> Option<T>,
) -> Option<T> {
    let deadline = Deadline::after_micros(clock, micros);
    loop {
        if let Some(value) = condition() {
            return Some(value);
        }
        if deadline.expired(clock) {
            return None;
        }
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU64, Ordering};

    struct StepClock {
        now: AtomicU64,
    }

    impl Clock for StepClock {
        fn ticks(&self) -> u64 {
            // Each observation advances time by one tick.
            self.now.fetch_add(1, Ordering::Relaxed)
        }
        fn tick_hz(&self) -> u64 {
            1_000_000
        }
    }

    #[test]
    fn conversion_rounds_up() {
        let clock = StepClock {
            now: AtomicU64::new(0),
        };
        assert_eq!(clock.micros_to_ticks(1), 1);
        assert_eq!(clock.micros_to_ticks(0), 1);
    }

    #[test]
    fn poll_until_times_out() {
        let clock = StepClock {
            now: AtomicU64::new(0),
        };
        let got: Option<()> = poll_until(&clock, 10, || None);
        assert!(got.is_none());
    }

    #[test]
    fn poll_until_sees_condition() {
        let clock = StepClock {
            now: AtomicU64::new(0),
        };
        let mut calls = 0;
        let got = poll_until(&clock, 1_000, || {
            calls += 1;
            (calls == 3).then_some(calls)
        });
        assert_eq!(got, Some(3));
    }
}
