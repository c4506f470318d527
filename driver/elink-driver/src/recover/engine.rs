//! Tiered recovery engine.
//!
//! Errors feed per-NIC statistics; the engine turns statistics into one of
//! four strategies and climbs a ladder — each further trigger after an
//! attempt escalates one step, and the ladder ends at `Disable`. Every
//! attempt is bounded: at most `max_attempts_per_window` per time window,
//! after which the only remaining move is `Disable`.

use super::kinds::{ErrorKind, KIND_COUNT};

/// Recovery strategies, mildest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Strategy {
    /// Clear error state and re-enable RX/TX; rings untouched.
    Soft,
    /// Full reset: stop traffic, reset the adapter, rebuild rings.
    Hard,
    /// Close and re-open the NIC from scratch.
    Reinitialize,
    /// Take the NIC out of service permanently.
    Disable,
}

impl Strategy {
    fn level(self) -> u8 {
        match self {
            Self::Soft => 1,
            Self::Hard => 2,
            Self::Reinitialize => 3,
            Self::Disable => 4,
        }
    }

    fn from_level(level: u8) -> Self {
        match level {
            0 | 1 => Self::Soft,
            2 => Self::Hard,
            3 => Self::Reinitialize,
            _ => Self::Disable,
        }
    }
}

/// Tunable recovery policy (defaults are the production values).
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    /// Consecutive same-kind errors beyond this count trigger `Soft`.
    pub consecutive_limit: u16,
    /// Windowed error rate (percent) at or above this triggers `Hard`.
    pub rate_pct: u32,
    /// Frames that must pass before the rate is meaningful.
    pub rate_floor_frames: u32,
    /// Attempts allowed per window before the ladder jumps to `Disable`.
    pub max_attempts_per_window: u8,
    /// Attempt-window length in microseconds.
    pub window_micros: u64,
    /// Move matching handles to a surviving NIC on `Disable`.
    pub migrate_on_disable: bool,
    /// Re-run the capability probe during `Reinitialize`.
    pub reprobe_on_reinit: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            consecutive_limit: 8,
            rate_pct: 10,
            rate_floor_frames: 1000,
            max_attempts_per_window: 4,
            window_micros: 30_000_000,
            migrate_on_disable: true,
            reprobe_on_reinit: false,
        }
    }
}

/// Per-NIC rolling error statistics.
#[derive(Debug, Default)]
pub struct ErrorStats {
    /// Lifetime count per kind.
    pub counts: [u32; KIND_COUNT],
    /// Kind of the current consecutive-error run.
    pub consecutive_kind: Option<ErrorKind>,
    /// Length of the current run.
    pub consecutive: u16,
    /// Frames seen in the current rate window.
    pub window_frames: u32,
    /// Errors seen in the current rate window.
    pub window_errors: u32,
}

impl ErrorStats {
    /// Notes `n` frames processed (good or bad) for the rate window.
    /// A clean frame breaks any consecutive-error run.
    pub fn note_frames(&mut self, n: u32, clean: bool) {
        self.window_frames = self.window_frames.saturating_add(n);
        if clean {
            self.consecutive = 0;
            self.consecutive_kind = None;
        }
        // Keep the window sliding: past twice the floor, halve both sides
        // so the rate stays continuous without unbounded growth.
        if self.window_frames > 2 * 1000 {
            self.window_frames /= 2;
            self.window_errors /= 2;
        }
    }

    /// Notes one classified error.
    pub fn note_error(&mut self, kind: ErrorKind) {
        self.counts[kind.index()] = self.counts[kind.index()].saturating_add(1);
        self.window_errors = self.window_errors.saturating_add(1);
        if self.consecutive_kind == Some(kind) {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive_kind = Some(kind);
            self.consecutive = 1;
        }
    }

    /// Windowed error rate in percent (0 when below the floor).
    #[must_use]
    pub fn rate_pct(&self, floor: u32) -> u32 {
        if self.window_frames < floor.max(1) {
            return 0;
        }
        self.window_errors.saturating_mul(100) / self.window_frames
    }

    fn reset_window(&mut self) {
        self.consecutive = 0;
        self.consecutive_kind = None;
        self.window_frames = 0;
        self.window_errors = 0;
    }
}

/// Per-NIC escalation state.
#[derive(Debug, Default)]
pub struct RecoveryState {
    /// Ladder position: 0 none, 1 soft, 2 hard, 3 reinit, 4 disabled.
    pub level: u8,
    /// Attempts inside the current window.
    pub attempts: u8,
    /// Window start, in clock ticks.
    pub window_start: u64,
    /// Strategy most recently applied.
    pub last_strategy: Option<Strategy>,
}

/// Decides whether the latest statistics demand a strategy.
///
/// `last_kind` is the error that prompted the check. Returns `None` when no
/// threshold fired or the NIC is already disabled.
pub fn decide(
    stats: &ErrorStats,
    recovery: &mut RecoveryState,
    policy: &RecoveryPolicy,
    last_kind: ErrorKind,
    now: u64,
    window_ticks: u64,
) -> Option<Strategy> {
    if recovery.level >= 4 {
        return None;
    }

    if now.wrapping_sub(recovery.window_start) > window_ticks {
        recovery.window_start = now;
        recovery.attempts = 0;
    }

    let rate_fired = stats.rate_pct(policy.rate_floor_frames) >= policy.rate_pct;
    let consec_fired = stats.consecutive > policy.consecutive_limit;

    let wanted = if last_kind.is_adapter_level() || rate_fired {
        2
    } else if consec_fired {
        1
    } else {
        return None;
    };

    let mut target = if wanted > recovery.level {
        wanted
    } else {
        recovery.level + 1
    };
    if recovery.attempts >= policy.max_attempts_per_window {
        target = 4;
    }
    Some(Strategy::from_level(target.min(4)))
}

/// Books an applied attempt: advances the ladder and clears the counters
/// that triggered it.
pub fn after_attempt(stats: &mut ErrorStats, recovery: &mut RecoveryState, strategy: Strategy) {
    recovery.level = recovery.level.max(strategy.level());
    recovery.attempts = recovery.attempts.saturating_add(1);
    recovery.last_strategy = Some(strategy);
    stats.reset_window();
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: u64 = 30_000_000;

    fn policy() -> RecoveryPolicy {
        RecoveryPolicy::default()
    }

    #[test]
    fn nine_consecutive_trigger_soft() {
        let mut stats = ErrorStats::default();
        let mut recov = RecoveryState::default();
        for _ in 0..8 {
            stats.note_frames(1, false);
            stats.note_error(ErrorKind::RxCrc);
            assert_eq!(
                decide(&stats, &mut recov, &policy(), ErrorKind::RxCrc, 0, WINDOW),
                None
            );
        }
        stats.note_frames(1, false);
        stats.note_error(ErrorKind::RxCrc);
        assert_eq!(
            decide(&stats, &mut recov, &policy(), ErrorKind::RxCrc, 0, WINDOW),
            Some(Strategy::Soft)
        );
        after_attempt(&mut stats, &mut recov, Strategy::Soft);
        assert_eq!(stats.consecutive, 0);
        assert_eq!(recov.level, 1);
    }

    #[test]
    fn rate_over_ten_percent_triggers_hard() {
        let mut stats = ErrorStats::default();
        let mut recov = RecoveryState {
            level: 1,
            ..RecoveryState::default()
        };
        // 200 errors among 1000 frames, evenly interleaved.
        let mut fired = None;
        for i in 1..=1000u32 {
            let is_err = i % 5 == 0;
            stats.note_frames(1, !is_err);
            if is_err {
                stats.note_error(ErrorKind::RxCrc);
                fired = decide(&stats, &mut recov, &policy(), ErrorKind::RxCrc, 0, WINDOW);
                if fired.is_some() {
                    break;
                }
            }
        }
        assert_eq!(fired, Some(Strategy::Hard));
    }

    #[test]
    fn adapter_errors_climb_the_ladder() {
        let mut stats = ErrorStats::default();
        let mut recov = RecoveryState {
            level: 2,
            ..RecoveryState::default()
        };
        stats.note_error(ErrorKind::AdapterDma);
        let s = decide(&stats, &mut recov, &policy(), ErrorKind::AdapterDma, 0, WINDOW).unwrap();
        assert_eq!(s, Strategy::Reinitialize);
        after_attempt(&mut stats, &mut recov, s);

        stats.note_error(ErrorKind::AdapterDma);
        let s = decide(&stats, &mut recov, &policy(), ErrorKind::AdapterDma, 0, WINDOW).unwrap();
        assert_eq!(s, Strategy::Disable);
        after_attempt(&mut stats, &mut recov, s);
        assert_eq!(recov.level, 4);

        // Disabled NICs never recover further.
        stats.note_error(ErrorKind::AdapterDma);
        assert_eq!(
            decide(&stats, &mut recov, &policy(), ErrorKind::AdapterDma, 0, WINDOW),
            None
        );
    }

    #[test]
    fn attempt_budget_forces_disable() {
        let mut stats = ErrorStats::default();
        let mut recov = RecoveryState::default();
        recov.attempts = 4;
        stats.note_error(ErrorKind::AdapterHang);
        assert_eq!(
            decide(&stats, &mut recov, &policy(), ErrorKind::AdapterHang, 10, WINDOW),
            Some(Strategy::Disable)
        );
    }

    #[test]
    fn window_expiry_resets_attempts() {
        let mut stats = ErrorStats::default();
        let mut recov = RecoveryState {
            attempts: 4,
            window_start: 0,
            ..RecoveryState::default()
        };
        stats.note_error(ErrorKind::AdapterHang);
        // Past the window the budget is fresh, so this is Hard not Disable.
        let s = decide(
            &stats,
            &mut recov,
            &policy(),
            ErrorKind::AdapterHang,
            WINDOW + 1,
            WINDOW,
        );
        assert_eq!(s, Some(Strategy::Hard));
        assert_eq!(recov.attempts, 0);
    }
}
