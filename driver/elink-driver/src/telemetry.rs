//! Telemetry: the error ring, severity overrides, and the health score.

use crate::nicapi::NicId;
use crate::recover::engine::{ErrorStats, RecoveryState};
use crate::recover::kinds::{ErrorKind, KIND_COUNT, Severity};
use crate::recover::log::{
    EntrySource, ErrorRecord, ErrorRing, RecoveryOutcome,
};
use crate::recover::Strategy;

/// The diagnostic sink the rest of the driver writes into.
pub struct Telemetry {
    /// The dual-producer ring log.
    pub ring: ErrorRing,
    severity_overrides: [Option<Severity>; KIND_COUNT],
}

impl Telemetry {
    /// Creates an empty telemetry sink.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: ErrorRing::new(),
            severity_overrides: [None; KIND_COUNT],
        }
    }

    /// Overrides the severity of one error kind (configuration hook).
    pub fn override_severity(&mut self, kind: ErrorKind, severity: Severity) {
        self.severity_overrides[kind.index()] = Some(severity);
    }

    /// Effective severity for a kind.
    #[must_use]
    pub fn severity_of(&self, kind: ErrorKind) -> Severity {
        self.severity_overrides[kind.index()].unwrap_or_else(|| kind.default_severity())
    }

    /// Records a plain error.
    pub fn record(&mut self, source: EntrySource, timestamp: u64, nic: NicId, kind: ErrorKind) {
        let severity = self.severity_of(kind);
        self.ring.push(
            source,
            ErrorRecord {
                timestamp,
                nic,
                kind,
                severity,
                strategy: None,
                outcome: None,
            },
        );
    }

    /// Records a recovery decision and its outcome.
    pub fn record_recovery(
        &mut self,
        timestamp: u64,
        nic: NicId,
        kind: ErrorKind,
        strategy: Strategy,
        outcome: RecoveryOutcome,
    ) {
        let severity = self.severity_of(kind);
        self.ring.push(
            EntrySource::Task,
            ErrorRecord {
                timestamp,
                nic,
                kind,
                severity,
                strategy: Some(strategy),
                outcome: Some(outcome),
            },
        );
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Health score for one NIC, 0 (dead) to 100 (clean).
///
/// Recent error pressure and how far the recovery ladder has climbed both
/// pull the score down.
#[must_use]
pub fn health_score(err: &ErrorStats, recovery: &RecoveryState) -> u8 {
    let rate = err.rate_pct(1).min(100) as u64;
    let ladder_penalty = u64::from(recovery.level) * 20;
    let score = 100u64.saturating_sub(rate).saturating_sub(ladder_penalty);
    score as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_changes_recorded_severity() {
        let mut tel = Telemetry::new();
        assert_eq!(tel.severity_of(ErrorKind::RxCrc), Severity::Warning);
        tel.override_severity(ErrorKind::RxCrc, Severity::Critical);
        tel.record(EntrySource::Task, 1, 0, ErrorKind::RxCrc);
        let got = tel.ring.find_last(|r| r.kind == ErrorKind::RxCrc).unwrap();
        assert_eq!(got.severity, Severity::Critical);
    }

    #[test]
    fn health_degrades_with_ladder_and_rate() {
        let mut err = ErrorStats::default();
        let recovery = RecoveryState::default();
        assert_eq!(health_score(&err, &recovery), 100);

        err.note_frames(100, true);
        for _ in 0..30 {
            err.note_error(ErrorKind::RxCrc);
        }
        let mid = health_score(&err, &recovery);
        assert!(mid < 100);

        let climbed = RecoveryState {
            level: 3,
            ..RecoveryState::default()
        };
        assert!(health_score(&err, &climbed) < mid);
    }
}
