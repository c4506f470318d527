//! Fixed-depth error ring log.
//!
//! Two single-producer halves — one written from the hardware ISR path, one
//! from API/idle context — so neither producer ever needs to lock against
//! the other. Readers merge the halves by timestamp.

use super::engine::Strategy;
use super::kinds::{ErrorKind, Severity};
use crate::nicapi::NicId;

/// Which execution context produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    /// Hardware interrupt service.
    Isr,
    /// API call or idle-queue drain.
    Task,
}

/// Outcome of an applied recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// The strategy completed and the NIC is back in service.
    Succeeded,
    /// The strategy ran but the NIC is still unhealthy.
    Failed,
}

/// One diagnostic record.
#[derive(Debug, Clone, Copy)]
pub struct ErrorRecord {
    /// Clock ticks when the record was written.
    pub timestamp: u64,
    /// NIC the record concerns.
    pub nic: NicId,
    /// Classified error.
    pub kind: ErrorKind,
    /// Severity after any configured override.
    pub severity: Severity,
    /// Recovery strategy applied in response, if any.
    pub strategy: Option<Strategy>,
    /// Outcome of that strategy, if one ran.
    pub outcome: Option<RecoveryOutcome>,
}

/// Depth of each single-producer half.
const HALF_DEPTH: usize = 64;
/// Total merged depth visible to readers.
pub const RING_DEPTH: usize = HALF_DEPTH * 2;

struct Half {
    records: [Option<ErrorRecord>; HALF_DEPTH],
    /// Monotonic write index; slot = index % depth.
    widx: u32,
}

impl Half {
    const fn new() -> Self {
        Self {
            records: [None; HALF_DEPTH],
            widx: 0,
        }
    }

    fn push(&mut self, record: ErrorRecord) {
        self.records[self.widx as usize % HALF_DEPTH] = Some(record);
        self.widx = self.widx.wrapping_add(1);
    }
}

/// The dual-producer ring.
pub struct ErrorRing {
    isr: Half,
    task: Half,
    /// Total records ever written (both halves).
    pub total_records: u32,
}

impl ErrorRing {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            isr: Half::new(),
            task: Half::new(),
            total_records: 0,
        }
    }

    /// Appends a record from the given context.
    pub fn push(&mut self, source: EntrySource, record: ErrorRecord) {
        match source {
            EntrySource::Isr => self.isr.push(record),
            EntrySource::Task => self.task.push(record),
        }
        self.total_records = self.total_records.wrapping_add(1);
    }

    /// Merges both halves into `out`, oldest first. Returns the count.
    pub fn snapshot(&self, out: &mut [Option<ErrorRecord>; RING_DEPTH]) -> usize {
        let mut n = 0;
        for half in [&self.isr, &self.task] {
            for rec in half.records.iter().flatten() {
                out[n] = Some(*rec);
                n += 1;
            }
        }
        // Insertion sort by timestamp; the ring is small and reads are rare.
        for i in 1..n {
            let mut j = i;
            while j > 0 {
                let earlier = out[j - 1].as_ref().map_or(0, |r| r.timestamp);
                let later = out[j].as_ref().map_or(0, |r| r.timestamp);
                if earlier <= later {
                    break;
                }
                out.swap(j - 1, j);
                j -= 1;
            }
        }
        n
    }

    /// Convenience: counts records of one kind for one NIC.
    #[must_use]
    pub fn count_kind(&self, nic: NicId, kind: ErrorKind) -> usize {
        let mut n = 0;
        for half in [&self.isr, &self.task] {
            n += half
                .records
                .iter()
                .flatten()
                .filter(|r| r.nic == nic && r.kind == kind)
                .count();
        }
        n
    }

    /// Convenience: most recent record matching a predicate.
    pub fn find_last(&self, mut pred: impl FnMut(&ErrorRecord) -> bool) -> Option<ErrorRecord> {
        let mut best: Option<ErrorRecord> = None;
        for half in [&self.isr, &self.task] {
            for rec in half.records.iter().flatten() {
                if pred(rec) && best.is_none_or(|b| rec.timestamp >= b.timestamp) {
                    best = Some(*rec);
                }
            }
        }
        best
    }
}

impl Default for ErrorRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorthand for a plain (no-strategy) record.
#[must_use]
pub fn record(timestamp: u64, nic: NicId, kind: ErrorKind) -> ErrorRecord {
    ErrorRecord {
        timestamp,
        nic,
        kind,
        severity: kind.default_severity(),
        strategy: None,
        outcome: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_orders_by_timestamp_across_producers() {
        let mut ring = ErrorRing::new();
        ring.push(EntrySource::Task, record(5, 0, ErrorKind::TxTimeout));
        ring.push(EntrySource::Isr, record(2, 0, ErrorKind::RxCrc));
        ring.push(EntrySource::Isr, record(9, 0, ErrorKind::RxOverrun));

        let mut out = [None; RING_DEPTH];
        let n = ring.snapshot(&mut out);
        assert_eq!(n, 3);
        let stamps: Vec<u64> = out[..n].iter().map(|r| r.unwrap().timestamp).collect();
        assert_eq!(stamps, vec![2, 5, 9]);
    }

    #[test]
    fn half_wraps_without_growing() {
        let mut ring = ErrorRing::new();
        for t in 0..(HALF_DEPTH as u64 + 10) {
            ring.push(EntrySource::Isr, record(t, 1, ErrorKind::RxCrc));
        }
        let mut out = [None; RING_DEPTH];
        assert_eq!(ring.snapshot(&mut out), HALF_DEPTH);
        assert_eq!(ring.count_kind(1, ErrorKind::RxCrc), HALF_DEPTH);
    }

    #[test]
    fn find_last_sees_the_newest_match() {
        let mut ring = ErrorRing::new();
        ring.push(EntrySource::Task, record(1, 0, ErrorKind::RxCrc));
        ring.push(EntrySource::Task, record(7, 0, ErrorKind::RxCrc));
        let got = ring.find_last(|r| r.kind == ErrorKind::RxCrc).unwrap();
        assert_eq!(got.timestamp, 7);
    }
}
