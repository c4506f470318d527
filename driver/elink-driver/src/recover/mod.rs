//! Error classification, the ring log, and the recovery engine.

pub mod engine;
pub mod kinds;
pub mod log;

pub use engine::{ErrorStats, RecoveryPolicy, RecoveryState, Strategy, after_attempt, decide};
pub use kinds::{ErrorKind, KIND_COUNT, Severity};
pub use log::{EntrySource, ErrorRecord, ErrorRing, RecoveryOutcome, RING_DEPTH};
