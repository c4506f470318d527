//! Foundation types for the elink packet driver.
//!
//! This crate holds the pieces every other elink crate leans on: the
//! fn-pointer logging facade, spin locks, interrupt-flag-preserving
//! critical sections, and compile-time assertions. Everything here is
//! host-testable: real interrupt-flag manipulation is gated on
//! `target_os = "none"` and replaced by bookkeeping on the host so the
//! invariants stay checkable under `cargo test`.

#![cfg_attr(not(test), no_std)]

pub mod log;
pub mod static_assert;
pub mod sync;

pub use sync::spinlock::{SpinLock, SpinLockGuard};
