//! Synchronization primitives.
//!
//! The driver runs single-threaded with hardware interrupts as the only
//! preemption, so the primitives here are small: a TTAS [`SpinLock`] for
//! state shared with the ISR path, and [`critical`] sections that disable
//! interrupts for a bounded span while preserving the caller's interrupt
//! flag.

pub mod critical;
pub mod spinlock;

pub use critical::CritSection;
pub use spinlock::{SpinLock, SpinLockGuard};
