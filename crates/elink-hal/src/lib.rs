//! Hardware and host abstraction for the elink packet driver.
//!
//! The driver core talks to the world through four narrow traits:
//!
//! - [`IoBus`] — x86 port I/O (the EtherLink III family is register-windowed
//!   port I/O, no MMIO).
//! - [`DmaArena`] — ISA-reachable memory for descriptor rings and buffer
//!   pools, addressed by 24-bit-safe physical addresses.
//! - [`HostApi`] — the host's interrupt-vector table and busy flags.
//! - [`Clock`] — a monotonic tick source for every bounded hardware wait.
//!
//! Real implementations exist only on `target_os = "none"`; the `sim`
//! feature provides software models of the bus, memory, host, clock, and
//! both NIC variants so the whole driver runs under `cargo test`.

#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod dma;
pub mod host;
pub mod intc;
pub mod io;

#[cfg(feature = "sim")]
pub mod sim;

pub use clock::{Clock, Deadline};
pub use dma::{DmaArena, DmaError};
pub use host::{FarPtr, HostApi};
pub use io::IoBus;
