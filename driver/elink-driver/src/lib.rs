//! Resident packet-driver core for 3Com EtherLink III family NICs.
//!
//! One driver, one API surface, one or more NICs: the 10 Mbit PIO parts
//! (3C509B) and the 100 Mbit ISA bus-master (3C515 "Corkscrew"). The crate
//! is the CORE of the resident driver — the dispatcher with its private
//! stack and re-entrancy discipline, the capability-driven NIC operation
//! tables, the PIO and descriptor-ring transfer paths, per-NIC buffer pools
//! with copy-break, the error taxonomy with tiered recovery, and the
//! one-shot probe that decides whether bus-master DMA can be trusted on
//! the running host.
//!
//! Hardware and host access go through the narrow traits in `elink-hal`;
//! with the `sim` device models the whole driver runs under `cargo test`.
//! Command-line parsing, logging sinks, and the resident install image are
//! the external loader's business — it hands the core a validated
//! [`StartConfig`](config::StartConfig) and entry-point addresses.

#![cfg_attr(not(test), no_std)]

pub mod api;
pub mod buffer;
pub mod config;
pub mod context;
pub mod cpu;
pub mod dispatch;
pub mod driver;
pub mod netaux;
pub mod nic3com;
pub mod nicapi;
pub mod recover;
pub mod telemetry;

pub use api::{ApiCall, ApiError, ApiOutcome, DriverInfo, PktStats};
pub use config::{BusmasterMode, NicConfig, StartConfig};
pub use driver::{Hw, InstallError, IrqOutcome, PacketDriver};
pub use nicapi::{CapabilityFlags, MacAddr, MediaType, NicId, RcvMode};
