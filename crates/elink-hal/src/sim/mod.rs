//! Software device models for the test suite.
//!
//! Everything the driver talks to has a model here: physical memory
//! ([`SimMemory`]) with a bump-allocated DMA arena ([`SimArena`]), a port-I/O
//! bus that routes to attached devices and records interrupt-controller
//! traffic ([`SimBus`]), a host with a vector table and busy flags
//! ([`SimHost`]), a manually advanced clock ([`SimClock`]), and behavioral
//! models of both NIC variants ([`Sim3c509`], [`Sim3c515`]) with loopback
//! and fault-injection knobs.
//!
//! The models are register-accurate enough that the driver's open, transmit,
//! receive, recovery, and probe paths run unmodified against them.

extern crate alloc;

pub mod bus;
pub mod clock;
pub mod corkscrew;
pub mod el3;
pub mod host;
pub mod mem;

pub use bus::{SimBus, SimDevice};
pub use clock::SimClock;
pub use corkscrew::Sim3c515;
pub use el3::Sim3c509;
pub use host::SimHost;
pub use mem::{SimArena, SimMemory};
