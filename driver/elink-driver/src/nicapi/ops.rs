//! The polymorphic NIC operation table.
//!
//! Upper layers drive every NIC through one process-constant [`NicOps`]
//! value — a struct of plain function pointers, selected from the device
//! database at open. Capability queries are field reads on the descriptor,
//! not dispatches.
//!
//! Operation contract: every operation is total for its variant, never
//! blocks unbounded (all hardware waits carry deadlines from the clock),
//! and fails with an [`ErrorKind`] that the caller records and feeds to the
//! recovery engine.

use elink_hal::clock::Clock;
use elink_hal::dma::DmaArena;
use elink_hal::io::IoBus;

use super::{Nic, NicStats};
use crate::api::handle::HandleTable;
use crate::dispatch::idle::IdleQueue;
use crate::recover::kinds::ErrorKind;
use crate::recover::log::EntrySource;
use crate::telemetry::Telemetry;

/// Receive modes, in increasing order of openness (the wire encoding).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RcvMode {
    /// Receiver off.
    Off = 1,
    /// Frames addressed to this station only.
    Directed = 2,
    /// Directed plus broadcast.
    Broadcast = 3,
    /// Broadcast plus limited multicast.
    Multicast = 4,
    /// Broadcast plus all multicast.
    AllMulticast = 5,
    /// Everything on the wire.
    Promiscuous = 6,
}

impl RcvMode {
    /// Wire encoding.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes a wire mode.
    #[must_use]
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Off),
            2 => Some(Self::Directed),
            3 => Some(Self::Broadcast),
            4 => Some(Self::Multicast),
            5 => Some(Self::AllMulticast),
            6 => Some(Self::Promiscuous),
            _ => None,
        }
    }
}

/// Everything an operation may touch besides its own NIC.
///
/// Built by the dispatcher from disjoint borrows of the driver context, so
/// an operation can post idle work, match handles, and write telemetry
/// without ever seeing another NIC.
pub struct OpCtx<'a> {
    /// Port I/O.
    pub io: &'a dyn IoBus,
    /// DMA-reachable memory.
    pub arena: &'a dyn DmaArena,
    /// Monotonic clock for bounded waits.
    pub clock: &'a dyn Clock,
    /// Deferred-work queue.
    pub idle: &'a mut IdleQueue,
    /// Handle table (read-only from operations).
    pub handles: &'a HandleTable,
    /// Error ring and counters.
    pub tel: &'a mut Telemetry,
    /// Which execution context is running this operation.
    pub source: EntrySource,
}

impl OpCtx<'_> {
    /// Records an error against `nic` in the telemetry ring.
    pub fn record(&mut self, nic: super::NicId, kind: ErrorKind) {
        let ts = self.clock.ticks();
        self.tel.record(self.source, ts, nic, kind);
    }
}

/// Result type shared by most operations.
pub type OpResult = Result<(), ErrorKind>;

/// One transmit fragment.
#[derive(Clone, Copy)]
pub struct TxFrag<'a> {
    /// Fragment bytes.
    pub data: &'a [u8],
}

/// Largest scatter-gather list a single send may carry.
pub const MAX_TX_FRAGS: usize = 8;

/// A transmit request: one frame as one or more fragments.
///
/// The caller's buffers must stay valid for the duration of the call; the
/// driver has accepted the frame when `send` returns.
pub struct TxRequest<'a> {
    /// The fragments, in frame order.
    pub frags: &'a [TxFrag<'a>],
}

impl<'a> TxRequest<'a> {
    /// A single contiguous frame.
    #[must_use]
    pub fn single(frags: &'a [TxFrag<'a>; 1]) -> Self {
        Self { frags }
    }

    /// Total frame length across fragments.
    #[must_use]
    pub fn total_len(&self) -> usize {
        self.frags.iter().map(|f| f.data.len()).sum()
    }
}

/// Whether a hardware IRQ belonged to this NIC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqClaim {
    /// Not ours; the dispatcher chains to the saved vector.
    NotMine,
    /// Serviced; the dispatcher issues the EOI.
    Claimed,
}

/// Depth of a reset operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetDepth {
    /// Clear error state, re-enable RX/TX; rings untouched.
    Short,
    /// Full adapter reset; DMA variants rebuild their rings.
    Full,
}

/// The per-variant operation table. Tables are `'static` constants; every
/// NIC references exactly one.
pub struct NicOps {
    /// Brings the NIC from reset to operational.
    pub open: fn(&mut Nic, &mut OpCtx<'_>) -> OpResult,
    /// Quiesces and releases the NIC.
    pub close: fn(&mut Nic, &mut OpCtx<'_>),
    /// Recovers the NIC at the requested depth.
    pub reset: fn(&mut Nic, &mut OpCtx<'_>, ResetDepth) -> OpResult,
    /// Transmits one frame.
    pub send: fn(&mut Nic, &mut OpCtx<'_>, &TxRequest<'_>) -> OpResult,
    /// Poll-mode receive: copies one pending frame into `buf` and returns
    /// its length, `0` when nothing is waiting. The interrupt-driven path
    /// is the normal one; this serves masked-interrupt diagnostics.
    pub recv: fn(&mut Nic, &mut OpCtx<'_>, &mut [u8]) -> Result<usize, ErrorKind>,
    /// Services a hardware interrupt if this NIC raised it.
    pub handle_irq: fn(&mut Nic, &mut OpCtx<'_>) -> IrqClaim,
    /// Reads one EEPROM word.
    pub read_eeprom: fn(&mut Nic, &mut OpCtx<'_>, u8) -> Result<u16, ErrorKind>,
    /// Selects (or auto-detects, on `None`) the active medium.
    pub select_media:
        fn(&mut Nic, &mut OpCtx<'_>, Option<super::MediaType>) -> OpResult,
    /// Programs the hardware receive filter for a mode.
    pub set_rx_filter: fn(&mut Nic, &mut OpCtx<'_>, RcvMode) -> OpResult,
    /// Folds hardware counters into the driver's and returns a snapshot.
    pub get_stats: fn(&mut Nic, &mut OpCtx<'_>) -> NicStats,
}
