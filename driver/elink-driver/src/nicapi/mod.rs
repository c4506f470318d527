//! The NIC abstraction: descriptor, capability flags, operation table.
//!
//! Upper layers (API surface, dispatcher, recovery) see every NIC through
//! [`Nic`] and its [`NicOps`](ops::NicOps) table; nothing above this module
//! ever branches on the variant identity.

pub mod caps;
pub mod media;
pub mod ops;
pub mod probe_report;
pub mod stats;

pub use caps::CapabilityFlags;
pub use media::MediaType;
pub use ops::{IrqClaim, NicOps, OpCtx, OpResult, RcvMode, ResetDepth, TxFrag, TxRequest};
pub use probe_report::{Confidence, ProbeReport, ProbeThresholds};
pub use stats::NicStats;

use bitflags::bitflags;

use crate::buffer::BufferPool;
use crate::netaux::pause::PauseState;
use crate::nic3com::rings::DmaChannels;
use crate::recover::engine::{ErrorStats, RecoveryState};
use crate::recover::kinds::ErrorKind;

/// Index of a NIC within the driver context.
pub type NicId = u8;

/// Most NICs one resident driver will multiplex.
pub const MAX_NICS: usize = 4;

/// A 6-byte MAC (Ethernet hardware) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MacAddr(pub [u8; 6]);

impl core::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

bitflags! {
    /// Per-variant oddities carried by the device database.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QuirkFlags: u8 {
        /// The station address may be rewritten through `set_address`.
        const SET_MAC_ALLOWED = 1 << 0;
        /// EEPROM wants the slow read timing.
        const EEPROM_SLOW = 1 << 1;
        /// Interrupt mask must be rewritten after every filter change.
        const REARM_MASK_ON_FILTER = 1 << 2;
    }
}

/// NIC lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicState {
    /// Not yet opened (or closed for reinitialization).
    Closed,
    /// Carrying traffic.
    Open,
    /// A recovery strategy is mid-flight.
    Recovering,
    /// Permanently out of service.
    Disabled,
}

/// Identity and link state for one NIC.
#[derive(Debug, Clone, Copy)]
pub struct NicDescriptor {
    /// Index in the driver context.
    pub id: NicId,
    /// Variant name from the device database.
    pub name: &'static str,
    /// EEPROM product id.
    pub product_id: u16,
    /// Product revision (low nibble of the product word).
    pub revision: u8,
    /// I/O window base.
    pub io_base: u16,
    /// IRQ line.
    pub irq: u8,
    /// Station address from the EEPROM.
    pub mac: MacAddr,
    /// EEPROM media-capability word.
    pub media_caps: u16,
    /// Currently selected medium.
    pub media: MediaType,
    /// Link beat / carrier present.
    pub link_up: bool,
    /// Link speed in Mbit/s.
    pub speed_mbps: u32,
    /// Capability set, frozen after open.
    pub caps: CapabilityFlags,
}

/// Variant-specific runtime state.
pub enum VariantState {
    /// Register-windowed PIO: the hardware FIFO is the transport.
    Pio,
    /// Bus-master descriptor rings.
    Dma(DmaChannels),
}

/// One network interface: descriptor, operation table, pools, counters,
/// and recovery state. Exclusively owned by the driver context; NIC driver
/// code receives it as `&mut` and never sees its siblings.
pub struct Nic {
    /// Identity and link state.
    pub desc: NicDescriptor,
    /// Lifecycle state.
    pub state: NicState,
    /// The operation table for this variant.
    pub ops: &'static NicOps,
    /// Database quirk flags.
    pub quirks: QuirkFlags,
    /// The device-database row this NIC matched.
    pub db: &'static crate::nic3com::DeviceEntry,
    /// Software cache of the selected register window.
    pub window_cache: u8,
    /// This NIC's buffer pool.
    pub pool: BufferPool,
    /// Traffic counters.
    pub stats: NicStats,
    /// Rolling error statistics.
    pub err: ErrorStats,
    /// Recovery-ladder state.
    pub recovery: RecoveryState,
    /// Capability probe findings (bus-master variants, `auto` mode).
    pub probe: Option<ProbeReport>,
    /// 802.3x transmit-pause state.
    pub pause: PauseState,
    /// Hardware receive mode currently programmed.
    pub rcv_mode: RcvMode,
    /// Cause of the most recent failure, if any.
    pub last_failure: Option<ErrorKind>,
    /// Medium requested by configuration (`None` = autodetect).
    pub cfg_media: Option<MediaType>,
    /// Open with internal loopback engaged (diagnostics).
    pub cfg_loopback: bool,
    /// Copy-break threshold for inbound frames.
    pub copy_break: u16,
    /// Variant-specific state.
    pub variant: VariantState,
}

impl Nic {
    /// True when the NIC may carry traffic.
    #[must_use]
    pub fn serviceable(&self) -> bool {
        matches!(self.state, NicState::Open | NicState::Recovering)
    }

    /// True when bus-master transfer paths are in use.
    #[must_use]
    pub fn uses_dma(&self) -> bool {
        matches!(self.variant, VariantState::Dma(_))
    }
}
