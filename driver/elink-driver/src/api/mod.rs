//! The packet-driver API surface: function codes, error codes, and the
//! typed call/outcome model the dispatcher executes.
//!
//! On the wire this is an interrupt-vector interface — function code in a
//! register, carry set on error, an error code in a result register, and
//! the 8-byte "PKT DRVR" signature reachable from the entry point for
//! presence checks. The resident stubs translate that register block into
//! [`ApiCall`] values; everything behind the translation is typed.

pub mod delivery;
pub mod handle;

pub use handle::{HandleTable, RxEvent, RxUpcall};

use crate::nicapi::ops::{RcvMode, TxFrag};
use crate::nicapi::{MacAddr, NicId, NicStats};

/// The presence-check signature, at a fixed offset from the API entry.
pub const SIGNATURE: [u8; 8] = *b"PKT DRVR";

/// Driver specification version reported by `driver_info`.
pub const DRIVER_VERSION: u16 = 0x010B;

/// Basic-functions functionality class.
pub const FUNCTIONALITY_BASIC: u8 = 1;

/// Wire function codes.
pub mod functions {
    /// driver_info.
    pub const DRIVER_INFO: u8 = 0x01;
    /// access_type.
    pub const ACCESS_TYPE: u8 = 0x02;
    /// release_type.
    pub const RELEASE_TYPE: u8 = 0x03;
    /// send_pkt.
    pub const SEND_PKT: u8 = 0x04;
    /// terminate.
    pub const TERMINATE: u8 = 0x05;
    /// get_address.
    pub const GET_ADDRESS: u8 = 0x06;
    /// reset_interface.
    pub const RESET_INTERFACE: u8 = 0x07;
    /// set_rcv_mode.
    pub const SET_RCV_MODE: u8 = 0x14;
    /// get_rcv_mode.
    pub const GET_RCV_MODE: u8 = 0x15;
    /// get_statistics.
    pub const GET_STATISTICS: u8 = 0x18;
    /// set_address.
    pub const SET_ADDRESS: u8 = 0x19;
}

/// API error codes, in the classic wire encoding (returned with carry set).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApiError {
    /// Invalid or stale handle.
    BadHandle = 1,
    /// Unsupported class or malformed type.
    BadType = 5,
    /// Unsupported receive mode.
    BadMode = 8,
    /// No room (handle table, output buffer).
    NoSpace = 9,
    /// The (class, type) pair is already registered.
    TypeInUse = 10,
    /// Unknown function code.
    BadCommand = 11,
    /// The frame could not be accepted.
    CantSend = 12,
    /// The station address cannot be changed.
    CantSet = 13,
    /// The interface could not be reset.
    CantReset = 15,
    /// The host is in a non-reentrant section or a call is in flight;
    /// retry later.
    Busy = 16,
}

impl ApiError {
    /// Wire code for the error register.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl core::fmt::Display for ApiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::BadHandle => "bad handle",
            Self::BadType => "bad type",
            Self::BadMode => "bad mode",
            Self::NoSpace => "no space",
            Self::TypeInUse => "type in use",
            Self::BadCommand => "bad command",
            Self::CantSend => "can't send",
            Self::CantSet => "can't set",
            Self::CantReset => "can't reset",
            Self::Busy => "busy, retry",
        };
        f.write_str(name)
    }
}

/// `driver_info` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverInfo {
    /// Specification version.
    pub version: u16,
    /// Interface class (Ethernet II).
    pub class: u8,
    /// Interface type from the device database.
    pub if_type: u16,
    /// Interface number (NIC index).
    pub number: u8,
    /// Driver name.
    pub name: &'static str,
    /// Functionality class.
    pub functionality: u8,
}

/// The statistics block applications read.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PktStats {
    /// Frames received.
    pub packets_in: u32,
    /// Frames transmitted.
    pub packets_out: u32,
    /// Bytes received.
    pub bytes_in: u32,
    /// Bytes transmitted.
    pub bytes_out: u32,
    /// Receive errors.
    pub errors_in: u32,
    /// Transmit errors.
    pub errors_out: u32,
    /// Frames dropped for lack of buffers or receivers.
    pub packets_lost: u32,
}

impl From<NicStats> for PktStats {
    fn from(s: NicStats) -> Self {
        Self {
            packets_in: s.rx_packets as u32,
            packets_out: s.tx_packets as u32,
            bytes_in: s.rx_bytes as u32,
            bytes_out: s.tx_bytes as u32,
            errors_in: s.rx_errors as u32,
            errors_out: s.tx_errors as u32,
            packets_lost: s.rx_dropped as u32,
        }
    }
}

/// A decoded API request.
pub enum ApiCall<'a> {
    /// Identity of one interface.
    DriverInfo {
        /// Interface number.
        nic: NicId,
    },
    /// Register a receiver for (class, type) on an interface.
    AccessType {
        /// Interface class.
        class: u8,
        /// Interface number.
        nic: NicId,
        /// Type template (empty = all frames).
        pkt_type: &'a [u8],
        /// Receive upcall.
        upcall: RxUpcall,
        /// Caller cookie passed back on every delivery.
        cookie: usize,
    },
    /// Release one handle.
    ReleaseType {
        /// The handle.
        handle: u16,
    },
    /// Transmit a contiguous frame.
    SendPkt {
        /// The sending handle.
        handle: u16,
        /// The frame.
        frame: &'a [u8],
    },
    /// Transmit a scatter-gather frame.
    SendPktSg {
        /// The sending handle.
        handle: u16,
        /// The fragments, in frame order.
        frags: &'a [TxFrag<'a>],
    },
    /// Release every handle owned by this handle's application.
    Terminate {
        /// Any handle of the terminating application.
        handle: u16,
    },
    /// Read the station address.
    GetAddress {
        /// The handle.
        handle: u16,
        /// Destination buffer.
        out: &'a mut [u8],
    },
    /// Rewrite the station address (capability-gated).
    SetAddress {
        /// The handle.
        handle: u16,
        /// The new address.
        addr: &'a [u8],
    },
    /// Force a full reset of the handle's interface.
    ResetInterface {
        /// The handle.
        handle: u16,
    },
    /// Counters snapshot.
    GetStatistics {
        /// The handle.
        handle: u16,
    },
    /// Change the handle's receive mode.
    SetRcvMode {
        /// The handle.
        handle: u16,
        /// Wire mode code.
        mode: u8,
    },
    /// Read the handle's receive mode.
    GetRcvMode {
        /// The handle.
        handle: u16,
    },
}

impl ApiCall<'_> {
    /// True for calls that change driver or hardware state. Read-only calls
    /// stay allowed while the host is busy; everything else gets
    /// [`ApiError::Busy`].
    #[must_use]
    pub fn modifies_state(&self) -> bool {
        !matches!(
            self,
            Self::DriverInfo { .. }
                | Self::GetAddress { .. }
                | Self::GetRcvMode { .. }
                | Self::GetStatistics { .. }
        )
    }
}

/// A successful API result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiOutcome {
    /// Nothing to return.
    Done,
    /// A freshly registered handle.
    Handle(u16),
    /// `driver_info` data.
    Info(DriverInfo),
    /// A receive mode.
    Mode(RcvMode),
    /// A statistics snapshot.
    Stats(PktStats),
    /// An address was written; this many bytes.
    AddressLen(u8),
    /// The station address (diagnostic convenience).
    Address(MacAddr),
}
