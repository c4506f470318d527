//! Error taxonomy and severities.
//!
//! Every failure anywhere in the driver is classified as one of these kinds;
//! the recovery engine and the telemetry ring both speak this vocabulary.
//! The API surface maps kinds onto the small packet-driver code set before
//! anything reaches an application.

use core::fmt;

/// Classified driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorKind {
    /// RX FIFO or upload-ring overrun.
    RxOverrun,
    /// Bad CRC on a received frame.
    RxCrc,
    /// Framing / alignment error on receive.
    RxFraming,
    /// Received frame length out of bounds (runt or oversize).
    RxLength,
    /// Transmit abandoned after excessive collisions.
    TxCollisionExcess,
    /// Transmit FIFO/DMA underrun.
    TxUnderrun,
    /// Transmit did not complete in time.
    TxTimeout,
    /// Jabber: transmitter held the wire too long.
    TxJabber,
    /// Adapter stopped responding (no completions, stuck command).
    AdapterHang,
    /// Bus-master engine reported a DMA error.
    AdapterDma,
    /// Power or link-level failure.
    AdapterPower,
    /// EEPROM / configuration inconsistency.
    AdapterConfig,
    /// A buffer pool could not satisfy an allocation.
    PoolExhausted,
    /// The idle queue overflowed.
    QueueOverflow,
    /// The host stayed busy past the deferral limit.
    HostBusyTimeout,
    /// The capability probe failed.
    ProbeFailed,
    /// Another resident hooked our vector; uninstall refused.
    VectorStolen,
    /// The selected medium lost link.
    MediaLost,
}

/// Number of error kinds (sized for per-kind counter arrays).
pub const KIND_COUNT: usize = 18;

impl ErrorKind {
    /// Dense index for counter arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// All kinds, in index order.
    pub const ALL: [Self; KIND_COUNT] = [
        Self::RxOverrun,
        Self::RxCrc,
        Self::RxFraming,
        Self::RxLength,
        Self::TxCollisionExcess,
        Self::TxUnderrun,
        Self::TxTimeout,
        Self::TxJabber,
        Self::AdapterHang,
        Self::AdapterDma,
        Self::AdapterPower,
        Self::AdapterConfig,
        Self::PoolExhausted,
        Self::QueueOverflow,
        Self::HostBusyTimeout,
        Self::ProbeFailed,
        Self::VectorStolen,
        Self::MediaLost,
    ];

    /// Default severity for this kind (configuration may override).
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            Self::RxOverrun | Self::RxCrc | Self::RxFraming | Self::RxLength => Severity::Warning,
            Self::TxCollisionExcess | Self::TxUnderrun | Self::TxJabber => Severity::Warning,
            Self::TxTimeout | Self::MediaLost | Self::HostBusyTimeout => Severity::Critical,
            Self::AdapterHang | Self::AdapterDma | Self::AdapterPower | Self::AdapterConfig => {
                Severity::Critical
            }
            Self::PoolExhausted | Self::QueueOverflow => Severity::Warning,
            Self::ProbeFailed => Severity::Info,
            Self::VectorStolen => Severity::Fatal,
        }
    }

    /// True for adapter-level kinds, which escalate recovery harder than
    /// per-frame noise.
    #[must_use]
    pub fn is_adapter_level(self) -> bool {
        matches!(
            self,
            Self::AdapterHang | Self::AdapterDma | Self::AdapterPower | Self::AdapterConfig
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RxOverrun => "rx overrun",
            Self::RxCrc => "rx crc",
            Self::RxFraming => "rx framing",
            Self::RxLength => "rx length",
            Self::TxCollisionExcess => "tx collision excess",
            Self::TxUnderrun => "tx underrun",
            Self::TxTimeout => "tx timeout",
            Self::TxJabber => "tx jabber",
            Self::AdapterHang => "adapter hang",
            Self::AdapterDma => "adapter dma",
            Self::AdapterPower => "adapter power",
            Self::AdapterConfig => "adapter config",
            Self::PoolExhausted => "pool exhausted",
            Self::QueueOverflow => "queue overflow",
            Self::HostBusyTimeout => "host busy timeout",
            Self::ProbeFailed => "probe failed",
            Self::VectorStolen => "vector stolen",
            Self::MediaLost => "media lost",
        };
        f.write_str(name)
    }
}

/// How bad an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Purely informational.
    Info,
    /// Counted, recovered from routinely.
    Warning,
    /// Demands recovery attention.
    Critical,
    /// Ends the NIC (or refuses the operation outright).
    Fatal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_are_dense_and_stable() {
        for (i, kind) in ErrorKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        assert_eq!(ErrorKind::ALL.len(), KIND_COUNT);
    }

    #[test]
    fn adapter_kinds_are_critical_by_default() {
        for kind in ErrorKind::ALL {
            if kind.is_adapter_level() {
                assert_eq!(kind.default_severity(), Severity::Critical);
            }
        }
    }
}
