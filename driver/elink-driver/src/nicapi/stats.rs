//! Per-NIC traffic counters.

/// Driver-maintained NIC counters.
///
/// The first seven fields mirror the wire statistics block applications can
/// request; the rest are driver-internal observability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NicStats {
    /// Frames received and delivered (or deliverable).
    pub rx_packets: u64,
    /// Frames transmitted.
    pub tx_packets: u64,
    /// Bytes received.
    pub rx_bytes: u64,
    /// Bytes transmitted.
    pub tx_bytes: u64,
    /// Receive-path errors.
    pub rx_errors: u64,
    /// Transmit-path errors.
    pub tx_errors: u64,
    /// Frames dropped for lack of buffers or handles.
    pub rx_dropped: u64,
    /// Frames sent through multi-fragment descriptors.
    pub sg_sends: u64,
    /// Frames consolidated into one linear buffer before sending.
    pub consolidations: u64,
    /// PAUSE frames received.
    pub pause_rx: u64,
    /// PAUSE frames transmitted.
    pub pause_tx: u64,
}
