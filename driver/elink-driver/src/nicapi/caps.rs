//! Per-NIC capability flags.

use bitflags::bitflags;

bitflags! {
    /// What a NIC can do, decided once at open (after the capability probe
    /// for bus-master parts) and read-only afterwards.
    ///
    /// Upper layers pick algorithms from these bits; they never branch on
    /// the variant identity itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CapabilityFlags: u16 {
        /// Host-programmed FIFO transfers.
        const DIRECT_PIO = 1 << 0;
        /// Bus-master descriptor-ring DMA.
        const BUS_MASTER = 1 << 1;
        /// MII transceiver management.
        const MII = 1 << 2;
        /// Multi-fragment transmit descriptors.
        const SCATTER_GATHER = 1 << 3;
        /// Hardware checksum offload.
        const HW_CHECKSUM = 1 << 4;
        /// Hardware VLAN tag insert/strip.
        const HW_VLAN = 1 << 5;
        /// Full-duplex operation.
        const FULL_DUPLEX = 1 << 6;
        /// 802.3x PAUSE flow control.
        const FLOW_CONTROL = 1 << 7;
        /// Wake-on-LAN.
        const WAKE_ON_LAN = 1 << 8;
        /// 100 Mbit/s operation.
        const MBIT_100 = 1 << 9;
    }
}

impl core::fmt::Display for CapabilityFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        bitflags::parser::to_writer(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pio_and_dma_are_distinct() {
        let pio = CapabilityFlags::DIRECT_PIO;
        let dma = CapabilityFlags::BUS_MASTER | CapabilityFlags::SCATTER_GATHER;
        assert!(!pio.intersects(dma));
        assert!(dma.contains(CapabilityFlags::SCATTER_GATHER));
    }
}
