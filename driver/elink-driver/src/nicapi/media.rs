//! Media types and the EEPROM media-capability word.

/// A physical transceiver selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// 10baseT twisted pair (link-beat capable).
    TenBaseT,
    /// AUI (external transceiver).
    Aui,
    /// 10base2 thin coax.
    Bnc,
    /// MII-managed transceiver (100 Mbit parts).
    Mii,
}

/// Media capability bits as stored in the EEPROM media word.
pub mod media_caps {
    /// 10baseT present.
    pub const TP: u16 = 0x0001;
    /// AUI present.
    pub const AUI: u16 = 0x0002;
    /// 10base2 present.
    pub const BNC: u16 = 0x0004;
    /// MII present.
    pub const MII: u16 = 0x0008;
    /// Full duplex supported.
    pub const FDX: u16 = 0x0010;
    /// 100 Mbit supported.
    pub const MBIT_100: u16 = 0x0020;
}

impl MediaType {
    /// The capability bit a medium requires.
    #[must_use]
    pub fn required_cap(self) -> u16 {
        match self {
            Self::TenBaseT => media_caps::TP,
            Self::Aui => media_caps::AUI,
            Self::Bnc => media_caps::BNC,
            Self::Mii => media_caps::MII,
        }
    }

    /// Autodetection order: link-beat media first, then the passive ones.
    pub const DETECT_ORDER: [Self; 4] = [Self::Mii, Self::TenBaseT, Self::Aui, Self::Bnc];
}

impl core::fmt::Display for MediaType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::TenBaseT => "10baseT",
            Self::Aui => "AUI",
            Self::Bnc => "10base2",
            Self::Mii => "MII",
        };
        f.write_str(name)
    }
}
