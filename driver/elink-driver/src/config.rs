//! Validated start-up configuration.
//!
//! The external loader parses whatever it parses and hands the core one
//! typed [`StartConfig`]. The core never sees text; it validates the values
//! once at install and treats them as constants afterwards.

use core::fmt;

use elink_core::log::LogLevel;

use crate::buffer::SMALL_BUF_BYTES;
use crate::nicapi::probe_report::ProbeThresholds;
use crate::nicapi::{MAX_NICS, MediaType, RcvMode};
use crate::recover::engine::RecoveryPolicy;

/// Bus-master policy for DMA-capable NICs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusmasterMode {
    /// Run the capability probe and believe its verdict.
    Auto,
    /// Skip the probe and trust the silicon (explicit user opt-in).
    On,
    /// Never bus-master; PIO only.
    Off,
}

/// Per-NIC configuration.
#[derive(Debug, Clone, Copy)]
pub struct NicConfig {
    /// I/O window base.
    pub io_base: u16,
    /// IRQ line.
    pub irq: u8,
    /// Medium to select (`None` = autodetect).
    pub media: Option<MediaType>,
    /// Open in internal loopback (diagnostics).
    pub loopback: bool,
}

/// Configuration faults the validator reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No NIC configured at all.
    NoNics,
    /// An I/O base is zero or below the ISA expansion range.
    BadIoBase,
    /// An IRQ line outside 2..=15.
    BadIrq,
    /// Two NICs share an I/O window.
    IoBaseClash,
    /// Copy-break threshold larger than a small buffer.
    BadCopyBreak,
    /// Pool geometry is unusable (zero buffers or limit below minimum).
    BadPool,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNics => f.write_str("no NIC configured"),
            Self::BadIoBase => f.write_str("bad I/O base"),
            Self::BadIrq => f.write_str("bad IRQ line"),
            Self::IoBaseClash => f.write_str("I/O bases overlap"),
            Self::BadCopyBreak => f.write_str("copy-break exceeds small buffer"),
            Self::BadPool => f.write_str("unusable pool geometry"),
        }
    }
}

/// The validated driver configuration.
#[derive(Debug, Clone, Copy)]
pub struct StartConfig {
    /// Configured NICs, densely packed from index 0.
    pub nics: [Option<NicConfig>; MAX_NICS],
    /// Bus-master policy.
    pub busmaster: BusmasterMode,
    /// Short capability probe (seconds instead of tens of seconds).
    pub probe_quick: bool,
    /// Probe confidence thresholds.
    pub probe_thresholds: ProbeThresholds,
    /// Receive mode new handles start in.
    pub rcv_mode_default: RcvMode,
    /// Byte quota per NIC pool.
    pub pool_bytes_limit: u32,
    /// Floor the balancer may never cross.
    pub pool_min_bytes: u32,
    /// Small buffers per NIC.
    pub small_buf_count: u8,
    /// Large buffers per NIC.
    pub large_buf_count: u8,
    /// Copy-break threshold in bytes.
    pub copy_break: u16,
    /// Interrupt vector for the packet-driver API.
    pub api_vector: u8,
    /// Multiplex identifier (installation-check interface).
    pub multiplex_id: u8,
    /// TX stall watchdog interval, microseconds.
    pub tx_watchdog_micros: u64,
    /// Recovery thresholds and budgets.
    pub recovery: RecoveryPolicy,
    /// Log verbosity handed to the sink.
    pub log_level: LogLevel,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            nics: [None; MAX_NICS],
            busmaster: BusmasterMode::Auto,
            probe_quick: false,
            probe_thresholds: ProbeThresholds::default(),
            rcv_mode_default: RcvMode::Broadcast,
            pool_bytes_limit: 32 * 1024,
            pool_min_bytes: 8 * 1024,
            small_buf_count: 16,
            large_buf_count: 20,
            copy_break: 200,
            api_vector: 0x60,
            multiplex_id: 0xC8,
            tx_watchdog_micros: 500_000,
            recovery: RecoveryPolicy::default(),
            log_level: LogLevel::Info,
        }
    }
}

impl StartConfig {
    /// Checks the configuration for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_bases = [0u16; MAX_NICS];
        let mut count = 0;
        for nic in self.nics.iter().flatten() {
            if nic.io_base < 0x100 {
                return Err(ConfigError::BadIoBase);
            }
            if !(2..=15).contains(&nic.irq) {
                return Err(ConfigError::BadIrq);
            }
            if seen_bases[..count].contains(&nic.io_base) {
                return Err(ConfigError::IoBaseClash);
            }
            seen_bases[count] = nic.io_base;
            count += 1;
        }
        if count == 0 {
            return Err(ConfigError::NoNics);
        }
        if self.copy_break > SMALL_BUF_BYTES {
            return Err(ConfigError::BadCopyBreak);
        }
        if self.small_buf_count == 0
            || self.large_buf_count == 0
            || self.pool_bytes_limit < self.pool_min_bytes
        {
            return Err(ConfigError::BadPool);
        }
        Ok(())
    }

    /// Convenience: a single-NIC configuration with defaults.
    #[must_use]
    pub fn one_nic(io_base: u16, irq: u8) -> Self {
        let mut cfg = Self::default();
        cfg.nics[0] = Some(NicConfig {
            io_base,
            irq,
            media: None,
            loopback: false,
        });
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_single_nic_validates() {
        let cfg = StartConfig::one_nic(0x300, 10);
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn empty_configuration_is_refused() {
        let cfg = StartConfig::default();
        assert_eq!(cfg.validate(), Err(ConfigError::NoNics));
    }

    #[test]
    fn clashing_bases_are_refused() {
        let mut cfg = StartConfig::one_nic(0x300, 10);
        cfg.nics[1] = Some(NicConfig {
            io_base: 0x300,
            irq: 11,
            media: None,
            loopback: false,
        });
        assert_eq!(cfg.validate(), Err(ConfigError::IoBaseClash));
    }

    #[test]
    fn copy_break_cannot_exceed_small_buffers() {
        let mut cfg = StartConfig::one_nic(0x300, 10);
        cfg.copy_break = SMALL_BUF_BYTES + 1;
        assert_eq!(cfg.validate(), Err(ConfigError::BadCopyBreak));
    }
}
