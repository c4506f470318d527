//! 3Com EtherLink III family drivers.
//!
//! The device database keys (product id, revision) to an operation table,
//! base capabilities, default media, and quirk flags. [`open_nic`] walks the
//! open sequence: global reset, EEPROM identification, database match,
//! pool construction, the bus-master capability probe where it applies, and
//! finally the variant's own `open`.

pub mod corkscrew;
pub mod el3;
pub mod probe;
pub mod regs;
pub mod rings;

use elink_core::{dinfo, dwarn};

use crate::buffer::BufferPool;
use crate::config::{BusmasterMode, NicConfig, StartConfig};
use crate::nicapi::ops::{NicOps, OpCtx};
use crate::nicapi::probe_report::Confidence;
use crate::nicapi::{
    CapabilityFlags, MacAddr, MediaType, Nic, NicDescriptor, NicId, NicState, QuirkFlags,
    VariantState,
};
use crate::recover::kinds::ErrorKind;

/// One row of the device database.
pub struct DeviceEntry {
    /// Bits of the product id that must match.
    pub product_mask: u16,
    /// Expected value under the mask.
    pub product_match: u16,
    /// Human-readable variant name.
    pub name: &'static str,
    /// Packet-driver interface type reported by `driver_info`.
    pub if_type: u16,
    /// PIO operation table (every variant has one).
    pub pio_ops: &'static NicOps,
    /// Bus-master operation table, if the silicon has the engine.
    pub dma_ops: Option<&'static NicOps>,
    /// Capabilities before any probe verdict.
    pub base_caps: CapabilityFlags,
    /// Medium used when configuration does not choose.
    pub default_media: MediaType,
    /// Variant quirks.
    pub quirks: QuirkFlags,
}

/// The family database. Tables are process-wide constants.
pub static DEVICE_DB: [DeviceEntry; 2] = [
    DeviceEntry {
        product_mask: 0xFF00,
        product_match: 0x9000,
        name: "3C509B",
        if_type: 1,
        pio_ops: &el3::EL3_PIO_OPS,
        dma_ops: None,
        base_caps: CapabilityFlags::DIRECT_PIO,
        default_media: MediaType::TenBaseT,
        quirks: QuirkFlags::SET_MAC_ALLOWED,
    },
    DeviceEntry {
        product_mask: 0xFFFF,
        product_match: 0x5051,
        name: "3C515",
        if_type: 2,
        pio_ops: &el3::EL3_PIO_OPS,
        dma_ops: Some(&corkscrew::CORKSCREW_DMA_OPS),
        base_caps: CapabilityFlags::DIRECT_PIO
            .union(CapabilityFlags::BUS_MASTER)
            .union(CapabilityFlags::SCATTER_GATHER)
            .union(CapabilityFlags::MII)
            .union(CapabilityFlags::FULL_DUPLEX)
            .union(CapabilityFlags::FLOW_CONTROL)
            .union(CapabilityFlags::MBIT_100),
        default_media: MediaType::Mii,
        quirks: QuirkFlags::SET_MAC_ALLOWED,
    },
];

/// Finds the database row for an EEPROM product id.
#[must_use]
pub fn lookup(product: u16) -> Option<&'static DeviceEntry> {
    DEVICE_DB
        .iter()
        .find(|e| product & e.product_mask == e.product_match)
}

/// Capabilities left when bus mastering is distrusted.
fn pio_caps(base: CapabilityFlags) -> CapabilityFlags {
    (base - (CapabilityFlags::BUS_MASTER | CapabilityFlags::SCATTER_GATHER))
        | CapabilityFlags::DIRECT_PIO
}

/// Opens the NIC described by `niccfg` as driver NIC `id`.
pub fn open_nic(
    octx: &mut OpCtx<'_>,
    cfg: &StartConfig,
    niccfg: &NicConfig,
    id: NicId,
) -> Result<Nic, ErrorKind> {
    let ports = regs::El3Ports::new(octx.io, niccfg.io_base);
    let mut window = 0u8;
    ports.cmd_wait(octx.clock, regs::OP_TOTAL_RESET, 0)?;

    // Identify the part before touching anything else.
    let mut mac = [0u8; 6];
    for word in 0..3u8 {
        let w = el3::eeprom_read_word(&ports, octx.clock, &mut window, word)?;
        mac[usize::from(word) * 2] = (w >> 8) as u8;
        mac[usize::from(word) * 2 + 1] = (w & 0xFF) as u8;
    }
    let mfr = el3::eeprom_read_word(&ports, octx.clock, &mut window, regs::eeprom_words::MFR)?;
    if mfr != regs::eeprom_words::MFR_3COM {
        return Err(ErrorKind::AdapterConfig);
    }
    let product =
        el3::eeprom_read_word(&ports, octx.clock, &mut window, regs::eeprom_words::PRODUCT)?;
    let media_caps =
        el3::eeprom_read_word(&ports, octx.clock, &mut window, regs::eeprom_words::MEDIA)?;

    let entry = lookup(product).ok_or(ErrorKind::AdapterConfig)?;

    let pool = BufferPool::new(
        id,
        octx.arena,
        cfg.small_buf_count,
        cfg.large_buf_count,
        cfg.pool_bytes_limit,
    )?;

    // Probe-or-trust decision, frozen for the NIC's lifetime.
    let mut report = None;
    let use_dma = match (entry.dma_ops, cfg.busmaster) {
        (None, _) | (_, BusmasterMode::Off) => false,
        (Some(_), BusmasterMode::On) => true,
        (Some(_), BusmasterMode::Auto) => {
            let env = probe::ProbeEnv {
                io: octx.io,
                arena: octx.arena,
                clock: octx.clock,
                io_base: niccfg.io_base,
            };
            let r = probe::run(&env, &cfg.probe_thresholds, cfg.probe_quick);
            let trusted = r.safe_for_production;
            if matches!(r.confidence, Confidence::Failed) {
                octx.record(id, ErrorKind::ProbeFailed);
                dwarn!("nic {id}: busmaster probe failed (score {}), forcing PIO", r.total);
            }
            report = Some(r);
            trusted
        }
    };

    let (ops, caps) = if use_dma {
        (
            entry.dma_ops.unwrap_or(entry.pio_ops),
            entry.base_caps | CapabilityFlags::BUS_MASTER,
        )
    } else {
        (entry.pio_ops, pio_caps(entry.base_caps))
    };

    let mut nic = Nic {
        desc: NicDescriptor {
            id,
            name: entry.name,
            product_id: product,
            revision: (product & 0x000F) as u8,
            io_base: niccfg.io_base,
            irq: niccfg.irq,
            mac: MacAddr(mac),
            media_caps,
            media: entry.default_media,
            link_up: false,
            speed_mbps: 10,
            caps,
        },
        state: NicState::Closed,
        ops,
        quirks: entry.quirks,
        db: entry,
        window_cache: 0,
        pool,
        stats: Default::default(),
        err: Default::default(),
        recovery: Default::default(),
        probe: report,
        pause: Default::default(),
        rcv_mode: cfg.rcv_mode_default,
        last_failure: None,
        cfg_media: niccfg.media,
        cfg_loopback: niccfg.loopback,
        copy_break: cfg.copy_break,
        variant: VariantState::Pio,
    };

    (nic.ops.open)(&mut nic, octx)?;
    dinfo!(
        "nic {id}: {} at {:#05x} irq {} mac {} ({})",
        entry.name,
        niccfg.io_base,
        niccfg.irq,
        nic.desc.mac,
        if nic.uses_dma() { "busmaster" } else { "pio" },
    );
    Ok(nic)
}

/// Re-opens a NIC after a `Reinitialize` recovery: full EEPROM re-read and
/// media re-select. The original probe verdict still gates DMA — a frozen
/// `Failed` report is never overridden here.
pub fn reopen_nic(
    nic: &mut Nic,
    octx: &mut OpCtx<'_>,
    cfg: &StartConfig,
) -> Result<(), ErrorKind> {
    (nic.ops.close)(nic, octx);

    let ports = regs::El3Ports::new(octx.io, nic.desc.io_base);
    let mut window = 0u8;
    ports.cmd_wait(octx.clock, regs::OP_TOTAL_RESET, 0)?;

    // EEPROM re-read: the adapter may have been power-cycled under us.
    let mut mac = [0u8; 6];
    for word in 0..3u8 {
        let w = el3::eeprom_read_word(&ports, octx.clock, &mut window, word)?;
        mac[usize::from(word) * 2] = (w >> 8) as u8;
        mac[usize::from(word) * 2 + 1] = (w & 0xFF) as u8;
    }
    nic.desc.mac = MacAddr(mac);
    nic.desc.media_caps =
        el3::eeprom_read_word(&ports, octx.clock, &mut window, regs::eeprom_words::MEDIA)?;
    nic.window_cache = 0;

    if cfg.recovery.reprobe_on_reinit
        && nic.db.dma_ops.is_some()
        && cfg.busmaster == BusmasterMode::Auto
    {
        let env = probe::ProbeEnv {
            io: octx.io,
            arena: octx.arena,
            clock: octx.clock,
            io_base: nic.desc.io_base,
        };
        let report = probe::run(&env, &cfg.probe_thresholds, true);
        let trusted = report.safe_for_production;
        nic.probe = Some(report);
        if trusted {
            nic.ops = nic.db.dma_ops.unwrap_or(nic.db.pio_ops);
            nic.desc.caps = nic.db.base_caps | CapabilityFlags::BUS_MASTER;
        } else {
            nic.ops = nic.db.pio_ops;
            nic.desc.caps = pio_caps(nic.db.base_caps);
        }
    } else if nic.probe.is_some_and(|r| !r.safe_for_production) {
        // The frozen verdict keeps DMA off.
        nic.ops = nic.db.pio_ops;
        nic.desc.caps = pio_caps(nic.db.base_caps);
    }

    (nic.ops.open)(nic, octx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_matches_both_variants() {
        assert_eq!(lookup(0x9050).unwrap().name, "3C509B");
        assert_eq!(lookup(0x90F7).unwrap().name, "3C509B");
        assert_eq!(lookup(0x5051).unwrap().name, "3C515");
        assert!(lookup(0x1234).is_none());
    }

    #[test]
    fn pio_fallback_strips_bus_master_caps() {
        let entry = lookup(0x5051).unwrap();
        let caps = pio_caps(entry.base_caps);
        assert!(caps.contains(CapabilityFlags::DIRECT_PIO));
        assert!(!caps.contains(CapabilityFlags::BUS_MASTER));
        assert!(!caps.contains(CapabilityFlags::SCATTER_GATHER));
        assert!(caps.contains(CapabilityFlags::MBIT_100));
    }
}
