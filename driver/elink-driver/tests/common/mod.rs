//! Shared test harness: sim rigs, frame builders, and upcall capture.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use elink_driver::api::RxEvent;
use elink_driver::driver::PacketDriver;
use elink_driver::dispatch::vectors::ResidentEntries;
use elink_hal::host::FarPtr;
use elink_hal::sim::{Sim3c509, Sim3c515, SimArena, SimBus, SimClock, SimHost, SimMemory};

/// MAC programmed into every sim NIC.
pub const MAC: [u8; 6] = [0x00, 0x60, 0x97, 0x01, 0x02, 0x03];
/// PIO rig I/O base / IRQ.
pub const PIO_BASE: u16 = 0x300;
pub const PIO_IRQ: u8 = 10;
/// Bus-master rig I/O base / IRQ.
pub const DMA_BASE: u16 = 0x280;
pub const DMA_IRQ: u8 = 11;

/// Entry points the "installer" would burn into the resident image.
pub fn entries() -> ResidentEntries {
    ResidentEntries {
        api_entry: FarPtr::new(0xCAFE, 0x0010),
        irq_entry: FarPtr::new(0xCAFE, 0x0040),
    }
}

/// Everything a PIO test needs. The driver borrows these, so tests keep
/// the rig alive in a local.
pub struct PioRig {
    pub bus: SimBus,
    pub dev: Arc<Sim3c509>,
    pub host: SimHost,
    pub clock: SimClock,
    pub arena: SimArena,
}

pub fn pio_rig() -> PioRig {
    let bus = SimBus::new();
    let dev = Arc::new(Sim3c509::new(PIO_BASE, PIO_IRQ, MAC));
    bus.attach(dev.clone());
    PioRig {
        bus,
        dev,
        host: SimHost::new(),
        clock: SimClock::with_auto_step(50),
        arena: SimArena::new(SimMemory::new(1 << 20)),
    }
}

/// Everything a bus-master test needs.
pub struct DmaRig {
    pub bus: SimBus,
    pub dev: Arc<Sim3c515>,
    pub host: SimHost,
    pub clock: Arc<SimClock>,
    pub mem: Arc<SimMemory>,
    pub arena: SimArena,
}

pub fn dma_rig() -> DmaRig {
    let mem = SimMemory::new(1 << 20);
    let clock = Arc::new(SimClock::with_auto_step(50));
    let bus = SimBus::new();
    let dev = Arc::new(Sim3c515::new(
        DMA_BASE,
        DMA_IRQ,
        MAC,
        mem.clone(),
        clock.clone(),
    ));
    bus.attach(dev.clone());
    let arena = SimArena::new(mem.clone());
    DmaRig {
        bus,
        dev,
        host: SimHost::new(),
        clock,
        mem,
        arena,
    }
}

/// Dispatches every pending IRQ, then runs one idle pass.
pub fn pump(drv: &mut PacketDriver<'_>, bus: &SimBus) {
    while let Some(line) = bus.take_irq() {
        let _ = drv.hw_interrupt(line);
    }
    drv.on_idle();
}

/// Builds an Ethernet frame: broadcast dst, our MAC src, given ethertype.
pub fn frame(ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut f = Vec::with_capacity(14 + payload.len());
    f.extend_from_slice(&[0xFF; 6]);
    f.extend_from_slice(&MAC);
    f.extend_from_slice(&ethertype.to_be_bytes());
    f.extend_from_slice(payload);
    f
}

// ---------------------------------------------------------------------------
// Upcall capture: fn-pointer receivers record into a cookie-keyed registry.
// ---------------------------------------------------------------------------

type Captured = Vec<(u16, Vec<u8>)>;

fn registry() -> &'static Mutex<HashMap<usize, Captured>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Captured>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The receive upcall every test registers.
pub fn capture_upcall(cookie: usize, event: &RxEvent<'_>) {
    registry()
        .lock()
        .unwrap()
        .entry(cookie)
        .or_default()
        .push((event.handle, event.frame.to_vec()));
}

/// Frames delivered to `cookie` so far.
pub fn captured(cookie: usize) -> Captured {
    registry()
        .lock()
        .unwrap()
        .get(&cookie)
        .cloned()
        .unwrap_or_default()
}

/// Forgets everything delivered to `cookie`.
pub fn clear_captured(cookie: usize) {
    registry().lock().unwrap().remove(&cookie);
}
