//! Simulated port-I/O bus.
//!
//! Routes port accesses to attached [`SimDevice`]s, models the 8259 pair's
//! command/mask ports (recording the EOI sequence so tests can assert the
//! slave-first ordering), and collects interrupt events raised by devices.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use elink_core::sync::SpinLock;

use crate::intc::{PIC1_CMD, PIC1_DATA, PIC2_CMD, PIC2_DATA};
use crate::io::IoBus;

/// A device attached to the simulated bus.
///
/// Methods take `&self`; devices keep state behind their own locks, the same
/// way real hardware is indifferent to the CPU context that pokes it.
pub trait SimDevice: Send + Sync {
    /// True if this device decodes `port`.
    fn claims(&self, port: u16) -> bool;

    /// 8-bit read.
    fn read8(&self, port: u16) -> u8;

    /// 16-bit read.
    fn read16(&self, port: u16) -> u16;

    /// 8-bit write.
    fn write8(&self, port: u16, value: u8);

    /// 16-bit write.
    fn write16(&self, port: u16, value: u16);

    /// Takes a pending interrupt event (edge semantics): returns the IRQ
    /// line once per assertion.
    fn take_irq(&self) -> Option<u8>;
}

/// Recorded 8259 state: masks plus the ordered log of command-port writes.
#[derive(Default)]
struct PicModel {
    master_mask: u8,
    slave_mask: u8,
    /// (port, value) for every command-port write, in order.
    cmd_log: Vec<(u16, u8)>,
}

/// The simulated bus.
pub struct SimBus {
    devices: SpinLock<Vec<Arc<dyn SimDevice>>>,
    pic: SpinLock<PicModel>,
}

impl SimBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self {
            devices: SpinLock::new(Vec::new()),
            pic: SpinLock::new(PicModel::default()),
        }
    }

    /// Attaches a device.
    pub fn attach(&self, device: Arc<dyn SimDevice>) {
        self.devices.lock().push(device);
    }

    /// Returns one pending IRQ line, if any device is asserting.
    pub fn take_irq(&self) -> Option<u8> {
        let devices = self.devices.lock();
        devices.iter().find_map(|d| d.take_irq())
    }

    /// The ordered log of PIC command-port writes (EOIs).
    pub fn pic_cmd_log(&self) -> Vec<(u16, u8)> {
        self.pic.lock().cmd_log.clone()
    }

    /// Clears the PIC command log.
    pub fn clear_pic_log(&self) {
        self.pic.lock().cmd_log.clear();
    }

    fn pic_read(&self, port: u16) -> Option<u8> {
        let pic = self.pic.lock();
        match port {
            PIC1_DATA => Some(pic.master_mask),
            PIC2_DATA => Some(pic.slave_mask),
            PIC1_CMD | PIC2_CMD => Some(0),
            _ => None,
        }
    }

    fn pic_write(&self, port: u16, value: u8) -> bool {
        let mut pic = self.pic.lock();
        match port {
            PIC1_DATA => pic.master_mask = value,
            PIC2_DATA => pic.slave_mask = value,
            PIC1_CMD | PIC2_CMD => pic.cmd_log.push((port, value)),
            _ => return false,
        }
        true
    }

    fn with_claiming<R>(&self, port: u16, f: impl FnOnce(&dyn SimDevice) -> R) -> Option<R> {
        let devices = self.devices.lock();
        devices.iter().find(|d| d.claims(port)).map(|d| f(d.as_ref()))
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBus for SimBus {
    fn inb(&self, port: u16) -> u8 {
        if let Some(v) = self.pic_read(port) {
            return v;
        }
        // Undecoded ISA reads float high.
        self.with_claiming(port, |d| d.read8(port)).unwrap_or(0xFF)
    }

    fn inw(&self, port: u16) -> u16 {
        self.with_claiming(port, |d| d.read16(port))
            .unwrap_or(0xFFFF)
    }

    fn outb(&self, port: u16, value: u8) {
        if self.pic_write(port, value) {
            return;
        }
        self.with_claiming(port, |d| d.write8(port, value));
    }

    fn outw(&self, port: u16, value: u16) {
        self.with_claiming(port, |d| d.write16(port, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intc;

    #[test]
    fn unclaimed_ports_float_high() {
        let bus = SimBus::new();
        assert_eq!(bus.inb(0x300), 0xFF);
        assert_eq!(bus.inw(0x300), 0xFFFF);
    }

    #[test]
    fn pic_eoi_sequence_is_recorded() {
        let bus = SimBus::new();
        intc::eoi(&bus, 10);
        assert_eq!(
            bus.pic_cmd_log(),
            vec![(PIC2_CMD, 0x20), (PIC1_CMD, 0x20)]
        );
    }

    #[test]
    fn pic_masks_are_live() {
        let bus = SimBus::new();
        bus.outb(PIC1_DATA, 0xAB);
        assert_eq!(bus.inb(PIC1_DATA), 0xAB);
    }
}
