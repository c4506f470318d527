//! Behavioral model of the 3C515 "Corkscrew" ISA bus-master NIC.
//!
//! Embeds the windowed [`El3Core`](super::el3) (so the PIO paths keep
//! working when bus mastering is distrusted) and adds the download/upload
//! descriptor engines: the device walks driver-built descriptor lists in
//! [`SimMemory`](super::mem::SimMemory), gathers fragments, loops frames
//! back or puts them on the wire, and uploads received frames into
//! driver-owned buffers.

extern crate alloc;

use alloc::sync::Arc;
use alloc::vec::Vec;

use elink_core::sync::SpinLock;

use super::bus::SimDevice;
use super::clock::SimClock;
use super::el3::{self, El3Core, eeprom};
use super::mem::SimMemory;

// ---------------------------------------------------------------------------
// Bus-master register offsets (relative to the I/O base)
// ---------------------------------------------------------------------------

/// DMA/packet status (read).
pub const R_PKT_STATUS: u16 = 0x400;
/// Download (TX) list pointer.
pub const R_DOWN_LIST_PTR: u16 = 0x404;
/// Upload (RX) packet status (read).
pub const R_UP_PKT_STATUS: u16 = 0x410;
/// Upload (RX) list pointer.
pub const R_UP_LIST_PTR: u16 = 0x418;

/// PKT_STATUS bit: the DMA engine reported a bus error.
pub const PKT_DMA_ERROR: u32 = 0x0000_0002;

// Descriptor field flags (shared contract with the driver).

/// Terminates a download fragment list.
pub const DN_LAST_FRAG: u32 = 0x8000_0000;
/// Upload status: descriptor complete.
pub const UP_COMPLETE: u32 = 0x0000_8000;
/// Upload status: error summary.
pub const UP_ERROR: u32 = 0x0000_4000;
/// Length mask for descriptor length fields.
pub const LEN_MASK: u32 = 0x0000_1FFF;

/// Upload error detail bits (16..20): overrun, runt, framing, CRC, oversize.
pub const UP_ERR_OVERRUN: u32 = 1 << 16;
/// Runt frame.
pub const UP_ERR_RUNT: u32 = 1 << 17;
/// Alignment error.
pub const UP_ERR_FRAMING: u32 = 1 << 18;
/// CRC error.
pub const UP_ERR_CRC: u32 = 1 << 19;
/// Oversized frame.
pub const UP_ERR_OVERSIZE: u32 = 1 << 20;

/// StartDMA opcode (<< 11); operand 0 = upload, 1 = download.
const OP_START_DMA: u16 = 20;

/// TX status underrun bit (matches the PIO TX status byte).
const TXS_UNDERRUN: u8 = 0x10;

// ---------------------------------------------------------------------------
// DMA engine state
// ---------------------------------------------------------------------------

#[derive(Default)]
struct DmaState {
    down_list_ptr: u32,
    up_list_ptr: u32,
    /// Next upload descriptor the engine will fill.
    up_next: u32,
    down_stalled: bool,
    up_stalled: bool,
    pkt_status: u32,
    // Write-assembly latches for the 32-bit registers.
    down_low: u16,
    up_low: u16,
    // Knobs.
    /// Engine ignores doorbells (registers don't stick).
    dead: bool,
    /// Corrupt every gathered byte once this many DMA bytes have moved.
    corrupt_after: Option<u64>,
    dma_bytes: u64,
    /// Ticks charged per processed frame.
    frame_cost: u64,
}

struct Inner {
    core: El3Core,
    dma: DmaState,
}

/// Software model of a 3C515 with its bus-master engines.
pub struct Sim3c515 {
    io_base: u16,
    mem: Arc<SimMemory>,
    clock: Arc<SimClock>,
    inner: SpinLock<Inner>,
}

impl Sim3c515 {
    /// Creates a model with the given I/O base, IRQ line, and MAC, attached
    /// to the shared physical memory and clock.
    #[must_use]
    pub fn new(
        io_base: u16,
        irq: u8,
        mac: [u8; 6],
        mem: Arc<SimMemory>,
        clock: Arc<SimClock>,
    ) -> Self {
        let caps = eeprom::MEDIA_TP | eeprom::MEDIA_MII | eeprom::MEDIA_FDX | eeprom::MEDIA_100;
        Self {
            io_base,
            mem,
            clock,
            inner: SpinLock::new(Inner {
                core: El3Core::new(irq, mac, eeprom::PRODUCT_3C515, caps),
                dma: DmaState {
                    frame_cost: 50,
                    ..DmaState::default()
                },
            }),
        }
    }

    /// The device's I/O base.
    #[must_use]
    pub fn io_base(&self) -> u16 {
        self.io_base
    }

    // -- knobs --------------------------------------------------------------

    /// Forces internal loopback regardless of MAC control.
    pub fn set_loopback(&self, on: bool) {
        self.inner.lock().core.knobs.loopback = on;
    }

    /// Sets link-beat presence.
    pub fn set_link_beat(&self, on: bool) {
        self.inner.lock().core.knobs.link_beat = on;
    }

    /// Stamps subsequent received frames with an RX error code.
    pub fn set_rx_error(&self, code: Option<u16>) {
        self.inner.lock().core.knobs.rx_error_code = code;
    }

    /// EEPROM never becomes ready.
    pub fn set_eeprom_dead(&self, dead: bool) {
        self.inner.lock().core.knobs.eeprom_dead = dead;
    }

    /// The DMA engine stops honoring list-pointer writes.
    pub fn set_dma_dead(&self, dead: bool) {
        self.inner.lock().dma.dead = dead;
    }

    /// Corrupts every DMA byte moved after `bytes` total bytes.
    pub fn set_corrupt_after(&self, bytes: Option<u64>) {
        let mut inner = self.inner.lock();
        inner.dma.corrupt_after = bytes;
        inner.dma.dma_bytes = 0;
    }

    /// Ticks charged against the clock per processed frame.
    pub fn set_frame_cost(&self, ticks: u64) {
        self.inner.lock().dma.frame_cost = ticks;
    }

    /// Raises an adapter failure with the DMA-error cause bit.
    pub fn trigger_dma_error(&self) {
        let mut inner = self.inner.lock();
        inner.dma.pkt_status |= PKT_DMA_ERROR;
        inner.core.raise(el3::ST_ADAPTER_FAILURE);
    }

    /// Frames the device has put on the wire (loopback off).
    pub fn tx_out(&self) -> Vec<Vec<u8>> {
        self.inner.lock().core.tx_out.clone()
    }

    /// Injects a frame from the wire: uploaded via DMA when the upload
    /// engine is armed, queued on the PIO FIFO otherwise.
    pub fn inject_rx(&self, frame: &[u8]) {
        let mut inner = self.inner.lock();
        if !inner.core.accepts(frame) {
            return;
        }
        self.deliver(&mut inner, frame);
    }

    // -- engine -------------------------------------------------------------

    fn deliver(&self, inner: &mut Inner, frame: &[u8]) {
        if inner.dma.up_list_ptr != 0 && !inner.dma.up_stalled {
            self.upload(inner, frame);
        } else {
            inner.core.queue_rx(frame);
        }
    }

    fn upload(&self, inner: &mut Inner, frame: &[u8]) {
        let desc = if inner.dma.up_next != 0 {
            inner.dma.up_next
        } else {
            inner.dma.up_list_ptr
        };
        let status = self.mem.read_u32(desc + 4);
        if status & UP_COMPLETE != 0 {
            // Sentinel slot not yet reclaimed by the host: drop.
            inner.core.stats.rx_overruns = inner.core.stats.rx_overruns.wrapping_add(1);
            return;
        }
        let buf_addr = self.mem.read_u32(desc + 8);
        let buf_len = (self.mem.read_u32(desc + 12) & LEN_MASK) as usize;
        let n = frame.len().min(buf_len);
        self.mem.write(buf_addr, &frame[..n]);
        inner.dma.dma_bytes += n as u64;

        let mut status = n as u32 | UP_COMPLETE;
        if let Some(code) = inner.core.knobs.rx_error_code {
            status |= UP_ERROR
                | match code {
                    el3::RXE_RUNT => UP_ERR_RUNT,
                    el3::RXE_FRAMING => UP_ERR_FRAMING,
                    el3::RXE_CRC => UP_ERR_CRC,
                    el3::RXE_OVERSIZE => UP_ERR_OVERSIZE,
                    _ => UP_ERR_OVERRUN,
                };
        } else {
            inner.core.stats.rx_frames_ok = inner.core.stats.rx_frames_ok.wrapping_add(1);
            inner.core.stats.rx_bytes_ok = inner.core.stats.rx_bytes_ok.wrapping_add(n as u16);
        }
        self.mem.write_u32(desc + 4, status);
        inner.dma.up_next = self.mem.read_u32(desc);
        inner.core.raise(el3::ST_UP_COMPLETE);
    }

    /// Walks the download list, transmitting each described frame.
    fn process_down(&self, inner: &mut Inner) {
        if inner.dma.dead || inner.dma.down_stalled {
            return;
        }
        let mut ptr = inner.dma.down_list_ptr;
        while ptr != 0 {
            let header = self.mem.read_u32(ptr + 4);
            let want = (header & LEN_MASK) as usize;

            let mut frame = Vec::with_capacity(want);
            let mut frag = ptr + 8;
            let mut underrun = false;
            for _ in 0..16 {
                let addr = self.mem.read_u32(frag);
                let flen_raw = self.mem.read_u32(frag + 4);
                let flen = (flen_raw & LEN_MASK) as usize;
                if flen == 0 {
                    underrun = true;
                } else {
                    let mut chunk = alloc::vec![0u8; flen];
                    self.mem.read(addr, &mut chunk);
                    for byte in &mut chunk {
                        inner.dma.dma_bytes += 1;
                        if let Some(limit) = inner.dma.corrupt_after {
                            if inner.dma.dma_bytes > limit {
                                *byte ^= 0x01;
                            }
                        }
                    }
                    frame.extend_from_slice(&chunk);
                }
                if flen_raw & DN_LAST_FRAG != 0 {
                    break;
                }
                frag += 8;
            }

            self.clock.advance(inner.dma.frame_cost);

            if underrun {
                // Recoverable fault: report, stop the engine mid-list.
                inner.core.push_tx_status(el3::TXS_COMPLETE | TXS_UNDERRUN);
                inner.dma.down_list_ptr = 0;
                inner.core.raise(el3::ST_DOWN_COMPLETE);
                return;
            }

            frame.truncate(want);
            inner.core.stats.tx_frames_ok = inner.core.stats.tx_frames_ok.wrapping_add(1);
            inner.core.stats.tx_bytes_ok =
                inner.core.stats.tx_bytes_ok.wrapping_add(frame.len() as u16);

            if inner.core.loopback_on() {
                if inner.core.accepts(&frame) {
                    self.deliver(inner, &frame);
                }
            } else {
                inner.core.tx_out.push(frame);
            }

            ptr = self.mem.read_u32(ptr);
        }
        inner.dma.down_list_ptr = 0;
        inner.core.raise(el3::ST_DOWN_COMPLETE);
    }

    fn dma_read16(&self, inner: &mut Inner, off: u16) -> u16 {
        let word32 = |v: u32, high: bool| {
            if high {
                (v >> 16) as u16
            } else {
                (v & 0xFFFF) as u16
            }
        };
        match off {
            R_PKT_STATUS => word32(inner.dma.pkt_status, false),
            0x402 => word32(inner.dma.pkt_status, true),
            R_DOWN_LIST_PTR => word32(inner.dma.down_list_ptr, false),
            0x406 => word32(inner.dma.down_list_ptr, true),
            R_UP_PKT_STATUS => word32(inner.dma.up_next_status(self), false),
            0x412 => word32(inner.dma.up_next_status(self), true),
            R_UP_LIST_PTR => word32(inner.dma.up_list_ptr, false),
            0x41A => word32(inner.dma.up_list_ptr, true),
            _ => 0,
        }
    }

    fn dma_write16(&self, inner: &mut Inner, off: u16, value: u16) {
        match off {
            R_DOWN_LIST_PTR => inner.dma.down_low = value,
            0x406 => {
                if !inner.dma.dead {
                    inner.dma.down_list_ptr =
                        u32::from(inner.dma.down_low) | (u32::from(value) << 16);
                    self.process_down(inner);
                }
            }
            R_UP_LIST_PTR => inner.dma.up_low = value,
            0x41A => {
                if !inner.dma.dead {
                    inner.dma.up_list_ptr = u32::from(inner.dma.up_low) | (u32::from(value) << 16);
                    inner.dma.up_next = inner.dma.up_list_ptr;
                }
            }
            _ => {}
        }
    }

    fn command_hook(&self, inner: &mut Inner, op: u16, arg: u16) {
        match op {
            0 => {
                // Total reset clears the DMA engine too.
                let knobs_keep = (inner.dma.dead, inner.dma.corrupt_after, inner.dma.frame_cost);
                inner.dma = DmaState {
                    dead: knobs_keep.0,
                    corrupt_after: knobs_keep.1,
                    frame_cost: knobs_keep.2,
                    ..DmaState::default()
                };
            }
            el3::OP_STALL_CTL => match arg {
                0 => inner.dma.up_stalled = true,
                1 => inner.dma.up_stalled = false,
                2 => inner.dma.down_stalled = true,
                3 => {
                    inner.dma.down_stalled = false;
                    if inner.dma.down_list_ptr != 0 {
                        self.process_down(inner);
                    }
                }
                _ => {}
            },
            OP_START_DMA => {
                if arg == 1 && inner.dma.down_list_ptr != 0 {
                    self.process_down(inner);
                }
            }
            _ => {}
        }
    }
}

impl DmaState {
    /// Status of the next upload descriptor (for UP_PKT_STATUS reads).
    fn up_next_status(&self, dev: &Sim3c515) -> u32 {
        if self.up_next == 0 {
            0
        } else {
            dev.mem.read_u32(self.up_next + 4)
        }
    }
}

impl SimDevice for Sim3c515 {
    fn claims(&self, port: u16) -> bool {
        (port >= self.io_base && port < self.io_base + 0x10)
            || (port >= self.io_base + 0x400 && port < self.io_base + 0x420)
    }

    fn read8(&self, port: u16) -> u8 {
        let off = port - self.io_base;
        let mut inner = self.inner.lock();
        if off >= 0x400 {
            let word = self.dma_read16(&mut inner, off & !1);
            (word >> ((off & 1) * 8)) as u8
        } else {
            inner.core.read8(off)
        }
    }

    fn read16(&self, port: u16) -> u16 {
        let off = port - self.io_base;
        let mut inner = self.inner.lock();
        if off >= 0x400 {
            self.dma_read16(&mut inner, off)
        } else {
            inner.core.read16(off)
        }
    }

    fn write8(&self, port: u16, value: u8) {
        let off = port - self.io_base;
        let mut inner = self.inner.lock();
        if off < 0x400 {
            inner.core.write8(off, value);
        }
    }

    fn write16(&self, port: u16, value: u16) {
        let off = port - self.io_base;
        let mut inner = self.inner.lock();
        if off >= 0x400 {
            self.dma_write16(&mut inner, off, value);
        } else if off == el3::CMD_STATUS {
            let (op, arg) = inner.core.command(value);
            self.command_hook(&mut inner, op, arg);
        } else {
            inner.core.write16(off, value);
        }
    }

    fn take_irq(&self) -> Option<u8> {
        self.inner.lock().core.take_irq()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dma::DmaArena;
    use crate::sim::mem::SimArena;

    fn setup() -> (Sim3c515, Arc<SimMemory>, SimArena) {
        let mem = SimMemory::new(1 << 20);
        let clock = Arc::new(SimClock::new());
        let dev = Sim3c515::new(0x280, 11, [0x00, 0x60, 0x97, 0xAA, 0xBB, 0xCC], mem.clone(), clock);
        let arena = SimArena::new(mem.clone());
        // Enable RX/TX, broadcast+station filter, all interrupts, loopback.
        dev.write16(0x280 + 0x0E, el3::OP_SET_RX_FILTER << 11 | 0x05);
        dev.write16(0x280 + 0x0E, 4 << 11); // RxEnable
        dev.write16(0x280 + 0x0E, 9 << 11); // TxEnable
        dev.write16(0x280 + 0x0E, 14 << 11 | 0x7FF);
        dev.set_loopback(true);
        (dev, mem, arena)
    }

    fn build_rx_ring(mem: &SimMemory, arena: &SimArena, slots: usize) -> (u32, Vec<u32>) {
        let base = arena.alloc((slots * 16) as u32, 8).unwrap();
        let mut bufs = Vec::new();
        for i in 0..slots {
            let desc = base + (i as u32) * 16;
            let buf = arena.alloc(1536, 4).unwrap();
            let next = base + (((i + 1) % slots) as u32) * 16;
            mem.write_u32(desc, next);
            mem.write_u32(desc + 4, 0);
            mem.write_u32(desc + 8, buf);
            mem.write_u32(desc + 12, 1536 | DN_LAST_FRAG);
            bufs.push(buf);
        }
        (base, bufs)
    }

    #[test]
    fn download_gathers_fragments_and_loops_back() {
        let (dev, mem, arena) = setup();
        let (rx_base, rx_bufs) = build_rx_ring(&mem, &arena, 4);
        dev.write16(0x280 + 0x418, (rx_base & 0xFFFF) as u16);
        dev.write16(0x280 + 0x41A, (rx_base >> 16) as u16);

        // Two-fragment frame: 14-byte broadcast header + 50 bytes payload.
        let frag_a = arena.alloc(14, 4).unwrap();
        let mut hdr = [0u8; 14];
        hdr[..6].copy_from_slice(&[0xFF; 6]);
        mem.write(frag_a, &hdr);
        let frag_b = arena.alloc(50, 4).unwrap();
        mem.write(frag_b, &[0x5A; 50]);

        let desc = arena.alloc(72, 8).unwrap();
        mem.write_u32(desc, 0);
        mem.write_u32(desc + 4, 64);
        mem.write_u32(desc + 8, frag_a);
        mem.write_u32(desc + 12, 14);
        mem.write_u32(desc + 16, frag_b);
        mem.write_u32(desc + 20, 50 | DN_LAST_FRAG);

        dev.write16(0x280 + 0x404, (desc & 0xFFFF) as u16);
        dev.write16(0x280 + 0x406, (desc >> 16) as u16);

        // Engine consumed the list.
        assert_eq!(dev.read16(0x280 + 0x404), 0);
        // The frame was uploaded into the first RX buffer.
        let status = mem.read_u32(rx_base + 4);
        assert_eq!(status & UP_COMPLETE, UP_COMPLETE);
        assert_eq!(status & LEN_MASK, 64);
        let mut got = [0u8; 64];
        mem.read(rx_bufs[0], &mut got);
        assert_eq!(&got[..6], &[0xFF; 6]);
        assert_eq!(&got[14..], &[0x5A; 50]);
        assert!(dev.take_irq().is_some());
    }

    #[test]
    fn zero_length_fragment_reports_underrun() {
        let (dev, mem, arena) = setup();
        let desc = arena.alloc(72, 8).unwrap();
        mem.write_u32(desc, 0);
        mem.write_u32(desc + 4, 60);
        mem.write_u32(desc + 8, 0x2000);
        mem.write_u32(desc + 12, DN_LAST_FRAG); // length 0
        dev.write16(0x280 + 0x404, (desc & 0xFFFF) as u16);
        dev.write16(0x280 + 0x406, (desc >> 16) as u16);
        // TX status carries the underrun bit.
        dev.write16(0x280 + 0x0E, 1 << 11 | 1); // window 1
        assert_eq!(dev.read8(0x280 + 0x0B) & TXS_UNDERRUN, TXS_UNDERRUN);
    }

    #[test]
    fn corruption_knob_flips_bits() {
        let (dev, mem, arena) = setup();
        let (rx_base, rx_bufs) = build_rx_ring(&mem, &arena, 4);
        dev.write16(0x280 + 0x418, (rx_base & 0xFFFF) as u16);
        dev.write16(0x280 + 0x41A, (rx_base >> 16) as u16);
        dev.set_corrupt_after(Some(0));

        let frag = arena.alloc(60, 4).unwrap();
        let mut frame = [0u8; 60];
        frame[..6].copy_from_slice(&[0xFF; 6]);
        mem.write(frag, &frame);
        let desc = arena.alloc(72, 8).unwrap();
        mem.write_u32(desc, 0);
        mem.write_u32(desc + 4, 60);
        mem.write_u32(desc + 8, frag);
        mem.write_u32(desc + 12, 60 | DN_LAST_FRAG);
        dev.write16(0x280 + 0x404, (desc & 0xFFFF) as u16);
        dev.write16(0x280 + 0x406, (desc >> 16) as u16);

        let mut got = [0u8; 6];
        mem.read(rx_bufs[0], &mut got);
        assert_eq!(&got, &[0xFE; 6]);
    }
}
