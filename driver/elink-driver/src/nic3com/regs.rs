//! EtherLink III register model: windows, commands, status words.
//!
//! Both variants share the windowed command/status scheme; the Corkscrew
//! adds the bus-master registers at `base + 0x400`. Window changes go
//! through the software window cache and a critical section so a nested
//! ISR entry can never observe a half-switched window.

use elink_core::sync::critical;
use elink_hal::clock::{Clock, poll_until};
use elink_hal::io::IoBus;

use crate::recover::kinds::ErrorKind;

/// Command (write) / status (read) register offset.
pub const CMD_STATUS: u16 = 0x0E;

// ---------------------------------------------------------------------------
// Command opcodes (shifted into bits 11–15; operand in bits 0–10)
// ---------------------------------------------------------------------------

/// Global reset.
pub const OP_TOTAL_RESET: u16 = 0;
/// Select a register window (operand = window).
pub const OP_SELECT_WINDOW: u16 = 1;
/// Disable the receiver.
pub const OP_RX_DISABLE: u16 = 3;
/// Enable the receiver.
pub const OP_RX_ENABLE: u16 = 4;
/// Reset the receive engine.
pub const OP_RX_RESET: u16 = 5;
/// Stall/unstall the bus-master engines (operand = stall code).
pub const OP_STALL_CTL: u16 = 6;
/// Discard the frame at the head of the RX FIFO.
pub const OP_RX_DISCARD: u16 = 8;
/// Enable the transmitter.
pub const OP_TX_ENABLE: u16 = 9;
/// Disable the transmitter.
pub const OP_TX_DISABLE: u16 = 10;
/// Reset the transmit engine.
pub const OP_TX_RESET: u16 = 11;
/// Acknowledge interrupt status bits (operand = bits).
pub const OP_ACK_INTR: u16 = 13;
/// Set the interrupt-enable mask (operand = bits).
pub const OP_SET_INTR_ENB: u16 = 14;
/// Set the status-enable mask (operand = bits).
pub const OP_SET_STATUS_ENB: u16 = 15;
/// Program the receive filter (operand = filter bits).
pub const OP_SET_RX_FILTER: u16 = 16;
/// Start a bus-master transfer (operand 0 = upload, 1 = download).
pub const OP_START_DMA: u16 = 20;

/// Builds a command word.
#[must_use]
pub const fn cmd_word(op: u16, operand: u16) -> u16 {
    (op << 11) | (operand & 0x07FF)
}

// Stall operands.
/// Stall the upload engine.
pub const STALL_UP: u16 = 0;
/// Unstall the upload engine.
pub const UNSTALL_UP: u16 = 1;
/// Stall the download engine.
pub const STALL_DOWN: u16 = 2;
/// Unstall the download engine.
pub const UNSTALL_DOWN: u16 = 3;

// ---------------------------------------------------------------------------
// Status word bits
// ---------------------------------------------------------------------------

/// An enabled interrupt is latched.
pub const ST_INT_LATCH: u16 = 0x0001;
/// Adapter-level failure.
pub const ST_ADAPTER_FAILURE: u16 = 0x0002;
/// A transmit completed (status byte available).
pub const ST_TX_COMPLETE: u16 = 0x0004;
/// TX FIFO has room past the threshold.
pub const ST_TX_AVAILABLE: u16 = 0x0008;
/// A frame is waiting in the RX FIFO.
pub const ST_RX_COMPLETE: u16 = 0x0010;
/// The statistics counters want a read-out.
pub const ST_STATS_FULL: u16 = 0x0080;
/// Download (TX DMA) list consumed.
pub const ST_DOWN_COMPLETE: u16 = 0x0200;
/// Upload (RX DMA) descriptor filled.
pub const ST_UP_COMPLETE: u16 = 0x0400;
/// A command is still executing.
pub const ST_CMD_IN_PROGRESS: u16 = 0x1000;

/// Interrupt sources the driver enables on the PIO variant.
pub const PIO_INT_MASK: u16 =
    ST_INT_LATCH | ST_ADAPTER_FAILURE | ST_TX_COMPLETE | ST_RX_COMPLETE | ST_STATS_FULL;

/// Interrupt sources the driver enables when bus mastering.
pub const DMA_INT_MASK: u16 =
    ST_INT_LATCH | ST_ADAPTER_FAILURE | ST_TX_COMPLETE | ST_DOWN_COMPLETE | ST_UP_COMPLETE;

// ---------------------------------------------------------------------------
// Receive filter bits
// ---------------------------------------------------------------------------

/// Frames addressed to the station.
pub const FILT_STATION: u16 = 0x01;
/// Multicast frames.
pub const FILT_MULTICAST: u16 = 0x02;
/// Broadcast frames.
pub const FILT_BROADCAST: u16 = 0x04;
/// All frames.
pub const FILT_PROMISC: u16 = 0x08;

// ---------------------------------------------------------------------------
// Window 0: configuration / EEPROM
// ---------------------------------------------------------------------------

/// EEPROM command register (window 0).
pub const W0_EEPROM_CMD: u16 = 0x0A;
/// EEPROM data register (window 0).
pub const W0_EEPROM_DATA: u16 = 0x0C;
/// EEPROM read opcode (or-ed with the word address).
pub const EEPROM_READ: u16 = 0x80;
/// EEPROM busy bit in the command register.
pub const EEPROM_BUSY: u16 = 0x8000;

/// EEPROM words the driver consumes.
pub mod eeprom_words {
    /// Station address, words 0–2, MSB first within each word.
    pub const MAC0: u8 = 0;
    /// Product id.
    pub const PRODUCT: u8 = 3;
    /// Manufacturer id.
    pub const MFR: u8 = 7;
    /// Media capabilities.
    pub const MEDIA: u8 = 8;
    /// 3Com's manufacturer id.
    pub const MFR_3COM: u16 = 0x6D50;
}

// ---------------------------------------------------------------------------
// Window 1: operation
// ---------------------------------------------------------------------------

/// TX FIFO (write) / RX FIFO (read) data port.
pub const W1_FIFO: u16 = 0x00;
/// RX status word.
pub const W1_RX_STATUS: u16 = 0x08;
/// TX status byte (write pops the stack).
pub const W1_TX_STATUS: u16 = 0x0B;
/// Free bytes in the TX FIFO.
pub const W1_TX_FREE: u16 = 0x0C;

/// RX status: no frame ready.
pub const RXS_INCOMPLETE: u16 = 0x8000;
/// RX status: the frame is damaged; the code field says how.
pub const RXS_ERROR: u16 = 0x4000;
/// RX status length mask.
pub const RXS_LEN_MASK: u16 = 0x07FF;

/// Decodes the RX status error code into the taxonomy.
#[must_use]
pub fn rx_error_kind(status: u16) -> ErrorKind {
    match (status >> 11) & 0x7 {
        1 => ErrorKind::RxLength,  // runt
        2 => ErrorKind::RxFraming, // alignment
        3 => ErrorKind::RxCrc,
        4 => ErrorKind::RxLength, // oversize
        _ => ErrorKind::RxOverrun,
    }
}

/// TX status: complete.
pub const TXS_COMPLETE: u8 = 0x80;
/// TX status: jabber.
pub const TXS_JABBER: u8 = 0x20;
/// TX status: FIFO underrun.
pub const TXS_UNDERRUN: u8 = 0x10;
/// TX status: gave up after sixteen collisions.
pub const TXS_MAX_COLLISIONS: u8 = 0x08;

// ---------------------------------------------------------------------------
// Window 2: station address. Window 3: MAC control. Window 4: media.
// ---------------------------------------------------------------------------

/// First station-address byte (window 2, bytes 0–5).
pub const W2_STATION: u16 = 0x00;
/// MAC control register (window 3).
pub const W3_MAC_CONTROL: u16 = 0x06;
/// MAC control: internal loopback.
pub const MACCTL_LOOPBACK: u16 = 0x0002;
/// Media status/control register (window 4).
pub const W4_MEDIA: u16 = 0x0A;
/// Media: enable jabber guard.
pub const MEDIA_JABBER_GUARD: u16 = 0x0040;
/// Media: enable link-beat check.
pub const MEDIA_LINK_BEAT_ENABLE: u16 = 0x0080;
/// Media: link beat detected (read-only).
pub const MEDIA_LINK_DETECT: u16 = 0x0800;

// ---------------------------------------------------------------------------
// Window 6: statistics (read-to-clear)
// ---------------------------------------------------------------------------

/// Carrier-lost events (byte).
pub const W6_CARRIER_LOST: u16 = 0x00;
/// RX overruns (byte).
pub const W6_RX_OVERRUNS: u16 = 0x05;
/// Good frames transmitted (byte).
pub const W6_TX_FRAMES: u16 = 0x06;
/// Good frames received (byte).
pub const W6_RX_FRAMES: u16 = 0x07;

// ---------------------------------------------------------------------------
// Corkscrew bus-master registers (base + 0x400)
// ---------------------------------------------------------------------------

/// DMA/packet status.
pub const DMA_PKT_STATUS: u16 = 0x400;
/// Download (TX) list pointer.
pub const DMA_DOWN_LIST_PTR: u16 = 0x404;
/// Upload (RX) packet status.
pub const DMA_UP_PKT_STATUS: u16 = 0x410;
/// Upload (RX) list pointer.
pub const DMA_UP_LIST_PTR: u16 = 0x418;
/// PKT_STATUS: the engine hit a bus error.
pub const PKT_DMA_ERROR: u32 = 0x0000_0002;

/// Terminates a download fragment list.
pub const DN_LAST_FRAG: u32 = 0x8000_0000;
/// Upload status: descriptor complete.
pub const UP_COMPLETE: u32 = 0x0000_8000;
/// Upload status: error summary.
pub const UP_ERROR: u32 = 0x0000_4000;
/// Descriptor length mask.
pub const LEN_MASK: u32 = 0x0000_1FFF;

/// Decodes upload error detail bits into the taxonomy.
#[must_use]
pub fn up_error_kind(status: u32) -> ErrorKind {
    if status & (1 << 19) != 0 {
        ErrorKind::RxCrc
    } else if status & (1 << 18) != 0 {
        ErrorKind::RxFraming
    } else if status & ((1 << 17) | (1 << 20)) != 0 {
        ErrorKind::RxLength
    } else {
        ErrorKind::RxOverrun
    }
}

// ---------------------------------------------------------------------------
// Port accessor
// ---------------------------------------------------------------------------

/// Microseconds a command may run before the adapter counts as hung.
pub const CMD_TIMEOUT_MICROS: u64 = 10_000;

/// Typed access to one NIC's I/O window.
pub struct El3Ports<'a> {
    /// The bus.
    pub io: &'a dyn IoBus,
    /// The NIC's I/O base.
    pub base: u16,
}

impl<'a> El3Ports<'a> {
    /// Creates an accessor for `base`.
    #[must_use]
    pub fn new(io: &'a dyn IoBus, base: u16) -> Self {
        Self { io, base }
    }

    /// Issues a command without waiting.
    pub fn cmd(&self, op: u16, operand: u16) {
        self.io.outw(self.base + CMD_STATUS, cmd_word(op, operand));
    }

    /// Issues a command and waits (bounded) for completion.
    pub fn cmd_wait(&self, clock: &dyn Clock, op: u16, operand: u16) -> Result<(), ErrorKind> {
        self.cmd(op, operand);
        poll_until(clock, CMD_TIMEOUT_MICROS, || {
            (self.status() & ST_CMD_IN_PROGRESS == 0).then_some(())
        })
        .ok_or(ErrorKind::AdapterHang)
    }

    /// Reads the status word.
    #[must_use]
    pub fn status(&self) -> u16 {
        self.io.inw(self.base + CMD_STATUS)
    }

    /// Selects `window`, going to the hardware only on a real change. The
    /// change happens inside a critical section so a nested ISR entry sees
    /// either the old or the new window, never a torn switch.
    pub fn select_window(&self, cache: &mut u8, window: u8) {
        if *cache == window {
            return;
        }
        critical::with(|| {
            self.cmd(OP_SELECT_WINDOW, u16::from(window));
            *cache = window;
        });
    }

    /// 16-bit register read at `offset` in the current window.
    #[must_use]
    pub fn rd16(&self, offset: u16) -> u16 {
        self.io.inw(self.base + offset)
    }

    /// 16-bit register write.
    pub fn wr16(&self, offset: u16, value: u16) {
        self.io.outw(self.base + offset, value);
    }

    /// 8-bit register read.
    #[must_use]
    pub fn rd8(&self, offset: u16) -> u8 {
        self.io.inb(self.base + offset)
    }

    /// 8-bit register write.
    pub fn wr8(&self, offset: u16, value: u8) {
        self.io.outb(self.base + offset, value);
    }

    /// 32-bit register read (bus-master registers).
    #[must_use]
    pub fn rd32(&self, offset: u16) -> u32 {
        self.io.inl(self.base + offset)
    }

    /// 32-bit register write (bus-master registers).
    pub fn wr32(&self, offset: u16, value: u32) {
        self.io.outl(self.base + offset, value);
    }
}
