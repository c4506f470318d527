//! Bus-master descriptor rings.
//!
//! Sixteen slots per direction, tracked by two monotonic counters: `cur`
//! (producer) and `dirty` (consumer). The active slot is the counter modulo
//! the ring size, a slot is device-owned while `dirty <= i < cur`, and
//! `cur - dirty` never exceeds fifteen — one slot always stays open as the
//! sentinel.
//!
//! The zero-leak rule is structural: `dirty` only advances after the slot's
//! buffers have been handed to the free callback (TX) or taken for delivery
//! (RX), and [`audit`](TxRing::audit) verifies the buffer census against
//! the counters on every completion when leak checking is on.

use elink_core::static_assert;
use elink_hal::dma::DmaArena;

use super::regs::{DN_LAST_FRAG, LEN_MASK, UP_COMPLETE};
use crate::buffer::BufHandle;
use crate::nicapi::ops::MAX_TX_FRAGS;
use crate::recover::kinds::ErrorKind;

/// Descriptors per ring.
pub const RING_SIZE: u16 = 16;

/// Bytes per download descriptor: next + header + eight fragment pairs.
pub const TX_SLOT_BYTES: u32 = 8 + (MAX_TX_FRAGS as u32) * 8;
/// Bytes per upload descriptor: next + status + address + length.
pub const RX_SLOT_BYTES: u32 = 16;

static_assert!(TX_SLOT_BYTES == 72);

#[derive(Clone, Copy)]
struct TxSlot {
    bufs: [Option<BufHandle>; MAX_TX_FRAGS],
    nfrags: u8,
    total_len: u16,
}

impl TxSlot {
    const EMPTY: Self = Self {
        bufs: [None; MAX_TX_FRAGS],
        nfrags: 0,
        total_len: 0,
    };
}

/// The download (transmit) ring.
pub struct TxRing {
    base: u32,
    /// Producer counter (monotonic).
    pub cur: u16,
    /// Consumer counter (monotonic).
    pub dirty: u16,
    slots: [TxSlot; RING_SIZE as usize],
}

impl TxRing {
    /// Allocates and zeroes the descriptor storage.
    pub fn new(arena: &dyn DmaArena) -> Result<Self, ErrorKind> {
        let base = arena
            .alloc(TX_SLOT_BYTES * u32::from(RING_SIZE), 8)
            .map_err(|_| ErrorKind::PoolExhausted)?;
        for i in 0..u32::from(RING_SIZE) {
            let phys = base + i * TX_SLOT_BYTES;
            arena.write_u32(phys, 0);
            arena.write_u32(phys + 4, 0);
        }
        Ok(Self {
            base,
            cur: 0,
            dirty: 0,
            slots: [TxSlot::EMPTY; RING_SIZE as usize],
        })
    }

    /// Slots posted but not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> u16 {
        self.cur.wrapping_sub(self.dirty)
    }

    /// True when posting another frame would need the sentinel slot.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.in_flight() >= RING_SIZE - 1
    }

    /// Physical address of a slot's descriptor.
    #[must_use]
    pub fn slot_phys(&self, counter: u16) -> u32 {
        self.base + u32::from(counter % RING_SIZE) * TX_SLOT_BYTES
    }

    /// Writes the next descriptor and links it behind any in-flight chain.
    ///
    /// `frags` are `(phys, len, buffer)` triples already staged in arena
    /// memory. Returns the descriptor's physical address. The caller owns
    /// the barrier and the doorbell.
    pub fn post(
        &mut self,
        arena: &dyn DmaArena,
        frags: &[(u32, u16, BufHandle)],
        total_len: u16,
    ) -> Result<u32, ErrorKind> {
        if self.is_full() || frags.is_empty() || frags.len() > MAX_TX_FRAGS {
            return Err(ErrorKind::QueueOverflow);
        }
        let idx = self.cur % RING_SIZE;
        let phys = self.slot_phys(self.cur);

        arena.write_u32(phys, 0);
        arena.write_u32(phys + 4, u32::from(total_len) & LEN_MASK);
        let mut slot = TxSlot::EMPTY;
        for (i, &(fphys, flen, buf)) in frags.iter().enumerate() {
            let mut word = u32::from(flen) & LEN_MASK;
            if i == frags.len() - 1 {
                word |= DN_LAST_FRAG;
            }
            let at = phys + 8 + (i as u32) * 8;
            arena.write_u32(at, fphys);
            arena.write_u32(at + 4, word);
            slot.bufs[i] = Some(buf);
        }
        slot.nfrags = frags.len() as u8;
        slot.total_len = total_len;
        self.slots[usize::from(idx)] = slot;

        if self.in_flight() > 0 {
            let prev = self.slot_phys(self.cur.wrapping_sub(1));
            arena.write_u32(prev, phys);
        }
        self.cur = self.cur.wrapping_add(1);
        Ok(phys)
    }

    /// Walks completions: every slot the hardware has moved past is freed
    /// through `free`, then (and only then) `dirty` advances over it.
    ///
    /// `hw_list_ptr` is the device's current download pointer; a slot whose
    /// descriptor the device still points at stays owned by it. Returns the
    /// reaped (frame, byte) counts.
    pub fn reap(&mut self, hw_list_ptr: u32, mut free: impl FnMut(BufHandle)) -> (u16, u32) {
        let mut reaped = 0;
        let mut bytes = 0u32;
        while self.dirty != self.cur {
            let idx = self.dirty % RING_SIZE;
            if hw_list_ptr == self.slot_phys(self.dirty) {
                break;
            }
            let slot = &mut self.slots[usize::from(idx)];
            for buf in slot.bufs.iter_mut() {
                if let Some(handle) = buf.take() {
                    free(handle);
                }
            }
            bytes += u32::from(slot.total_len);
            slot.nfrags = 0;
            self.dirty = self.dirty.wrapping_add(1);
            reaped += 1;
        }
        (reaped, bytes)
    }

    /// Frees every outstanding buffer (ring teardown / hard reset).
    pub fn drop_all(&mut self, mut free: impl FnMut(BufHandle)) {
        for slot in &mut self.slots {
            for buf in slot.bufs.iter_mut() {
                if let Some(handle) = buf.take() {
                    free(handle);
                }
            }
            slot.nfrags = 0;
        }
        self.dirty = self.cur;
    }

    /// Zero-leak census: the buffer count must match the in-flight slots.
    #[must_use]
    pub fn audit(&self) -> bool {
        if self.in_flight() >= RING_SIZE {
            return false;
        }
        let mut expect = 0usize;
        let mut counter = self.dirty;
        while counter != self.cur {
            let slot = &self.slots[usize::from(counter % RING_SIZE)];
            if slot.nfrags == 0 || slot.bufs.iter().flatten().count() != usize::from(slot.nfrags)
            {
                return false;
            }
            expect += usize::from(slot.nfrags);
            counter = counter.wrapping_add(1);
        }
        let held: usize = self
            .slots
            .iter()
            .map(|s| s.bufs.iter().flatten().count())
            .sum();
        held == expect
    }
}

/// The upload (receive) ring.
///
/// Fifteen slots stay armed with large-pool buffers; the sixteenth is the
/// rotating sentinel the device refuses to overwrite. Processing a
/// completion advances `dirty`; re-arming the sentinel slot advances `cur`.
pub struct RxRing {
    base: u32,
    /// Producer (arm) counter.
    pub cur: u16,
    /// Consumer (completion) counter.
    pub dirty: u16,
    bufs: [Option<BufHandle>; RING_SIZE as usize],
}

impl RxRing {
    /// Allocates descriptors, links them in a circle, and arms fifteen
    /// slots with buffers produced by `alloc_buf`.
    pub fn new(
        arena: &dyn DmaArena,
        mut alloc_buf: impl FnMut() -> Result<(BufHandle, u32, u16), ErrorKind>,
    ) -> Result<Self, ErrorKind> {
        let base = arena
            .alloc(RX_SLOT_BYTES * u32::from(RING_SIZE), 8)
            .map_err(|_| ErrorKind::PoolExhausted)?;
        let mut ring = Self {
            base,
            cur: 0,
            dirty: 0,
            bufs: [None; RING_SIZE as usize],
        };
        for i in 0..RING_SIZE {
            let phys = ring.slot_phys(i);
            let next = ring.slot_phys((i + 1) % RING_SIZE);
            arena.write_u32(phys, next);
            // Parked until armed.
            arena.write_u32(phys + 4, UP_COMPLETE);
            arena.write_u32(phys + 8, 0);
            arena.write_u32(phys + 12, 0);
        }
        for _ in 0..RING_SIZE - 1 {
            let (buf, phys, cap) = alloc_buf()?;
            ring.arm(arena, buf, phys, cap);
        }
        Ok(ring)
    }

    /// Physical address of a slot's descriptor.
    #[must_use]
    pub fn slot_phys(&self, counter: u16) -> u32 {
        self.base + u32::from(counter % RING_SIZE) * RX_SLOT_BYTES
    }

    /// Physical address of the first descriptor (for the list-pointer
    /// register).
    #[must_use]
    pub fn head_phys(&self) -> u32 {
        self.base
    }

    /// Armed slots awaiting the device.
    #[must_use]
    pub fn in_flight(&self) -> u16 {
        self.cur.wrapping_sub(self.dirty)
    }

    /// Status word of the next completion slot.
    #[must_use]
    pub fn peek_status(&self, arena: &dyn DmaArena) -> u32 {
        arena.read_u32(self.slot_phys(self.dirty) + 4)
    }

    /// Takes the completed slot's buffer and advances `dirty`. The slot
    /// becomes the new sentinel until [`arm`](Self::arm) rotates past it.
    pub fn consume(&mut self) -> Option<BufHandle> {
        let idx = usize::from(self.dirty % RING_SIZE);
        let buf = self.bufs[idx].take();
        self.dirty = self.dirty.wrapping_add(1);
        buf
    }

    /// Arms the sentinel slot with a buffer and hands it to the device.
    pub fn arm(&mut self, arena: &dyn DmaArena, buf: BufHandle, phys: u32, cap: u16) {
        let idx = usize::from(self.cur % RING_SIZE);
        let desc = self.slot_phys(self.cur);
        arena.write_u32(desc + 8, phys);
        arena.write_u32(desc + 12, u32::from(cap) & LEN_MASK);
        arena.write_u32(desc + 4, 0);
        self.bufs[idx] = Some(buf);
        self.cur = self.cur.wrapping_add(1);
    }

    /// Frees every armed buffer (ring teardown / hard reset).
    pub fn drop_all(&mut self, mut free: impl FnMut(BufHandle)) {
        for buf in &mut self.bufs {
            if let Some(handle) = buf.take() {
                free(handle);
            }
        }
        self.dirty = self.cur;
    }

    /// Zero-leak census: armed slots and held buffers must agree.
    #[must_use]
    pub fn audit(&self) -> bool {
        let held = self.bufs.iter().flatten().count();
        usize::from(self.in_flight()) == held && self.in_flight() < RING_SIZE
    }
}

/// Both rings plus the transmit watchdog bookkeeping.
pub struct DmaChannels {
    /// Download ring.
    pub tx: TxRing,
    /// Upload ring.
    pub rx: RxRing,
    /// Tick of the most recent TX completion (stall watchdog).
    pub last_tx_completion: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use elink_hal::sim::{SimArena, SimMemory};

    fn arena() -> SimArena {
        SimArena::new(SimMemory::new(1 << 20))
    }

    fn handle(i: u8) -> BufHandle {
        BufHandle {
            nic: 0,
            class: crate::buffer::SizeClass::Large,
            index: i,
        }
    }

    #[test]
    fn tx_post_links_descriptors_in_order() {
        let a = arena();
        let mut ring = TxRing::new(&a).unwrap();
        let p0 = ring.post(&a, &[(0x8000, 60, handle(0))], 60).unwrap();
        let p1 = ring.post(&a, &[(0x9000, 60, handle(1))], 60).unwrap();
        // First descriptor now chains to the second.
        assert_eq!(a.read_u32(p0), p1);
        assert_eq!(a.read_u32(p1), 0);
        assert_eq!(ring.in_flight(), 2);
        assert!(ring.audit());
    }

    #[test]
    fn tx_capacity_is_fifteen() {
        let a = arena();
        let mut ring = TxRing::new(&a).unwrap();
        for i in 0..15 {
            ring.post(&a, &[(0x8000, 60, handle(i))], 60).unwrap();
        }
        assert!(ring.is_full());
        assert!(ring.post(&a, &[(0x8000, 60, handle(15))], 60).is_err());
        // One completion reopens exactly one slot.
        let mut freed = 0;
        ring.reap(ring.slot_phys(ring.dirty.wrapping_add(1)), |_| freed += 1);
        assert_eq!(freed, 1);
        assert!(!ring.is_full());
    }

    #[test]
    fn tx_reap_respects_device_pointer() {
        let a = arena();
        let mut ring = TxRing::new(&a).unwrap();
        for i in 0..4 {
            ring.post(&a, &[(0x8000, 60, handle(i))], 60).unwrap();
        }
        // Device is still chewing on slot 2.
        let mut freed = Vec::new();
        ring.reap(ring.slot_phys(2), |b| freed.push(b.index));
        assert_eq!(freed, vec![0, 1]);
        assert_eq!(ring.in_flight(), 2);
        assert!(ring.audit());
        // Device done: pointer cleared.
        ring.reap(0, |b| freed.push(b.index));
        assert_eq!(freed, vec![0, 1, 2, 3]);
        assert_eq!(ring.dirty, ring.cur);
    }

    #[test]
    fn rx_ring_arms_fifteen_and_rotates_the_sentinel() {
        let a = arena();
        let mut next = 0u8;
        let mut ring = RxRing::new(&a, || {
            let i = next;
            next += 1;
            Ok((handle(i), 0x10000 + u32::from(i) * 2048, 1536))
        })
        .unwrap();
        assert_eq!(ring.in_flight(), 15);
        assert!(ring.audit());

        // Slot 15 is the parked sentinel.
        assert_eq!(a.read_u32(ring.slot_phys(15) + 4), UP_COMPLETE);
        // The circle closes.
        assert_eq!(a.read_u32(ring.slot_phys(15)), ring.slot_phys(0));

        // Device completes slot 0; driver consumes and re-arms.
        a.write_u32(ring.slot_phys(0) + 4, UP_COMPLETE | 64);
        assert_eq!(ring.peek_status(&a) & UP_COMPLETE, UP_COMPLETE);
        let got = ring.consume().unwrap();
        assert_eq!(got.index, 0);
        ring.arm(&a, handle(20), 0x40000, 1536);
        assert_eq!(ring.in_flight(), 15);
        assert!(ring.audit());
        // The re-armed slot is the old sentinel (slot 15).
        assert_eq!(a.read_u32(ring.slot_phys(15) + 4), 0);
    }
}
