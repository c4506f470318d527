//! The per-NIC buffer pool.

use elink_hal::dma::{DmaArena, DmaError};

use super::{BufHandle, LARGE_BUF_BYTES, SMALL_BUF_BYTES, SizeClass};
use crate::nicapi::NicId;
use crate::recover::kinds::ErrorKind;

/// Static ceiling on buffers per size class.
pub const MAX_PER_CLASS: usize = 32;

/// Pool observability counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoolStats {
    /// Total successful allocations.
    pub allocs: u64,
    /// Buffers currently out of the pool.
    pub in_use: u16,
    /// High-watermark of `in_use`.
    pub peak: u16,
    /// Allocations refused because the byte quota was reached.
    pub overflow_drops: u32,
    /// Small requests served from the large class.
    pub upward_falls: u32,
    /// Inbound frames copied into a small buffer.
    pub copy_break_hits: u32,
    /// Inbound frames handed up by swapping ring buffers.
    pub zero_copy_swaps: u32,
    /// Frees rejected because the origin tag did not match.
    pub cross_nic_rejects: u32,
    /// Allocations since the balancer last looked (its activity signal).
    pub recent_allocs: u32,
}

#[derive(Clone, Copy)]
struct Slot {
    phys: u32,
    free: bool,
}

struct ClassPool {
    slots: [Slot; MAX_PER_CLASS],
    count: u8,
    buf_bytes: u16,
}

impl ClassPool {
    fn new(
        arena: &dyn DmaArena,
        count: u8,
        buf_bytes: u16,
    ) -> Result<Self, DmaError> {
        let mut slots = [Slot { phys: 0, free: false }; MAX_PER_CLASS];
        let count = count.min(MAX_PER_CLASS as u8);
        for slot in slots.iter_mut().take(usize::from(count)) {
            slot.phys = arena.alloc(u32::from(buf_bytes), 4)?;
            slot.free = true;
        }
        Ok(Self {
            slots,
            count,
            buf_bytes,
        })
    }

    fn take_free(&mut self) -> Option<u8> {
        for i in 0..usize::from(self.count) {
            if self.slots[i].free {
                self.slots[i].free = false;
                return Some(i as u8);
            }
        }
        None
    }
}

/// A per-NIC pool: two bounded free-lists over arena storage plus a byte
/// quota that caps how much of the pool may be out at once.
pub struct BufferPool {
    nic: NicId,
    small: ClassPool,
    large: ClassPool,
    byte_quota: u32,
    bytes_in_use: u32,
    /// Counters; updated only inside the owner's short critical sections.
    pub stats: PoolStats,
}

impl BufferPool {
    /// Builds a pool, allocating all buffer storage from the arena up front.
    /// The pool never allocates again after this.
    pub fn new(
        nic: NicId,
        arena: &dyn DmaArena,
        small_count: u8,
        large_count: u8,
        byte_quota: u32,
    ) -> Result<Self, ErrorKind> {
        let small = ClassPool::new(arena, small_count, SMALL_BUF_BYTES)
            .map_err(|_| ErrorKind::PoolExhausted)?;
        let large = ClassPool::new(arena, large_count, LARGE_BUF_BYTES)
            .map_err(|_| ErrorKind::PoolExhausted)?;
        Ok(Self {
            nic,
            small,
            large,
            byte_quota,
            bytes_in_use: 0,
            stats: PoolStats::default(),
        })
    }

    /// Allocates a buffer of at least the requested class.
    ///
    /// An empty small class falls upward to the large class; an empty large
    /// class (or a breached byte quota) is [`ErrorKind::PoolExhausted`].
    pub fn alloc(&mut self, class: SizeClass) -> Result<BufHandle, ErrorKind> {
        let (resolved, index) = match class {
            SizeClass::Small => match self.small.take_free() {
                Some(i) => (SizeClass::Small, i),
                None => match self.large.take_free() {
                    Some(i) => {
                        self.stats.upward_falls += 1;
                        (SizeClass::Large, i)
                    }
                    None => {
                        self.stats.overflow_drops += 1;
                        return Err(ErrorKind::PoolExhausted);
                    }
                },
            },
            SizeClass::Large => match self.large.take_free() {
                Some(i) => (SizeClass::Large, i),
                None => {
                    self.stats.overflow_drops += 1;
                    return Err(ErrorKind::PoolExhausted);
                }
            },
        };

        let cost = u32::from(self.class_bytes(resolved));
        if self.bytes_in_use + cost > self.byte_quota {
            // Quota breached: put the slot straight back.
            self.class_mut(resolved).slots[usize::from(index)].free = true;
            self.stats.overflow_drops += 1;
            return Err(ErrorKind::PoolExhausted);
        }

        self.bytes_in_use += cost;
        self.stats.allocs += 1;
        self.stats.recent_allocs += 1;
        self.stats.in_use += 1;
        self.stats.peak = self.stats.peak.max(self.stats.in_use);
        Ok(BufHandle {
            nic: self.nic,
            class: resolved,
            index,
        })
    }

    /// Returns a buffer. Rejects (and counts) handles whose origin tag does
    /// not name this pool.
    pub fn free(&mut self, handle: BufHandle) -> bool {
        if handle.nic != self.nic {
            self.stats.cross_nic_rejects += 1;
            return false;
        }
        let class = handle.class;
        let slot = &mut self.class_mut(class).slots[usize::from(handle.index)];
        if slot.free {
            // Double free; refuse rather than corrupt the free list.
            return false;
        }
        slot.free = true;
        self.bytes_in_use -= u32::from(self.class_bytes(class));
        self.stats.in_use -= 1;
        true
    }

    /// Physical address of a buffer.
    #[must_use]
    pub fn phys(&self, handle: BufHandle) -> u32 {
        self.class_ref(handle.class).slots[usize::from(handle.index)].phys
    }

    /// Capacity of a buffer.
    #[must_use]
    pub fn capacity(&self, handle: BufHandle) -> u16 {
        self.class_bytes(handle.class)
    }

    /// Buffers currently out.
    #[must_use]
    pub fn in_use(&self) -> u16 {
        self.stats.in_use
    }

    /// Current byte quota.
    #[must_use]
    pub fn quota(&self) -> u32 {
        self.byte_quota
    }

    /// Adjusts the byte quota (balancer only).
    pub fn set_quota(&mut self, quota: u32) {
        self.byte_quota = quota;
    }

    /// Fraction of the quota currently in use, in percent.
    #[must_use]
    pub fn pressure_pct(&self) -> u32 {
        if self.byte_quota == 0 {
            return 100;
        }
        self.bytes_in_use.saturating_mul(100) / self.byte_quota
    }

    fn class_bytes(&self, class: SizeClass) -> u16 {
        match class {
            SizeClass::Small => self.small.buf_bytes,
            SizeClass::Large => self.large.buf_bytes,
        }
    }

    fn class_ref(&self, class: SizeClass) -> &ClassPool {
        match class {
            SizeClass::Small => &self.small,
            SizeClass::Large => &self.large,
        }
    }

    fn class_mut(&mut self, class: SizeClass) -> &mut ClassPool {
        match class {
            SizeClass::Small => &mut self.small,
            SizeClass::Large => &mut self.large,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elink_hal::sim::{SimArena, SimMemory};

    fn pool() -> BufferPool {
        let arena = SimArena::new(SimMemory::new(1 << 20));
        BufferPool::new(0, &arena, 4, 4, 64 * 1024).unwrap()
    }

    #[test]
    fn alloc_free_round_trip() {
        let mut p = pool();
        let h = p.alloc(SizeClass::Small).unwrap();
        assert_eq!(p.in_use(), 1);
        assert!(p.free(h));
        assert_eq!(p.in_use(), 0);
        assert_eq!(p.stats.allocs, 1);
    }

    #[test]
    fn small_falls_upward_when_empty() {
        let mut p = pool();
        let mut held = [None; 4];
        for slot in &mut held {
            *slot = Some(p.alloc(SizeClass::Small).unwrap());
        }
        let h = p.alloc(SizeClass::Small).unwrap();
        assert_eq!(h.class, SizeClass::Large);
        assert_eq!(p.stats.upward_falls, 1);
    }

    #[test]
    fn exhaustion_counts_and_errors() {
        let mut p = pool();
        let mut held = Vec::new();
        for _ in 0..4 {
            held.push(p.alloc(SizeClass::Large).unwrap());
        }
        assert_eq!(p.alloc(SizeClass::Large), Err(ErrorKind::PoolExhausted));
        assert_eq!(p.stats.overflow_drops, 1);
        // Freeing un-wedges it.
        assert!(p.free(held.pop().unwrap()));
        assert!(p.alloc(SizeClass::Large).is_ok());
    }

    #[test]
    fn quota_caps_total_bytes() {
        let arena = SimArena::new(SimMemory::new(1 << 20));
        let mut p = BufferPool::new(0, &arena, 4, 4, 2048).unwrap();
        let _a = p.alloc(SizeClass::Large).unwrap();
        // Second large buffer would exceed 2048 bytes.
        assert_eq!(p.alloc(SizeClass::Large), Err(ErrorKind::PoolExhausted));
    }

    #[test]
    fn cross_origin_free_is_rejected() {
        let mut p = pool();
        let h = p.alloc(SizeClass::Small).unwrap();
        let foreign = BufHandle { nic: 3, ..h };
        assert!(!p.free(foreign));
        assert_eq!(p.stats.cross_nic_rejects, 1);
        assert_eq!(p.in_use(), 1);
    }
}
