//! Idle-time pool balancer.
//!
//! Shifts byte quota between the per-NIC pools in proportion to recent
//! allocation activity, never dropping a pool below the configured minimum.
//! Storage itself stays put; only the quotas move, so the fast path never
//! observes a buffer changing owners.

use super::pool::BufferPool;

/// Most pools one balancing pass will look at.
const MAX_POOLS: usize = 8;

/// Rebalances quotas across `pools`.
///
/// `total` is the byte budget shared by all pools; `min` is the floor any
/// single pool is guaranteed. Each pool's share follows its allocations
/// since the previous pass (plus one, so an idle NIC keeps a sliver).
pub fn rebalance<'a>(pools: impl IntoIterator<Item = &'a mut BufferPool>, total: u32, min: u32) {
    let mut slots: [Option<&'a mut BufferPool>; MAX_POOLS] = [const { None }; MAX_POOLS];
    let mut n = 0;
    for pool in pools {
        if n < MAX_POOLS {
            slots[n] = Some(pool);
            n += 1;
        }
    }
    if n == 0 {
        return;
    }

    let mut weights = [0u64; MAX_POOLS];
    let mut sum: u64 = 0;
    for (i, slot) in slots[..n].iter().enumerate() {
        let w = u64::from(slot.as_ref().map_or(0, |p| p.stats.recent_allocs)) + 1;
        weights[i] = w;
        sum += w;
    }

    for (i, slot) in slots[..n].iter_mut().enumerate() {
        if let Some(pool) = slot.as_mut() {
            let share = (u64::from(total) * weights[i] / sum) as u32;
            pool.set_quota(share.max(min));
            pool.stats.recent_allocs = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SizeClass;
    use elink_hal::sim::{SimArena, SimMemory};

    #[test]
    fn busy_pool_gains_quota_idle_pool_keeps_minimum() {
        let arena = SimArena::new(SimMemory::new(1 << 20));
        let mut a = BufferPool::new(0, &arena, 8, 8, 16 * 1024).unwrap();
        let mut b = BufferPool::new(1, &arena, 8, 8, 16 * 1024).unwrap();

        for _ in 0..8 {
            let h = a.alloc(SizeClass::Small).unwrap();
            a.free(h);
        }

        rebalance([&mut a, &mut b], 32 * 1024, 4 * 1024);
        assert!(a.quota() > b.quota());
        assert!(b.quota() >= 4 * 1024);
        assert_eq!(a.stats.recent_allocs, 0);
    }

    #[test]
    fn equal_activity_splits_evenly() {
        let arena = SimArena::new(SimMemory::new(1 << 20));
        let mut a = BufferPool::new(0, &arena, 4, 4, 1024).unwrap();
        let mut b = BufferPool::new(1, &arena, 4, 4, 1024).unwrap();
        rebalance([&mut a, &mut b], 20_000, 1_000);
        assert_eq!(a.quota(), b.quota());
    }
}
