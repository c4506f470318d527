//! Idle-time frame delivery.
//!
//! The RX paths never call applications; they post `DeliverFrame` items.
//! This module drains those items: each matching handle's upcall runs in
//! registration order, in a consistent context (private stack, API state,
//! host known quiescent), and the buffer goes back to its pool after the
//! last callback returns.

use elink_hal::dma::DmaArena;

use super::handle::{HandleTable, RxEvent};
use crate::buffer::{BufHandle, BufferPool};
use crate::nicapi::NicId;

/// Delivers one received frame to every live matching handle, then frees
/// the buffer. Returns how many upcalls ran.
pub fn deliver(
    handles: &HandleTable,
    pool: &mut BufferPool,
    arena: &dyn DmaArena,
    nic: NicId,
    buf: BufHandle,
    len: u16,
    matches: u16,
) -> usize {
    let mut frame = [0u8; 1536];
    let len = usize::from(len).min(frame.len());
    arena.read(pool.phys(buf), &mut frame[..len]);

    let (slots, n) = handles.delivery_order(matches);
    let mut delivered = 0;
    for &slot in &slots[..n] {
        let slot = usize::from(slot);
        // A handle may have been released or migrated since the match.
        if handles.nic_of(slot) != nic {
            continue;
        }
        let Some((upcall, cookie)) = handles.receiver_of(slot) else {
            continue;
        };
        let event = RxEvent {
            handle: handles.selector_of(slot),
            nic,
            frame: &frame[..len],
        };
        upcall(cookie, &event);
        delivered += 1;
    }

    pool.free(buf);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SizeClass;
    use crate::nicapi::RcvMode;
    use elink_hal::sim::{SimArena, SimMemory};
    use std::sync::Mutex;

    static SEEN: Mutex<Vec<(usize, u16, Vec<u8>)>> = Mutex::new(Vec::new());

    fn upcall(cookie: usize, event: &RxEvent<'_>) {
        SEEN.lock()
            .unwrap()
            .push((cookie, event.handle, event.frame.to_vec()));
    }

    #[test]
    fn frame_reaches_matching_handles_in_order_and_buffer_returns() {
        SEEN.lock().unwrap().clear();
        let arena = SimArena::new(SimMemory::new(1 << 20));
        let mut pool = BufferPool::new(0, &arena, 4, 4, 64 * 1024).unwrap();
        let mut handles = HandleTable::new(RcvMode::Broadcast);

        let first = handles.register(1, &[0x08, 0x00], 0, upcall, 100).unwrap();
        let second = handles.register(1, &[], 0, upcall, 200).unwrap();

        let mut frame = [0u8; 60];
        frame[..6].copy_from_slice(&[0xFF; 6]);
        frame[12] = 0x08;
        let buf = pool.alloc(SizeClass::Small).unwrap();
        arena.write(pool.phys(buf), &frame);

        let matches = handles.match_frame(0, &frame);
        let delivered = deliver(&handles, &mut pool, &arena, 0, buf, 60, matches);

        assert_eq!(delivered, 2);
        assert_eq!(pool.in_use(), 0);
        let seen = SEEN.lock().unwrap();
        assert_eq!(seen[0].0, 100);
        assert_eq!(seen[0].1, first);
        assert_eq!(seen[1].0, 200);
        assert_eq!(seen[1].1, second);
        assert_eq!(seen[0].2.len(), 60);
    }
}
