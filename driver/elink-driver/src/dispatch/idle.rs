//! The idle queue: typed deferred work.
//!
//! The only "later" in the driver. ISR halves post here; the host-idle
//! callback drains in FIFO order, a bounded batch at a time, and only while
//! the host is quiescent.

use planck_noalloc::ringbuf::RingBuf;

use crate::buffer::BufHandle;
use crate::nicapi::NicId;
use crate::recover::ErrorKind;

/// Deferred work items. All variants are `Copy` so the queue never owns
/// resources — buffers referenced by a dropped item are freed by the
/// dropper.
#[derive(Debug, Clone, Copy)]
pub enum IdleItem {
    /// Deliver a received frame to the handles in `matches` (bitmask by
    /// handle slot), then return `buf` to its pool.
    DeliverFrame {
        /// Receiving NIC.
        nic: NicId,
        /// Pool buffer holding the frame.
        buf: BufHandle,
        /// Frame length in bytes.
        len: u16,
        /// Bitmask of matching handle slots.
        matches: u16,
    },
    /// Run the recovery engine for a NIC after `kind` was recorded.
    RecoveryCheck {
        /// Affected NIC.
        nic: NicId,
        /// The error that prompted the check.
        kind: ErrorKind,
    },
    /// Periodic link/pause/watchdog check.
    HealthCheck {
        /// NIC to check.
        nic: NicId,
    },
    /// A transmit-pause interval may have elapsed.
    PauseExpiry {
        /// Paused NIC.
        nic: NicId,
    },
    /// Rebalance pool quotas across NICs.
    PoolBalance,
}

/// Backing ring size (usable capacity is one less).
pub const IDLE_QUEUE_DEPTH: usize = 64;

/// Items drained per idle callback, to keep each callback short.
pub const IDLE_BATCH: usize = 16;

/// Bounded FIFO of deferred work.
pub struct IdleQueue {
    queue: RingBuf<IdleItem, IDLE_QUEUE_DEPTH>,
    /// Items refused because the queue was full.
    pub overflows: u32,
}

impl IdleQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            queue: RingBuf::new(),
            overflows: 0,
        }
    }

    /// Enqueues an item. Returns `false` (and counts the overflow) when the
    /// queue is full; the caller owns any resources the item referenced.
    pub fn push(&mut self, item: IdleItem) -> bool {
        match self.queue.try_push(item) {
            Ok(()) => true,
            Err(_) => {
                self.overflows = self.overflows.saturating_add(1);
                false
            }
        }
    }

    /// Dequeues the oldest item.
    pub fn pop(&mut self) -> Option<IdleItem> {
        self.queue.pop()
    }

    /// Items currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_is_preserved() {
        let mut q = IdleQueue::new();
        assert!(q.push(IdleItem::HealthCheck { nic: 0 }));
        assert!(q.push(IdleItem::PoolBalance));
        assert!(matches!(q.pop(), Some(IdleItem::HealthCheck { nic: 0 })));
        assert!(matches!(q.pop(), Some(IdleItem::PoolBalance)));
        assert!(q.pop().is_none());
    }

    #[test]
    fn overflow_is_counted_not_fatal() {
        let mut q = IdleQueue::new();
        let mut pushed = 0;
        while q.push(IdleItem::PoolBalance) {
            pushed += 1;
        }
        assert_eq!(pushed, IDLE_QUEUE_DEPTH - 1);
        assert_eq!(q.overflows, 1);
        q.pop();
        assert!(q.push(IdleItem::PoolBalance));
    }
}
