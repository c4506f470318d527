//! Simulated host: vector table and busy flags.

use core::sync::atomic::{AtomicBool, Ordering};

use elink_core::sync::SpinLock;

use crate::host::{FarPtr, HostApi};

/// A host with a 256-entry interrupt-vector table and host-busy flags the
/// tests can toggle.
pub struct SimHost {
    vectors: SpinLock<[FarPtr; 256]>,
    busy: AtomicBool,
}

impl SimHost {
    /// Creates a host whose vectors all point at a recognizable BIOS-ish
    /// placeholder so chain targets are never null.
    #[must_use]
    pub fn new() -> Self {
        Self {
            vectors: SpinLock::new([FarPtr::new(0xF000, 0x1234); 256]),
            busy: AtomicBool::new(false),
        }
    }

    /// Marks the host as inside (or out of) a non-reentrant section.
    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Release);
    }
}

impl Default for SimHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostApi for SimHost {
    fn get_vector(&self, vector: u8) -> FarPtr {
        self.vectors.lock()[vector as usize]
    }

    fn set_vector(&self, vector: u8, target: FarPtr) {
        self.vectors.lock()[vector as usize] = target;
    }

    fn host_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_round_trip() {
        let host = SimHost::new();
        let old = host.get_vector(0x60);
        let ours = FarPtr::new(0x1234, 0x0010);
        host.set_vector(0x60, ours);
        assert_eq!(host.get_vector(0x60), ours);
        assert_ne!(old, ours);
    }

    #[test]
    fn busy_flag_toggles() {
        let host = SimHost::new();
        assert!(!host.host_busy());
        host.set_busy(true);
        assert!(host.host_busy());
    }
}
