//! Host environment surface.
//!
//! The resident driver needs exactly three things from its host: the
//! interrupt-vector table (to install and chain), the host-busy flags
//! captured at install time (to avoid re-entering non-reentrant host
//! services), and nothing else. [`HostApi`] is that surface.

use core::fmt;

/// A segment:offset far pointer as stored in the interrupt-vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FarPtr {
    /// Segment half.
    pub segment: u16,
    /// Offset half.
    pub offset: u16,
}

impl FarPtr {
    /// The null vector.
    pub const NULL: Self = Self {
        segment: 0,
        offset: 0,
    };

    /// Creates a far pointer from its halves.
    #[must_use]
    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// True for the null vector.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.segment == 0 && self.offset == 0
    }
}

impl fmt::Display for FarPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.segment, self.offset)
    }
}

/// The host services the dispatcher is allowed to touch.
///
/// `host_busy` reflects the flag pointers captured once at install; it is
/// consulted on API entries only — the hardware ISR path never calls host
/// services, so it never needs to ask.
pub trait HostApi {
    /// Reads the current vector for interrupt `vector`.
    fn get_vector(&self, vector: u8) -> FarPtr;

    /// Installs `target` as the vector for interrupt `vector`.
    fn set_vector(&self, vector: u8, target: FarPtr);

    /// True while the host is inside a non-reentrant critical section.
    fn host_busy(&self) -> bool;
}
