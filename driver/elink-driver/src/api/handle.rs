//! The application handle table.
//!
//! A handle is an opaque selector returned by `access_type`. Entries carry
//! the (class, type) filter, the receive upcall, and a per-handle receive
//! mode. Several handles may match one frame; delivery is in registration
//! order, tracked by a monotonic sequence number so slot reuse never
//! reorders older registrations.

use crate::nicapi::{NicId, RcvMode};

/// Maximum simultaneous handles.
pub const MAX_HANDLES: usize = 12;

/// Longest type template, in bytes.
pub const MAX_TYPE_LEN: usize = 8;

/// A frame-delivery upcall: `(cookie, event)`.
///
/// The cookie is the caller-supplied word registered with the handle — the
/// portable rendering of the far-pointer receiver the wire API carries.
pub type RxUpcall = fn(cookie: usize, event: &RxEvent<'_>);

/// A delivered frame.
pub struct RxEvent<'a> {
    /// The handle being called.
    pub handle: u16,
    /// NIC the frame arrived on.
    pub nic: NicId,
    /// The frame, header first.
    pub frame: &'a [u8],
}

/// Errors from handle registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    /// Unsupported class or malformed type template.
    BadType,
    /// An identical (class, type) is already registered on this NIC.
    TypeInUse,
    /// The table is full.
    NoSpace,
}

struct HandleEntry {
    class: u8,
    pkt_type: [u8; MAX_TYPE_LEN],
    type_len: u8,
    nic: NicId,
    upcall: RxUpcall,
    cookie: usize,
    mode: RcvMode,
    seq: u32,
}

/// The handle table.
pub struct HandleTable {
    entries: [Option<HandleEntry>; MAX_HANDLES],
    generation: [u8; MAX_HANDLES],
    next_seq: u32,
    default_mode: RcvMode,
}

/// Ethernet II (DIX) class, the only one these NICs speak.
pub const CLASS_ETHERNET: u8 = 1;

const fn encode(slot: usize, generation: u8) -> u16 {
    0x2000 | ((slot as u16) << 4) | (generation as u16 & 0x0F)
}

impl HandleTable {
    /// Creates an empty table whose new handles start in `default_mode`.
    #[must_use]
    pub fn new(default_mode: RcvMode) -> Self {
        Self {
            entries: [const { None }; MAX_HANDLES],
            generation: [0; MAX_HANDLES],
            next_seq: 0,
            default_mode,
        }
    }

    /// Registers a receiver. A zero-length type template matches all frames.
    pub fn register(
        &mut self,
        class: u8,
        pkt_type: &[u8],
        nic: NicId,
        upcall: RxUpcall,
        cookie: usize,
    ) -> Result<u16, RegisterError> {
        if class != CLASS_ETHERNET || pkt_type.len() > MAX_TYPE_LEN {
            return Err(RegisterError::BadType);
        }
        let duplicate = self.entries.iter().flatten().any(|e| {
            e.nic == nic
                && e.class == class
                && usize::from(e.type_len) == pkt_type.len()
                && e.pkt_type[..pkt_type.len()] == *pkt_type
        });
        if duplicate && !pkt_type.is_empty() {
            return Err(RegisterError::TypeInUse);
        }
        let slot = self
            .entries
            .iter()
            .position(Option::is_none)
            .ok_or(RegisterError::NoSpace)?;

        let mut tmpl = [0u8; MAX_TYPE_LEN];
        tmpl[..pkt_type.len()].copy_from_slice(pkt_type);
        self.entries[slot] = Some(HandleEntry {
            class,
            pkt_type: tmpl,
            type_len: pkt_type.len() as u8,
            nic,
            upcall,
            cookie,
            mode: self.default_mode,
            seq: self.next_seq,
        });
        self.next_seq = self.next_seq.wrapping_add(1);
        Ok(encode(slot, self.generation[slot]))
    }

    /// Releases one handle. The selector is dead afterwards: the slot's
    /// generation advances so a stale copy can never alias a new handle.
    pub fn release(&mut self, handle: u16) -> Result<(), ()> {
        let slot = self.lookup(handle).ok_or(())?;
        self.entries[slot] = None;
        self.generation[slot] = (self.generation[slot] + 1) & 0x0F;
        Ok(())
    }

    /// Releases every handle sharing the given handle's receiver — the
    /// application-shutdown path.
    pub fn release_siblings(&mut self, handle: u16) -> Result<(), ()> {
        let slot = self.lookup(handle).ok_or(())?;
        let (upcall, cookie) = {
            let e = self.entries[slot].as_ref().ok_or(())?;
            (e.upcall as usize, e.cookie)
        };
        for i in 0..MAX_HANDLES {
            let matches = self.entries[i]
                .as_ref()
                .is_some_and(|e| e.upcall as usize == upcall && e.cookie == cookie);
            if matches {
                self.entries[i] = None;
                self.generation[i] = (self.generation[i] + 1) & 0x0F;
            }
        }
        Ok(())
    }

    /// Resolves a selector to its slot, rejecting stale generations.
    #[must_use]
    pub fn lookup(&self, handle: u16) -> Option<usize> {
        if handle & 0xE000 != 0x2000 {
            return None;
        }
        let slot = usize::from((handle >> 4) & 0x0F);
        if slot >= MAX_HANDLES || self.entries[slot].is_none() {
            return None;
        }
        (u8::try_from(handle & 0x0F).ok()? == self.generation[slot]).then_some(slot)
    }

    /// The NIC a live handle is bound to.
    #[must_use]
    pub fn nic_of(&self, slot: usize) -> NicId {
        self.entries[slot].as_ref().map_or(0, |e| e.nic)
    }

    /// Rebinds a slot to another NIC (disable-time migration).
    pub fn migrate(&mut self, slot: usize, nic: NicId) {
        if let Some(entry) = self.entries[slot].as_mut() {
            entry.nic = nic;
        }
    }

    /// Per-handle receive mode.
    #[must_use]
    pub fn mode_of(&self, slot: usize) -> RcvMode {
        self.entries[slot].as_ref().map_or(self.default_mode, |e| e.mode)
    }

    /// Sets a handle's receive mode.
    pub fn set_mode(&mut self, slot: usize, mode: RcvMode) {
        if let Some(entry) = self.entries[slot].as_mut() {
            entry.mode = mode;
        }
    }

    /// The upcall and cookie for a slot.
    #[must_use]
    pub fn receiver_of(&self, slot: usize) -> Option<(RxUpcall, usize)> {
        self.entries[slot].as_ref().map(|e| (e.upcall, e.cookie))
    }

    /// The live selector for a slot.
    #[must_use]
    pub fn selector_of(&self, slot: usize) -> u16 {
        encode(slot, self.generation[slot])
    }

    /// The strongest receive mode any handle on `nic` wants — what the NIC's
    /// hardware filter must honor. `None` when the NIC has no handles.
    #[must_use]
    pub fn effective_mode(&self, nic: NicId) -> Option<RcvMode> {
        self.entries
            .iter()
            .flatten()
            .filter(|e| e.nic == nic)
            .map(|e| e.mode)
            .max_by_key(|m| m.as_u8())
    }

    /// Live handle count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// Matches a received frame against every handle on `nic`.
    ///
    /// Returns a slot bitmask. Use [`delivery_order`](Self::delivery_order)
    /// to expand the mask in registration order.
    #[must_use]
    pub fn match_frame(&self, nic: NicId, frame: &[u8]) -> u16 {
        if frame.len() < 14 {
            return 0;
        }
        let dst_mode_floor = required_mode(frame);
        let mut mask = 0u16;
        for (slot, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if entry.nic != nic || entry.mode == RcvMode::Off {
                continue;
            }
            if entry.mode.as_u8() < dst_mode_floor.as_u8() {
                continue;
            }
            let tl = usize::from(entry.type_len);
            if tl == 0 || frame[12..12 + tl] == entry.pkt_type[..tl] {
                mask |= 1 << slot;
            }
        }
        mask
    }

    /// Expands a match mask into slots, oldest registration first.
    #[must_use]
    pub fn delivery_order(&self, mask: u16) -> ([u8; MAX_HANDLES], usize) {
        let mut slots = [0u8; MAX_HANDLES];
        let mut n = 0;
        for slot in 0..MAX_HANDLES {
            if mask & (1 << slot) != 0 && self.entries[slot].is_some() {
                slots[n] = slot as u8;
                n += 1;
            }
        }
        // Order by registration sequence.
        for i in 1..n {
            let mut j = i;
            while j > 0 {
                let sj = self.seq_of(slots[j]);
                let sp = self.seq_of(slots[j - 1]);
                if sp <= sj {
                    break;
                }
                slots.swap(j - 1, j);
                j -= 1;
            }
        }
        (slots, n)
    }

    fn seq_of(&self, slot: u8) -> u32 {
        self.entries[usize::from(slot)].as_ref().map_or(0, |e| e.seq)
    }

    /// Slots currently bound to `nic`.
    #[must_use]
    pub fn slots_of(&self, nic: NicId) -> u16 {
        let mut mask = 0;
        for (slot, entry) in self.entries.iter().enumerate() {
            if entry.as_ref().is_some_and(|e| e.nic == nic) {
                mask |= 1 << slot;
            }
        }
        mask
    }
}

/// The weakest receive mode that accepts a frame with this destination.
fn required_mode(frame: &[u8]) -> RcvMode {
    let dst = &frame[..6];
    if dst == [0xFF; 6] {
        RcvMode::Broadcast
    } else if dst[0] & 1 != 0 {
        RcvMode::Multicast
    } else {
        RcvMode::Directed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(_cookie: usize, _event: &RxEvent<'_>) {}
    fn other_sink(_cookie: usize, _event: &RxEvent<'_>) {}

    fn frame(dst: [u8; 6], ethertype: u16) -> [u8; 60] {
        let mut f = [0u8; 60];
        f[..6].copy_from_slice(&dst);
        f[12..14].copy_from_slice(&ethertype.to_be_bytes());
        f
    }

    #[test]
    fn register_release_round_trip() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        let h = t.register(1, &[0x08, 0x00], 0, sink, 7).unwrap();
        assert_eq!(t.count(), 1);
        assert!(t.lookup(h).is_some());
        t.release(h).unwrap();
        assert_eq!(t.count(), 0);
        // The old selector is dead even though the slot may be reused.
        assert!(t.lookup(h).is_none());
        let h2 = t.register(1, &[0x08, 0x00], 0, sink, 7).unwrap();
        assert_ne!(h, h2);
    }

    #[test]
    fn duplicate_type_is_refused() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        t.register(1, &[0x08, 0x00], 0, sink, 0).unwrap();
        assert_eq!(
            t.register(1, &[0x08, 0x00], 0, sink, 1),
            Err(RegisterError::TypeInUse)
        );
        // Same type on another NIC is fine.
        assert!(t.register(1, &[0x08, 0x00], 1, sink, 1).is_ok());
    }

    #[test]
    fn bad_class_is_refused() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        assert_eq!(
            t.register(9, &[0x08, 0x00], 0, sink, 0),
            Err(RegisterError::BadType)
        );
    }

    #[test]
    fn table_exhaustion_reports_no_space() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        for i in 0..MAX_HANDLES as u16 {
            t.register(1, &i.to_be_bytes(), 0, sink, 0).unwrap();
        }
        assert_eq!(
            t.register(1, &[0xAA, 0xAA], 0, sink, 0),
            Err(RegisterError::NoSpace)
        );
    }

    #[test]
    fn matching_honors_type_and_mode() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        let _ip = t.register(1, &[0x08, 0x00], 0, sink, 0).unwrap();
        let arp = t.register(1, &[0x08, 0x06], 0, sink, 0).unwrap();
        let all = t.register(1, &[], 0, sink, 0).unwrap();

        let f = frame([0xFF; 6], 0x0800);
        let mask = t.match_frame(0, &f);
        let (slots, n) = t.delivery_order(mask);
        assert_eq!(n, 2);
        // Registration order: the ip handle first, then the wildcard.
        assert_eq!(slots[0], 0);
        assert_eq!(t.selector_of(usize::from(slots[1])), all);

        // Multicast frame needs mode >= Multicast.
        let m = frame([0x01, 0x00, 0x5E, 0, 0, 1], 0x0806);
        assert_eq!(t.match_frame(0, &m), 0);
        t.set_mode(t.lookup(arp).unwrap(), RcvMode::AllMulticast);
        assert_ne!(t.match_frame(0, &m), 0);
    }

    #[test]
    fn terminate_releases_sibling_handles_only() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        let a = t.register(1, &[0x08, 0x00], 0, sink, 42).unwrap();
        let _b = t.register(1, &[0x08, 0x06], 0, sink, 42).unwrap();
        let c = t.register(1, &[0x81, 0x37], 0, other_sink, 9).unwrap();
        t.release_siblings(a).unwrap();
        assert_eq!(t.count(), 1);
        assert!(t.lookup(c).is_some());
    }

    #[test]
    fn effective_mode_is_the_strongest_request() {
        let mut t = HandleTable::new(RcvMode::Broadcast);
        assert_eq!(t.effective_mode(0), None);
        let a = t.register(1, &[0x08, 0x00], 0, sink, 0).unwrap();
        let b = t.register(1, &[0x08, 0x06], 0, sink, 0).unwrap();
        t.set_mode(t.lookup(a).unwrap(), RcvMode::Directed);
        t.set_mode(t.lookup(b).unwrap(), RcvMode::Promiscuous);
        assert_eq!(t.effective_mode(0), Some(RcvMode::Promiscuous));
    }
}
