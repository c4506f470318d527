//! The dispatcher's private stack.
//!
//! Every entry into the resident driver switches off the caller's stack so
//! our deepest call chain can never walk into application or host memory.
//! The switch itself is two writes that the hardware treats as one: the
//! stack-selector write masks interrupts for exactly one instruction, and
//! the stack-pointer write must be that instruction. That pair lives in
//! [`arch`]; everything else here is bookkeeping that also runs (and is
//! tested) on the host.

/// Size of the private stack.
pub const PRIVATE_STACK_BYTES: u16 = 4096;

/// Nesting the private stack accepts: one API level plus one ISR level.
pub const MAX_PRIVATE_NESTING: u8 = 2;

/// A caller's SS:SP pair, saved across the switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedStack {
    /// Stack segment/selector.
    pub ss: u16,
    /// Stack pointer.
    pub sp: u16,
}

/// Where an entry ended up running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackHome {
    /// Switched onto the private stack.
    Private,
    /// Nesting budget spent: stayed on the caller's stack (no allocation
    /// allowed on this path).
    Caller,
}

/// Private-stack state.
pub struct PrivateStack {
    /// Our stack selector (fixed at install).
    pub selector: u16,
    /// Top-of-stack offset for the outermost entry.
    pub top: u16,
    /// Current nesting depth on the private stack.
    depth: u8,
    /// Saved caller pairs, one per active level.
    saved: [SavedStack; MAX_PRIVATE_NESTING as usize],
    /// Entries that had to stay on the caller's stack.
    pub caller_stack_entries: u32,
}

impl PrivateStack {
    /// Creates the bookkeeping for a stack at `selector:top`.
    #[must_use]
    pub const fn new(selector: u16, top: u16) -> Self {
        Self {
            selector,
            top,
            depth: 0,
            saved: [SavedStack { ss: 0, sp: 0 }; MAX_PRIVATE_NESTING as usize],
            caller_stack_entries: 0,
        }
    }

    /// Current nesting depth.
    #[must_use]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Enters a new level. Switches to the private stack when the nesting
    /// budget allows, otherwise stays on the caller's stack.
    pub fn enter(&mut self, caller: SavedStack) -> StackHome {
        if self.depth >= MAX_PRIVATE_NESTING {
            self.caller_stack_entries += 1;
            return StackHome::Caller;
        }
        self.saved[usize::from(self.depth)] = caller;
        self.depth += 1;

        #[cfg(target_os = "none")]
        {
            // Each nesting level gets the lower half of the remaining stack.
            let sp = self.top - u16::from(self.depth - 1) * (PRIVATE_STACK_BYTES / 2);
            // SAFETY: selector:sp addresses our resident stack region and the
            // caller pair was just recorded for the matching exit.
            unsafe { arch::load_stack_pair(self.selector, sp) };
        }
        StackHome::Private
    }

    /// Leaves a level entered with [`enter`](Self::enter) that returned
    /// [`StackHome::Private`]. Restores the caller's pair.
    pub fn exit(&mut self) -> SavedStack {
        debug_assert!(self.depth > 0, "stack exit without matching enter");
        self.depth -= 1;
        let caller = self.saved[usize::from(self.depth)];

        #[cfg(target_os = "none")]
        // SAFETY: `caller` is the pair saved by the matching enter.
        unsafe {
            arch::load_stack_pair(caller.ss, caller.sp);
        }
        caller
    }
}

#[cfg(target_os = "none")]
mod arch {
    //! The paired stack-selector/pointer write.

    /// Loads SS:SP as an uninterruptible pair.
    ///
    /// # Safety
    ///
    /// `ss:sp` must address writable stack memory with room for the deepest
    /// call chain, and the caller must have saved the previous pair. The
    /// selector write masks interrupts for exactly one instruction; the
    /// pointer write is that instruction — nothing may be scheduled between
    /// them.
    pub unsafe fn load_stack_pair(ss: u16, sp: u16) {
        // SAFETY: Contract documented above; the two moves are adjacent by
        // construction and the assembler may not reorder them.
        unsafe {
            core::arch::asm!(
                "mov ss, {0:x}",
                "mov sp, {1:x}",
                in(reg) ss,
                in(reg) sp,
                options(nostack)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_budget_is_two_levels() {
        let mut stack = PrivateStack::new(0x1234, 0x0FFE);
        let api = SavedStack { ss: 0x2000, sp: 0x8000 };
        let isr = SavedStack { ss: 0x3000, sp: 0x7000 };

        assert_eq!(stack.enter(api), StackHome::Private);
        assert_eq!(stack.enter(isr), StackHome::Private);
        // A third entry must not touch the private stack.
        assert_eq!(
            stack.enter(SavedStack { ss: 0x4000, sp: 0x6000 }),
            StackHome::Caller
        );
        assert_eq!(stack.caller_stack_entries, 1);

        // LIFO restore order.
        assert_eq!(stack.exit(), isr);
        assert_eq!(stack.exit(), api);
        assert_eq!(stack.depth(), 0);
    }
}
