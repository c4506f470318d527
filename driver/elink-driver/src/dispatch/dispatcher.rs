//! Dispatcher entry/exit state.
//!
//! Tracks which execution contexts are live (API call, hardware ISR, both
//! nested), owns the private stack, and enforces the re-entrancy rules: an
//! API call never nests inside another API call, a hardware ISR may nest
//! once on top of an API call, and anything deeper runs on the caller's
//! stack without allocating.

use super::stack::{PrivateStack, SavedStack, StackHome};

/// Dispatcher execution-state flags and counters.
pub struct DispatcherState {
    /// An API call is in flight.
    pub in_api: bool,
    /// Nested hardware-ISR depth.
    pub isr_depth: u8,
    /// The private stack.
    pub stack: PrivateStack,
    /// API calls refused because one was already in flight.
    pub reentry_refusals: u32,
    /// API calls refused because the host was busy.
    pub busy_rejections: u32,
    /// Consecutive busy rejections (feeds the host-busy-timeout error).
    pub consecutive_busy: u8,
}

impl DispatcherState {
    /// Creates the dispatcher state around a private stack.
    #[must_use]
    pub const fn new(stack_selector: u16, stack_top: u16) -> Self {
        Self {
            in_api: false,
            isr_depth: 0,
            stack: PrivateStack::new(stack_selector, stack_top),
            reentry_refusals: 0,
            busy_rejections: 0,
            consecutive_busy: 0,
        }
    }

    /// Enters API context. `false` means a call is already in flight and
    /// the caller must return the busy code without touching anything.
    pub fn enter_api(&mut self, caller: SavedStack) -> bool {
        if self.in_api {
            self.reentry_refusals += 1;
            return false;
        }
        self.in_api = true;
        let _ = self.stack.enter(caller);
        true
    }

    /// Leaves API context.
    pub fn exit_api(&mut self) {
        debug_assert!(self.in_api);
        let _ = self.stack.exit();
        self.in_api = false;
    }

    /// Enters hardware-ISR context (always proceeds; interrupts preempt).
    /// Returns where this level is running.
    pub fn enter_isr(&mut self, caller: SavedStack) -> StackHome {
        self.isr_depth = self.isr_depth.saturating_add(1);
        self.stack.enter(caller)
    }

    /// Leaves hardware-ISR context.
    pub fn exit_isr(&mut self, home: StackHome) {
        debug_assert!(self.isr_depth > 0);
        self.isr_depth -= 1;
        if home == StackHome::Private {
            let _ = self.stack.exit();
        }
    }

    /// True while any driver context is live.
    #[must_use]
    pub fn active(&self) -> bool {
        self.in_api || self.isr_depth > 0
    }
}
