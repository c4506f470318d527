//! Interrupt-flag-preserving critical sections.
//!
//! Shared counters and queue indices are updated inside sections that
//! disable interrupts for a bounded handful of instructions. The interrupt
//! flag is saved on entry and restored on exit (push-flags / pop-flags), so
//! a nested caller always gets back the flag state it installed — a section
//! entered from the ISR (interrupts already off) does not accidentally
//! re-enable them.
//!
//! On `target_os = "none"` this is the real flag dance; on the host the
//! section maintains a depth counter instead so nesting balance stays
//! testable.

#[cfg(not(target_os = "none"))]
use core::sync::atomic::{AtomicU32, Ordering};

#[cfg(not(target_os = "none"))]
static HOST_DEPTH: AtomicU32 = AtomicU32::new(0);

/// RAII critical section: interrupts are disabled while this value lives.
///
/// Not `Send`: the saved flag state belongs to the entering context.
pub struct CritSection {
    #[cfg(target_os = "none")]
    saved_flags: u16,
    _not_send: core::marker::PhantomData<*const ()>,
}

impl CritSection {
    /// Enters a critical section, saving the current interrupt flag.
    #[must_use]
    pub fn enter() -> Self {
        #[cfg(target_os = "none")]
        {
            let saved_flags = arch::save_flags_and_cli();
            Self {
                saved_flags,
                _not_send: core::marker::PhantomData,
            }
        }
        #[cfg(not(target_os = "none"))]
        {
            HOST_DEPTH.fetch_add(1, Ordering::AcqRel);
            Self {
                _not_send: core::marker::PhantomData,
            }
        }
    }
}

impl Drop for CritSection {
    fn drop(&mut self) {
        #[cfg(target_os = "none")]
        // SAFETY: `saved_flags` came from `save_flags_and_cli` in `enter`.
        unsafe {
            arch::restore_flags(self.saved_flags);
        }
        #[cfg(not(target_os = "none"))]
        HOST_DEPTH.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs `f` inside a critical section.
///
/// The closure must be short: a few loads and stores, never a hardware wait.
pub fn with<R>(f: impl FnOnce() -> R) -> R {
    let _section = CritSection::enter();
    f()
}

/// Current nesting depth (host builds only; used by tests to verify the
/// push/pop discipline stays balanced).
#[cfg(not(target_os = "none"))]
#[must_use]
pub fn depth() -> u32 {
    HOST_DEPTH.load(Ordering::Acquire)
}

#[cfg(target_os = "none")]
mod arch {
    //! The exact flag-save sequence. Preconditions: real-address mode,
    //! flags reachable on the current stack.

    /// Pushes FLAGS, disables interrupts, returns the saved FLAGS word.
    pub fn save_flags_and_cli() -> u16 {
        let flags: u16;
        // SAFETY: pushf/pop and cli are always valid in the driver's
        // execution contexts; the pop rebalances the stack.
        unsafe {
            core::arch::asm!(
                "pushf",
                "pop {0:x}",
                "cli",
                out(reg) flags,
                options(nomem, preserves_flags)
            );
        }
        flags
    }

    /// Restores a FLAGS word previously returned by [`save_flags_and_cli`].
    ///
    /// # Safety
    ///
    /// `flags` must come from a matching `save_flags_and_cli` on this
    /// context, in LIFO order.
    pub unsafe fn restore_flags(flags: u16) {
        // SAFETY: Caller guarantees LIFO pairing; push/popf rebalances.
        unsafe {
            core::arch::asm!(
                "push {0:x}",
                "popf",
                in(reg) flags,
                options(nomem)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Serializes the two tests below: depth() is process-global.
    static DEPTH_TEST: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn nesting_balances() {
        let _serial = DEPTH_TEST.lock().unwrap();
        let before = depth();
        {
            let _outer = CritSection::enter();
            assert_eq!(depth(), before + 1);
            {
                let _inner = CritSection::enter();
                assert_eq!(depth(), before + 2);
            }
            assert_eq!(depth(), before + 1);
        }
        assert_eq!(depth(), before);
    }

    #[test]
    fn with_restores_on_return() {
        let _serial = DEPTH_TEST.lock().unwrap();
        let before = depth();
        let v = with(|| depth());
        assert_eq!(v, before + 1);
        assert_eq!(depth(), before);
    }
}
