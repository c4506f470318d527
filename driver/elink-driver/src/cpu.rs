//! CPU feature probe.
//!
//! Establishes once at init which fast paths the processor supports. A
//! failed check never aborts anything — it just leaves the corresponding
//! fast path off.

use bitflags::bitflags;

bitflags! {
    /// Processor features the driver's fast paths care about.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CpuFeatures: u8 {
        /// Floating-point unit present.
        const FPU = 1 << 0;
        /// 32-bit registers (386+): enables dword-wide copies.
        const CPU32 = 1 << 1;
        /// CPUID instruction available.
        const CPUID = 1 << 2;
        /// Timestamp counter available.
        const TSC = 1 << 3;
        /// Fast string moves are profitable.
        const WIDE_IO = 1 << 4;
    }
}

/// Clock the timing code should prefer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSource {
    /// Per-cycle timestamp counter.
    TimestampCounter,
    /// The platform interval timer.
    IntervalTimer,
}

/// Probes the processor.
#[must_use]
pub fn probe() -> CpuFeatures {
    #[cfg(target_os = "none")]
    {
        arch::detect()
    }
    #[cfg(not(target_os = "none"))]
    {
        // Host builds model a fully featured processor.
        CpuFeatures::all()
    }
}

/// Widest safe transfer unit (bytes) for the copy routines.
#[must_use]
pub fn copy_unit(features: CpuFeatures) -> usize {
    if features.contains(CpuFeatures::CPU32) {
        4
    } else {
        2
    }
}

/// The best available time source.
#[must_use]
pub fn time_source(features: CpuFeatures) -> TimeSource {
    if features.contains(CpuFeatures::TSC) {
        TimeSource::TimestampCounter
    } else {
        TimeSource::IntervalTimer
    }
}

#[cfg(target_os = "none")]
mod arch {
    //! Flag-toggle feature detection for real hardware.

    use super::CpuFeatures;

    /// EFLAGS alignment-check bit: toggleable on a 486+, which implies
    /// 32-bit registers are present.
    const FLAG_AC: u32 = 1 << 18;
    /// EFLAGS ID bit: toggleable when CPUID exists.
    const FLAG_ID: u32 = 1 << 21;

    pub fn detect() -> CpuFeatures {
        let mut features = CpuFeatures::empty();
        if flag_toggles(FLAG_AC) {
            features |= CpuFeatures::CPU32 | CpuFeatures::WIDE_IO;
        }
        if flag_toggles(FLAG_ID) {
            features |= CpuFeatures::CPUID;
            let (edx, _) = cpuid(1);
            if edx & 1 != 0 {
                features |= CpuFeatures::FPU;
            }
            if edx & (1 << 4) != 0 {
                features |= CpuFeatures::TSC;
            }
        }
        features
    }

    /// True when `bit` in EFLAGS can be flipped and read back.
    fn flag_toggles(bit: u32) -> bool {
        let before: u32;
        let after: u32;
        // SAFETY: pushfd/popfd pairs rebalance the stack; flipping AC/ID is
        // side-effect free outside the flag register.
        unsafe {
            core::arch::asm!(
                "pushfd",
                "pop {before:e}",
                "mov {tmp:e}, {before:e}",
                "xor {tmp:e}, {bit:e}",
                "push {tmp:e}",
                "popfd",
                "pushfd",
                "pop {after:e}",
                "push {before:e}",
                "popfd",
                before = out(reg) before,
                after = out(reg) after,
                tmp = out(reg) _,
                bit = in(reg) bit,
            );
        }
        (before ^ after) & bit != 0
    }

    /// Executes CPUID, returning (EDX, EAX).
    fn cpuid(leaf: u32) -> (u32, u32) {
        let edx: u32;
        let eax: u32;
        // SAFETY: CPUID presence was verified via the ID flag toggle.
        unsafe {
            core::arch::asm!(
                "cpuid",
                inout("eax") leaf => eax,
                out("edx") edx,
                out("ecx") _,
                out("ebx") _,
            );
        }
        (edx, eax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_probe_enables_fast_paths() {
        let f = probe();
        assert!(f.contains(CpuFeatures::CPU32));
        assert_eq!(copy_unit(f), 4);
        assert_eq!(time_source(f), TimeSource::TimestampCounter);
    }

    #[test]
    fn narrow_processor_falls_back() {
        let f = CpuFeatures::FPU;
        assert_eq!(copy_unit(f), 2);
        assert_eq!(time_source(f), TimeSource::IntervalTimer);
    }
}
