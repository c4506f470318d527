//! Vector install, chaining, and verified uninstall.
//!
//! Install saves every vector it replaces and remembers exactly what it
//! wrote. Uninstall restores nothing unless every one of our vectors is
//! still ours — a foreign resident chained in front means the only safe
//! answer is to refuse.

use elink_hal::host::{FarPtr, HostApi};

use crate::nicapi::MAX_NICS;

/// Maps an IRQ line to its interrupt vector (PC interrupt layout: master
/// lines at 8..15, slave lines at 0x70..0x77).
#[must_use]
pub fn irq_to_vector(line: u8) -> u8 {
    if line < 8 { 8 + line } else { 0x70 + (line - 8) }
}

/// Far entry points of the resident image, provided by the installer.
#[derive(Debug, Clone, Copy)]
pub struct ResidentEntries {
    /// The packet-driver API entry (hooked at the API vector).
    pub api_entry: FarPtr,
    /// The hardware-IRQ entry (hooked at each NIC's IRQ vector).
    pub irq_entry: FarPtr,
}

/// Why an uninstall was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallError {
    /// Another resident has hooked in front of us; unhooking now would cut
    /// it out of the chain.
    BusyChained,
    /// Nothing is installed.
    NotInstalled,
}

impl core::fmt::Display for UninstallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BusyChained => f.write_str("foreign handler chained in front"),
            Self::NotInstalled => f.write_str("not installed"),
        }
    }
}

/// Multiplex (installation-check) functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxFunction {
    /// "Are you there?"
    InstallationCheck,
    /// "Where is your API entry?"
    GetEntryPoint,
    /// "May you be uninstalled right now?"
    UninstallCheck,
}

/// Multiplex replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxReply {
    /// The id is not ours; the caller chains on.
    NotOurs,
    /// Installed; here is the API entry point.
    Present(FarPtr),
    /// Uninstall would succeed right now.
    UninstallOk,
    /// Uninstall would be refused (chained).
    UninstallBlocked,
}

/// Vector bookkeeping for one installed driver.
pub struct InstallState {
    /// True between a successful install and a successful uninstall.
    pub installed: bool,
    /// The API interrupt vector number.
    pub api_vector: u8,
    /// What the API vector held before us.
    pub saved_api: FarPtr,
    /// Our multiplex identifier.
    pub multiplex_id: u8,
    /// What we installed.
    pub entries: ResidentEntries,
    /// Hooked IRQ lines: `(line, previous vector)`.
    pub irq_hooks: [Option<(u8, FarPtr)>; MAX_NICS],
}

impl InstallState {
    /// Empty, uninstalled state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            installed: false,
            api_vector: 0,
            saved_api: FarPtr::NULL,
            multiplex_id: 0,
            entries: ResidentEntries {
                api_entry: FarPtr::NULL,
                irq_entry: FarPtr::NULL,
            },
            irq_hooks: [None; MAX_NICS],
        }
    }

    /// Hooks the API vector and every distinct IRQ line in `irq_lines`.
    pub fn install(
        &mut self,
        host: &dyn HostApi,
        api_vector: u8,
        multiplex_id: u8,
        entries: ResidentEntries,
        irq_lines: &[u8],
    ) {
        self.api_vector = api_vector;
        self.multiplex_id = multiplex_id;
        self.entries = entries;
        self.saved_api = host.get_vector(api_vector);
        host.set_vector(api_vector, entries.api_entry);

        let mut hooked = 0;
        for &line in irq_lines {
            let already = self.irq_hooks[..hooked]
                .iter()
                .flatten()
                .any(|&(l, _)| l == line);
            if already || hooked >= MAX_NICS {
                continue;
            }
            let vector = irq_to_vector(line);
            self.irq_hooks[hooked] = Some((line, host.get_vector(vector)));
            host.set_vector(vector, entries.irq_entry);
            hooked += 1;
        }
        self.installed = true;
    }

    /// The far target an unclaimed interrupt on `line` chains to.
    #[must_use]
    pub fn chain_target(&self, line: u8) -> FarPtr {
        self.irq_hooks
            .iter()
            .flatten()
            .find(|&&(l, _)| l == line)
            .map_or(FarPtr::NULL, |&(_, saved)| saved)
    }

    /// True while every vector we hooked still points at us.
    #[must_use]
    pub fn owns_vectors(&self, host: &dyn HostApi) -> bool {
        if host.get_vector(self.api_vector) != self.entries.api_entry {
            return false;
        }
        self.irq_hooks.iter().flatten().all(|&(line, _)| {
            host.get_vector(irq_to_vector(line)) == self.entries.irq_entry
        })
    }

    /// Restores every saved vector, refusing if any has been re-hooked.
    pub fn uninstall(&mut self, host: &dyn HostApi) -> Result<(), UninstallError> {
        if !self.installed {
            return Err(UninstallError::NotInstalled);
        }
        if !self.owns_vectors(host) {
            return Err(UninstallError::BusyChained);
        }
        host.set_vector(self.api_vector, self.saved_api);
        for hook in self.irq_hooks.iter_mut() {
            if let Some((line, saved)) = hook.take() {
                host.set_vector(irq_to_vector(line), saved);
            }
        }
        self.installed = false;
        Ok(())
    }

    /// Answers a multiplex query addressed to `id`.
    #[must_use]
    pub fn multiplex(&self, host: &dyn HostApi, id: u8, function: MuxFunction) -> MuxReply {
        if id != self.multiplex_id || !self.installed {
            return MuxReply::NotOurs;
        }
        match function {
            MuxFunction::InstallationCheck | MuxFunction::GetEntryPoint => {
                MuxReply::Present(self.entries.api_entry)
            }
            MuxFunction::UninstallCheck => {
                if self.owns_vectors(host) {
                    MuxReply::UninstallOk
                } else {
                    MuxReply::UninstallBlocked
                }
            }
        }
    }
}

impl Default for InstallState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elink_hal::sim::SimHost;

    fn entries() -> ResidentEntries {
        ResidentEntries {
            api_entry: FarPtr::new(0x5000, 0x0100),
            irq_entry: FarPtr::new(0x5000, 0x0200),
        }
    }

    #[test]
    fn irq_lines_map_to_pc_vectors() {
        assert_eq!(irq_to_vector(3), 0x0B);
        assert_eq!(irq_to_vector(10), 0x72);
    }

    #[test]
    fn install_then_uninstall_restores_vectors() {
        let host = SimHost::new();
        let before_api = host.get_vector(0x60);
        let before_irq = host.get_vector(irq_to_vector(10));

        let mut st = InstallState::new();
        st.install(&host, 0x60, 0xC8, entries(), &[10]);
        assert!(st.owns_vectors(&host));
        assert_eq!(st.chain_target(10), before_irq);

        st.uninstall(&host).unwrap();
        assert_eq!(host.get_vector(0x60), before_api);
        assert_eq!(host.get_vector(irq_to_vector(10)), before_irq);
        assert!(!st.installed);
    }

    #[test]
    fn chained_foreign_handler_blocks_uninstall() {
        let host = SimHost::new();
        let mut st = InstallState::new();
        st.install(&host, 0x60, 0xC8, entries(), &[10]);

        let foreign = FarPtr::new(0x7777, 0x0000);
        host.set_vector(0x60, foreign);

        assert_eq!(st.uninstall(&host), Err(UninstallError::BusyChained));
        // The foreign hook is untouched and we still count as installed.
        assert_eq!(host.get_vector(0x60), foreign);
        assert!(st.installed);
        assert_eq!(
            st.multiplex(&host, 0xC8, MuxFunction::UninstallCheck),
            MuxReply::UninstallBlocked
        );
    }

    #[test]
    fn duplicate_irq_lines_hook_once() {
        let host = SimHost::new();
        let mut st = InstallState::new();
        st.install(&host, 0x60, 0xC8, entries(), &[10, 10, 10]);
        assert_eq!(st.irq_hooks.iter().flatten().count(), 1);
    }

    #[test]
    fn multiplex_identifies_us() {
        let host = SimHost::new();
        let mut st = InstallState::new();
        st.install(&host, 0x60, 0xC8, entries(), &[10]);
        assert_eq!(
            st.multiplex(&host, 0xC8, MuxFunction::InstallationCheck),
            MuxReply::Present(entries().api_entry)
        );
        assert_eq!(
            st.multiplex(&host, 0x55, MuxFunction::InstallationCheck),
            MuxReply::NotOurs
        );
    }
}
