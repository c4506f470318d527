//! The single driver context.
//!
//! All mutable driver state lives in one [`DriverContext`] value owned by
//! the facade and passed by (split) reference to every subsystem — there
//! are no module-level singletons. Each field is exclusively owned by its
//! subsystem: the dispatcher owns the stack and idle queue, the API layer
//! owns the handle table, each NIC owns its rings and pool.

use crate::api::handle::HandleTable;
use crate::config::StartConfig;
use crate::cpu::CpuFeatures;
use crate::dispatch::dispatcher::DispatcherState;
use crate::dispatch::idle::IdleQueue;
use crate::dispatch::stack::PRIVATE_STACK_BYTES;
use crate::dispatch::vectors::InstallState;
use crate::nicapi::{MAX_NICS, Nic};
use crate::telemetry::Telemetry;

/// Everything the resident driver owns.
pub struct DriverContext {
    /// Validated configuration (constant after install).
    pub config: StartConfig,
    /// CPU features probed at init.
    pub cpu: CpuFeatures,
    /// Entry/exit state and the private stack.
    pub dispatcher: DispatcherState,
    /// Deferred work.
    pub idle: IdleQueue,
    /// Application handles.
    pub handles: HandleTable,
    /// The multiplexed NICs.
    pub nics: [Option<Nic>; MAX_NICS],
    /// Error ring and severity policy.
    pub telemetry: Telemetry,
    /// Vector bookkeeping.
    pub install: InstallState,
    /// Idle callbacks serviced (drives periodic health/balance work).
    pub idle_passes: u64,
}

impl DriverContext {
    /// Builds the context for a validated configuration.
    #[must_use]
    pub fn new(config: StartConfig, cpu: CpuFeatures) -> Self {
        Self {
            config,
            cpu,
            // The stack selector is patched in at install, when the
            // resident image's segment is known.
            dispatcher: DispatcherState::new(0, PRIVATE_STACK_BYTES - 2),
            idle: IdleQueue::new(),
            handles: HandleTable::new(config.rcv_mode_default),
            nics: [const { None }; MAX_NICS],
            telemetry: Telemetry::new(),
            install: InstallState::new(),
            idle_passes: 0,
        }
    }
}
