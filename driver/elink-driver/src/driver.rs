//! The resident driver facade.
//!
//! [`PacketDriver`] is what the resident entry stubs call into: the API
//! vector lands in [`api`](PacketDriver::api), a hardware IRQ lands in
//! [`hw_interrupt`](PacketDriver::hw_interrupt), and the host-idle hook
//! lands in [`on_idle`](PacketDriver::on_idle). Each entry runs the full
//! protocol — re-entry gate, private-stack accounting, host-busy check —
//! before any real work happens.

use elink_core::{derror, dinfo, dwarn};
use elink_hal::clock::Clock;
use elink_hal::dma::DmaArena;
use elink_hal::host::{FarPtr, HostApi};
use elink_hal::intc;
use elink_hal::io::IoBus;

use crate::api::delivery;
use crate::api::handle::RegisterError;
use crate::api::{
    ApiCall, ApiError, ApiOutcome, DriverInfo, DRIVER_VERSION, FUNCTIONALITY_BASIC, PktStats,
    SIGNATURE,
};
use crate::buffer::balancer;
use crate::config::{ConfigError, StartConfig};
use crate::context::DriverContext;
use crate::cpu;
use crate::dispatch::idle::{IDLE_BATCH, IdleItem};
use crate::dispatch::stack::SavedStack;
use crate::dispatch::vectors::{ResidentEntries, UninstallError};
use crate::api::handle::CLASS_ETHERNET;
use crate::nic3com::{self, el3, regs};
use crate::nicapi::ops::{IrqClaim, OpCtx, RcvMode, ResetDepth, TxFrag, TxRequest};
use crate::nicapi::{CapabilityFlags, MacAddr, MediaType, Nic, NicId, NicState, MAX_NICS};
use crate::netaux::pause;
use crate::recover::engine::{self as engine, Strategy};
use crate::recover::kinds::ErrorKind;
use crate::recover::log::{EntrySource, RecoveryOutcome};

/// Idle callbacks between self-scheduled health/balance passes.
const HEALTH_PERIOD: u64 = 64;
/// Pool pressure (percent) that arms the PAUSE watchdog.
const PAUSE_PRESSURE_PCT: u32 = 80;
/// Quanta requested when the RX side runs hot.
const PAUSE_QUANTA: u16 = 0x00FF;
/// Consecutive host-busy rejections before it counts as an error.
const BUSY_LIMIT: u8 = 16;

/// The hardware and host services the driver runs against.
pub struct Hw<'h> {
    /// Port I/O.
    pub io: &'h dyn IoBus,
    /// DMA-reachable memory.
    pub arena: &'h dyn DmaArena,
    /// Monotonic clock.
    pub clock: &'h dyn Clock,
    /// Vector table and busy flags.
    pub host: &'h dyn HostApi,
}

/// Why install failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallError {
    /// The configuration did not validate.
    Config(ConfigError),
    /// No configured NIC could be opened (last cause attached).
    NoNicOpened(ErrorKind),
}

impl core::fmt::Display for InstallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration: {e}"),
            Self::NoNicOpened(k) => write!(f, "no NIC opened: {k}"),
        }
    }
}

/// Outcome of a hardware-interrupt entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// A NIC claimed and was serviced; EOI has been issued.
    Claimed,
    /// Not ours: far-jump to this saved vector without any EOI.
    Chain(FarPtr),
}

/// The resident packet driver.
pub struct PacketDriver<'h> {
    hw: Hw<'h>,
    /// All driver state.
    pub ctx: DriverContext,
}

/// Builds an `OpCtx` from split context borrows and runs `f` on one NIC.
fn with_nic<R>(
    hw: &Hw<'_>,
    ctx: &mut DriverContext,
    id: NicId,
    source: EntrySource,
    f: impl FnOnce(&mut Nic, &mut OpCtx<'_>) -> R,
) -> Option<R> {
    let DriverContext {
        idle,
        handles,
        nics,
        telemetry,
        ..
    } = ctx;
    let nic = nics[usize::from(id)].as_mut()?;
    let mut octx = OpCtx {
        io: hw.io,
        arena: hw.arena,
        clock: hw.clock,
        idle,
        handles,
        tel: telemetry,
        source,
    };
    Some(f(nic, &mut octx))
}

impl<'h> PacketDriver<'h> {
    /// Creates an uninstalled driver for a validated configuration.
    pub fn new(hw: Hw<'h>, config: StartConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let features = cpu::probe();
        Ok(Self {
            hw,
            ctx: DriverContext::new(config, features),
        })
    }

    /// The presence-check signature external installers scan for.
    #[must_use]
    pub fn signature() -> &'static [u8; 8] {
        &SIGNATURE
    }

    /// Opens every configured NIC and hooks the vectors. NICs that fail to
    /// open are skipped (and logged); at least one must survive.
    pub fn install(&mut self, entries: ResidentEntries) -> Result<(), InstallError> {
        let cfg = self.ctx.config;
        let mut opened = 0;
        let mut last_err = ErrorKind::AdapterConfig;

        for id in 0..MAX_NICS {
            let Some(niccfg) = cfg.nics[id] else { continue };
            let result = {
                let DriverContext {
                    idle,
                    handles,
                    telemetry,
                    ..
                } = &mut self.ctx;
                let mut octx = OpCtx {
                    io: self.hw.io,
                    arena: self.hw.arena,
                    clock: self.hw.clock,
                    idle,
                    handles,
                    tel: telemetry,
                    source: EntrySource::Task,
                };
                nic3com::open_nic(&mut octx, &cfg, &niccfg, id as NicId)
            };
            match result {
                Ok(nic) => {
                    self.ctx.nics[id] = Some(nic);
                    opened += 1;
                }
                Err(kind) => {
                    derror!("nic {id}: open failed: {kind}");
                    let ts = self.hw.clock.ticks();
                    self.ctx
                        .telemetry
                        .record(EntrySource::Task, ts, id as NicId, kind);
                    last_err = kind;
                }
            }
        }
        if opened == 0 {
            return Err(InstallError::NoNicOpened(last_err));
        }

        let mut lines = [0u8; MAX_NICS];
        let mut nlines = 0;
        for nic in self.ctx.nics.iter().flatten() {
            lines[nlines] = nic.desc.irq;
            nlines += 1;
            intc::unmask_line(self.hw.io, nic.desc.irq);
        }
        self.ctx.dispatcher.stack.selector = entries.api_entry.segment;
        self.ctx.install.install(
            self.hw.host,
            cfg.api_vector,
            cfg.multiplex_id,
            entries,
            &lines[..nlines],
        );
        dinfo!(
            "installed: vector {:#04x}, {} nic(s)",
            cfg.api_vector,
            opened
        );
        Ok(())
    }

    /// Uninstalls: verifies vector ownership, restores every vector, and
    /// closes the NICs. Refuses (recording the cause) when foreign code
    /// has chained in front of us.
    pub fn uninstall(&mut self) -> Result<(), UninstallError> {
        match self.ctx.install.uninstall(self.hw.host) {
            Ok(()) => {
                for id in 0..MAX_NICS as u8 {
                    let _ = with_nic(&self.hw, &mut self.ctx, id, EntrySource::Task, |nic, octx| {
                        (nic.ops.close)(nic, octx);
                    });
                }
                dinfo!("uninstalled");
                Ok(())
            }
            Err(e) => {
                if e == UninstallError::BusyChained {
                    let ts = self.hw.clock.ticks();
                    self.ctx
                        .telemetry
                        .record(EntrySource::Task, ts, 0, ErrorKind::VectorStolen);
                    dwarn!("uninstall refused: {e}");
                }
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // API entry
    // -----------------------------------------------------------------------

    /// The packet-driver API entry. The resident stub has already saved the
    /// caller's registers; this runs the rest of the protocol.
    pub fn api(&mut self, call: ApiCall<'_>) -> Result<ApiOutcome, ApiError> {
        if !self.ctx.dispatcher.enter_api(SavedStack::default()) {
            return Err(ApiError::Busy);
        }
        let result = self.api_inner(call);
        self.ctx.dispatcher.exit_api();
        result
    }

    fn api_inner(&mut self, call: ApiCall<'_>) -> Result<ApiOutcome, ApiError> {
        // Host-busy gate: state-changing calls are refused while the host
        // sits in a non-reentrant section.
        if call.modifies_state() && self.hw.host.host_busy() {
            let d = &mut self.ctx.dispatcher;
            d.busy_rejections += 1;
            d.consecutive_busy = d.consecutive_busy.saturating_add(1);
            if d.consecutive_busy == BUSY_LIMIT {
                let ts = self.hw.clock.ticks();
                self.ctx
                    .telemetry
                    .record(EntrySource::Task, ts, 0, ErrorKind::HostBusyTimeout);
            }
            return Err(ApiError::Busy);
        }
        self.ctx.dispatcher.consecutive_busy = 0;

        match call {
            ApiCall::DriverInfo { nic } => self.driver_info(nic),
            ApiCall::AccessType {
                class,
                nic,
                pkt_type,
                upcall,
                cookie,
            } => self.access_type(class, nic, pkt_type, upcall, cookie),
            ApiCall::ReleaseType { handle } => {
                self.ctx
                    .handles
                    .release(handle)
                    .map_err(|()| ApiError::BadHandle)?;
                Ok(ApiOutcome::Done)
            }
            ApiCall::SendPkt { handle, frame } => {
                let frag = [TxFrag { data: frame }];
                self.send(handle, &TxRequest::single(&frag))
            }
            ApiCall::SendPktSg { handle, frags } => self.send(handle, &TxRequest { frags }),
            ApiCall::Terminate { handle } => {
                self.ctx
                    .handles
                    .release_siblings(handle)
                    .map_err(|()| ApiError::BadHandle)?;
                Ok(ApiOutcome::Done)
            }
            ApiCall::GetAddress { handle, out } => {
                let (_, nic_id) = self.resolve(handle)?;
                if out.len() < 6 {
                    return Err(ApiError::NoSpace);
                }
                let mac = self.nic_ref(nic_id).ok_or(ApiError::BadHandle)?.desc.mac;
                out[..6].copy_from_slice(&mac.0);
                Ok(ApiOutcome::AddressLen(6))
            }
            ApiCall::SetAddress { handle, addr } => self.set_address(handle, addr),
            ApiCall::ResetInterface { handle } => {
                let (_, nic_id) = self.resolve(handle)?;
                let outcome = with_nic(
                    &self.hw,
                    &mut self.ctx,
                    nic_id,
                    EntrySource::Task,
                    |nic, octx| (nic.ops.reset)(nic, octx, ResetDepth::Full),
                );
                match outcome {
                    Some(Ok(())) => Ok(ApiOutcome::Done),
                    _ => Err(ApiError::CantReset),
                }
            }
            ApiCall::GetStatistics { handle } => {
                let (_, nic_id) = self.resolve(handle)?;
                let stats = with_nic(
                    &self.hw,
                    &mut self.ctx,
                    nic_id,
                    EntrySource::Task,
                    |nic, octx| (nic.ops.get_stats)(nic, octx),
                )
                .ok_or(ApiError::BadHandle)?;
                Ok(ApiOutcome::Stats(PktStats::from(stats)))
            }
            ApiCall::SetRcvMode { handle, mode } => self.set_rcv_mode(handle, mode),
            ApiCall::GetRcvMode { handle } => {
                let (slot, _) = self.resolve(handle)?;
                Ok(ApiOutcome::Mode(self.ctx.handles.mode_of(slot)))
            }
        }
    }

    fn driver_info(&self, nic: NicId) -> Result<ApiOutcome, ApiError> {
        let nic = self.nic_ref(nic).ok_or(ApiError::BadCommand)?;
        Ok(ApiOutcome::Info(DriverInfo {
            version: DRIVER_VERSION,
            class: CLASS_ETHERNET,
            if_type: nic.db.if_type,
            number: nic.desc.id,
            name: nic.desc.name,
            functionality: FUNCTIONALITY_BASIC,
        }))
    }

    fn access_type(
        &mut self,
        class: u8,
        nic: NicId,
        pkt_type: &[u8],
        upcall: crate::api::RxUpcall,
        cookie: usize,
    ) -> Result<ApiOutcome, ApiError> {
        if self.nic_ref(nic).is_none_or(|n| !n.serviceable()) {
            return Err(ApiError::BadType);
        }
        let handle = self
            .ctx
            .handles
            .register(class, pkt_type, nic, upcall, cookie)
            .map_err(|e| match e {
                RegisterError::BadType => ApiError::BadType,
                RegisterError::TypeInUse => ApiError::TypeInUse,
                RegisterError::NoSpace => ApiError::NoSpace,
            })?;
        Ok(ApiOutcome::Handle(handle))
    }

    fn send(&mut self, handle: u16, req: &TxRequest<'_>) -> Result<ApiOutcome, ApiError> {
        let (_, nic_id) = self.resolve(handle)?;
        if self.nic_ref(nic_id).is_none_or(|n| !n.serviceable()) {
            return Err(ApiError::CantSend);
        }

        let result = with_nic(
            &self.hw,
            &mut self.ctx,
            nic_id,
            EntrySource::Task,
            |nic, octx| {
                if nic.pause.tx_blocked(octx.clock.ticks()) {
                    return Err(ErrorKind::QueueOverflow);
                }
                (nic.ops.send)(nic, octx, req)
            },
        )
        .ok_or(ApiError::CantSend)?;

        match result {
            Ok(()) => Ok(ApiOutcome::Done),
            Err(kind) => {
                // Flow-control conditions (full ring, empty pool, pause)
                // are backpressure, not faults; everything else feeds the
                // recovery engine.
                if !matches!(kind, ErrorKind::QueueOverflow | ErrorKind::PoolExhausted) {
                    self.ctx.idle.push(IdleItem::RecoveryCheck { nic: nic_id, kind });
                }
                Err(ApiError::CantSend)
            }
        }
    }

    fn set_address(&mut self, handle: u16, addr: &[u8]) -> Result<ApiOutcome, ApiError> {
        let (_, nic_id) = self.resolve(handle)?;
        if addr.len() != 6 {
            return Err(ApiError::CantSet);
        }
        let mut mac = [0u8; 6];
        mac.copy_from_slice(addr);

        with_nic(&self.hw, &mut self.ctx, nic_id, EntrySource::Task, |nic, octx| {
            if !nic.quirks.contains(crate::nicapi::QuirkFlags::SET_MAC_ALLOWED)
                || !nic.serviceable()
            {
                return Err(ApiError::CantSet);
            }
            nic.desc.mac = MacAddr(mac);
            let ports = regs::El3Ports::new(octx.io, nic.desc.io_base);
            el3::write_station(&ports, &mut nic.window_cache, mac);
            ports.select_window(&mut nic.window_cache, 1);
            Ok(ApiOutcome::Done)
        })
        .ok_or(ApiError::BadHandle)?
    }

    fn set_rcv_mode(&mut self, handle: u16, mode: u8) -> Result<ApiOutcome, ApiError> {
        let (slot, nic_id) = self.resolve(handle)?;
        let mode = RcvMode::from_u8(mode).ok_or(ApiError::BadMode)?;
        self.ctx.handles.set_mode(slot, mode);

        // The hardware filter honors the strongest mode any handle wants.
        let effective = self
            .ctx
            .handles
            .effective_mode(nic_id)
            .unwrap_or(self.ctx.config.rcv_mode_default);
        let current = self.nic_ref(nic_id).map(|n| n.rcv_mode);
        if current != Some(effective) {
            with_nic(&self.hw, &mut self.ctx, nic_id, EntrySource::Task, |nic, octx| {
                (nic.ops.set_rx_filter)(nic, octx, effective)
            });
        }
        Ok(ApiOutcome::Done)
    }

    // -----------------------------------------------------------------------
    // Hardware interrupt entry
    // -----------------------------------------------------------------------

    /// Hardware-IRQ entry for `line`. Never consults the host-busy flags
    /// and never calls host services; unclaimed interrupts chain to the
    /// previously saved vector without an EOI.
    pub fn hw_interrupt(&mut self, line: u8) -> IrqOutcome {
        let home = self.ctx.dispatcher.enter_isr(SavedStack::default());

        let mut claimed = false;
        for id in 0..MAX_NICS as u8 {
            let candidate = self.nic_ref(id).is_some_and(|n| {
                n.desc.irq == line && !matches!(n.state, NicState::Closed | NicState::Disabled)
            });
            if !candidate {
                continue;
            }
            let claim = with_nic(&self.hw, &mut self.ctx, id, EntrySource::Isr, |nic, octx| {
                (nic.ops.handle_irq)(nic, octx)
            });
            if claim == Some(IrqClaim::Claimed) {
                claimed = true;
                break;
            }
        }

        if claimed {
            // Cascade-aware: the slave is acknowledged before the master.
            intc::eoi(self.hw.io, line);
        }
        self.ctx.dispatcher.exit_isr(home);

        if claimed {
            IrqOutcome::Claimed
        } else {
            IrqOutcome::Chain(self.ctx.install.chain_target(line))
        }
    }

    // -----------------------------------------------------------------------
    // Idle entry
    // -----------------------------------------------------------------------

    /// Host-idle entry: drains a bounded batch of deferred work, but only
    /// while the host is quiescent.
    pub fn on_idle(&mut self) {
        if self.hw.host.host_busy() {
            return;
        }
        self.ctx.idle_passes += 1;
        if self.ctx.idle_passes % HEALTH_PERIOD == 0 {
            self.schedule_periodic();
        }

        for _ in 0..IDLE_BATCH {
            let Some(item) = self.ctx.idle.pop() else { break };
            self.run_idle_item(item);
        }
    }

    fn schedule_periodic(&mut self) {
        for id in 0..MAX_NICS as u8 {
            if self.nic_ref(id).is_some_and(Nic::serviceable) {
                self.ctx.idle.push(IdleItem::HealthCheck { nic: id });
            }
        }
        self.ctx.idle.push(IdleItem::PoolBalance);
    }

    fn run_idle_item(&mut self, item: IdleItem) {
        match item {
            IdleItem::DeliverFrame {
                nic,
                buf,
                len,
                matches,
            } => {
                let DriverContext { nics, handles, .. } = &mut self.ctx;
                let Some(nic_ref) = nics[usize::from(nic)].as_mut() else {
                    return;
                };
                if nic_ref.state == NicState::Disabled {
                    // Deliveries for a dead NIC are dropped.
                    nic_ref.pool.free(buf);
                    return;
                }
                delivery::deliver(handles, &mut nic_ref.pool, self.hw.arena, nic, buf, len, matches);
            }
            IdleItem::RecoveryCheck { nic, kind } => self.recovery_check(nic, kind),
            IdleItem::HealthCheck { nic } => self.health_check(nic),
            IdleItem::PauseExpiry { nic } => {
                let now = self.hw.clock.ticks();
                if let Some(nic) = self.ctx.nics[usize::from(nic)].as_mut() {
                    nic.pause.expire(now);
                }
            }
            IdleItem::PoolBalance => {
                let cfg = self.ctx.config;
                let count = self.ctx.nics.iter().flatten().count() as u32;
                balancer::rebalance(
                    self.ctx.nics.iter_mut().flatten().map(|n| &mut n.pool),
                    cfg.pool_bytes_limit.saturating_mul(count.max(1)),
                    cfg.pool_min_bytes,
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    fn recovery_check(&mut self, id: NicId, kind: ErrorKind) {
        let cfg = self.ctx.config;
        let now = self.hw.clock.ticks();
        let window_ticks = self.hw.clock.micros_to_ticks(cfg.recovery.window_micros);

        let strategy = {
            let Some(nic) = self.ctx.nics[usize::from(id)].as_mut() else {
                return;
            };
            if nic.state == NicState::Disabled {
                return;
            }
            engine::decide(&nic.err, &mut nic.recovery, &cfg.recovery, kind, now, window_ticks)
        };
        let Some(strategy) = strategy else { return };
        dwarn!("nic {id}: {kind} -> {strategy:?} recovery");

        let ok = match strategy {
            Strategy::Soft => self.run_reset(id, ResetDepth::Short),
            Strategy::Hard => self.run_reset(id, ResetDepth::Full),
            Strategy::Reinitialize => with_nic(
                &self.hw,
                &mut self.ctx,
                id,
                EntrySource::Task,
                |nic, octx| {
                    nic.state = NicState::Recovering;
                    nic3com::reopen_nic(nic, octx, &cfg).is_ok()
                },
            )
            .unwrap_or(false),
            Strategy::Disable => {
                self.disable_nic(id);
                true
            }
        };

        if let Some(nic) = self.ctx.nics[usize::from(id)].as_mut() {
            engine::after_attempt(&mut nic.err, &mut nic.recovery, strategy);
            if strategy != Strategy::Disable {
                nic.state = if ok { NicState::Open } else { NicState::Recovering };
            }
        }
        let outcome = if ok {
            RecoveryOutcome::Succeeded
        } else {
            RecoveryOutcome::Failed
        };
        self.ctx
            .telemetry
            .record_recovery(now, id, kind, strategy, outcome);
    }

    fn run_reset(&mut self, id: NicId, depth: ResetDepth) -> bool {
        with_nic(&self.hw, &mut self.ctx, id, EntrySource::Task, |nic, octx| {
            nic.state = NicState::Recovering;
            (nic.ops.reset)(nic, octx, depth).is_ok()
        })
        .unwrap_or(false)
    }

    /// Takes a NIC out of service for good, migrating its handles to a
    /// surviving NIC when policy allows.
    fn disable_nic(&mut self, id: NicId) {
        let _ = with_nic(&self.hw, &mut self.ctx, id, EntrySource::Task, |nic, octx| {
            (nic.ops.close)(nic, octx);
            nic.state = NicState::Disabled;
            nic.recovery.level = 4;
        });
        derror!("nic {id}: disabled");

        if !self.ctx.config.recovery.migrate_on_disable {
            return;
        }
        let target = (0..MAX_NICS as u8)
            .find(|&other| other != id && self.nic_ref(other).is_some_and(Nic::serviceable));
        let Some(target) = target else { return };

        let slots = self.ctx.handles.slots_of(id);
        for slot in 0..u16::BITS as usize {
            if slots & (1 << slot) != 0 {
                self.ctx.handles.migrate(slot, target);
            }
        }
        dinfo!("nic {id}: handles migrated to nic {target}");
    }

    // -----------------------------------------------------------------------
    // Health
    // -----------------------------------------------------------------------

    fn health_check(&mut self, id: NicId) {
        let now = self.hw.clock.ticks();
        let wd_ticks = self
            .hw
            .clock
            .micros_to_ticks(self.ctx.config.tx_watchdog_micros);

        let _ = with_nic(&self.hw, &mut self.ctx, id, EntrySource::Task, |nic, octx| {
            // TX stall watchdog (bus-master variants).
            if let Some(kind) =
                crate::nic3com::corkscrew::tx_stall_check(nic, octx.tel, now, wd_ticks)
            {
                octx.idle.push(IdleItem::RecoveryCheck {
                    nic: nic.desc.id,
                    kind,
                });
            }

            // Link-beat re-test on beat-capable media.
            if nic.desc.link_up
                && matches!(nic.desc.media, MediaType::TenBaseT | MediaType::Mii)
            {
                let ports = regs::El3Ports::new(octx.io, nic.desc.io_base);
                ports.select_window(&mut nic.window_cache, 4);
                let beat = ports.rd16(regs::W4_MEDIA) & regs::MEDIA_LINK_DETECT != 0;
                ports.select_window(&mut nic.window_cache, 1);
                if !beat {
                    nic.desc.link_up = false;
                    nic.err.note_error(ErrorKind::MediaLost);
                    octx.record(nic.desc.id, ErrorKind::MediaLost);
                    octx.idle.push(IdleItem::RecoveryCheck {
                        nic: nic.desc.id,
                        kind: ErrorKind::MediaLost,
                    });
                }
            }

            // RX-pressure PAUSE watchdog, capability permitting.
            if nic.desc.caps.contains(CapabilityFlags::FLOW_CONTROL)
                && nic.pool.pressure_pct() >= PAUSE_PRESSURE_PCT
            {
                let mut frame = [0u8; 60];
                pause::build_frame(nic.desc.mac.0, PAUSE_QUANTA, &mut frame);
                let frag = [TxFrag { data: &frame }];
                if (nic.ops.send)(nic, octx, &TxRequest::single(&frag)).is_ok() {
                    nic.stats.pause_tx += 1;
                }
            }
        });
    }

    // -----------------------------------------------------------------------
    // Accessors (diagnostics and tests)
    // -----------------------------------------------------------------------

    /// Immutable view of one NIC.
    #[must_use]
    pub fn nic_ref(&self, id: NicId) -> Option<&Nic> {
        self.ctx.nics.get(usize::from(id))?.as_ref()
    }

    /// Resolves a handle to `(slot, nic)`.
    fn resolve(&self, handle: u16) -> Result<(usize, NicId), ApiError> {
        let slot = self
            .ctx
            .handles
            .lookup(handle)
            .ok_or(ApiError::BadHandle)?;
        Ok((slot, self.ctx.handles.nic_of(slot)))
    }
}
