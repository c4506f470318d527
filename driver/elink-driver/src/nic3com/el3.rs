//! 3C509B PIO driver.
//!
//! Register-windowed operation: transmit streams the caller's bytes
//! straight into the on-chip TX FIFO (no intermediate copy), receive reads
//! the RX FIFO through the copy-break rule, and the ISR half acknowledges
//! the adapter before the dispatcher issues the cascade-aware EOI.
//!
//! The EEPROM, media-select, and filter helpers here are shared with the
//! Corkscrew driver — the windowed core is common to the family.

use elink_core::dtrace;
use elink_hal::clock::{Clock, poll_until};

use super::regs::{self, El3Ports};
use crate::buffer::{BufHandle, MAX_FRAME_BYTES, MIN_FRAME_BYTES, SizeClass, class_for_len};
use crate::dispatch::idle::IdleItem;
use crate::netaux::pause;
use crate::nicapi::ops::{
    IrqClaim, NicOps, OpCtx, OpResult, RcvMode, ResetDepth, TxRequest,
};
use crate::nicapi::{MediaType, Nic, NicState, NicStats, media::media_caps};
use crate::recover::kinds::ErrorKind;

/// Microseconds to wait for one EEPROM word.
const EEPROM_WORD_TIMEOUT_MICROS: u64 = 2_000;
/// EEPROM read retries before the adapter counts as misconfigured.
const EEPROM_RETRIES: u8 = 3;
/// Microseconds to wait for TX FIFO space.
const TX_SPACE_TIMEOUT_MICROS: u64 = 20_000;
/// Link-beat sampling: ten samples, 100 ms apart, eight must agree.
const LINK_SAMPLES: u8 = 10;
const LINK_SAMPLE_SPACING_MICROS: u64 = 100_000;
const LINK_SAMPLES_REQUIRED: u8 = 8;
/// Frames drained from the RX FIFO per interrupt.
const RX_BUDGET: u8 = 8;

/// The PIO operation table. Also serves a Corkscrew that failed its
/// capability probe — the windowed FIFO paths are common to the family.
pub static EL3_PIO_OPS: NicOps = NicOps {
    open: pio_open,
    close: pio_close,
    reset: pio_reset,
    send: pio_send,
    recv: pio_recv,
    handle_irq: pio_irq,
    read_eeprom: op_read_eeprom,
    select_media: op_select_media,
    set_rx_filter: op_set_rx_filter,
    get_stats: op_get_stats,
};

fn ports<'a>(octx: &OpCtx<'a>, nic: &Nic) -> El3Ports<'a> {
    El3Ports::new(octx.io, nic.desc.io_base)
}

// ---------------------------------------------------------------------------
// Shared family helpers (also used by the Corkscrew driver)
// ---------------------------------------------------------------------------

/// Burns `micros` against the clock.
pub(super) fn sleep(clock: &dyn Clock, micros: u64) {
    let _: Option<()> = poll_until(clock, micros, || None);
}

/// Reads one EEPROM word with bounded waits and a small retry budget.
pub(super) fn eeprom_read_word(
    ports: &El3Ports<'_>,
    clock: &dyn Clock,
    window_cache: &mut u8,
    addr: u8,
) -> Result<u16, ErrorKind> {
    ports.select_window(window_cache, 0);
    for _ in 0..EEPROM_RETRIES {
        ports.wr16(regs::W0_EEPROM_CMD, regs::EEPROM_READ | u16::from(addr));
        let ready = poll_until(clock, EEPROM_WORD_TIMEOUT_MICROS, || {
            (ports.rd16(regs::W0_EEPROM_CMD) & regs::EEPROM_BUSY == 0).then_some(())
        });
        if ready.is_some() {
            return Ok(ports.rd16(regs::W0_EEPROM_DATA));
        }
    }
    Err(ErrorKind::AdapterConfig)
}

/// Maps a receive mode onto the family's filter bits.
pub(super) fn filter_bits(mode: RcvMode) -> u16 {
    match mode {
        RcvMode::Off => 0,
        RcvMode::Directed => regs::FILT_STATION,
        RcvMode::Broadcast => regs::FILT_STATION | regs::FILT_BROADCAST,
        RcvMode::Multicast | RcvMode::AllMulticast => {
            regs::FILT_STATION | regs::FILT_BROADCAST | regs::FILT_MULTICAST
        }
        RcvMode::Promiscuous => {
            regs::FILT_STATION
                | regs::FILT_BROADCAST
                | regs::FILT_MULTICAST
                | regs::FILT_PROMISC
        }
    }
}

/// Programs the station address into window 2.
pub(crate) fn write_station(ports: &El3Ports<'_>, window_cache: &mut u8, mac: [u8; 6]) {
    ports.select_window(window_cache, 2);
    for (i, b) in mac.iter().enumerate() {
        ports.wr8(regs::W2_STATION + i as u16, *b);
    }
}

/// Samples the link-beat bit over a full second with a stability predicate.
pub(super) fn link_beat_stable(
    ports: &El3Ports<'_>,
    clock: &dyn Clock,
    window_cache: &mut u8,
) -> bool {
    ports.select_window(window_cache, 4);
    let mut hits = 0;
    for _ in 0..LINK_SAMPLES {
        if ports.rd16(regs::W4_MEDIA) & regs::MEDIA_LINK_DETECT != 0 {
            hits += 1;
        }
        sleep(clock, LINK_SAMPLE_SPACING_MICROS);
    }
    hits >= LINK_SAMPLES_REQUIRED
}

/// Selects a medium: the requested one, or autodetection in family order.
pub(super) fn select_media_impl(
    nic: &mut Nic,
    octx: &mut OpCtx<'_>,
    requested: Option<MediaType>,
) -> OpResult {
    let ports = ports(octx, nic);
    let caps = nic.desc.media_caps;
    let candidates: &[MediaType] = match requested {
        Some(ref m) => core::slice::from_ref(m),
        None => &MediaType::DETECT_ORDER,
    };

    for &media in candidates {
        if caps & media.required_cap() == 0 {
            continue;
        }
        match media {
            MediaType::TenBaseT | MediaType::Mii => {
                ports.select_window(&mut nic.window_cache, 4);
                ports.wr16(
                    regs::W4_MEDIA,
                    regs::MEDIA_JABBER_GUARD | regs::MEDIA_LINK_BEAT_ENABLE,
                );
                if link_beat_stable(&ports, octx.clock, &mut nic.window_cache) {
                    nic.desc.media = media;
                    nic.desc.link_up = true;
                    nic.desc.speed_mbps =
                        if media == MediaType::Mii && caps & media_caps::MBIT_100 != 0 {
                            100
                        } else {
                            10
                        };
                    return Ok(());
                }
                // No beat on a requested medium is a hard answer.
                if requested.is_some() {
                    nic.desc.link_up = false;
                    return Err(ErrorKind::MediaLost);
                }
            }
            MediaType::Aui | MediaType::Bnc => {
                // Passive media carry no beat; select and trust.
                nic.desc.media = media;
                nic.desc.link_up = true;
                nic.desc.speed_mbps = 10;
                return Ok(());
            }
        }
    }
    nic.desc.link_up = false;
    Err(ErrorKind::MediaLost)
}

/// Common bring-up used by open and full reset: reset engines, program the
/// station address, select media, program filter, interrupts, loopback.
pub(super) fn family_init(nic: &mut Nic, octx: &mut OpCtx<'_>, int_mask: u16) -> OpResult {
    let ports = ports(octx, nic);
    let clock = octx.clock;

    ports.cmd_wait(clock, regs::OP_TX_RESET, 0)?;
    ports.cmd_wait(clock, regs::OP_RX_RESET, 0)?;

    write_station(&ports, &mut nic.window_cache, nic.desc.mac.0);

    let wanted = nic.cfg_media;
    select_media_impl(nic, octx, wanted)?;

    let ports = self::ports(octx, nic);
    if nic.cfg_loopback {
        ports.select_window(&mut nic.window_cache, 3);
        ports.wr16(regs::W3_MAC_CONTROL, regs::MACCTL_LOOPBACK);
    }

    ports.cmd(regs::OP_SET_RX_FILTER, filter_bits(nic.rcv_mode));
    ports.cmd(regs::OP_SET_STATUS_ENB, int_mask);
    ports.cmd(regs::OP_SET_INTR_ENB, int_mask);
    ports.cmd(regs::OP_TX_ENABLE, 0);
    if nic.rcv_mode != RcvMode::Off {
        ports.cmd(regs::OP_RX_ENABLE, 0);
    }
    ports.select_window(&mut nic.window_cache, 1);
    Ok(())
}

// ---------------------------------------------------------------------------
// PIO operations
// ---------------------------------------------------------------------------

fn pio_open(nic: &mut Nic, octx: &mut OpCtx<'_>) -> OpResult {
    let ports = ports(octx, nic);
    ports.cmd_wait(octx.clock, regs::OP_TOTAL_RESET, 0)?;
    nic.window_cache = 0;
    family_init(nic, octx, regs::PIO_INT_MASK)?;
    nic.state = NicState::Open;
    Ok(())
}

fn pio_close(nic: &mut Nic, octx: &mut OpCtx<'_>) {
    let ports = ports(octx, nic);
    ports.cmd(regs::OP_RX_DISABLE, 0);
    ports.cmd(regs::OP_TX_DISABLE, 0);
    ports.cmd(regs::OP_SET_INTR_ENB, 0);
    ports.cmd(regs::OP_ACK_INTR, 0x07FF);
    nic.state = NicState::Closed;
}

fn pio_reset(nic: &mut Nic, octx: &mut OpCtx<'_>, depth: ResetDepth) -> OpResult {
    let ports = ports(octx, nic);
    match depth {
        ResetDepth::Short => {
            // Clear latched trouble and re-enable both engines in place.
            ports.cmd(regs::OP_ACK_INTR, 0x07FF);
            ports.cmd(regs::OP_TX_ENABLE, 0);
            if nic.rcv_mode != RcvMode::Off {
                ports.cmd(regs::OP_RX_ENABLE, 0);
            }
            Ok(())
        }
        ResetDepth::Full => {
            ports.cmd_wait(octx.clock, regs::OP_TOTAL_RESET, 0)?;
            nic.window_cache = 0;
            family_init(nic, octx, regs::PIO_INT_MASK)?;
            nic.state = NicState::Open;
            Ok(())
        }
    }
}

/// Direct-PIO transmit: header words, then the caller's bytes straight
/// into the FIFO. The caller's buffers are only borrowed for the duration
/// of this call, and the frame is fully in the FIFO when it returns.
fn pio_send(nic: &mut Nic, octx: &mut OpCtx<'_>, req: &TxRequest<'_>) -> OpResult {
    let total = req.total_len();
    if total < 14 || total > usize::from(MAX_FRAME_BYTES) {
        return Err(ErrorKind::RxLength);
    }
    let wire_len = total.max(usize::from(MIN_FRAME_BYTES));

    let ports = ports(octx, nic);
    ports.select_window(&mut nic.window_cache, 1);

    // Wait (bounded) for FIFO room: frame plus the two header words.
    let needed = (wire_len + 4) as u16;
    let space = poll_until(octx.clock, TX_SPACE_TIMEOUT_MICROS, || {
        (ports.rd16(regs::W1_TX_FREE) >= needed).then_some(())
    });
    if space.is_none() {
        nic.stats.tx_errors += 1;
        nic.err.note_error(ErrorKind::TxTimeout);
        octx.record(nic.desc.id, ErrorKind::TxTimeout);
        return Err(ErrorKind::TxTimeout);
    }

    let fifo = nic.desc.io_base + regs::W1_FIFO;
    octx.io.outw(fifo, wire_len as u16);
    octx.io.outw(fifo, 0);

    let pad = wire_len - total;
    let mut bytes = req
        .frags
        .iter()
        .flat_map(|f| f.data.iter().copied())
        .chain(core::iter::repeat_n(0u8, pad));
    while let Some(lo) = bytes.next() {
        let hi = bytes.next().unwrap_or(0);
        octx.io.outw(fifo, u16::from(lo) | (u16::from(hi) << 8));
    }

    nic.stats.tx_packets += 1;
    nic.stats.tx_bytes += wire_len as u64;
    Ok(())
}

/// Poll-mode receive: one frame straight from the RX FIFO into the
/// caller's buffer, no pool involvement.
fn pio_recv(nic: &mut Nic, octx: &mut OpCtx<'_>, buf: &mut [u8]) -> Result<usize, ErrorKind> {
    let ports = ports(octx, nic);
    ports.select_window(&mut nic.window_cache, 1);
    let status = ports.rd16(regs::W1_RX_STATUS);
    if status & regs::RXS_INCOMPLETE != 0 {
        return Ok(0);
    }
    if status & regs::RXS_ERROR != 0 {
        let kind = regs::rx_error_kind(status);
        nic.stats.rx_errors += 1;
        nic.err.note_frames(1, false);
        nic.err.note_error(kind);
        octx.record(nic.desc.id, kind);
        ports.cmd(regs::OP_RX_DISCARD, 0);
        return Err(kind);
    }
    let len = usize::from(status & regs::RXS_LEN_MASK).min(buf.len()).min(1536);
    elink_hal::io::read_fifo_bytes(octx.io, nic.desc.io_base + regs::W1_FIFO, &mut buf[..len]);
    ports.cmd(regs::OP_RX_DISCARD, 0);
    nic.err.note_frames(1, true);
    nic.stats.rx_packets += 1;
    nic.stats.rx_bytes += len as u64;
    Ok(len)
}

fn pio_irq(nic: &mut Nic, octx: &mut OpCtx<'_>) -> IrqClaim {
    let status = {
        let ports = ports(octx, nic);
        ports.status()
    };
    if status & regs::ST_INT_LATCH == 0 {
        return IrqClaim::NotMine;
    }

    if status & regs::ST_ADAPTER_FAILURE != 0 {
        adapter_failure(nic, octx);
    }
    if status & regs::ST_TX_COMPLETE != 0 {
        drain_tx_status(nic, octx);
    }
    if status & regs::ST_RX_COMPLETE != 0 {
        drain_rx_fifo(nic, octx);
    }

    let ports = ports(octx, nic);
    ports.cmd(
        regs::OP_ACK_INTR,
        regs::ST_INT_LATCH | (status & (regs::ST_ADAPTER_FAILURE | regs::ST_RX_COMPLETE)),
    );
    IrqClaim::Claimed
}

fn adapter_failure(nic: &mut Nic, octx: &mut OpCtx<'_>) {
    let kind = ErrorKind::AdapterHang;
    nic.err.note_error(kind);
    nic.last_failure = Some(kind);
    octx.record(nic.desc.id, kind);
    octx.idle.push(IdleItem::RecoveryCheck {
        nic: nic.desc.id,
        kind,
    });
}

/// Pops the TX status stack, mapping error bits into the taxonomy.
pub(super) fn drain_tx_status(nic: &mut Nic, octx: &mut OpCtx<'_>) {
    let ports = ports(octx, nic);
    ports.select_window(&mut nic.window_cache, 1);
    loop {
        let st = ports.rd8(regs::W1_TX_STATUS);
        if st & regs::TXS_COMPLETE == 0 {
            break;
        }
        ports.wr8(regs::W1_TX_STATUS, 0);

        let kind = if st & regs::TXS_JABBER != 0 {
            Some(ErrorKind::TxJabber)
        } else if st & regs::TXS_UNDERRUN != 0 {
            Some(ErrorKind::TxUnderrun)
        } else if st & regs::TXS_MAX_COLLISIONS != 0 {
            Some(ErrorKind::TxCollisionExcess)
        } else {
            None
        };
        if let Some(kind) = kind {
            nic.stats.tx_errors += 1;
            nic.err.note_error(kind);
            nic.last_failure = Some(kind);
            octx.record(nic.desc.id, kind);
            octx.idle.push(IdleItem::RecoveryCheck {
                nic: nic.desc.id,
                kind,
            });
        }
    }
}

fn drain_rx_fifo(nic: &mut Nic, octx: &mut OpCtx<'_>) {
    for _ in 0..RX_BUDGET {
        let ports = ports(octx, nic);
        ports.select_window(&mut nic.window_cache, 1);
        let status = ports.rd16(regs::W1_RX_STATUS);
        if status & regs::RXS_INCOMPLETE != 0 {
            break;
        }

        if status & regs::RXS_ERROR != 0 {
            let kind = regs::rx_error_kind(status);
            nic.stats.rx_errors += 1;
            nic.err.note_frames(1, false);
            nic.err.note_error(kind);
            octx.record(nic.desc.id, kind);
            octx.idle.push(IdleItem::RecoveryCheck {
                nic: nic.desc.id,
                kind,
            });
            ports.cmd(regs::OP_RX_DISCARD, 0);
            continue;
        }

        let len = usize::from(status & regs::RXS_LEN_MASK).min(1536);
        let mut frame = [0u8; 1536];
        elink_hal::io::read_fifo_bytes(octx.io, nic.desc.io_base + regs::W1_FIFO, &mut frame[..len]);
        ports.cmd(regs::OP_RX_DISCARD, 0);

        nic.err.note_frames(1, true);
        receive_frame(nic, octx, &frame[..len]);
    }
}

/// Common inbound-frame handling for both variants once the bytes are in
/// host memory: PAUSE interception, handle matching, copy-break class
/// selection, and the idle-queue delivery post.
pub(super) fn receive_frame(nic: &mut Nic, octx: &mut OpCtx<'_>, frame: &[u8]) {
    if let Some(quanta) = pause::parse(frame) {
        let ticks = pause::quanta_to_ticks(quanta, nic.desc.speed_mbps, octx.clock.tick_hz());
        nic.pause.apply(octx.clock.ticks(), ticks);
        nic.stats.pause_rx += 1;
        octx.idle.push(IdleItem::PauseExpiry { nic: nic.desc.id });
        return;
    }

    nic.stats.rx_packets += 1;
    nic.stats.rx_bytes += frame.len() as u64;

    let matches = octx.handles.match_frame(nic.desc.id, frame);
    if matches == 0 {
        nic.stats.rx_dropped += 1;
        return;
    }

    let class = class_for_len(frame.len() as u16, nic.copy_break);
    let handle = match nic.pool.alloc(class) {
        Ok(h) => h,
        Err(kind) => {
            nic.stats.rx_dropped += 1;
            nic.err.note_error(kind);
            octx.record(nic.desc.id, kind);
            return;
        }
    };
    if class == SizeClass::Small {
        nic.pool.stats.copy_break_hits += 1;
    }
    octx.arena.write(nic.pool.phys(handle), frame);
    post_delivery(nic, octx, handle, frame.len() as u16, matches);
}

/// Posts a delivery item, returning the buffer to the pool on overflow.
pub(super) fn post_delivery(
    nic: &mut Nic,
    octx: &mut OpCtx<'_>,
    buf: BufHandle,
    len: u16,
    matches: u16,
) {
    let ok = octx.idle.push(IdleItem::DeliverFrame {
        nic: nic.desc.id,
        buf,
        len,
        matches,
    });
    if !ok {
        nic.pool.free(buf);
        nic.stats.rx_dropped += 1;
        nic.err.note_error(ErrorKind::QueueOverflow);
        octx.record(nic.desc.id, ErrorKind::QueueOverflow);
    } else {
        dtrace!("nic {} rx {} bytes -> {:#06x}", nic.desc.id, len, matches);
    }
}

pub(super) fn op_read_eeprom(nic: &mut Nic, octx: &mut OpCtx<'_>, addr: u8) -> Result<u16, ErrorKind> {
    let ports = ports(octx, nic);
    eeprom_read_word(&ports, octx.clock, &mut nic.window_cache, addr)
}

pub(super) fn op_select_media(nic: &mut Nic, octx: &mut OpCtx<'_>, media: Option<MediaType>) -> OpResult {
    select_media_impl(nic, octx, media)
}

pub(super) fn op_set_rx_filter(nic: &mut Nic, octx: &mut OpCtx<'_>, mode: RcvMode) -> OpResult {
    let ports = ports(octx, nic);
    ports.cmd(regs::OP_SET_RX_FILTER, filter_bits(mode));
    if mode == RcvMode::Off {
        ports.cmd(regs::OP_RX_DISABLE, 0);
    } else {
        ports.cmd(regs::OP_RX_ENABLE, 0);
    }
    nic.rcv_mode = mode;
    Ok(())
}

/// Folds the window-6 read-to-clear counters into the driver's view.
pub(super) fn op_get_stats(nic: &mut Nic, octx: &mut OpCtx<'_>) -> NicStats {
    let ports = ports(octx, nic);
    ports.select_window(&mut nic.window_cache, 6);
    let carrier_lost = ports.rd8(regs::W6_CARRIER_LOST);
    let overruns = ports.rd8(regs::W6_RX_OVERRUNS);
    let _ = ports.rd8(regs::W6_TX_FRAMES);
    let _ = ports.rd8(regs::W6_RX_FRAMES);
    ports.select_window(&mut nic.window_cache, 1);

    nic.stats.tx_errors += u64::from(carrier_lost);
    nic.stats.rx_errors += u64::from(overruns);
    nic.stats
}
