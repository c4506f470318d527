//! Bus-master capability probe.
//!
//! Decides once, at open, whether DMA can be trusted on this host. Seven
//! phases exercise the controller registers, memory coherency, timing,
//! data-integrity patterns, burst chains, error recovery, and sustained
//! stability, each earning points toward a 552-point total. The verdict is
//! frozen into an immutable [`ProbeReport`]; a distrusted Corkscrew runs
//! the PIO paths for the driver's whole lifetime.
//!
//! The probe runs with the NIC in internal loopback and no handles bound,
//! so nothing it does is visible to applications. Any result that suggests
//! the host itself is at risk aborts straight to `Failed`.

use elink_core::dinfo;
use elink_hal::clock::{Clock, poll_until};
use elink_hal::dma::DmaArena;
use elink_hal::io::IoBus;

use super::regs::{self, El3Ports};
use crate::nicapi::probe_report::{PHASE_MAX, ProbeReport, ProbeThresholds};

/// Probe frame payload size.
const FRAME_LEN: usize = 64;
/// Upload descriptors in the scratch ring.
const RIG_RX_SLOTS: usize = 8;
/// Microseconds to wait for one loopback completion.
const COMPLETION_TIMEOUT_MICROS: u64 = 100_000;
/// Average round-trip ticks for full timing credit.
const TIMING_GOOD_TICKS: u64 = 5_000;
/// Average round-trip ticks for partial timing credit.
const TIMING_OK_TICKS: u64 = 50_000;
/// Controller-phase floor below which the probe aborts.
const CONTROLLER_ABORT_FLOOR: u16 = 30;

/// Hardware access for one probe run.
pub struct ProbeEnv<'a> {
    /// Port I/O.
    pub io: &'a dyn IoBus,
    /// DMA-reachable scratch memory.
    pub arena: &'a dyn DmaArena,
    /// Clock for timeouts and the timing phase.
    pub clock: &'a dyn Clock,
    /// The NIC's I/O base.
    pub io_base: u16,
}

/// Scratch descriptors and buffers the probe drives transfers through.
struct ProbeRig {
    tx_desc: u32,
    tx_buf: u32,
    rx_descs: [u32; RIG_RX_SLOTS],
    rx_bufs: [u32; RIG_RX_SLOTS],
    rx_next: usize,
}

/// Runs the probe. `quick` trades the stability phase and half the
/// repetition counts for a few seconds instead of tens.
pub fn run(env: &ProbeEnv<'_>, thresholds: &ProbeThresholds, quick: bool) -> ProbeReport {
    let mut scores = [0u16; 7];
    let ports = El3Ports::new(env.io, env.io_base);
    let mut window = 0u8;

    let Some(rig) = setup(env, &ports, &mut window) else {
        return ProbeReport::from_scores(scores, thresholds, true);
    };
    let mut rig = rig;

    scores[0] = phase_controller(&ports, &rig);
    if scores[0] < CONTROLLER_ABORT_FLOOR {
        finish(&ports);
        return ProbeReport::from_scores(scores, thresholds, true);
    }

    scores[1] = phase_coherency(env, &ports, &mut rig, quick);
    if scores[1] == 0 {
        // Transfers that never land (or land wrong) are a host hazard.
        finish(&ports);
        return ProbeReport::from_scores(scores, thresholds, true);
    }

    scores[2] = phase_timing(env, &ports, &mut rig);
    scores[3] = phase_patterns(env, &ports, &mut rig);
    scores[4] = phase_burst(env, &ports, &mut rig, quick);
    scores[5] = phase_error_recovery(env, &ports, &mut rig, &mut window);
    if !quick {
        scores[6] = phase_stability(env, &ports, &mut rig);
    }

    finish(&ports);
    let report = ProbeReport::from_scores(scores, thresholds, false);
    dinfo!(
        "busmaster probe: total {} -> {:?}",
        report.total,
        report.confidence
    );
    report
}

/// Brings the NIC into loopback and allocates the scratch rig.
fn setup(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, window: &mut u8) -> Option<ProbeRig> {
    ports
        .cmd_wait(env.clock, regs::OP_TOTAL_RESET, 0)
        .ok()?;
    *window = 0;

    // No interrupts: the probe polls completions out of descriptor memory.
    ports.cmd(regs::OP_SET_INTR_ENB, 0);
    ports.cmd(
        regs::OP_SET_RX_FILTER,
        regs::FILT_STATION | regs::FILT_BROADCAST,
    );
    ports.select_window(window, 3);
    ports.wr16(regs::W3_MAC_CONTROL, regs::MACCTL_LOOPBACK);
    ports.cmd(regs::OP_TX_ENABLE, 0);
    ports.cmd(regs::OP_RX_ENABLE, 0);

    let arena = env.arena;
    let tx_desc = arena.alloc(72, 8).ok()?;
    let tx_buf = arena.alloc(FRAME_LEN as u32, 4).ok()?;
    let mut rx_descs = [0u32; RIG_RX_SLOTS];
    let mut rx_bufs = [0u32; RIG_RX_SLOTS];
    for i in 0..RIG_RX_SLOTS {
        rx_descs[i] = arena.alloc(16, 8).ok()?;
        rx_bufs[i] = arena.alloc(1536, 4).ok()?;
    }
    for i in 0..RIG_RX_SLOTS {
        let next = rx_descs[(i + 1) % RIG_RX_SLOTS];
        arena.write_u32(rx_descs[i], next);
        arena.write_u32(rx_descs[i] + 4, 0);
        arena.write_u32(rx_descs[i] + 8, rx_bufs[i]);
        arena.write_u32(rx_descs[i] + 12, 1536);
    }

    Some(ProbeRig {
        tx_desc,
        tx_buf,
        rx_descs,
        rx_bufs,
        rx_next: 0,
    })
}

fn finish(ports: &El3Ports<'_>) {
    // Leave nothing armed behind us; open re-initializes from scratch.
    ports.cmd(regs::OP_TOTAL_RESET, 0);
}

/// Builds a broadcast probe frame: fixed header, patterned body.
fn build_frame(fill: impl Fn(usize) -> u8) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..6].fill(0xFF);
    frame[6..12].copy_from_slice(&[0x00, 0x60, 0x97, 0xEE, 0xEE, 0xEE]);
    frame[12] = 0x88;
    frame[13] = 0xB5;
    for i in 14..FRAME_LEN {
        frame[i] = fill(i);
    }
    frame
}

/// One loopback transfer through the rig. Returns whether the frame came
/// back intact; `None` means it never completed.
fn round_trip(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, rig: &mut ProbeRig, frame: &[u8; FRAME_LEN]) -> Option<bool> {
    let arena = env.arena;
    let slot = rig.rx_next;
    arena.write_u32(rig.rx_descs[slot] + 4, 0);
    arena.write(rig.tx_buf, frame);

    arena.write_u32(rig.tx_desc, 0);
    arena.write_u32(rig.tx_desc + 4, FRAME_LEN as u32);
    arena.write_u32(rig.tx_desc + 8, rig.tx_buf);
    arena.write_u32(rig.tx_desc + 12, FRAME_LEN as u32 | regs::DN_LAST_FRAG);

    ports.cmd(regs::OP_STALL_CTL, regs::STALL_DOWN);
    ports.wr32(regs::DMA_DOWN_LIST_PTR, rig.tx_desc);
    ports.cmd(regs::OP_STALL_CTL, regs::UNSTALL_DOWN);

    let status = poll_until(env.clock, COMPLETION_TIMEOUT_MICROS, || {
        let st = arena.read_u32(rig.rx_descs[slot] + 4);
        (st & regs::UP_COMPLETE != 0).then_some(st)
    })?;
    rig.rx_next = (slot + 1) % RIG_RX_SLOTS;

    if status & regs::UP_ERROR != 0 {
        return Some(false);
    }
    let len = (status & regs::LEN_MASK) as usize;
    if len != FRAME_LEN {
        return Some(false);
    }
    let mut got = [0u8; FRAME_LEN];
    arena.read(rig.rx_bufs[slot], &mut got);
    Some(got == *frame)
}

/// Phase 1: the descriptor-engine registers behave as documented.
fn phase_controller(ports: &El3Ports<'_>, rig: &ProbeRig) -> u16 {
    let mut score = 0;

    // Status register responds at all.
    if ports.status() != 0xFFFF {
        score += 10;
    }

    // Upload list pointer holds what we wrote (this also arms the rig).
    ports.wr32(regs::DMA_UP_LIST_PTR, rig.rx_descs[0]);
    if ports.rd32(regs::DMA_UP_LIST_PTR) == rig.rx_descs[0] {
        score += 20;
    }

    // Download list pointer: write/readback under stall, then clear.
    ports.cmd(regs::OP_STALL_CTL, regs::STALL_DOWN);
    ports.wr32(regs::DMA_DOWN_LIST_PTR, rig.tx_desc);
    if ports.rd32(regs::DMA_DOWN_LIST_PTR) == rig.tx_desc {
        score += 25;
    }
    ports.wr32(regs::DMA_DOWN_LIST_PTR, 0);
    ports.cmd(regs::OP_STALL_CTL, regs::UNSTALL_DOWN);

    // No error causes latched before we ever moved a byte.
    if ports.rd32(regs::DMA_PKT_STATUS) & regs::PKT_DMA_ERROR == 0 {
        score += 15;
    }

    score.min(PHASE_MAX[0])
}

/// Phase 2: write patterns, run short transfers, verify host reads match.
fn phase_coherency(
    env: &ProbeEnv<'_>,
    ports: &El3Ports<'_>,
    rig: &mut ProbeRig,
    quick: bool,
) -> u16 {
    let rounds: u16 = if quick { 4 } else { 8 };
    let per_round = PHASE_MAX[1] / rounds;
    let mut score = 0;
    for round in 0..rounds {
        let frame = build_frame(|i| (i as u8).wrapping_add(round as u8));
        if round_trip(env, ports, rig, &frame) == Some(true) {
            score += per_round;
        }
    }
    score.min(PHASE_MAX[1])
}

/// Phase 3: round-trip latency against the documented budgets. Only intact
/// transfers count; corrupted data voids the measurement.
fn phase_timing(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, rig: &mut ProbeRig) -> u16 {
    const ROUNDS: u64 = 4;
    let mut elapsed_total = 0u64;
    for round in 0..ROUNDS {
        let frame = build_frame(|i| (i as u8) ^ (round as u8));
        let start = env.clock.ticks();
        if round_trip(env, ports, rig, &frame) != Some(true) {
            return 0;
        }
        elapsed_total += env.clock.ticks().saturating_sub(start);
    }
    let avg = elapsed_total / ROUNDS;
    if avg <= TIMING_GOOD_TICKS {
        PHASE_MAX[2]
    } else if avg <= TIMING_OK_TICKS {
        60
    } else {
        0
    }
}

/// Phase 4: all-ones, all-zeros, walking-ones, alternating, pseudo-random.
fn phase_patterns(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, rig: &mut ProbeRig) -> u16 {
    let patterns: [fn(usize) -> u8; 5] = [
        |_| 0xFF,
        |_| 0x00,
        |i| 1 << (i % 8),
        |i| if i % 2 == 0 { 0x55 } else { 0xAA },
        |i| {
            // Tiny LFSR keyed by position; deterministic, bit-diverse.
            let mut x = (i as u8).wrapping_mul(97).wrapping_add(31);
            x ^= x << 3;
            x ^= x >> 2;
            x
        },
    ];
    let per_pattern = PHASE_MAX[3] / patterns.len() as u16;
    let mut score = 0;
    for fill in patterns {
        let frame = build_frame(fill);
        if round_trip(env, ports, rig, &frame) == Some(true) {
            score += per_pattern;
        }
    }
    score.min(PHASE_MAX[3])
}

/// Phase 5: a chained multi-descriptor burst behind a single doorbell.
fn phase_burst(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, rig: &mut ProbeRig, quick: bool) -> u16 {
    let count = if quick { 4usize } else { 8 };
    let arena = env.arena;

    // Reset the upload ring so the burst lands in slots 0..count.
    for desc in rig.rx_descs {
        arena.write_u32(desc + 4, 0);
    }
    ports.wr32(regs::DMA_UP_LIST_PTR, rig.rx_descs[0]);
    rig.rx_next = 0;

    // Build `count` chained descriptors, each with its own patterned buffer.
    let mut descs = [0u32; RIG_RX_SLOTS];
    let mut frames = [[0u8; FRAME_LEN]; RIG_RX_SLOTS];
    for (i, frame) in frames.iter_mut().enumerate().take(count) {
        *frame = build_frame(|p| (p as u8).wrapping_mul(i as u8 + 1));
        let Ok(desc) = arena.alloc(72, 8) else { return 0 };
        let Ok(buf) = arena.alloc(FRAME_LEN as u32, 4) else {
            return 0;
        };
        arena.write(buf, frame);
        arena.write_u32(desc, 0);
        arena.write_u32(desc + 4, FRAME_LEN as u32);
        arena.write_u32(desc + 8, buf);
        arena.write_u32(desc + 12, FRAME_LEN as u32 | regs::DN_LAST_FRAG);
        if i > 0 {
            arena.write_u32(descs[i - 1], desc);
        }
        descs[i] = desc;
    }

    ports.cmd(regs::OP_STALL_CTL, regs::STALL_DOWN);
    ports.wr32(regs::DMA_DOWN_LIST_PTR, descs[0]);
    ports.cmd(regs::OP_STALL_CTL, regs::UNSTALL_DOWN);

    // Wait for the last slot to fill, then verify each arrival.
    let done = poll_until(env.clock, COMPLETION_TIMEOUT_MICROS, || {
        (arena.read_u32(rig.rx_descs[count - 1] + 4) & regs::UP_COMPLETE != 0).then_some(())
    });
    if done.is_none() {
        return 0;
    }

    let mut intact = 0u16;
    for i in 0..count {
        let status = arena.read_u32(rig.rx_descs[i] + 4);
        if status & regs::UP_COMPLETE == 0 || status & regs::UP_ERROR != 0 {
            continue;
        }
        let mut got = [0u8; FRAME_LEN];
        arena.read(rig.rx_bufs[i], &mut got);
        if got == frames[i] {
            intact += 1;
        }
    }
    rig.rx_next = count % RIG_RX_SLOTS;
    PHASE_MAX[4] * intact / count as u16
}

/// Phase 6: induce a recoverable fault (descriptor underrun) and confirm a
/// short reset brings the engine back without a full adapter reset.
fn phase_error_recovery(
    env: &ProbeEnv<'_>,
    ports: &El3Ports<'_>,
    rig: &mut ProbeRig,
    window: &mut u8,
) -> u16 {
    let arena = env.arena;

    // A zero-length fragment is an underrun by construction.
    arena.write_u32(rig.tx_desc, 0);
    arena.write_u32(rig.tx_desc + 4, FRAME_LEN as u32);
    arena.write_u32(rig.tx_desc + 8, rig.tx_buf);
    arena.write_u32(rig.tx_desc + 12, regs::DN_LAST_FRAG);

    ports.cmd(regs::OP_STALL_CTL, regs::STALL_DOWN);
    ports.wr32(regs::DMA_DOWN_LIST_PTR, rig.tx_desc);
    ports.cmd(regs::OP_STALL_CTL, regs::UNSTALL_DOWN);

    ports.select_window(window, 1);
    let fault_seen = poll_until(env.clock, COMPLETION_TIMEOUT_MICROS, || {
        (ports.rd8(regs::W1_TX_STATUS) & regs::TXS_UNDERRUN != 0).then_some(())
    });
    if fault_seen.is_none() {
        return 0;
    }
    ports.wr8(regs::W1_TX_STATUS, 0);

    // Short recovery only: transmit reset plus re-enable.
    if ports.cmd_wait(env.clock, regs::OP_TX_RESET, 0).is_err() {
        return 0;
    }
    ports.cmd(regs::OP_TX_ENABLE, 0);

    let frame = build_frame(|i| i as u8);
    if round_trip(env, ports, rig, &frame) == Some(true) {
        PHASE_MAX[5]
    } else {
        0
    }
}

/// Phase 7: sustained background traffic with integrity checks.
fn phase_stability(env: &ProbeEnv<'_>, ports: &El3Ports<'_>, rig: &mut ProbeRig) -> u16 {
    const ROUNDS: u16 = 32;
    let mut intact = 0u16;
    for round in 0..ROUNDS {
        let frame = build_frame(|i| (i as u8).wrapping_add(round as u8).rotate_left(3));
        if round_trip(env, ports, rig, &frame) == Some(true) {
            intact += 1;
        }
    }
    PHASE_MAX[6] * intact / ROUNDS
}
