//! The recovery escalation ladder, end to end: Soft, Hard (with ring
//! rebuild), Reinitialize, and Disable.

mod common;

use common::*;
use elink_driver::api::{ApiCall, ApiError, ApiOutcome};
use elink_driver::config::BusmasterMode;
use elink_driver::driver::{Hw, PacketDriver};
use elink_driver::nicapi::{NicState, VariantState};
use elink_driver::recover::Strategy;
use elink_driver::{MediaType, StartConfig};
use elink_hal::sim::el3::RXE_CRC;

fn config() -> StartConfig {
    let mut cfg = StartConfig::one_nic(DMA_BASE, DMA_IRQ);
    cfg.nics[0].as_mut().unwrap().media = Some(MediaType::Mii);
    cfg.busmaster = BusmasterMode::On;
    cfg.large_buf_count = 32;
    cfg.pool_bytes_limit = 64 * 1024;
    cfg
}

fn strategy_logged(drv: &PacketDriver<'_>, strategy: Strategy) -> bool {
    drv.ctx
        .telemetry
        .ring
        .find_last(|r| r.strategy == Some(strategy))
        .is_some()
}

#[test]
fn ladder_escalates_soft_hard_reinit_disable() {
    let cookie = 0xEC01;
    clear_captured(cookie);
    let rig = dma_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: rig.clock.as_ref(),
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();
    let handle = match drv
        .api(ApiCall::AccessType {
            class: 1,
            nic: 0,
            pkt_type: &[],
            upcall: capture_upcall,
            cookie,
        })
        .unwrap()
    {
        ApiOutcome::Handle(h) => h,
        other => panic!("unexpected outcome {other:?}"),
    };

    let f = frame(0x0800, &[0x42; 50]);

    // Phase 1: nine consecutive CRC errors promote a Soft recovery.
    rig.dev.set_rx_error(Some(RXE_CRC));
    for _ in 0..9 {
        rig.dev.inject_rx(&f);
        pump(&mut drv, &rig.bus);
    }
    rig.dev.set_rx_error(None);
    assert!(strategy_logged(&drv, Strategy::Soft));
    assert!(!strategy_logged(&drv, Strategy::Hard));
    // Counters were reset by the attempt.
    assert_eq!(drv.nic_ref(0).unwrap().err.consecutive, 0);

    // Phase 2: 200 errors among 1000 frames crosses the 10% rate and
    // promotes a Hard recovery with a ring rebuild.
    for i in 1..=1000u32 {
        rig.dev
            .set_rx_error(if i % 5 == 0 { Some(RXE_CRC) } else { None });
        rig.dev.inject_rx(&f);
        pump(&mut drv, &rig.bus);
        if strategy_logged(&drv, Strategy::Hard) {
            break;
        }
    }
    rig.dev.set_rx_error(None);
    assert!(strategy_logged(&drv, Strategy::Hard));
    match &drv.nic_ref(0).unwrap().variant {
        VariantState::Dma(ch) => {
            // Fresh rings: fifteen armed upload slots, nothing in flight
            // on the download side.
            assert_eq!(ch.rx.dirty, 0);
            assert_eq!(ch.rx.cur, 15);
            assert_eq!(ch.tx.in_flight(), 0);
        }
        VariantState::Pio => panic!("expected bus-master state"),
    }

    // Phase 3: a DMA fault escalates to Reinitialize.
    rig.dev.trigger_dma_error();
    pump(&mut drv, &rig.bus);
    pump(&mut drv, &rig.bus);
    assert!(strategy_logged(&drv, Strategy::Reinitialize));
    assert_eq!(drv.nic_ref(0).unwrap().state, NicState::Open);

    // Phase 4: a repeat DMA fault ends the NIC.
    rig.dev.trigger_dma_error();
    pump(&mut drv, &rig.bus);
    pump(&mut drv, &rig.bus);
    assert!(strategy_logged(&drv, Strategy::Disable));
    assert_eq!(drv.nic_ref(0).unwrap().state, NicState::Disabled);

    // Sends on the dead NIC answer CantSend, forever.
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Err(ApiError::CantSend)
    );
}

#[test]
fn soft_reset_leaves_rings_alone() {
    let rig = dma_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: rig.clock.as_ref(),
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();

    let before = match &drv.nic_ref(0).unwrap().variant {
        VariantState::Dma(ch) => (ch.rx.cur, ch.rx.dirty),
        VariantState::Pio => panic!("expected bus-master state"),
    };

    // Nine consecutive CRC errors -> Soft only.
    rig.dev.set_rx_error(Some(RXE_CRC));
    let f = frame(0x0800, &[0; 50]);
    for _ in 0..9 {
        rig.dev.inject_rx(&f);
        pump(&mut drv, &rig.bus);
    }
    assert!(strategy_logged(&drv, Strategy::Soft));

    match &drv.nic_ref(0).unwrap().variant {
        VariantState::Dma(ch) => {
            // Error frames recycled their buffers in place; counters moved
            // forward together and the ring kept its geometry.
            assert_eq!(ch.rx.cur.wrapping_sub(ch.rx.dirty), 15);
            assert_eq!(ch.rx.dirty.wrapping_sub(before.1), 9);
            assert!(ch.rx.audit());
        }
        VariantState::Pio => panic!("expected bus-master state"),
    }
}
