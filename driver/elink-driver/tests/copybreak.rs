//! Copy-break correctness over sustained inbound traffic.

mod common;

use common::*;
use elink_driver::api::{ApiCall, ApiOutcome};
use elink_driver::config::BusmasterMode;
use elink_driver::driver::{Hw, PacketDriver};
use elink_driver::{MediaType, StartConfig};

fn config() -> StartConfig {
    let mut cfg = StartConfig::one_nic(DMA_BASE, DMA_IRQ);
    cfg.nics[0].as_mut().unwrap().media = Some(MediaType::Mii);
    cfg.busmaster = BusmasterMode::On;
    cfg.large_buf_count = 32;
    cfg.pool_bytes_limit = 64 * 1024;
    cfg
}

#[test]
fn alternating_traffic_splits_across_size_classes() {
    let cookie = 0xCB01;
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

    match drv
        .api(ApiCall::AccessType {
            class: 1,
            nic: 0,
            pkt_type: &[],
            upcall: capture_upcall,
            cookie,
        })
        .unwrap()
    {
        ApiOutcome::Handle(_) => {}
        other => panic!("unexpected outcome {other:?}"),
    }

    let baseline_in_use = drv.nic_ref(0).unwrap().pool.in_use();
    let short = frame(0x0800, &[0x64; 50]); // 64 bytes, below the threshold
    let long = frame(0x0800, &[0x20; 498]); // 512 bytes, above it

    for i in 0..1000 {
        if i % 2 == 0 {
            rig.dev.inject_rx(&short);
        } else {
            rig.dev.inject_rx(&long);
        }
        pump(&mut drv, &rig.bus);
    }

    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.pool.stats.copy_break_hits, 500);
    assert_eq!(nic.pool.stats.zero_copy_swaps, 500);
    assert_eq!(nic.stats.rx_packets, 1000);
    // Every delivery returned its buffer; only the armed ring remains out.
    assert_eq!(nic.pool.in_use(), baseline_in_use);

    let got = captured(cookie);
    assert_eq!(got.len(), 1000);
    assert_eq!(got[0].1.len(), 64);
    assert_eq!(got[1].1.len(), 512);
}

#[test]
fn threshold_boundary_is_exact() {
    let cookie = 0xCB02;
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
    drv.api(ApiCall::AccessType {
        class: 1,
        nic: 0,
        pkt_type: &[],
        upcall: capture_upcall,
        cookie,
    })
    .unwrap();

    // Exactly the threshold: the copy path.
    let at = frame(0x0800, &[0xAB; 186]); // 200 bytes
    rig.dev.inject_rx(&at);
    pump(&mut drv, &rig.bus);
    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.pool.stats.copy_break_hits, 1);
    assert_eq!(nic.pool.stats.zero_copy_swaps, 0);

    // One past it: the swap path.
    let past = frame(0x0800, &[0xAB; 187]); // 201 bytes
    rig.dev.inject_rx(&past);
    pump(&mut drv, &rig.bus);
    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.pool.stats.copy_break_hits, 1);
    assert_eq!(nic.pool.stats.zero_copy_swaps, 1);
}
