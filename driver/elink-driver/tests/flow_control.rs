//! 802.3x PAUSE handling end to end.

mod common;

use common::*;
use elink_driver::api::{ApiCall, ApiError, ApiOutcome};
use elink_driver::config::BusmasterMode;
use elink_driver::driver::{Hw, PacketDriver};
use elink_driver::netaux::pause;
use elink_driver::{MediaType, StartConfig};

fn config() -> StartConfig {
    let mut cfg = StartConfig::one_nic(DMA_BASE, DMA_IRQ);
    {
        let nic = cfg.nics[0].as_mut().unwrap();
        nic.loopback = true;
        nic.media = Some(MediaType::Mii);
    }
    cfg.busmaster = BusmasterMode::On;
    cfg.large_buf_count = 32;
    cfg.pool_bytes_limit = 64 * 1024;
    cfg
}

fn setup_handle(drv: &mut PacketDriver<'_>, cookie: usize) -> u16 {
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
    // All-multicast so the MAC-control group address passes the filter.
    drv.api(ApiCall::SetRcvMode { handle, mode: 5 }).unwrap();
    handle
}

#[test]
fn pause_frame_blocks_transmit_until_expiry() {
    let cookie = 0xFC01;
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
    let handle = setup_handle(&mut drv, cookie);

    let mut pause_frame = [0u8; 60];
    pause::build_frame([0x00, 0x60, 0x97, 0xFE, 0xFE, 0xFE], 0x00FF, &mut pause_frame);
    rig.dev.inject_rx(&pause_frame);
    pump(&mut drv, &rig.bus);

    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.stats.pause_rx, 1);
    // The PAUSE frame itself never reaches applications.
    assert!(captured(cookie).is_empty());

    // Transmit is held while the quanta run.
    let f = frame(0x0800, &[0x01; 50]);
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Err(ApiError::CantSend)
    );

    // 0xFF quanta at 100 Mbit is ~1.3 ms; well past that, traffic flows.
    rig.clock.advance(50_000);
    drv.on_idle();
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Ok(ApiOutcome::Done)
    );
    pump(&mut drv, &rig.bus);
    assert_eq!(captured(cookie).len(), 1);
}

#[test]
fn zero_quanta_resumes_immediately() {
    let cookie = 0xFC02;
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
    let handle = setup_handle(&mut drv, cookie);

    let src = [0x00, 0x60, 0x97, 0xFE, 0xFE, 0xFE];
    let mut hold = [0u8; 60];
    pause::build_frame(src, 0xFFFF, &mut hold);
    rig.dev.inject_rx(&hold);
    pump(&mut drv, &rig.bus);

    let f = frame(0x0800, &[0x02; 50]);
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Err(ApiError::CantSend)
    );

    // The zero-quanta resume message unblocks without waiting.
    let mut resume = [0u8; 60];
    pause::build_frame(src, 0, &mut resume);
    rig.dev.inject_rx(&resume);
    pump(&mut drv, &rig.bus);

    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Ok(ApiOutcome::Done)
    );
    assert_eq!(drv.nic_ref(0).unwrap().stats.pause_rx, 2);
}
