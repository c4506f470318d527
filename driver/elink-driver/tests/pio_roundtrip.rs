//! End-to-end PIO paths: loopback round trip, framing boundaries, the
//! busy-host gate, and the API surface basics.

mod common;

use common::*;
use elink_driver::api::{ApiCall, ApiOutcome, ApiError};
use elink_driver::driver::{Hw, PacketDriver};
use elink_driver::{MediaType, StartConfig};
use elink_hal::intc::{PIC1_CMD, PIC2_CMD};

fn config() -> StartConfig {
    let mut cfg = StartConfig::one_nic(PIO_BASE, PIO_IRQ);
    {
        let nic = cfg.nics[0].as_mut().unwrap();
        nic.loopback = true;
        nic.media = Some(MediaType::TenBaseT);
    }
    cfg
}

fn access(drv: &mut PacketDriver<'_>, pkt_type: &[u8], cookie: usize) -> u16 {
    match drv
        .api(ApiCall::AccessType {
            class: 1,
            nic: 0,
            pkt_type,
            upcall: capture_upcall,
            cookie,
        })
        .unwrap()
    {
        ApiOutcome::Handle(h) => h,
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn send_receive_round_trip() {
    let cookie = 0x5091;
    clear_captured(cookie);
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();

    let handle = access(&mut drv, &[0x08, 0x00], cookie);
    let f = frame(0x0800, &[0x5A; 50]);
    assert_eq!(f.len(), 64);

    rig.bus.clear_pic_log();
    assert_eq!(
        drv.api(ApiCall::SendPkt {
            handle,
            frame: &f
        }),
        Ok(ApiOutcome::Done)
    );
    pump(&mut drv, &rig.bus);

    let got = captured(cookie);
    assert_eq!(got.len(), 1, "exactly one delivery");
    assert_eq!(got[0].0, handle);
    assert_eq!(got[0].1, f);

    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.stats.tx_packets, 1);
    assert_eq!(nic.stats.rx_packets, 1);

    // Cascade EOI for IRQ 10: slave acknowledged before master.
    let log = rig.bus.pic_cmd_log();
    assert_eq!(&log[..2], &[(PIC2_CMD, 0x20), (PIC1_CMD, 0x20)]);
}

#[test]
fn short_frames_pad_and_long_frames_transit() {
    let cookie = 0x5092;
    clear_captured(cookie);
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();
    let handle = access(&mut drv, &[], cookie);

    // 54-byte frame pads to the 60-byte minimum on the wire.
    let short = frame(0x0800, &[0xA1; 40]);
    drv.api(ApiCall::SendPkt { handle, frame: &short }).unwrap();
    pump(&mut drv, &rig.bus);

    // Maximum non-jumbo frame passes unchanged.
    let long = frame(0x0800, &[0xB2; 1500]);
    assert_eq!(long.len(), 1514);
    drv.api(ApiCall::SendPkt { handle, frame: &long }).unwrap();
    pump(&mut drv, &rig.bus);

    let got = captured(cookie);
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].1.len(), 60);
    assert_eq!(&got[0].1[..54], &short[..]);
    assert!(got[0].1[54..].iter().all(|&b| b == 0));
    assert_eq!(got[1].1, long);
}

#[test]
fn driver_info_reports_identity() {
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();

    match drv.api(ApiCall::DriverInfo { nic: 0 }).unwrap() {
        ApiOutcome::Info(info) => {
            assert_eq!(info.class, 1);
            assert_eq!(info.name, "3C509B");
            assert_eq!(info.number, 0);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(PacketDriver::signature(), b"PKT DRVR");
}

#[test]
fn release_returns_table_to_prior_state() {
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();

    let handle = access(&mut drv, &[0x08, 0x00], 0x5093);
    assert_eq!(drv.ctx.handles.count(), 1);
    drv.api(ApiCall::ReleaseType { handle }).unwrap();
    assert_eq!(drv.ctx.handles.count(), 0);
    // The same registration is possible again; the stale handle is dead.
    assert_eq!(
        drv.api(ApiCall::ReleaseType { handle }),
        Err(ApiError::BadHandle)
    );
    let _again = access(&mut drv, &[0x08, 0x00], 0x5093);
}

#[test]
fn busy_host_defers_state_changing_calls() {
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();
    let handle = access(&mut drv, &[], 0x5094);
    let f = frame(0x0800, &[0; 50]);

    rig.host.set_busy(true);
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Err(ApiError::Busy)
    );
    // Read-only calls still answer.
    assert!(drv.api(ApiCall::DriverInfo { nic: 0 }).is_ok());
    // Idle work stays parked while the host is busy.
    drv.on_idle();

    rig.host.set_busy(false);
    assert_eq!(
        drv.api(ApiCall::SendPkt { handle, frame: &f }),
        Ok(ApiOutcome::Done)
    );
}

#[test]
fn reset_interface_is_idempotent() {
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();
    let handle = access(&mut drv, &[], 0x5095);

    drv.api(ApiCall::ResetInterface { handle }).unwrap();
    drv.api(ApiCall::ResetInterface { handle }).unwrap();

    // Still fully operational after back-to-back resets.
    let cookie = 0x5095;
    clear_captured(cookie);
    let f = frame(0x0800, &[0x77; 50]);
    drv.api(ApiCall::SendPkt { handle, frame: &f }).unwrap();
    pump(&mut drv, &rig.bus);
    assert_eq!(captured(cookie).len(), 1);
}
