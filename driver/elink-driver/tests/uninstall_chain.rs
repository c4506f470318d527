//! Chained-vector uninstall refusal and clean uninstall.

mod common;

use common::*;
use elink_driver::dispatch::vectors::UninstallError;
use elink_driver::driver::{Hw, PacketDriver};
use elink_driver::recover::ErrorKind;
use elink_driver::{MediaType, StartConfig};
use elink_hal::host::{FarPtr, HostApi};

fn config() -> StartConfig {
    let mut cfg = StartConfig::one_nic(PIO_BASE, PIO_IRQ);
    cfg.nics[0].as_mut().unwrap().media = Some(MediaType::TenBaseT);
    cfg
}

#[test]
fn foreign_chain_blocks_uninstall_and_nothing_is_touched() {
    let rig = pio_rig();
    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();

    // A later resident hooks the API vector in front of ours.
    let foreign = FarPtr::new(0x7777, 0x0042);
    rig.host.set_vector(0x60, foreign);

    assert_eq!(drv.uninstall(), Err(UninstallError::BusyChained));

    // The foreign vector is untouched and we still consider ourselves
    // installed; the refusal is on the record.
    assert_eq!(rig.host.get_vector(0x60), foreign);
    assert!(drv.ctx.install.installed);
    assert!(
        drv.ctx
            .telemetry
            .ring
            .find_last(|r| r.kind == ErrorKind::VectorStolen)
            .is_some()
    );
    // Counters and NIC state are untouched by the refusal.
    let nic = drv.nic_ref(0).unwrap();
    assert_eq!(nic.stats.tx_packets, 0);
    assert_eq!(nic.stats.rx_packets, 0);

    // Once the foreign hook unchains, uninstall completes and restores
    // the original vectors.
    let original_api = entries().api_entry;
    rig.host.set_vector(0x60, original_api);
    drv.uninstall().unwrap();
    assert!(!drv.ctx.install.installed);
    assert_ne!(rig.host.get_vector(0x60), original_api);
}

#[test]
fn uninstall_restores_every_hooked_vector() {
    let rig = pio_rig();
    let before_api = rig.host.get_vector(0x60);
    let before_irq = rig.host.get_vector(0x72); // IRQ 10

    let hw = Hw {
        io: &rig.bus,
        arena: &rig.arena,
        clock: &rig.clock,
        host: &rig.host,
    };
    let mut drv = PacketDriver::new(hw, config()).unwrap();
    drv.install(entries()).unwrap();
    assert_ne!(rig.host.get_vector(0x60), before_api);
    assert_ne!(rig.host.get_vector(0x72), before_irq);

    drv.uninstall().unwrap();
    assert_eq!(rig.host.get_vector(0x60), before_api);
    assert_eq!(rig.host.get_vector(0x72), before_irq);
}
