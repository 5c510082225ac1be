mod common;

use rust_ois::adapters::{BusTransaction, RegisterWidth};
use rust_ois::{OisError, OpStatus};

#[test]
fn test_word_write_is_little_endian_on_the_wire() {
    let (rig, device) = common::powered_rig();

    device
        .write_register(0x0040, RegisterWidth::Word, 0x1234)
        .unwrap();

    assert_eq!(
        rig.bus.transactions(),
        vec![BusTransaction::Write {
            slave: 0x0E,
            reg: 0x0040,
            data: vec![0x34, 0x12],
        }]
    );
    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_read_back_at_every_width() {
    let (_rig, device) = common::powered_rig();

    for (addr, width, value) in [
        (0x0010, RegisterWidth::Byte, 0xAB),
        (0x0020, RegisterWidth::Word, 0xBEEF),
        (0x0030, RegisterWidth::DWord, 0xDEAD_BEEF),
    ] {
        device.write_register(addr, width, value).unwrap();
        assert_eq!(device.read_register(addr, width).unwrap(), value);
    }
}

#[test]
fn test_unpowered_access_is_refused_without_bus_traffic() {
    let (rig, device) = common::rig();

    let err = device.read_register(0x0010, RegisterWidth::Byte).unwrap_err();
    assert!(matches!(err, OisError::PowerNotReady));
    assert_eq!(err.to_string(), "POWER DOWN");
    assert_eq!(rig.bus.transaction_count(), 0);
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_oversized_value_rejected_before_bus() {
    let (rig, device) = common::powered_rig();

    let err = device
        .write_register(0x0010, RegisterWidth::Byte, 0x100)
        .unwrap_err();
    assert!(matches!(err, OisError::InvalidArgument(_)));
    assert_eq!(rig.bus.transaction_count(), 0);
}

#[test]
fn test_select_slave_redirects_access() {
    let (rig, device) = common::powered_rig();

    device.select_slave(0x50).unwrap();
    assert_eq!(device.slave(), 0x50);
    device.read_register(0x0001, RegisterWidth::Byte).unwrap();

    assert_eq!(
        rig.bus.transactions(),
        vec![BusTransaction::Read {
            slave: 0x50,
            reg: 0x0001,
            len: 1,
        }]
    );
    assert!(device.select_slave(0x80).is_err());
    assert_eq!(device.slave(), 0x50);
}

#[test]
fn test_bus_failure_is_reported_as_bus_error() {
    let (rig, device) = common::powered_rig();
    rig.bus.fail_reads(0x0010);

    let err = device.read_register(0x0010, RegisterWidth::Word).unwrap_err();
    assert!(matches!(err, OisError::Bus(_)));
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}
