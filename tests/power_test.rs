mod common;

use std::time::Instant;

use rust_ois::engine::power::POWER_SETTLE;
use rust_ois::engine::servo::ServoMode;
use rust_ois::{OisError, OpStatus};

#[test]
fn test_power_is_reference_counted() {
    let (rig, device) = common::rig();

    device.power_up().unwrap();
    device.power_up().unwrap();
    assert_eq!(device.power_refcount(), 2);
    assert_eq!(rig.power.power_up_calls(), 1);

    device.power_down().unwrap();
    assert!(device.is_powered());
    assert_eq!(rig.power.power_down_calls(), 0);

    device.power_down().unwrap();
    assert!(!device.is_powered());
    assert_eq!(device.power_refcount(), 0);
    assert_eq!(rig.power.power_down_calls(), 1);
}

#[test]
fn test_power_down_at_zero_is_a_no_op() {
    let (rig, device) = common::rig();

    device.power_down().unwrap();
    assert_eq!(device.power_refcount(), 0);
    assert_eq!(rig.power.power_down_calls(), 0);
}

#[test]
fn test_failed_power_up_leaves_count_unchanged() {
    let (rig, device) = common::rig();
    rig.power.fail_power_up(true);

    assert!(device.power_up().is_err());
    assert_eq!(device.power_refcount(), 0);
    assert_eq!(device.get_last_status(), OpStatus::Fail);

    rig.power.fail_power_up(false);
    device.power_up().unwrap();
    assert_eq!(device.power_refcount(), 1);
}

#[test]
fn test_physical_power_down_forgets_mode() {
    let (_rig, device) = common::powered_rig();
    device.set_mode(2).unwrap();
    assert_eq!(device.cached_mode(), ServoMode::Capture);

    device.power_down().unwrap();
    assert_eq!(device.cached_mode(), ServoMode::Uninitialized);
}

#[test]
fn test_external_owner_blocks_power_changes() {
    let (rig, device) = common::rig();
    device.set_external_owner(true);

    assert!(matches!(device.power_up(), Err(OisError::InUse(_))));
    assert_eq!(device.power_refcount(), 0);
    assert_eq!(rig.power.power_up_calls(), 0);

    // The owner powers the module, so register access works.
    assert!(device.is_powered());
    device.set_mode(1).unwrap();

    device.set_external_owner(false);
    assert!(!device.is_powered());
}

#[test]
fn test_first_power_up_waits_for_settle() {
    let (_rig, device) = common::rig();

    let start = Instant::now();
    device.power_up().unwrap();
    assert!(start.elapsed() >= POWER_SETTLE);

    // A second reference only moves the count.
    let start = Instant::now();
    device.power_up().unwrap();
    assert!(start.elapsed() < POWER_SETTLE);
    assert_eq!(device.power_refcount(), 2);
}
