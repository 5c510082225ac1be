mod common;

use rust_ois::engine::servo::ServoMode;
use rust_ois::hardware::mock::OisOp;
use rust_ois::{OisError, OpStatus};

#[test]
fn test_mode_cycle() {
    let (rig, device) = common::powered_rig();

    device.set_mode(2).unwrap();
    assert_eq!(device.get_mode().unwrap(), ServoMode::Capture);

    device.servo_off().unwrap();
    assert_eq!(device.get_mode().unwrap(), ServoMode::Off);
    assert_eq!(rig.ois.servo_state_now(), ServoMode::Off);

    device.servo_on().unwrap();
    assert_eq!(device.get_mode().unwrap(), ServoMode::Capture);
    assert_eq!(device.get_state().unwrap(), ServoMode::Capture);
}

#[test]
fn test_invalid_mode_never_reaches_device() {
    let (rig, device) = common::powered_rig();

    let err = device.set_mode(4).unwrap_err();
    assert!(matches!(err, OisError::InvalidArgument(_)));
    assert!(!rig.ois.was_called(OisOp::SwitchMode));
    assert_eq!(rig.bus.transaction_count(), 0);
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_invalid_mode_keeps_capture() {
    let (rig, device) = common::powered_rig();
    assert_eq!(rig.ois.servo_state_now(), ServoMode::Off);

    device.set_mode(2).unwrap();
    assert_eq!(device.cached_mode(), ServoMode::Capture);
    assert_eq!(device.get_last_status(), OpStatus::Pass);

    let calls_before = rig.ois.calls().len();
    let bus_before = rig.bus.transaction_count();
    let err = device.set_mode(7).unwrap_err();

    assert!(matches!(err, OisError::InvalidArgument(_)));
    assert_eq!(rig.ois.calls().len(), calls_before);
    assert_eq!(rig.bus.transaction_count(), bus_before);
    assert_eq!(device.cached_mode(), ServoMode::Capture);
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_mode_requires_power() {
    let (rig, device) = common::rig();

    assert!(matches!(device.set_mode(1), Err(OisError::PowerNotReady)));
    assert!(matches!(device.get_mode(), Err(OisError::PowerNotReady)));
    assert!(rig.ois.calls().is_empty());
}

#[test]
fn test_rejected_switch_keeps_cached_mode() {
    let (rig, device) = common::powered_rig();
    device.set_mode(1).unwrap();
    rig.ois.fail_on(OisOp::SwitchMode);

    assert!(device.set_mode(3).is_err());
    assert_eq!(device.cached_mode(), ServoMode::Preview);
}

#[test]
fn test_state_text() {
    let (_rig, device) = common::rig();
    assert_eq!(device.get_state_text().unwrap(), "POWER DOWN");

    device.power_up().unwrap();
    device.set_mode(1).unwrap();
    assert_eq!(device.get_state_text().unwrap(), "RUN");
    device.servo_off().unwrap();
    assert_eq!(device.get_state_text().unwrap(), "SERVO OFF");
}
