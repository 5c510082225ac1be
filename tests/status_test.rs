mod common;

use rust_ois::{CommandOutput, OisCommand, OpStatus};

#[test]
fn test_status_read_clears_to_fail() {
    let (_rig, device) = common::rig();
    device.power_up().unwrap();

    assert_eq!(device.get_last_status(), OpStatus::Pass);
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_new_device_reports_fail() {
    let (_rig, device) = common::rig();
    assert_eq!(device.get_last_status(), OpStatus::Fail);
    assert!(device.probe_status());
}

#[test]
fn test_status_override() {
    let (_rig, device) = common::rig();
    device.set_last_status(OpStatus::Pass);
    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_queries_do_not_touch_status() {
    let (_rig, device) = common::powered_rig();
    device.set_mode(1).unwrap();

    device.get_mode().unwrap();
    device.get_state_text().unwrap();
    let _ = device.device_name();

    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_device_name_keeps_first_token() {
    let (_rig, device) = common::rig();

    device
        .execute(OisCommand::SetDeviceName("rumba-s   extra words".into()))
        .unwrap();
    let out = device.execute(OisCommand::GetDeviceName).unwrap();
    assert!(matches!(out, CommandOutput::Text(ref name) if name == "rumba-s"));

    device.set_device_name(&"x".repeat(64));
    assert_eq!(device.device_name().len(), 31);
}

#[test]
fn test_status_through_dispatch() {
    let (_rig, device) = common::rig();
    assert!(device.execute(OisCommand::SetMode(1)).is_err());

    let out = device.execute(OisCommand::GetLastStatus).unwrap();
    assert_eq!(out.to_string(), "0");
}
