mod common;

use rust_ois::adapters::RegisterWidth;
use rust_ois::hardware::EEPROM_GYRO_CAL_FLAG;
use rust_ois::{OisError, OpStatus};

#[test]
fn test_sensor_register_access() {
    let (rig, device) = common::rig();
    rig.sensors.set_powered(1, true);

    device
        .write_sensor_register(1, 0x0100, RegisterWidth::Word, 0x0302)
        .unwrap();
    assert_eq!(
        device
            .read_sensor_register(1, 0x0100, RegisterWidth::Word)
            .unwrap(),
        0x0302
    );
    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_unpowered_sensor_refused() {
    let (_rig, device) = common::powered_rig();

    let err = device
        .read_sensor_register(0, 0x0016, RegisterWidth::Word)
        .unwrap_err();
    assert_eq!(err.to_string(), "Device command failed: Camera ID 0 POWER DOWN");
}

#[test]
fn test_sensor_arguments_checked() {
    let (rig, device) = common::rig();
    rig.sensors.set_powered(0, true);

    assert!(matches!(
        device.read_sensor_register(3, 0x0016, RegisterWidth::Byte),
        Err(OisError::InvalidArgument(_))
    ));
    assert!(matches!(
        device.read_sensor_register(0, 0x0016, RegisterWidth::DWord),
        Err(OisError::InvalidArgument(_))
    ));
    assert!(matches!(
        device.write_sensor_register(0, 0x0016, RegisterWidth::Byte, 0x1FF),
        Err(OisError::InvalidArgument(_))
    ));
}

#[test]
fn test_eeprom_needs_back_camera_or_ois_power() {
    let (rig, device) = common::rig();
    rig.eeprom.set_byte(EEPROM_GYRO_CAL_FLAG, 0x01);

    assert!(matches!(device.read_eeprom(EEPROM_GYRO_CAL_FLAG), Err(OisError::Command(_))));

    // The front camera does not feed the EEPROM.
    rig.sensors.set_powered(1, true);
    assert!(device.read_eeprom(EEPROM_GYRO_CAL_FLAG).is_err());

    rig.sensors.set_powered(2, true);
    assert_eq!(device.read_eeprom(EEPROM_GYRO_CAL_FLAG).unwrap(), 0x01);

    rig.sensors.set_powered(2, false);
    device.power_up().unwrap();
    assert_eq!(device.read_eeprom(EEPROM_GYRO_CAL_FLAG).unwrap(), 0x01);
    assert_eq!(device.read_eeprom(0x0000).unwrap(), 0xFF);
}
