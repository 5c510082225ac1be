mod common;

use std::time::Instant;

use rust_ois::engine::calibration::{GYRO_OFFSET_X, GYRO_OFFSET_Y, SAMPLE_COUNT, SAMPLE_INTERVAL};
use rust_ois::{OisError, OpStatus};

#[test]
fn test_constant_offsets() {
    let (rig, device) = common::powered_rig();
    rig.bus.set_word(GYRO_OFFSET_X, 0x0010);
    rig.bus.set_word(GYRO_OFFSET_Y, 0x0020);

    let result = device.run_calibration().unwrap();

    assert_eq!(result.avg_x, 0x0010);
    assert_eq!(result.avg_y, 0x0020);
    assert_eq!((result.min_x, result.max_x), (0x0010, 0x0010));
    assert_eq!((result.min_y, result.max_y), (0x0020, 0x0020));
    assert_eq!(rig.bus.read_count(GYRO_OFFSET_X), SAMPLE_COUNT);
    assert_eq!(rig.reports.calibrations(), vec![result]);
    assert_eq!(device.last_calibration(), Some(result));
    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_signed_samples_use_arithmetic_shift() {
    let (rig, device) = common::powered_rig();
    let x: Vec<i16> = (0..16).map(|i| -40 + i * 3).collect();
    let y: Vec<i16> = (0..16).map(|i| if i % 2 == 0 { 7 } else { -9 }).collect();
    rig.bus
        .queue_words(GYRO_OFFSET_X, &x.iter().map(|v| *v as u16).collect::<Vec<_>>());
    rig.bus
        .queue_words(GYRO_OFFSET_Y, &y.iter().map(|v| *v as u16).collect::<Vec<_>>());

    let result = device.run_calibration().unwrap();

    let sum_x: i32 = x.iter().map(|v| i32::from(*v)).sum();
    let sum_y: i32 = y.iter().map(|v| i32::from(*v)).sum();
    assert_eq!(i32::from(result.avg_x), sum_x >> 4);
    assert_eq!(i32::from(result.avg_y), sum_y >> 4);
    assert_eq!(result.min_x, -40);
    assert_eq!(result.max_x, 5);
    assert_eq!(result.min_y, -9);
    assert_eq!(result.max_y, 7);
    assert_eq!(result.to_words()[0], result.avg_x as u16);
}

#[test]
fn test_failed_sample_persists_nothing() {
    let (rig, device) = common::powered_rig();
    rig.bus.fail_nth_read(GYRO_OFFSET_Y, 9);

    assert!(matches!(device.run_calibration(), Err(OisError::Bus(_))));
    assert!(rig.reports.calibrations().is_empty());
    assert_eq!(device.last_calibration(), None);
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_persistence_failure_is_reported() {
    let (rig, device) = common::powered_rig();
    rig.reports.fail_writes(true);

    assert!(matches!(device.run_calibration(), Err(OisError::Persistence(_))));
    assert_eq!(device.last_calibration(), None);
}

#[test]
fn test_samples_are_spaced() {
    let (_rig, device) = common::powered_rig();

    let start = Instant::now();
    device.run_calibration().unwrap();

    assert!(start.elapsed() >= SAMPLE_INTERVAL * (SAMPLE_COUNT as u32 - 1));
}
