mod common;

use rust_ois::engine::maintenance::EMPTY_REPORT;
use rust_ois::engine::telemetry::TELEMETRY_REGISTERS;
use rust_ois::{OisError, OpStatus};

#[test]
fn test_full_batch_persists_one_record() {
    let (rig, device) = common::powered_rig();
    for (i, reg) in TELEMETRY_REGISTERS.iter().enumerate() {
        rig.bus.set_word(*reg, 0x0100 + i as u16);
    }

    device.sample_telemetry(1024).unwrap();

    let batches = rig.reports.telemetry_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].records.len(), 1024);
    assert_eq!(
        batches[0].records[0],
        [0x0100, 0x0101, 0x0102, 0x0103, 0x0104, 0x0105]
    );
    assert_eq!(device.get_last_status(), OpStatus::Pass);
}

#[test]
fn test_failure_mid_batch_persists_nothing() {
    let (rig, device) = common::powered_rig();
    // Iteration 500 is the 501st read of the first register.
    rig.bus.fail_nth_read(0x8455, 501);

    let err = device.sample_telemetry(1024).unwrap_err();

    match err {
        OisError::PartialBatchFailure {
            completed,
            requested,
            ..
        } => {
            assert_eq!(completed, 500);
            assert_eq!(requested, 1024);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(rig.reports.telemetry_batches().is_empty());
    assert_eq!(device.get_last_status(), OpStatus::Fail);
}

#[test]
fn test_unsupported_batch_size() {
    let (rig, device) = common::powered_rig();

    assert!(matches!(
        device.sample_telemetry(1000),
        Err(OisError::InvalidArgument(_))
    ));
    assert_eq!(rig.bus.transaction_count(), 0);
}

#[test]
fn test_telemetry_report_text() {
    let (_rig, device) = common::powered_rig();
    assert_eq!(device.read_telemetry_report().unwrap(), EMPTY_REPORT);

    device.sample_telemetry(2048).unwrap();
    let report = device.read_telemetry_report().unwrap();
    assert_eq!(report.lines().count(), 2048);
    assert!(report.starts_with("0x0000"));
}
