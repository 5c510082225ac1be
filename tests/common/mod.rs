//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use rust_ois::hardware::mock::SimulatedRig;
use rust_ois::OisDevice;

/// Fresh rig and a device built on it.
pub fn rig() -> (SimulatedRig, OisDevice) {
    let rig = SimulatedRig::new();
    let device = rig.build_device();
    (rig, device)
}

/// Rig whose device already holds one power reference, with the bus log cleared.
pub fn powered_rig() -> (SimulatedRig, OisDevice) {
    let (rig, device) = rig();
    device.power_up().expect("power up on a healthy rail");
    rig.bus.clear_log();
    (rig, device)
}
