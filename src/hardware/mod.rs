//! Device collaborators
//!
//! The engine drives the OIS coprocessor through a small set of platform services. Each one is
//! a trait so the engine can run against real hardware or against the simulators in [`mock`]:
//!
//! - [`PowerRail`] - physical power sequencing of the OIS rail
//! - [`OisCommandSet`] - the coprocessor's command protocol, spoken over the register bus
//! - [`SensorBus`] - register access to the camera image sensors
//! - [`EepromBus`] - byte reads from the calibration EEPROM
//!
//! None of these retry. A failure is reported once and the engine decides what to do with it.

pub mod mock;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::adapters::{RegisterBusAdapter, RegisterWidth};
use crate::engine::firmware::FirmwareImage;
use crate::engine::servo::ServoMode;
use crate::error::{BusError, OisResult};

/// Power supply of the OIS coprocessor.
pub trait PowerRail: Send {
    /// Run the physical power-up sequence. Settle time is the caller's concern.
    fn power_up(&mut self) -> Result<(), BusError>;

    /// Run the physical power-down sequence.
    fn power_down(&mut self) -> Result<(), BusError>;
}

/// Command protocol of the OIS coprocessor.
///
/// Every command is a protocol over the register bus and receives the adapter the engine holds
/// under its lock.
pub trait OisCommandSet: Send {
    /// Switch the servo to `mode`.
    fn switch_mode(&mut self, bus: &mut RegisterBusAdapter, mode: ServoMode) -> OisResult<()>;

    /// Enable the servo. Returns the mode the device entered.
    fn servo_on(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<ServoMode>;

    /// Park the lens and disable the servo.
    fn servo_off(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()>;

    /// Query the servo state from the device.
    fn servo_state(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<ServoMode>;

    /// Return the servo to a state previously read with [`OisCommandSet::servo_state`].
    fn restore_servo_state(
        &mut self,
        bus: &mut RegisterBusAdapter,
        mode: ServoMode,
    ) -> OisResult<()>;

    /// Write a firmware image to device flash.
    fn flash_firmware(
        &mut self,
        bus: &mut RegisterBusAdapter,
        image: &FirmwareImage,
    ) -> OisResult<()>;

    /// Reprogram the parameters a new firmware image expects.
    fn reprogram_parameters(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()>;

    /// Commit the OIS data area to flash and confirm the write.
    fn check_flash_write(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()>;

    /// Run the hall sensor calibration routine.
    fn hall_calibration(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()>;

    /// Reset every parameter to its initial value.
    fn init_all_params(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()>;

    /// Read the gyro value/range/K-value/config/accelerometer words.
    fn gyro_report(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<GyroReport>;

    /// Human-readable state of the coprocessor firmware.
    fn chip_state(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<String>;
}

/// Register access to the camera image sensors.
pub trait SensorBus: Send {
    /// Number of addressable cameras.
    fn camera_count(&self) -> u8;

    /// Whether camera `camera` is powered up.
    fn is_powered(&self, camera: u8) -> bool;

    /// Read a sensor register.
    fn read(&mut self, camera: u8, addr: u16, width: RegisterWidth) -> Result<u32, BusError>;

    /// Write a sensor register.
    fn write(
        &mut self,
        camera: u8,
        addr: u16,
        width: RegisterWidth,
        value: u32,
    ) -> Result<(), BusError>;
}

/// Byte reads from the module calibration EEPROM.
pub trait EepromBus: Send {
    /// Read one byte.
    fn read_byte(&mut self, addr: u16) -> Result<u8, BusError>;
}

/// EEPROM address of the gyro calibration flag.
pub const EEPROM_GYRO_CAL_FLAG: u16 = 0x1EB1;

/// Gyro diagnostic words reported by the coprocessor.
///
/// `value`, `range` and `k_value` carry two's-complement data; `config` and `accel` are raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GyroReport {
    /// Current gyro reading (X, Y)
    pub value: (i16, i16),
    /// Gyro range (X, Y)
    pub range: (i16, i16),
    /// Gyro gain K-value (X, Y)
    pub k_value: (i16, i16),
    /// Gyro configuration words
    pub config: (u16, u16),
    /// Accelerometer words
    pub accel: (u16, u16),
}

impl GyroReport {
    /// Decode the ten raw words in device order.
    pub fn from_words(words: [u16; 10]) -> Self {
        Self {
            value: (words[0] as i16, words[1] as i16),
            range: (words[2] as i16, words[3] as i16),
            k_value: (words[4] as i16, words[5] as i16),
            config: (words[6], words[7]),
            accel: (words[8], words[9]),
        }
    }
}

impl fmt::Display for GyroReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value({},{}), range({}, {}), K_value({}, {}), config(0x{:x}, 0x{:x}), ACC(0x{:x}, 0x{:x})",
            self.value.0,
            self.value.1,
            self.range.0,
            self.range.1,
            self.k_value.0,
            self.k_value.1,
            self.config.0,
            self.config.1,
            self.accel.0,
            self.accel.1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gyro_report_decodes_signed_words() {
        let report =
            GyroReport::from_words([0xFFFF, 2, 0x8000, 0x7FFF, 5, 0xFFFE, 0xA, 0xB, 0xC, 0xD]);
        assert_eq!(report.value, (-1, 2));
        assert_eq!(report.range, (i16::MIN, i16::MAX));
        assert_eq!(report.k_value, (5, -2));
        assert_eq!(report.config, (0xA, 0xB));
        assert_eq!(
            report.to_string(),
            "value(-1,2), range(-32768, 32767), K_value(5, -2), config(0xa, 0xb), ACC(0xc, 0xd)"
        );
    }
}
