//! Typed command dispatch
//!
//! The factory debug surface talks to the engine through a closed set of commands. Each
//! [`OisCommand`] variant maps to exactly one [`OisDevice`] operation and each successful
//! operation yields one [`CommandOutput`]. Raw numeric arguments (width byte counts, mode
//! codes) stay raw here so that validation happens in the engine, under the lock, and is
//! recorded in the last-operation status like any other failure.

use serde::Serialize;
use std::fmt;

use crate::adapters::RegisterWidth;
use crate::engine::backup::BackupSnapshot;
use crate::engine::calibration::CalibrationResult;
use crate::engine::firmware::FirmwareImage;
use crate::engine::servo::ServoMode;
use crate::engine::{OisDevice, OpStatus};
use crate::error::{OisError, OisResult};
use crate::hardware::GyroReport;

/// Commands accepted by [`OisDevice::execute`]
#[derive(Debug, Clone)]
pub enum OisCommand {
    /// Read a coprocessor register; `width` is a byte count (1, 2 or 4)
    ReadRegister { addr: u16, width: u8 },

    /// Write a coprocessor register; `width` is a byte count (1, 2 or 4)
    WriteRegister { addr: u16, width: u8, value: u32 },

    /// Address another device for raw register access
    SelectSlave(u8),

    /// Take a power reference
    PowerUp,

    /// Drop a power reference
    PowerDown,

    /// Switch servo mode (0..=3)
    SetMode(u8),

    /// Enable the servo
    ServoOn,

    /// Park the lens
    ServoOff,

    /// Cached servo mode
    GetMode,

    /// Servo state as reported by the device
    GetState,

    /// Chip state text
    GetStateText,

    /// Gyro offset calibration
    RunCalibration,

    /// Snapshot a register window
    Backup { base: u16, length: usize },

    /// Compare a register window with a snapshot
    Verify(BackupSnapshot),

    /// Flash a firmware image
    UpdateFirmware(FirmwareImage),

    /// Sample and persist a telemetry batch
    SampleTelemetry(usize),

    /// Last stored telemetry batch as text
    ReadTelemetryReport,

    /// Hall sensor calibration
    HallCalibration,

    /// Reset all parameters to initial values
    ResetParameters,

    /// Commit OIS data to flash
    SyncToRom,

    /// Dump registers 0x0000..=0x02BC
    DumpRegisters,

    /// Save the parameter window
    SaveOisData,

    /// Write the saved parameter window back
    RestoreOisData,

    /// Gyro diagnostic words
    GyroReport,

    /// Read the last-operation status (clears it to fail)
    GetLastStatus,

    /// Override the last-operation status
    SetLastStatus(OpStatus),

    /// Driver attach status
    ProbeStatus,

    /// Device-identifying string
    GetDeviceName,

    /// Set the device-identifying string
    SetDeviceName(String),

    /// Mark the device held or released by the camera stack
    SetExternalOwner(bool),

    /// Read an image sensor register
    ReadSensorRegister { camera: u8, addr: u16, width: u8 },

    /// Write an image sensor register
    WriteSensorRegister {
        camera: u8,
        addr: u16,
        width: u8,
        value: u32,
    },

    /// Read a calibration EEPROM byte
    ReadEeprom(u16),
}

/// Data returned by a successful command
#[derive(Debug, Clone, Serialize)]
pub enum CommandOutput {
    /// Command has no data
    Done,
    /// Register or EEPROM value
    Value(u32),
    /// Servo mode
    Mode(ServoMode),
    /// Free text
    Text(String),
    /// Calibration words
    Calibration(CalibrationResult),
    /// Captured window
    Snapshot(BackupSnapshot),
    /// Whether a verified window changed
    Changed(bool),
    /// Gyro diagnostic words
    Gyro(GyroReport),
    /// Register dump bytes
    Bytes(Vec<u8>),
    /// Last-operation status
    Status(OpStatus),
    /// Boolean flag (probe status)
    Flag(bool),
}

impl fmt::Display for CommandOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "OK"),
            Self::Value(value) => write!(f, "0x{:x}", value),
            Self::Mode(mode) => write!(f, "{}", mode.code()),
            Self::Text(text) => write!(f, "{}", text),
            Self::Calibration(result) => {
                let words: Vec<String> = result
                    .to_words()
                    .iter()
                    .map(|w| format!("0x{:04x}", w))
                    .collect();
                write!(f, "{}", words.join(" "))
            }
            Self::Snapshot(snapshot) => write!(
                f,
                "snapshot 0x{:04x}+{}",
                snapshot.base(),
                snapshot.len()
            ),
            Self::Changed(changed) => {
                write!(f, "{}", if *changed { "changed" } else { "unchanged" })
            }
            Self::Gyro(report) => write!(f, "{}", report),
            Self::Bytes(bytes) => write!(f, "{} bytes", bytes.len()),
            Self::Status(status) => write!(f, "{}", status.code()),
            Self::Flag(flag) => write!(f, "{}", u8::from(*flag)),
        }
    }
}

impl OisDevice {
    /// Run one command.
    pub fn execute(&self, command: OisCommand) -> OisResult<CommandOutput> {
        use CommandOutput as Out;

        match command {
            OisCommand::ReadRegister { addr, width } => {
                let width = self.checked_width(width)?;
                self.read_register(addr, width).map(Out::Value)
            }
            OisCommand::WriteRegister { addr, width, value } => {
                let width = self.checked_width(width)?;
                self.write_register(addr, width, value).map(|_| Out::Done)
            }
            OisCommand::SelectSlave(slave) => self.select_slave(slave).map(|_| Out::Done),
            OisCommand::PowerUp => self.power_up().map(|_| Out::Done),
            OisCommand::PowerDown => self.power_down().map(|_| Out::Done),
            OisCommand::SetMode(code) => self.set_mode(code).map(|_| Out::Done),
            OisCommand::ServoOn => self.servo_on().map(|_| Out::Done),
            OisCommand::ServoOff => self.servo_off().map(|_| Out::Done),
            OisCommand::GetMode => self.get_mode().map(Out::Mode),
            OisCommand::GetState => self.get_state().map(Out::Mode),
            OisCommand::GetStateText => self.get_state_text().map(Out::Text),
            OisCommand::RunCalibration => self.run_calibration().map(Out::Calibration),
            OisCommand::Backup { base, length } => self.backup(base, length).map(Out::Snapshot),
            OisCommand::Verify(snapshot) => self.verify(&snapshot).map(Out::Changed),
            OisCommand::UpdateFirmware(image) => self.update_firmware(&image).map(|_| Out::Done),
            OisCommand::SampleTelemetry(count) => self.sample_telemetry(count).map(|_| Out::Done),
            OisCommand::ReadTelemetryReport => self.read_telemetry_report().map(Out::Text),
            OisCommand::HallCalibration => self.run_hall_calibration().map(|_| Out::Done),
            OisCommand::ResetParameters => self.reset_parameters().map(|_| Out::Done),
            OisCommand::SyncToRom => self.sync_to_rom().map(|_| Out::Done),
            OisCommand::DumpRegisters => self.dump_registers().map(Out::Bytes),
            OisCommand::SaveOisData => self.save_ois_data().map(|_| Out::Done),
            OisCommand::RestoreOisData => self.restore_ois_data().map(|_| Out::Done),
            OisCommand::GyroReport => self.read_gyro_report().map(Out::Gyro),
            OisCommand::GetLastStatus => Ok(Out::Status(self.get_last_status())),
            OisCommand::SetLastStatus(status) => {
                self.set_last_status(status);
                Ok(Out::Done)
            }
            OisCommand::ProbeStatus => Ok(Out::Flag(self.probe_status())),
            OisCommand::GetDeviceName => Ok(Out::Text(self.device_name())),
            OisCommand::SetDeviceName(name) => {
                self.set_device_name(&name);
                Ok(Out::Done)
            }
            OisCommand::SetExternalOwner(held) => {
                self.set_external_owner(held);
                Ok(Out::Done)
            }
            OisCommand::ReadSensorRegister {
                camera,
                addr,
                width,
            } => {
                let width = self.checked_width(width)?;
                self.read_sensor_register(camera, addr, width).map(Out::Value)
            }
            OisCommand::WriteSensorRegister {
                camera,
                addr,
                width,
                value,
            } => {
                let width = self.checked_width(width)?;
                self.write_sensor_register(camera, addr, width, value)
                    .map(|_| Out::Done)
            }
            OisCommand::ReadEeprom(addr) => {
                self.read_eeprom(addr).map(|v| Out::Value(u32::from(v)))
            }
        }
    }

    /// Width conversion that records a rejected width as a failed command.
    fn checked_width(&self, bytes: u8) -> OisResult<RegisterWidth> {
        RegisterWidth::try_from(bytes).map_err(|e: OisError| {
            self.set_last_status(OpStatus::Fail);
            e
        })
    }
}
