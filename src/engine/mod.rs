//! OIS control and calibration engine.
//!
//! [`OisDevice`] is the device handle. It owns every collaborator and every piece of mutable
//! device state behind one exclusive lock; each public operation takes the lock for its full
//! duration and drops it on every exit path, so callers are strictly serialized.
//!
//! Operations are grouped by concern:
//!
//! - [`power`] - reference-counted power rail control
//! - [`servo`] - servo mode state machine
//! - [`calibration`] - gyro offset calibration
//! - [`backup`] - register window snapshot and compare
//! - [`firmware`] - firmware update sequencing
//! - [`telemetry`] - batched register sampling
//! - [`maintenance`] - hall calibration, parameter reset, register dump and friends
//! - [`ancillary`] - image sensor and EEPROM access
//!
//! # Last-operation status
//!
//! Every command records pass or fail. [`OisDevice::get_last_status`] returns the recorded
//! value and resets it to [`OpStatus::Fail`], so a second read without an intervening command
//! always reports failure.

pub mod ancillary;
pub mod backup;
pub mod calibration;
pub mod firmware;
pub mod maintenance;
pub mod power;
pub mod servo;
pub mod telemetry;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::adapters::{RegisterBus, RegisterBusAdapter, RegisterValue, RegisterWidth};
use crate::config::DeviceConfig;
use crate::data::ReportSink;
use crate::error::{OisError, OisResult};
use crate::hardware::{EepromBus, OisCommandSet, PowerRail, SensorBus};

use calibration::CalibrationResult;
use power::PowerSequencer;
use servo::ServoMode;

/// Longest device-identifying string kept, in bytes.
pub const MAX_DEVICE_NAME_LEN: usize = 31;

/// Pass/fail outcome of the most recent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpStatus {
    /// Last command succeeded
    Pass,
    /// Last command failed, or the status was already read
    Fail,
}

impl OpStatus {
    /// Numeric form used by factory tooling (1 = pass, 0 = fail).
    pub fn code(self) -> u8 {
        match self {
            Self::Pass => 1,
            Self::Fail => 0,
        }
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// State owned by the device lock.
pub(crate) struct DeviceInner {
    pub(crate) bus: RegisterBusAdapter,
    pub(crate) commands: Box<dyn OisCommandSet>,
    pub(crate) power_rail: Box<dyn PowerRail>,
    pub(crate) reports: Box<dyn ReportSink>,
    pub(crate) sensors: Option<Box<dyn SensorBus>>,
    pub(crate) eeprom: Option<Box<dyn EepromBus>>,
    pub(crate) power: PowerSequencer,
    pub(crate) mode: ServoMode,
    pub(crate) status: OpStatus,
    pub(crate) probe_ok: bool,
    pub(crate) device_name: String,
    pub(crate) last_calibration: Option<CalibrationResult>,
    pub(crate) backup_base: u16,
    pub(crate) backup_length: usize,
    pub(crate) external_owner: bool,
}

impl DeviceInner {
    /// Powered by our own reference count or by the camera stack holding the device.
    pub(crate) fn is_powered(&self) -> bool {
        self.power.is_up() || self.external_owner
    }

    pub(crate) fn require_power(&self) -> OisResult<()> {
        if self.is_powered() {
            Ok(())
        } else {
            Err(OisError::PowerNotReady)
        }
    }

    /// Record the outcome of command `op` as the last-operation status.
    pub(crate) fn finish<T>(&mut self, op: &'static str, result: OisResult<T>) -> OisResult<T> {
        match &result {
            Ok(_) => {
                self.status = OpStatus::Pass;
                debug!(op, "command passed");
            }
            Err(e) => {
                self.status = OpStatus::Fail;
                warn!(op, error = %e, "command failed");
            }
        }
        result
    }
}

/// Handle to one OIS coprocessor and its ancillary chips.
///
/// Created once when the driver attaches and shared by reference (typically in an `Arc`)
/// between every caller. All methods take `&self`; mutable state lives behind the lock.
///
/// # Example
///
/// ```rust
/// use rust_ois::hardware::mock::SimulatedRig;
/// use rust_ois::engine::OpStatus;
///
/// let rig = SimulatedRig::new();
/// let device = rig.build_device();
/// device.power_up()?;
/// device.set_mode(1)?;
/// assert_eq!(device.get_last_status(), OpStatus::Pass);
/// # Ok::<(), rust_ois::error::OisError>(())
/// ```
pub struct OisDevice {
    inner: Mutex<DeviceInner>,
}

impl OisDevice {
    /// Start building a device handle from its mandatory collaborators.
    pub fn builder(
        bus: Box<dyn RegisterBus>,
        commands: Box<dyn OisCommandSet>,
        power_rail: Box<dyn PowerRail>,
        reports: Box<dyn ReportSink>,
    ) -> OisDeviceBuilder {
        OisDeviceBuilder {
            bus,
            commands,
            power_rail,
            reports,
            sensors: None,
            eeprom: None,
            config: DeviceConfig::default(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, DeviceInner> {
        self.inner.lock()
    }

    /// Read a register of the OIS coprocessor.
    pub fn read_register(&self, addr: u16, width: RegisterWidth) -> OisResult<u32> {
        let mut dev = self.lock();
        let result = dev
            .require_power()
            .and_then(|_| dev.bus.read(addr, width).map_err(OisError::from));
        if let Ok(value) = &result {
            info!(
                slave = dev.bus.slave(),
                reg = %format!("0x{:04x}", addr),
                %width,
                value = %format!("0x{:x}", value),
                "register read"
            );
        }
        dev.finish("read_register", result)
    }

    /// Write a register of the OIS coprocessor.
    ///
    /// Values that do not fit `width` are rejected before any bus access.
    pub fn write_register(&self, addr: u16, width: RegisterWidth, value: u32) -> OisResult<()> {
        let mut dev = self.lock();
        let result = RegisterValue::new(addr, width, value).and_then(|reg| {
            dev.require_power()?;
            dev.bus.write(reg.addr, reg.width, reg.value)?;
            info!(
                slave = dev.bus.slave(),
                reg = %format!("0x{:04x}", reg.addr),
                %width,
                value = %format!("0x{:x}", reg.value),
                "register written"
            );
            Ok(())
        });
        dev.finish("write_register", result)
    }

    /// Address a different device on the register bus for subsequent raw register access.
    pub fn select_slave(&self, slave: u8) -> OisResult<()> {
        let mut dev = self.lock();
        let result = if slave > 0x7F {
            Err(OisError::invalid(format!(
                "slave id 0x{:02x} is not a 7-bit address",
                slave
            )))
        } else {
            dev.bus.select_slave(slave);
            info!(slave = %format!("0x{:02x}", slave), "slave id selected");
            Ok(())
        };
        dev.finish("select_slave", result)
    }

    /// Currently selected bus address.
    pub fn slave(&self) -> u8 {
        self.lock().bus.slave()
    }

    /// Outcome of the last command. Reading resets the stored status to [`OpStatus::Fail`].
    pub fn get_last_status(&self) -> OpStatus {
        std::mem::replace(&mut self.lock().status, OpStatus::Fail)
    }

    /// Overwrite the last-operation status.
    pub fn set_last_status(&self, status: OpStatus) {
        self.lock().status = status;
        debug!(%status, "last status overridden");
    }

    /// Whether the driver attached to the device successfully.
    pub fn probe_status(&self) -> bool {
        self.lock().probe_ok
    }

    /// Device-identifying string.
    pub fn device_name(&self) -> String {
        self.lock().device_name.clone()
    }

    /// Set the device-identifying string.
    ///
    /// Only the first whitespace-separated token is kept, truncated to
    /// [`MAX_DEVICE_NAME_LEN`] bytes on a character boundary.
    pub fn set_device_name(&self, name: &str) {
        let token = name.split_whitespace().next().unwrap_or_default();
        let mut end = token.len().min(MAX_DEVICE_NAME_LEN);
        while !token.is_char_boundary(end) {
            end -= 1;
        }
        let mut dev = self.lock();
        dev.device_name = token[..end].to_string();
        info!(name = %dev.device_name, "device name set");
    }

    /// Mark the device as held (or released) by a higher-level owner such as the camera stack.
    ///
    /// While held, power control is rejected with [`OisError::InUse`] and the device counts as
    /// powered.
    pub fn set_external_owner(&self, held: bool) {
        self.lock().external_owner = held;
        info!(held, "external owner flag changed");
    }

    /// Whether a higher-level owner holds the device.
    pub fn has_external_owner(&self) -> bool {
        self.lock().external_owner
    }

    /// Most recent successful gyro calibration.
    pub fn last_calibration(&self) -> Option<CalibrationResult> {
        self.lock().last_calibration
    }
}

impl fmt::Debug for OisDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dev = self.lock();
        f.debug_struct("OisDevice")
            .field("name", &dev.device_name)
            .field("slave", &dev.bus.slave())
            .field("power_refcount", &dev.power.refcount())
            .field("mode", &dev.mode)
            .field("status", &dev.status)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OisDevice`].
pub struct OisDeviceBuilder {
    bus: Box<dyn RegisterBus>,
    commands: Box<dyn OisCommandSet>,
    power_rail: Box<dyn PowerRail>,
    reports: Box<dyn ReportSink>,
    sensors: Option<Box<dyn SensorBus>>,
    eeprom: Option<Box<dyn EepromBus>>,
    config: DeviceConfig,
}

impl OisDeviceBuilder {
    /// Apply device settings (name, slave id, backup window).
    pub fn config(mut self, config: &DeviceConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Attach the image sensor service.
    pub fn sensors(mut self, sensors: Box<dyn SensorBus>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    /// Attach the calibration EEPROM service.
    pub fn eeprom(mut self, eeprom: Box<dyn EepromBus>) -> Self {
        self.eeprom = Some(eeprom);
        self
    }

    /// Finish the handle. The device starts powered down with its mode uninitialized.
    pub fn build(self) -> OisDevice {
        info!(
            name = %self.config.name,
            slave = %format!("0x{:02x}", self.config.slave_id),
            "OIS device attached"
        );
        OisDevice {
            inner: Mutex::new(DeviceInner {
                bus: RegisterBusAdapter::new(self.bus, self.config.slave_id),
                commands: self.commands,
                power_rail: self.power_rail,
                reports: self.reports,
                sensors: self.sensors,
                eeprom: self.eeprom,
                power: PowerSequencer::new(),
                mode: ServoMode::Uninitialized,
                status: OpStatus::Fail,
                probe_ok: true,
                device_name: self.config.name,
                last_calibration: None,
                backup_base: self.config.backup_base,
                backup_length: self.config.backup_length,
                external_owner: false,
            }),
        }
    }
}
