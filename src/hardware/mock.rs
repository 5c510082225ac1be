//! Simulated Device Collaborators
//!
//! In-memory stand-ins for the platform services, used by the test suite and by the bench
//! binary. Every simulator is `Clone` and clones share state, so a test keeps one handle for
//! fault injection and inspection while the engine owns another.
//!
//! # Available Simulators
//!
//! - `SimulatedOis` - command protocol over the simulated register bus
//! - `SimulatedPowerRail` - counts physical power transitions
//! - `SimulatedSensors` - three camera sensors with individual power state
//! - `SimulatedEeprom` - byte-addressed calibration EEPROM
//! - `SimulatedRig` - all of the above wired to one `SimulatedBus`

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use super::{EepromBus, GyroReport, OisCommandSet, PowerRail, SensorBus};
use crate::adapters::{RegisterBusAdapter, RegisterWidth, SimulatedBus};
use crate::config::DeviceConfig;
use crate::data::{MemoryReportSink, ReportSink};
use crate::engine::firmware::FirmwareImage;
use crate::engine::servo::ServoMode;
use crate::engine::OisDevice;
use crate::error::{BusDirection, BusError, OisError, OisResult};

/// Servo on/off control register of the simulated coprocessor.
pub const SERVO_CONTROL_REG: u16 = 0x0001;
/// Mode register of the simulated coprocessor.
pub const MODE_REG: u16 = 0x0002;
/// Command register used for flash and parameter commands.
pub const COMMAND_REG: u16 = 0x0003;
/// First of the ten gyro report words.
pub const GYRO_REPORT_BASE: u16 = 0x8460;

// =============================================================================
// SimulatedOis - Command Protocol
// =============================================================================

/// Commands of [`OisCommandSet`], for fault injection and call inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OisOp {
    /// `switch_mode`
    SwitchMode,
    /// `servo_on`
    ServoOn,
    /// `servo_off`
    ServoOff,
    /// `servo_state`
    ServoState,
    /// `restore_servo_state`
    RestoreServoState,
    /// `flash_firmware`
    FlashFirmware,
    /// `reprogram_parameters`
    ReprogramParameters,
    /// `check_flash_write`
    CheckFlashWrite,
    /// `hall_calibration`
    HallCalibration,
    /// `init_all_params`
    InitAllParams,
    /// `gyro_report`
    GyroReport,
    /// `chip_state`
    ChipState,
}

#[derive(Debug)]
struct OisState {
    servo: ServoMode,
    last_active: ServoMode,
    failing: HashSet<OisOp>,
    calls: Vec<OisOp>,
    flashed: Vec<FirmwareImage>,
    window_base: u16,
    calibration_runs: u8,
}

/// Simulated coprocessor command set.
///
/// Commands are written to the simulated register file, so bus faults surface through them.
/// Hall calibration and parameter reset rewrite bytes inside the parameter window so a
/// surrounding snapshot/compare sees a change.
///
/// # Example
///
/// ```rust
/// use rust_ois::hardware::mock::{OisOp, SimulatedOis};
///
/// let ois = SimulatedOis::new();
/// ois.fail_on(OisOp::FlashFirmware);
/// assert!(ois.calls().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedOis {
    state: Arc<Mutex<OisState>>,
}

impl SimulatedOis {
    /// Device in servo-off state with preview as the mode `servo_on` returns to.
    pub fn new() -> Self {
        Self::with_window(0x0200)
    }

    /// Simulator whose parameter window starts at `base`.
    pub fn with_window(base: u16) -> Self {
        Self {
            state: Arc::new(Mutex::new(OisState {
                servo: ServoMode::Off,
                last_active: ServoMode::Preview,
                failing: HashSet::new(),
                calls: Vec::new(),
                flashed: Vec::new(),
                window_base: base,
                calibration_runs: 0,
            })),
        }
    }

    /// Make `op` fail until [`SimulatedOis::clear_faults`].
    pub fn fail_on(&self, op: OisOp) {
        self.state.lock().failing.insert(op);
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        self.state.lock().failing.clear();
    }

    /// Force the device-side servo state.
    pub fn set_servo_state(&self, mode: ServoMode) {
        let mut state = self.state.lock();
        state.servo = mode;
        if mode != ServoMode::Off {
            state.last_active = mode;
        }
    }

    /// Device-side servo state.
    pub fn servo_state_now(&self) -> ServoMode {
        self.state.lock().servo
    }

    /// Commands issued so far, in order.
    pub fn calls(&self) -> Vec<OisOp> {
        self.state.lock().calls.clone()
    }

    /// Whether `op` was issued at least once.
    pub fn was_called(&self, op: OisOp) -> bool {
        self.state.lock().calls.contains(&op)
    }

    /// Images flashed successfully.
    pub fn flashed_images(&self) -> Vec<FirmwareImage> {
        self.state.lock().flashed.clone()
    }

    /// Log the call and fail it if requested.
    fn enter(&self, op: OisOp) -> OisResult<()> {
        let mut state = self.state.lock();
        state.calls.push(op);
        debug!(?op, "simulated OIS command");
        if state.failing.contains(&op) {
            return Err(OisError::Command(format!("{:?} rejected by simulated device", op)));
        }
        Ok(())
    }

    fn enter_servo_off(&self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        bus.write(SERVO_CONTROL_REG, RegisterWidth::Byte, 0)?;
        let mut state = self.state.lock();
        if state.servo != ServoMode::Off {
            state.last_active = state.servo;
        }
        state.servo = ServoMode::Off;
        Ok(())
    }

    fn enter_mode(&self, bus: &mut RegisterBusAdapter, mode: ServoMode) -> OisResult<()> {
        bus.write(MODE_REG, RegisterWidth::Byte, u32::from(mode.code()))?;
        let mut state = self.state.lock();
        state.servo = mode;
        if mode != ServoMode::Off {
            state.last_active = mode;
        }
        Ok(())
    }
}

impl Default for SimulatedOis {
    fn default() -> Self {
        Self::new()
    }
}

impl OisCommandSet for SimulatedOis {
    fn switch_mode(&mut self, bus: &mut RegisterBusAdapter, mode: ServoMode) -> OisResult<()> {
        self.enter(OisOp::SwitchMode)?;
        self.enter_mode(bus, mode)
    }

    fn servo_on(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<ServoMode> {
        self.enter(OisOp::ServoOn)?;
        bus.write(SERVO_CONTROL_REG, RegisterWidth::Byte, 1)?;
        let mut state = self.state.lock();
        state.servo = state.last_active;
        Ok(state.servo)
    }

    fn servo_off(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        self.enter(OisOp::ServoOff)?;
        self.enter_servo_off(bus)
    }

    fn servo_state(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<ServoMode> {
        self.enter(OisOp::ServoState)?;
        bus.read(MODE_REG, RegisterWidth::Byte)?;
        Ok(self.state.lock().servo)
    }

    fn restore_servo_state(
        &mut self,
        bus: &mut RegisterBusAdapter,
        mode: ServoMode,
    ) -> OisResult<()> {
        self.enter(OisOp::RestoreServoState)?;
        match mode {
            ServoMode::Off | ServoMode::Uninitialized => self.enter_servo_off(bus),
            active => self.enter_mode(bus, active),
        }
    }

    fn flash_firmware(
        &mut self,
        bus: &mut RegisterBusAdapter,
        image: &FirmwareImage,
    ) -> OisResult<()> {
        self.enter(OisOp::FlashFirmware)?;
        if image.path().as_os_str().is_empty() {
            return Err(OisError::Command("empty firmware image path".into()));
        }
        bus.write(COMMAND_REG, RegisterWidth::Byte, 0xF1)?;
        self.state.lock().flashed.push(image.clone());
        Ok(())
    }

    fn reprogram_parameters(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        self.enter(OisOp::ReprogramParameters)?;
        bus.write(COMMAND_REG, RegisterWidth::Byte, 0xF2)?;
        Ok(())
    }

    fn check_flash_write(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        self.enter(OisOp::CheckFlashWrite)?;
        bus.write(COMMAND_REG, RegisterWidth::Byte, 0xF3)?;
        Ok(())
    }

    fn hall_calibration(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        self.enter(OisOp::HallCalibration)?;
        let (base, run) = {
            let mut state = self.state.lock();
            state.calibration_runs = state.calibration_runs.wrapping_add(1);
            (state.window_base, state.calibration_runs)
        };
        let pattern: Vec<u8> = (0..16u8).map(|i| i.wrapping_mul(run).wrapping_add(run)).collect();
        bus.write_block(base, &pattern)?;
        Ok(())
    }

    fn init_all_params(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<()> {
        self.enter(OisOp::InitAllParams)?;
        let base = self.state.lock().window_base;
        bus.write_block(base, &[0x5A; 8])?;
        Ok(())
    }

    fn gyro_report(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<GyroReport> {
        self.enter(OisOp::GyroReport)?;
        let mut words = [0u16; 10];
        for (offset, word) in (0u16..).zip(words.iter_mut()) {
            *word = bus.read_word(GYRO_REPORT_BASE + offset)?;
        }
        Ok(GyroReport::from_words(words))
    }

    fn chip_state(&mut self, bus: &mut RegisterBusAdapter) -> OisResult<String> {
        self.enter(OisOp::ChipState)?;
        bus.read(MODE_REG, RegisterWidth::Byte)?;
        let state = match self.state.lock().servo {
            ServoMode::Off => "SERVO OFF",
            ServoMode::Test => "TEST",
            ServoMode::Uninitialized => "INIT",
            ServoMode::Preview | ServoMode::Capture => "RUN",
        };
        Ok(state.to_string())
    }
}

// =============================================================================
// SimulatedPowerRail
// =============================================================================

#[derive(Debug, Default)]
struct RailState {
    up_calls: usize,
    down_calls: usize,
    fail_up: bool,
    fail_down: bool,
}

/// Simulated OIS power rail.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPowerRail {
    state: Arc<Mutex<RailState>>,
}

impl SimulatedPowerRail {
    /// Rail that switches successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make physical power-up fail.
    pub fn fail_power_up(&self, fail: bool) {
        self.state.lock().fail_up = fail;
    }

    /// Make physical power-down fail.
    pub fn fail_power_down(&self, fail: bool) {
        self.state.lock().fail_down = fail;
    }

    /// Physical power-up attempts.
    pub fn power_up_calls(&self) -> usize {
        self.state.lock().up_calls
    }

    /// Physical power-down attempts.
    pub fn power_down_calls(&self) -> usize {
        self.state.lock().down_calls
    }
}

impl PowerRail for SimulatedPowerRail {
    fn power_up(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.up_calls += 1;
        if state.fail_up {
            return Err(BusError::Power("simulated regulator fault on power up".into()));
        }
        Ok(())
    }

    fn power_down(&mut self) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.down_calls += 1;
        if state.fail_down {
            return Err(BusError::Power("simulated regulator fault on power down".into()));
        }
        Ok(())
    }
}

// =============================================================================
// SimulatedSensors / SimulatedEeprom
// =============================================================================

#[derive(Debug, Default)]
struct SensorState {
    powered: [bool; 3],
    registers: HashMap<(u8, u16), u32>,
}

/// Three simulated camera sensors, all powered down initially.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSensors {
    state: Arc<Mutex<SensorState>>,
}

impl SimulatedSensors {
    /// Sensors powered down with empty register files.
    pub fn new() -> Self {
        Self::default()
    }

    /// Power camera `camera` up or down.
    pub fn set_powered(&self, camera: u8, powered: bool) {
        if let Some(slot) = self.state.lock().powered.get_mut(usize::from(camera)) {
            *slot = powered;
        }
    }

    /// Preload a sensor register.
    pub fn set_register(&self, camera: u8, addr: u16, value: u32) {
        self.state.lock().registers.insert((camera, addr), value);
    }
}

impl SensorBus for SimulatedSensors {
    fn camera_count(&self) -> u8 {
        3
    }

    fn is_powered(&self, camera: u8) -> bool {
        self.state
            .lock()
            .powered
            .get(usize::from(camera))
            .copied()
            .unwrap_or(false)
    }

    fn read(&mut self, camera: u8, addr: u16, width: RegisterWidth) -> Result<u32, BusError> {
        let value = self
            .state
            .lock()
            .registers
            .get(&(camera, addr))
            .copied()
            .unwrap_or(0);
        Ok(value & width.max_value())
    }

    fn write(
        &mut self,
        camera: u8,
        addr: u16,
        width: RegisterWidth,
        value: u32,
    ) -> Result<(), BusError> {
        self.state
            .lock()
            .registers
            .insert((camera, addr), value & width.max_value());
        Ok(())
    }
}

/// Simulated calibration EEPROM.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEeprom {
    bytes: Arc<Mutex<HashMap<u16, u8>>>,
    failing: Arc<Mutex<bool>>,
}

impl SimulatedEeprom {
    /// Blank EEPROM (reads 0xFF).
    pub fn new() -> Self {
        Self::default()
    }

    /// Program one byte.
    pub fn set_byte(&self, addr: u16, value: u8) {
        self.bytes.lock().insert(addr, value);
    }

    /// Make every read fail.
    pub fn fail_reads(&self, fail: bool) {
        *self.failing.lock() = fail;
    }
}

impl EepromBus for SimulatedEeprom {
    fn read_byte(&mut self, addr: u16) -> Result<u8, BusError> {
        if *self.failing.lock() {
            return Err(BusError::Transfer {
                slave: 0x50,
                reg: addr,
                len: 1,
                direction: BusDirection::Read,
                reason: "simulated NACK".into(),
            });
        }
        Ok(self.bytes.lock().get(&addr).copied().unwrap_or(0xFF))
    }
}

// =============================================================================
// SimulatedRig
// =============================================================================

/// Complete simulated module: one bus, the OIS command set, the rail, sensors, EEPROM and an
/// in-memory report sink, all sharing state with the device built from them.
#[derive(Debug, Clone, Default)]
pub struct SimulatedRig {
    /// Register bus
    pub bus: SimulatedBus,
    /// OIS command set
    pub ois: SimulatedOis,
    /// OIS power rail
    pub power: SimulatedPowerRail,
    /// Camera sensors
    pub sensors: SimulatedSensors,
    /// Calibration EEPROM
    pub eeprom: SimulatedEeprom,
    /// Report sink used by [`SimulatedRig::build_device`]
    pub reports: MemoryReportSink,
}

impl SimulatedRig {
    /// Fresh rig with default device settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Device with default settings reporting into [`SimulatedRig::reports`].
    pub fn build_device(&self) -> OisDevice {
        self.build_device_with(Box::new(self.reports.clone()), &DeviceConfig::default())
    }

    /// Device with explicit settings and report sink.
    pub fn build_device_with(
        &self,
        reports: Box<dyn ReportSink>,
        config: &DeviceConfig,
    ) -> OisDevice {
        OisDevice::builder(
            Box::new(self.bus.clone()),
            Box::new(self.ois.clone()),
            Box::new(self.power.clone()),
            reports,
        )
        .config(config)
        .sensors(Box::new(self.sensors.clone()))
        .eeprom(Box::new(self.eeprom.clone()))
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(bus: &SimulatedBus) -> RegisterBusAdapter {
        RegisterBusAdapter::new(Box::new(bus.clone()), 0x0E)
    }

    #[test]
    fn test_servo_on_returns_last_active_mode() {
        let bus = SimulatedBus::new();
        let mut bus_adapter = adapter(&bus);
        let mut ois = SimulatedOis::new();

        ois.switch_mode(&mut bus_adapter, ServoMode::Capture).unwrap();
        ois.servo_off(&mut bus_adapter).unwrap();
        assert_eq!(ois.servo_state(&mut bus_adapter).unwrap(), ServoMode::Off);
        assert_eq!(ois.servo_on(&mut bus_adapter).unwrap(), ServoMode::Capture);
    }

    #[test]
    fn test_injected_fault_is_logged() {
        let bus = SimulatedBus::new();
        let mut bus_adapter = adapter(&bus);
        let mut ois = SimulatedOis::new();
        ois.fail_on(OisOp::CheckFlashWrite);

        assert!(ois.check_flash_write(&mut bus_adapter).is_err());
        assert_eq!(ois.calls(), vec![OisOp::CheckFlashWrite]);
        assert_eq!(bus.transaction_count(), 0);
    }

    #[test]
    fn test_bus_fault_fails_command() {
        let bus = SimulatedBus::new();
        bus.fail_all();
        let mut bus_adapter = adapter(&bus);
        let mut ois = SimulatedOis::new();
        assert!(matches!(
            ois.servo_on(&mut bus_adapter),
            Err(OisError::Bus(_))
        ));
    }

    #[test]
    fn test_hall_calibration_touches_window() {
        let bus = SimulatedBus::new();
        let mut bus_adapter = adapter(&bus);
        let mut ois = SimulatedOis::new();
        ois.hall_calibration(&mut bus_adapter).unwrap();
        assert_ne!(bus.byte(0x0200), 0);
    }

    #[test]
    fn test_rail_counts_attempts() {
        let rail = SimulatedPowerRail::new();
        let mut handle = rail.clone();
        handle.power_up().unwrap();
        rail.fail_power_down(true);
        assert!(handle.power_down().is_err());
        assert_eq!(rail.power_up_calls(), 1);
        assert_eq!(rail.power_down_calls(), 1);
    }
}
