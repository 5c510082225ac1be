//! Servo mode state machine.
//!
//! The cached mode only moves when the device acknowledged a command. Failures leave it where
//! it was and are reported once; nothing is retried.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::OisDevice;
use crate::error::{OisError, OisResult};

/// Servo mode of the coprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServoMode {
    /// Not known since the last physical power-down
    Uninitialized,
    /// Centering servo, lens parked
    Off,
    /// Preview and video stabilization
    Preview,
    /// Still capture stabilization
    Capture,
    /// Factory test mode
    Test,
}

impl ServoMode {
    /// Mode for a device mode code (0..=3).
    pub fn from_code(code: u8) -> OisResult<Self> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Preview),
            2 => Ok(Self::Capture),
            3 => Ok(Self::Test),
            other => Err(OisError::invalid(format!(
                "servo mode {} out of range 0..=3",
                other
            ))),
        }
    }

    /// Device mode code; `Uninitialized` reports 255.
    pub fn code(self) -> u8 {
        match self {
            Self::Uninitialized => 255,
            Self::Off => 0,
            Self::Preview => 1,
            Self::Capture => 2,
            Self::Test => 3,
        }
    }
}

impl fmt::Display for ServoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Off => "servo off",
            Self::Preview => "preview",
            Self::Capture => "capture",
            Self::Test => "test",
        };
        f.write_str(name)
    }
}

impl OisDevice {
    /// Switch the servo to the mode with code `code` (0..=3).
    ///
    /// Out-of-range codes are rejected before any bus access and leave the mode unchanged.
    pub fn set_mode(&self, code: u8) -> OisResult<()> {
        let mut dev = self.lock();
        let result = ServoMode::from_code(code).and_then(|mode| {
            dev.require_power()?;
            let dev = &mut *dev;
            dev.commands.switch_mode(&mut dev.bus, mode)?;
            dev.mode = mode;
            info!(%mode, code, "OIS mode changed");
            Ok(())
        });
        dev.finish("set_mode", result)
    }

    /// Enable the servo. The cached mode becomes whatever the device reports entering.
    pub fn servo_on(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let mode = dev.commands.servo_on(&mut dev.bus)?;
            dev.mode = mode;
            info!(%mode, "OIS servo on");
            Ok(())
        });
        dev.finish("servo_on", result)
    }

    /// Park the lens. The cached mode becomes [`ServoMode::Off`].
    pub fn servo_off(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            dev.commands.servo_off(&mut dev.bus)?;
            dev.mode = ServoMode::Off;
            info!("OIS servo off");
            Ok(())
        });
        dev.finish("servo_off", result)
    }

    /// Cached mode. Requires power.
    pub fn get_mode(&self) -> OisResult<ServoMode> {
        let dev = self.lock();
        dev.require_power()?;
        Ok(dev.mode)
    }

    /// Cached mode without a power check, for status displays.
    pub fn cached_mode(&self) -> ServoMode {
        self.lock().mode
    }

    /// Servo state as reported by the device. Requires power.
    pub fn get_servo_state(&self) -> OisResult<ServoMode> {
        let mut dev = self.lock();
        dev.require_power()?;
        let dev = &mut *dev;
        dev.commands.servo_state(&mut dev.bus)
    }

    /// Alias of [`OisDevice::get_servo_state`] for the boundary layer.
    pub fn get_state(&self) -> OisResult<ServoMode> {
        self.get_servo_state()
    }

    /// Chip state text, or `POWER DOWN` while the rail is down.
    pub fn get_state_text(&self) -> OisResult<String> {
        let mut dev = self.lock();
        if !dev.is_powered() {
            return Ok(OisError::PowerNotReady.to_string());
        }
        let dev = &mut *dev;
        dev.commands.chip_state(&mut dev.bus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_codes() {
        for code in 0..=3u8 {
            assert_eq!(ServoMode::from_code(code).unwrap().code(), code);
        }
        assert!(ServoMode::from_code(4).is_err());
        assert!(ServoMode::from_code(7).is_err());
        assert_eq!(ServoMode::Uninitialized.code(), 255);
    }

    #[test]
    fn test_display() {
        assert_eq!(ServoMode::Capture.to_string(), "capture");
        assert_eq!(ServoMode::Off.to_string(), "servo off");
    }
}
