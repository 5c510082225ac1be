//! Image sensor and EEPROM register access.
//!
//! These chips sit on the same control bus but are powered by the camera stack. Access is
//! refused unless the chip in question is powered.

use tracing::info;

use super::OisDevice;
use crate::adapters::RegisterWidth;
use crate::error::{OisError, OisResult};

/// Cameras whose power also feeds the calibration EEPROM.
pub const BACK_CAMERAS: [u8; 2] = [0, 2];

fn sensor_width(width: RegisterWidth) -> OisResult<RegisterWidth> {
    match width {
        RegisterWidth::Byte | RegisterWidth::Word => Ok(width),
        RegisterWidth::DWord => Err(OisError::invalid("sensor registers are byte or word wide")),
    }
}

impl OisDevice {
    /// Read an image sensor register. The sensor must be powered.
    pub fn read_sensor_register(
        &self,
        camera: u8,
        addr: u16,
        width: RegisterWidth,
    ) -> OisResult<u32> {
        let mut dev = self.lock();
        let result = sensor_width(width).and_then(|width| {
            let sensors = dev
                .sensors
                .as_mut()
                .ok_or_else(|| OisError::Command("no image sensor service attached".into()))?;
            check_camera(sensors.camera_count(), camera)?;
            if !sensors.is_powered(camera) {
                return Err(OisError::Command(format!("Camera ID {} POWER DOWN", camera)));
            }
            let value = sensors.read(camera, addr, width)?;
            info!(
                camera,
                reg = %format!("0x{:04x}", addr),
                value = %format!("0x{:x}", value),
                "sensor register read"
            );
            Ok(value)
        });
        dev.finish("read_sensor_register", result)
    }

    /// Write an image sensor register. The sensor must be powered.
    pub fn write_sensor_register(
        &self,
        camera: u8,
        addr: u16,
        width: RegisterWidth,
        value: u32,
    ) -> OisResult<()> {
        let mut dev = self.lock();
        let result = sensor_width(width).and_then(|width| {
            if value > width.max_value() {
                return Err(OisError::invalid(format!(
                    "value 0x{:x} does not fit a {} register",
                    value, width
                )));
            }
            let sensors = dev
                .sensors
                .as_mut()
                .ok_or_else(|| OisError::Command("no image sensor service attached".into()))?;
            check_camera(sensors.camera_count(), camera)?;
            if !sensors.is_powered(camera) {
                return Err(OisError::Command(format!("Camera ID {} POWER DOWN", camera)));
            }
            sensors.write(camera, addr, width, value)?;
            info!(
                camera,
                reg = %format!("0x{:04x}", addr),
                value = %format!("0x{:x}", value),
                "sensor register written"
            );
            Ok(())
        });
        dev.finish("write_sensor_register", result)
    }

    /// Read one EEPROM byte. A back camera sensor or the OIS must be powered.
    pub fn read_eeprom(&self, addr: u16) -> OisResult<u8> {
        let mut dev = self.lock();
        let back_camera_up = dev
            .sensors
            .as_ref()
            .map(|s| BACK_CAMERAS.iter().any(|&cam| s.is_powered(cam)))
            .unwrap_or(false);
        let powered = back_camera_up || dev.is_powered();

        let result = if powered {
            match dev.eeprom.as_mut() {
                Some(eeprom) => eeprom.read_byte(addr).map_err(OisError::from),
                None => Err(OisError::Command("no EEPROM service attached".into())),
            }
        } else {
            Err(OisError::Command("EEPROM POWER DOWN".into()))
        };
        if let Ok(value) = &result {
            info!(
                reg = %format!("0x{:04x}", addr),
                value = %format!("0x{:x}", value),
                "EEPROM read"
            );
        }
        dev.finish("read_eeprom", result)
    }
}

fn check_camera(count: u8, camera: u8) -> OisResult<()> {
    if camera >= count {
        return Err(OisError::invalid(format!(
            "camera {} out of range (0..{})",
            camera, count
        )));
    }
    Ok(())
}
