//! Factory maintenance commands.
//!
//! Commands that rewrite the parameter window run through the backup guard, which logs whether
//! the window actually changed.

use tracing::{debug, info};

use super::backup::guarded;
use super::servo::ServoMode;
use super::OisDevice;
use crate::error::{OisError, OisResult};
use crate::hardware::GyroReport;

/// Last register included in a register dump.
pub const REGISTER_DUMP_END: u16 = 0x02BC;

/// Text returned when no telemetry batch has been stored.
pub const EMPTY_REPORT: &str = "file is empty!";

impl OisDevice {
    /// Run the hall sensor calibration with the servo parked.
    ///
    /// The servo state read beforehand is restored whether or not calibration succeeded.
    pub fn run_hall_calibration(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let previous = dev.commands.servo_state(&mut dev.bus)?;

            let calibration = dev
                .commands
                .servo_off(&mut dev.bus)
                .and_then(|_| {
                    dev.mode = ServoMode::Off;
                    guarded(&mut *dev, "hall_calibration", |dev| {
                        dev.commands.hall_calibration(&mut dev.bus)
                    })
                });

            let restore = dev.commands.restore_servo_state(&mut dev.bus, previous);
            if restore.is_ok() {
                dev.mode = previous;
            }
            calibration.and(restore)
        });
        dev.finish("run_hall_calibration", result)
    }

    /// Reset every device parameter to its initial value.
    pub fn reset_parameters(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            guarded(&mut *dev, "init_all_params", |dev| {
                dev.commands.init_all_params(&mut dev.bus)
            })
        });
        dev.finish("reset_parameters", result)
    }

    /// Commit the OIS data area to flash.
    pub fn sync_to_rom(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            dev.commands.check_flash_write(&mut dev.bus)?;
            info!("OIS Data to ROM OK");
            Ok(())
        });
        dev.finish("sync_to_rom", result)
    }

    /// Read registers `0x0000..=0x02BC` and store them as a byte dump.
    pub fn dump_registers(&self) -> OisResult<Vec<u8>> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let mut bytes = vec![0u8; usize::from(REGISTER_DUMP_END) + 1];
            dev.bus.read_block(0x0000, &mut bytes)?;
            for (reg, byte) in bytes.iter().enumerate() {
                debug!(reg = %format!("0x{:04x}", reg), value = %format!("0x{:02x}", byte), "dump");
            }
            dev.reports.write_byte_dump(&bytes)?;
            Ok(bytes)
        });
        dev.finish("dump_registers", result)
    }

    /// Read the gyro diagnostic words.
    pub fn read_gyro_report(&self) -> OisResult<GyroReport> {
        let mut dev = self.lock();
        dev.require_power()?;
        let dev = &mut *dev;
        let report = dev.commands.gyro_report(&mut dev.bus)?;
        debug!(%report, "gyro report");
        Ok(report)
    }

    /// Text of the last stored telemetry batch, or [`EMPTY_REPORT`].
    pub fn read_telemetry_report(&self) -> OisResult<String> {
        let mut dev = self.lock();
        Ok(dev
            .reports
            .read_telemetry()?
            .unwrap_or_else(|| EMPTY_REPORT.to_string()))
    }

    /// Save the parameter window through the report sink.
    pub fn save_ois_data(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let mut bytes = vec![0u8; dev.backup_length];
            dev.bus.read_block(dev.backup_base, &mut bytes)?;
            dev.reports.write_ois_data(&bytes)?;
            info!(len = bytes.len(), "BACKUP ois data succeeded");
            Ok(())
        });
        dev.finish("save_ois_data", result)
    }

    /// Write the saved parameter window back to the device.
    ///
    /// Fails with [`OisError::Persistence`] before any bus write if nothing was saved.
    pub fn restore_ois_data(&self) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let saved = dev
                .reports
                .read_ois_data()?
                .ok_or_else(|| OisError::Persistence("no saved OIS data".into()))?;
            if usize::from(dev.backup_base) + saved.len() > 0x1_0000 {
                return Err(OisError::Persistence(format!(
                    "saved OIS data ({} bytes) does not fit at 0x{:04x}",
                    saved.len(),
                    dev.backup_base
                )));
            }
            guarded(&mut *dev, "restore_ois_data", |dev| {
                dev.bus.write_block(dev.backup_base, &saved)?;
                info!(len = saved.len(), "RESTORE ois data succeeded");
                Ok(())
            })
        });
        dev.finish("restore_ois_data", result)
    }
}
