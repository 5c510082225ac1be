//! Firmware update sequencing.
//!
//! ```text
//! read servo state ──► servo off ──► flash image ──► reprogram parameters ──► verify flash
//!        │                 │              │                   │                    │
//!        ▼                 └──────────────┴─────── first failure skips ahead ──────┤
//!      abort                                                                       ▼
//!                                                                 restore servo state (always)
//! ```
//!
//! If the servo state cannot be read there is nothing to restore to, so the update aborts
//! before touching the device.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::servo::ServoMode;
use super::OisDevice;
use crate::error::{OisError, OisResult, UpdateStep};

/// Reference to a firmware image. The engine never opens it; the command set resolves it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage(PathBuf);

impl FirmwareImage {
    /// Reference the image at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    /// Path of the image.
    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for FirmwareImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

fn abort(step: UpdateStep, source: OisError) -> OisError {
    error!(%step, error = %source, "firmware update step failed");
    OisError::SequenceAbort {
        step,
        source: Box::new(source),
    }
}

impl OisDevice {
    /// Flash `image`, reprogram parameters and verify the flash write.
    ///
    /// The servo state read at the start is restored on every path past the first step. The
    /// first failing update step is reported; a restore failure is only reported when every
    /// update step passed. The cached mode follows the device: it reads servo off from the
    /// moment the servo is parked until the restore succeeds.
    pub fn update_firmware(&self, image: &FirmwareImage) -> OisResult<()> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let previous = dev
                .commands
                .servo_state(&mut dev.bus)
                .map_err(|e| abort(UpdateStep::ReadServoState, e))?;
            info!(%image, %previous, "firmware update started");

            let update = dev
                .commands
                .servo_off(&mut dev.bus)
                .map_err(|e| abort(UpdateStep::ServoOff, e))
                .and_then(|_| {
                    dev.mode = ServoMode::Off;
                    dev.commands
                        .flash_firmware(&mut dev.bus, image)
                        .map_err(|e| abort(UpdateStep::FlashImage, e))
                })
                .and_then(|_| {
                    dev.commands
                        .reprogram_parameters(&mut dev.bus)
                        .map_err(|e| abort(UpdateStep::ReprogramParameters, e))
                })
                .and_then(|_| {
                    dev.commands
                        .check_flash_write(&mut dev.bus)
                        .map_err(|e| abort(UpdateStep::VerifyFlash, e))
                });

            let restore = dev
                .commands
                .restore_servo_state(&mut dev.bus, previous)
                .map_err(|e| abort(UpdateStep::RestoreServo, e));
            if restore.is_ok() {
                dev.mode = previous;
            }

            update.and(restore)?;
            info!(%image, "firmware update completed");
            Ok(())
        });
        dev.finish("update_firmware", result)
    }
}
