//! Custom error types for the OIS engine.
//!
//! This module defines the primary error type, `OisError`, for the whole crate, plus the
//! transport-level `BusError` it wraps. Using the `thiserror` crate, every failure the
//! engine can report surfaces synchronously to the immediate caller as a value.
//!
//! ## Error Hierarchy
//!
//! - **`Bus`**: a register transaction (or the power rail behind it) failed at the transport.
//!   The current step is aborted and nothing is retried at this layer.
//! - **`PowerNotReady`**: a register or state operation was attempted while the OIS rail is
//!   down. Rejected before any bus access. Displays as `POWER DOWN`, the text the factory
//!   tooling expects.
//! - **`InvalidArgument`**: unsupported width, out-of-range mode, unsupported sample count.
//!   Rejected before any bus access.
//! - **`InUse`**: power control requested while a higher-level owner (the camera stack) holds
//!   the device.
//! - **`PartialBatchFailure`**: a telemetry batch aborted part way; nothing was persisted.
//! - **`SequenceAbort`**: a firmware update step failed. The servo state was still restored.
//! - **`Command`**: the device rejected a protocol command.
//! - **`Persistence`**: the report sink could not store a result.
//!
//! A verification mismatch around a maintenance operation is never an error; see
//! [`crate::engine::backup::VerifyOutcome`].

use std::fmt;
use thiserror::Error;

use crate::config::ConfigError;

/// Convenience alias for results using the engine error type.
pub type OisResult<T> = std::result::Result<T, OisError>;

/// Direction of a failed bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusDirection {
    /// Register read
    Read,
    /// Register write
    Write,
}

impl fmt::Display for BusDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Transport failure on the register bus.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// A single read or write transaction was not acknowledged or aborted.
    #[error("{direction} of {len} byte(s) at slave 0x{slave:02x} reg 0x{reg:04x} failed: {reason}")]
    Transfer {
        /// Device address on the bus
        slave: u8,
        /// Register address
        reg: u16,
        /// Transaction length in bytes
        len: usize,
        /// Read or write
        direction: BusDirection,
        /// Transport-specific reason
        reason: String,
    },

    /// The physical power sequence of a rail failed.
    #[error("power sequence failed: {0}")]
    Power(String),
}

/// Step of the firmware update sequence that aborted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStep {
    /// Reading the servo state to restore afterwards
    ReadServoState,
    /// Forcing the servo off before flashing
    ServoOff,
    /// Writing the firmware image
    FlashImage,
    /// Reprogramming parameters after the new image
    ReprogramParameters,
    /// Checking the flash write result
    VerifyFlash,
    /// Restoring the servo state read in the first step
    RestoreServo,
}

impl fmt::Display for UpdateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadServoState => "read servo state",
            Self::ServoOff => "servo off",
            Self::FlashImage => "flash image",
            Self::ReprogramParameters => "reprogram parameters",
            Self::VerifyFlash => "verify flash write",
            Self::RestoreServo => "restore servo state",
        };
        f.write_str(name)
    }
}

/// Primary error type of the engine.
#[derive(Error, Debug)]
pub enum OisError {
    /// Register transport failure
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// OIS rail is down
    #[error("POWER DOWN")]
    PowerNotReady,

    /// Argument rejected before any bus access
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A higher-level owner holds the device
    #[error("Device in use by {0}, power control rejected")]
    InUse(String),

    /// Telemetry batch aborted part way; nothing persisted
    #[error("Telemetry batch aborted after {completed} of {requested} iterations: {source}")]
    PartialBatchFailure {
        /// Iterations fully read before the failure
        completed: usize,
        /// Iterations requested
        requested: usize,
        /// Failure that aborted the batch
        #[source]
        source: Box<OisError>,
    },

    /// Firmware update aborted at `step`; servo state restoration still ran
    #[error("Firmware update aborted at '{step}': {source}")]
    SequenceAbort {
        /// First failing step
        step: UpdateStep,
        /// Failure of that step
        #[source]
        source: Box<OisError>,
    },

    /// Device rejected a protocol command
    #[error("Device command failed: {0}")]
    Command(String),

    /// Report sink failure
    #[error("Report persistence failed: {0}")]
    Persistence(String),

    /// Configuration load or validation failure
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OisError {
    /// Shorthand for [`OisError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_not_ready_display() {
        assert_eq!(OisError::PowerNotReady.to_string(), "POWER DOWN");
    }

    #[test]
    fn test_bus_error_display() {
        let err = OisError::from(BusError::Transfer {
            slave: 0x0e,
            reg: 0x8455,
            len: 2,
            direction: BusDirection::Read,
            reason: "nack".into(),
        });
        assert_eq!(
            err.to_string(),
            "Bus error: read of 2 byte(s) at slave 0x0e reg 0x8455 failed: nack"
        );
    }

    #[test]
    fn test_sequence_abort_names_step() {
        let err = OisError::SequenceAbort {
            step: UpdateStep::FlashImage,
            source: Box::new(OisError::Command("flash rejected".into())),
        };
        assert!(err.to_string().contains("flash image"));
        assert!(err.to_string().contains("flash rejected"));
    }
}
