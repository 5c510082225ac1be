//! Core library for the rust_ois control engine.
//!
//! This library drives an optical image stabilization (OIS) coprocessor that is reachable only
//! through a register-level bus: power sequencing, servo modes, gyro offset calibration,
//! firmware updates and batched telemetry, plus register access to the camera sensors and the
//! calibration EEPROM sharing that bus. It is used by the `rust_ois` bench binary and by
//! platform integrations that supply real bus, power and sensor services.
//!
//! The entry point is [`engine::OisDevice`]; [`messages::OisCommand`] is its typed command
//! surface.

pub mod adapters;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod hardware;
pub mod messages;

pub use config::OisConfig;
pub use engine::{OisDevice, OpStatus};
pub use error::{OisError, OisResult};
pub use messages::{CommandOutput, OisCommand};
