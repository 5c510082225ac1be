//! Register bus adapters
//!
//! This module contains the transport abstraction the engine talks through and the typed
//! adapter layered on top of it:
//!
//! - [`RegisterBus`] moves raw bytes to and from a register of a device on the bus. It is
//!   supplied by the platform (CCI/I2C controller) and is the only place that knows how a
//!   transaction is framed.
//! - [`RegisterBusAdapter`] adds 1/2/4-byte typed access, the device byte order and the
//!   selected device address.
//! - [`SimulatedBus`] is an in-memory register file with failure injection used by tests
//!   and the bench binary.

pub mod mock;
pub mod register;

pub use mock::{BusTransaction, SimulatedBus};
pub use register::{RegisterBusAdapter, RegisterValue, RegisterWidth};

use crate::error::BusError;

/// Raw register transport.
///
/// # Invariants
///
/// - All calls are synchronous and may block on the transport
/// - No retries are attempted; a failed transaction is reported once
/// - Only one owner drives a bus instance at a time (the engine holds it under its lock)
pub trait RegisterBus: Send {
    /// Read `buf.len()` bytes starting at register `reg` of device `slave`.
    fn read(&mut self, slave: u8, reg: u16, buf: &mut [u8]) -> Result<(), BusError>;

    /// Write `data` starting at register `reg` of device `slave`.
    fn write(&mut self, slave: u8, reg: u16, data: &[u8]) -> Result<(), BusError>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for Box<T> {
    fn read(&mut self, slave: u8, reg: u16, buf: &mut [u8]) -> Result<(), BusError> {
        (**self).read(slave, reg, buf)
    }

    fn write(&mut self, slave: u8, reg: u16, data: &[u8]) -> Result<(), BusError> {
        (**self).write(slave, reg, data)
    }
}
