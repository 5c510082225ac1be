//! Typed register access
//!
//! Multi-byte registers are little-endian on the wire: the low byte of the host value is
//! transmitted first. Against the MSB-first word framing of the camera control interface this
//! means a 2-byte write swaps the two bytes of the value before transmission, and a 2-byte read
//! swaps them back.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use super::RegisterBus;
use crate::error::{BusError, OisError};

/// Width of a register transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegisterWidth {
    /// 1 byte
    Byte,
    /// 2 bytes
    Word,
    /// 4 bytes
    DWord,
}

impl RegisterWidth {
    /// Number of bytes moved on the bus.
    pub const fn bytes(self) -> usize {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::DWord => 4,
        }
    }

    /// Largest value representable at this width.
    pub const fn max_value(self) -> u32 {
        match self {
            Self::Byte => 0xFF,
            Self::Word => 0xFFFF,
            Self::DWord => u32::MAX,
        }
    }
}

/// Widths are named by their byte count (1, 2 or 4). Anything else is rejected rather than
/// coerced to a byte access.
impl TryFrom<u8> for RegisterWidth {
    type Error = OisError;

    fn try_from(bytes: u8) -> Result<Self, Self::Error> {
        match bytes {
            1 => Ok(Self::Byte),
            2 => Ok(Self::Word),
            4 => Ok(Self::DWord),
            other => Err(OisError::invalid(format!(
                "unsupported register width {} (expected 1, 2 or 4)",
                other
            ))),
        }
    }
}

impl fmt::Display for RegisterWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Byte => write!(f, "BYTE"),
            Self::Word => write!(f, "WORD"),
            Self::DWord => write!(f, "DWORD"),
        }
    }
}

/// A register address, its width and a value of that width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterValue {
    /// Register address
    pub addr: u16,
    /// Transaction width
    pub width: RegisterWidth,
    /// Value, at most `width.max_value()`
    pub value: u32,
}

impl RegisterValue {
    /// Build a register value, rejecting values that do not fit the width.
    pub fn new(addr: u16, width: RegisterWidth, value: u32) -> Result<Self, OisError> {
        if value > width.max_value() {
            return Err(OisError::invalid(format!(
                "value 0x{:x} does not fit a {} register",
                value, width
            )));
        }
        Ok(Self { addr, width, value })
    }
}

/// Typed access to the registers of one selected device on a [`RegisterBus`].
pub struct RegisterBusAdapter {
    bus: Box<dyn RegisterBus>,
    slave: u8,
}

impl RegisterBusAdapter {
    /// Wrap a transport, addressing `slave`.
    pub fn new(bus: Box<dyn RegisterBus>, slave: u8) -> Self {
        Self { bus, slave }
    }

    /// Currently selected device address.
    pub fn slave(&self) -> u8 {
        self.slave
    }

    /// Address a different device on the same bus for subsequent transactions.
    pub fn select_slave(&mut self, slave: u8) {
        self.slave = slave;
    }

    /// Read a register of the given width.
    pub fn read(&mut self, addr: u16, width: RegisterWidth) -> Result<u32, BusError> {
        let mut buf = [0u8; 4];
        self.bus.read(self.slave, addr, &mut buf[..width.bytes()])?;
        let value = u32::from_le_bytes(buf);
        trace!(slave = self.slave, reg = addr, %width, value, "register read");
        Ok(value)
    }

    /// Write a register of the given width. Bits above the width are not transmitted.
    pub fn write(&mut self, addr: u16, width: RegisterWidth, value: u32) -> Result<(), BusError> {
        let bytes = value.to_le_bytes();
        self.bus.write(self.slave, addr, &bytes[..width.bytes()])?;
        trace!(slave = self.slave, reg = addr, %width, value, "register write");
        Ok(())
    }

    /// Read a 16-bit register.
    pub fn read_word(&mut self, addr: u16) -> Result<u16, BusError> {
        // A word read only fills the two low bytes.
        Ok(self.read(addr, RegisterWidth::Word)? as u16)
    }

    /// Read a 16-bit register holding two's-complement data.
    pub fn read_i16(&mut self, addr: u16) -> Result<i16, BusError> {
        Ok(self.read_word(addr)? as i16)
    }

    /// Write a 16-bit register.
    pub fn write_word(&mut self, addr: u16, value: u16) -> Result<(), BusError> {
        self.write(addr, RegisterWidth::Word, u32::from(value))
    }

    /// Read an X/Y register pair in one call; the first failure aborts the pair.
    pub fn read_pair(&mut self, x_addr: u16, y_addr: u16) -> Result<(u16, u16), BusError> {
        let x = self.read_word(x_addr)?;
        let y = self.read_word(y_addr)?;
        Ok((x, y))
    }

    /// Read `buf.len()` consecutive raw bytes starting at `addr` in one transaction.
    pub fn read_block(&mut self, addr: u16, buf: &mut [u8]) -> Result<(), BusError> {
        self.bus.read(self.slave, addr, buf)
    }

    /// Write consecutive raw bytes starting at `addr` in one transaction.
    pub fn write_block(&mut self, addr: u16, data: &[u8]) -> Result<(), BusError> {
        self.bus.write(self.slave, addr, data)
    }
}

impl fmt::Debug for RegisterBusAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterBusAdapter")
            .field("slave", &self.slave)
            .finish_non_exhaustive()
    }
}
