//! Simulated register bus
//!
//! In-memory register file standing in for the platform bus controller. Every clone shares the
//! same state, so a test can keep one handle for scripting and inspection while the engine owns
//! another.
//!
//! # Read resolution
//!
//! For a read of `n` bytes at `reg` the first match wins:
//!
//! 1. The front of the scripted queue for `(slave, reg)` if it holds exactly `n` bytes
//! 2. The stored entry for `(slave, reg)` if it holds exactly `n` bytes
//! 3. Byte-wise assembly from the single-byte view of `reg + i`, defaulting to 0
//!
//! Writes of up to 4 bytes are stored as one entry under their start register; longer block
//! writes are stored one byte per register.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::RegisterBus;
use crate::error::{BusDirection, BusError};

/// One transaction observed by the simulated bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusTransaction {
    /// Completed or failed read
    Read {
        /// Device address
        slave: u8,
        /// Register address
        reg: u16,
        /// Bytes requested
        len: usize,
    },
    /// Completed or failed write
    Write {
        /// Device address
        slave: u8,
        /// Register address
        reg: u16,
        /// Bytes transmitted, in wire order
        data: Vec<u8>,
    },
}

#[derive(Debug, Default)]
struct BusState {
    registers: HashMap<(u8, u16), Vec<u8>>,
    scripted: HashMap<(u8, u16), VecDeque<Vec<u8>>>,
    read_counts: HashMap<u16, usize>,
    fail_on_read: HashMap<u16, usize>,
    failing_reads: HashSet<u16>,
    failing_writes: HashSet<u16>,
    fail_all: bool,
    log: Vec<BusTransaction>,
}

impl BusState {
    fn byte_at(&self, slave: u8, reg: u16) -> u8 {
        self.registers
            .get(&(slave, reg))
            .and_then(|bytes| bytes.first().copied())
            .unwrap_or(0)
    }
}

/// In-memory [`RegisterBus`] with failure injection.
///
/// # Example
///
/// ```rust
/// use rust_ois::adapters::{RegisterBusAdapter, SimulatedBus};
///
/// let bus = SimulatedBus::new();
/// bus.set_word(0x8455, 0x0102);
/// let mut adapter = RegisterBusAdapter::new(Box::new(bus.clone()), 0x0E);
/// assert_eq!(adapter.read_word(0x8455).unwrap(), 0x0102);
/// ```
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
    slave: u8,
}

impl SimulatedBus {
    /// Create an empty register file. Helpers address the default OIS device (0x0E).
    pub fn new() -> Self {
        Self::for_slave(0x0E)
    }

    /// Create an empty register file whose helpers address `slave`.
    pub fn for_slave(slave: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState::default())),
            slave,
        }
    }

    /// Store a 16-bit value at `reg`, in device byte order.
    pub fn set_word(&self, reg: u16, value: u16) {
        self.set_bytes(reg, &value.to_le_bytes());
    }

    /// Store raw bytes as a single entry at `reg`.
    pub fn set_bytes(&self, reg: u16, bytes: &[u8]) {
        self.state
            .lock()
            .registers
            .insert((self.slave, reg), bytes.to_vec());
    }

    /// Store one byte per register starting at `reg`.
    pub fn poke(&self, reg: u16, bytes: &[u8]) {
        let mut state = self.state.lock();
        for (offset, byte) in bytes.iter().enumerate() {
            let addr = reg.wrapping_add(offset as u16);
            state.registers.insert((self.slave, addr), vec![*byte]);
        }
    }

    /// Queue 16-bit values returned by successive word reads of `reg`.
    ///
    /// Once the queue is drained reads fall back to the stored value.
    pub fn queue_words(&self, reg: u16, values: &[u16]) {
        let mut state = self.state.lock();
        let queue = state.scripted.entry((self.slave, reg)).or_default();
        queue.extend(values.iter().map(|v| v.to_le_bytes().to_vec()));
    }

    /// Current value of a stored 16-bit entry, if any.
    pub fn word(&self, reg: u16) -> Option<u16> {
        let state = self.state.lock();
        match state.registers.get(&(self.slave, reg)).map(Vec::as_slice) {
            Some([lo, hi]) => Some(u16::from_le_bytes([*lo, *hi])),
            Some([lo]) => Some(u16::from(*lo)),
            _ => None,
        }
    }

    /// Single-byte view of the register file at `reg`.
    pub fn byte(&self, reg: u16) -> u8 {
        self.state.lock().byte_at(self.slave, reg)
    }

    /// Fail the `n`-th read (1-based, counted since the last [`SimulatedBus::clear_log`]) of `reg`.
    pub fn fail_nth_read(&self, reg: u16, n: usize) {
        self.state.lock().fail_on_read.insert(reg, n);
    }

    /// Fail every read of `reg`.
    pub fn fail_reads(&self, reg: u16) {
        self.state.lock().failing_reads.insert(reg);
    }

    /// Fail every write to `reg`.
    pub fn fail_writes(&self, reg: u16) {
        self.state.lock().failing_writes.insert(reg);
    }

    /// Fail every transaction until [`SimulatedBus::clear_faults`].
    pub fn fail_all(&self) {
        self.state.lock().fail_all = true;
    }

    /// Remove every injected fault.
    pub fn clear_faults(&self) {
        let mut state = self.state.lock();
        state.fail_on_read.clear();
        state.failing_reads.clear();
        state.failing_writes.clear();
        state.fail_all = false;
    }

    /// Number of reads attempted at `reg`, including failed ones.
    pub fn read_count(&self, reg: u16) -> usize {
        self.state.lock().read_counts.get(&reg).copied().unwrap_or(0)
    }

    /// Every transaction attempted so far, in order.
    pub fn transactions(&self) -> Vec<BusTransaction> {
        self.state.lock().log.clone()
    }

    /// Number of transactions attempted so far.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Forget the transaction log and read counters.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.log.clear();
        state.read_counts.clear();
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBus for SimulatedBus {
    fn read(&mut self, slave: u8, reg: u16, buf: &mut [u8]) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.log.push(BusTransaction::Read {
            slave,
            reg,
            len: buf.len(),
        });

        let count = state.read_counts.entry(reg).or_insert(0);
        *count += 1;
        let attempt = *count;

        let injected = state.fail_all
            || state.failing_reads.contains(&reg)
            || state.fail_on_read.get(&reg) == Some(&attempt);
        if injected {
            return Err(BusError::Transfer {
                slave,
                reg,
                len: buf.len(),
                direction: BusDirection::Read,
                reason: "simulated NACK".into(),
            });
        }

        let key = (slave, reg);
        let scripted = state
            .scripted
            .get_mut(&key)
            .filter(|queue| queue.front().map(Vec::len) == Some(buf.len()))
            .and_then(VecDeque::pop_front);
        if let Some(bytes) = scripted {
            buf.copy_from_slice(&bytes);
            return Ok(());
        }

        if let Some(bytes) = state.registers.get(&key).filter(|b| b.len() == buf.len()) {
            buf.copy_from_slice(bytes);
            return Ok(());
        }

        for (offset, slot) in buf.iter_mut().enumerate() {
            *slot = state.byte_at(slave, reg.wrapping_add(offset as u16));
        }
        Ok(())
    }

    fn write(&mut self, slave: u8, reg: u16, data: &[u8]) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.log.push(BusTransaction::Write {
            slave,
            reg,
            data: data.to_vec(),
        });

        if state.fail_all || state.failing_writes.contains(&reg) {
            return Err(BusError::Transfer {
                slave,
                reg,
                len: data.len(),
                direction: BusDirection::Write,
                reason: "simulated NACK".into(),
            });
        }

        if data.len() <= 4 {
            state.registers.insert((slave, reg), data.to_vec());
        } else {
            for (offset, byte) in data.iter().enumerate() {
                let addr = reg.wrapping_add(offset as u16);
                state.registers.insert((slave, addr), vec![*byte]);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_registers_read_zero() {
        let mut bus = SimulatedBus::new();
        let mut buf = [0xAAu8; 4];
        bus.read(0x0E, 0x1234, &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
    }

    #[test]
    fn test_block_read_assembles_bytes() {
        let mut bus = SimulatedBus::new();
        bus.poke(0x0200, &[1, 2, 3]);
        let mut buf = [0u8; 4];
        bus.read(0x0E, 0x0200, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 0]);
    }

    #[test]
    fn test_queue_then_fallback() {
        let mut bus = SimulatedBus::new();
        bus.set_word(0x8455, 7);
        bus.queue_words(0x8455, &[1, 2]);

        let mut buf = [0u8; 2];
        let mut reads = Vec::new();
        for _ in 0..3 {
            bus.read(0x0E, 0x8455, &mut buf).unwrap();
            reads.push(u16::from_le_bytes(buf));
        }
        assert_eq!(reads, vec![1, 2, 7]);
    }

    #[test]
    fn test_fail_nth_read() {
        let mut bus = SimulatedBus::new();
        bus.fail_nth_read(0x8234, 2);
        let mut buf = [0u8; 2];
        assert!(bus.read(0x0E, 0x8234, &mut buf).is_ok());
        assert!(bus.read(0x0E, 0x8234, &mut buf).is_err());
        assert!(bus.read(0x0E, 0x8234, &mut buf).is_ok());
        assert_eq!(bus.read_count(0x8234), 3);
    }

    #[test]
    fn test_large_write_is_stored_per_byte() {
        let mut bus = SimulatedBus::new();
        bus.write(0x0E, 0x0300, &[9, 8, 7, 6, 5]).unwrap();
        assert_eq!(bus.byte(0x0300), 9);
        assert_eq!(bus.byte(0x0304), 5);
    }

    #[test]
    fn test_clones_share_state() {
        let bus = SimulatedBus::new();
        let mut engine_side = bus.clone();
        engine_side.write(0x0E, 0x0010, &[0x34, 0x12]).unwrap();
        assert_eq!(bus.word(0x0010), Some(0x1234));
        assert_eq!(bus.transaction_count(), 1);
    }
}
