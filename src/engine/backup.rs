//! Register window snapshot and compare.
//!
//! Maintenance commands that rewrite device parameters are bracketed by a snapshot of the
//! parameter window and a compare afterwards. The compare result is a bring-up signal: it is
//! logged and returned as a value, and never turns the surrounding command into a failure.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{DeviceInner, OisDevice};
use crate::adapters::RegisterBusAdapter;
use crate::error::{OisError, OisResult};

/// Copy of a register window taken before a mutating command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSnapshot {
    base: u16,
    data: Vec<u8>,
}

impl BackupSnapshot {
    /// Read `length` raw bytes starting at `base`.
    pub fn capture(bus: &mut RegisterBusAdapter, base: u16, length: usize) -> OisResult<Self> {
        validate_window(base, length)?;
        let mut data = vec![0u8; length];
        bus.read_block(base, &mut data)?;
        Ok(Self { base, data })
    }

    /// First register of the window.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Window length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false; empty windows are rejected at capture.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Captured bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Re-read the window and compare it byte for byte.
    pub fn compare(&self, bus: &mut RegisterBusAdapter) -> OisResult<VerifyOutcome> {
        let mut current = vec![0u8; self.data.len()];
        bus.read_block(self.base, &mut current)?;
        Ok(VerifyOutcome::between(&self.data, &current))
    }
}

fn validate_window(base: u16, length: usize) -> OisResult<()> {
    if length == 0 {
        return Err(OisError::invalid("backup window length must be non-zero"));
    }
    if usize::from(base) + length > 0x1_0000 {
        return Err(OisError::invalid(format!(
            "backup window 0x{:04x}+{} runs past 0xffff",
            base, length
        )));
    }
    Ok(())
}

/// Result of comparing a window against its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerifyOutcome {
    /// Every byte matches the snapshot
    Unchanged,
    /// At least one byte differs
    Changed {
        /// Offset of the first differing byte from the window base
        first_difference: usize,
        /// Number of differing bytes
        differing_bytes: usize,
    },
}

impl VerifyOutcome {
    fn between(before: &[u8], after: &[u8]) -> Self {
        let mut diffs = before
            .iter()
            .zip(after)
            .enumerate()
            .filter(|(_, (a, b))| a != b)
            .map(|(offset, _)| offset);
        match diffs.next() {
            None => Self::Unchanged,
            Some(first_difference) => Self::Changed {
                first_difference,
                differing_bytes: 1 + diffs.count(),
            },
        }
    }

    /// Whether the window changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Run `op` bracketed by a snapshot/compare of the configured backup window.
///
/// The compare only runs when `op` succeeded. Snapshot or compare failures are logged and
/// dropped; the returned value is always `op`'s result.
pub(crate) fn guarded<T>(
    dev: &mut DeviceInner,
    label: &str,
    op: impl FnOnce(&mut DeviceInner) -> OisResult<T>,
) -> OisResult<T> {
    let snapshot = match BackupSnapshot::capture(&mut dev.bus, dev.backup_base, dev.backup_length)
    {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(op = label, error = %e, "backup before command failed, compare skipped");
            None
        }
    };

    let result = op(dev);

    if let (Ok(_), Some(snapshot)) = (&result, snapshot) {
        match snapshot.compare(&mut dev.bus) {
            Ok(outcome) => log_outcome(label, &outcome),
            Err(e) => warn!(op = label, error = %e, "compare after command failed"),
        }
    }
    result
}

fn log_outcome(label: &str, outcome: &VerifyOutcome) {
    match outcome {
        VerifyOutcome::Changed {
            first_difference,
            differing_bytes,
        } => info!(
            op = label,
            first_difference, differing_bytes, "{} changed register data", label
        ),
        VerifyOutcome::Unchanged => warn!(op = label, "{} NOT changed register data", label),
    }
}

impl OisDevice {
    /// Snapshot `length` bytes of registers starting at `base`.
    pub fn backup(&self, base: u16, length: usize) -> OisResult<BackupSnapshot> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let snapshot = BackupSnapshot::capture(&mut dev.bus, base, length)?;
            info!(base = %format!("0x{:04x}", base), length, "register window backed up");
            Ok(snapshot)
        });
        dev.finish("backup", result)
    }

    /// Compare the registers behind `snapshot` with their captured values.
    ///
    /// Returns `true` if anything changed. A difference is a diagnostic, not an error.
    pub fn verify(&self, snapshot: &BackupSnapshot) -> OisResult<bool> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let outcome = snapshot.compare(&mut dev.bus)?;
            log_outcome("verify", &outcome);
            Ok(outcome.changed())
        });
        dev.finish("verify", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::SimulatedBus;

    #[test]
    fn test_outcome_counts_differences() {
        assert_eq!(VerifyOutcome::between(&[1, 2, 3], &[1, 2, 3]), VerifyOutcome::Unchanged);
        assert_eq!(
            VerifyOutcome::between(&[1, 2, 3, 4], &[1, 9, 3, 9]),
            VerifyOutcome::Changed {
                first_difference: 1,
                differing_bytes: 2
            }
        );
    }

    #[test]
    fn test_window_validation() {
        let bus = SimulatedBus::new();
        let mut adapter = RegisterBusAdapter::new(Box::new(bus), 0x0E);
        assert!(BackupSnapshot::capture(&mut adapter, 0x0200, 0).is_err());
        assert!(BackupSnapshot::capture(&mut adapter, 0xFFFF, 2).is_err());
        assert!(BackupSnapshot::capture(&mut adapter, 0xFFFF, 1).is_ok());
    }

    #[test]
    fn test_snapshot_sees_later_write() {
        let bus = SimulatedBus::new();
        bus.poke(0x0200, &[0xAA; 8]);
        let mut adapter = RegisterBusAdapter::new(Box::new(bus.clone()), 0x0E);

        let snapshot = BackupSnapshot::capture(&mut adapter, 0x0200, 8).unwrap();
        assert_eq!(snapshot.data(), &[0xAA; 8]);
        assert_eq!(snapshot.compare(&mut adapter).unwrap(), VerifyOutcome::Unchanged);

        bus.poke(0x0205, &[0x55]);
        assert_eq!(
            snapshot.compare(&mut adapter).unwrap(),
            VerifyOutcome::Changed {
                first_difference: 5,
                differing_bytes: 1
            }
        );
    }
}
