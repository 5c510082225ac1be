//! Report persistence.
//!
//! The engine hands complete results to a [`ReportSink`] and never sees files. Partial results
//! (an aborted calibration or telemetry batch) are never handed over.

pub mod storage;

pub use storage::FileReportSink;

use parking_lot::Mutex;
use std::sync::Arc;

use crate::engine::calibration::CalibrationResult;
use crate::engine::telemetry::TelemetryBatch;
use crate::error::OisResult;

/// Destination for the reports produced by engine operations.
///
/// Each write replaces the previous report of the same kind as a whole.
pub trait ReportSink: Send {
    /// Store the six calibration words.
    fn write_calibration(&mut self, result: &CalibrationResult) -> OisResult<()>;

    /// Store one complete telemetry batch.
    fn write_telemetry(&mut self, batch: &TelemetryBatch) -> OisResult<()>;

    /// Store a raw register dump.
    fn write_byte_dump(&mut self, bytes: &[u8]) -> OisResult<()>;

    /// Text of the last stored telemetry batch, `None` if there is none.
    fn read_telemetry(&mut self) -> OisResult<Option<String>>;

    /// Store a saved copy of the OIS parameter window.
    fn write_ois_data(&mut self, bytes: &[u8]) -> OisResult<()>;

    /// Saved copy of the OIS parameter window, `None` if nothing was saved.
    fn read_ois_data(&mut self) -> OisResult<Option<Vec<u8>>>;
}

#[derive(Debug, Default)]
struct MemoryReports {
    calibrations: Vec<CalibrationResult>,
    telemetry: Vec<TelemetryBatch>,
    dumps: Vec<Vec<u8>>,
    ois_data: Option<Vec<u8>>,
    fail_writes: bool,
}

/// In-memory [`ReportSink`].
///
/// Keeps every report it was handed, in order. Clones share storage, so a test can hand one
/// clone to the engine and inspect through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryReportSink {
    reports: Arc<Mutex<MemoryReports>>,
}

impl MemoryReportSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a persistence error.
    pub fn fail_writes(&self, fail: bool) {
        self.reports.lock().fail_writes = fail;
    }

    /// Every calibration result stored so far.
    pub fn calibrations(&self) -> Vec<CalibrationResult> {
        self.reports.lock().calibrations.clone()
    }

    /// Every telemetry batch stored so far.
    pub fn telemetry_batches(&self) -> Vec<TelemetryBatch> {
        self.reports.lock().telemetry.clone()
    }

    /// Every register dump stored so far.
    pub fn dumps(&self) -> Vec<Vec<u8>> {
        self.reports.lock().dumps.clone()
    }

    /// Saved OIS parameter window, if any.
    pub fn ois_data(&self) -> Option<Vec<u8>> {
        self.reports.lock().ois_data.clone()
    }

    fn check_writable(reports: &MemoryReports) -> OisResult<()> {
        if reports.fail_writes {
            return Err(crate::error::OisError::Persistence(
                "memory sink rejects writes".into(),
            ));
        }
        Ok(())
    }
}

impl ReportSink for MemoryReportSink {
    fn write_calibration(&mut self, result: &CalibrationResult) -> OisResult<()> {
        let mut reports = self.reports.lock();
        Self::check_writable(&reports)?;
        reports.calibrations.push(*result);
        Ok(())
    }

    fn write_telemetry(&mut self, batch: &TelemetryBatch) -> OisResult<()> {
        let mut reports = self.reports.lock();
        Self::check_writable(&reports)?;
        reports.telemetry.push(batch.clone());
        Ok(())
    }

    fn write_byte_dump(&mut self, bytes: &[u8]) -> OisResult<()> {
        let mut reports = self.reports.lock();
        Self::check_writable(&reports)?;
        reports.dumps.push(bytes.to_vec());
        Ok(())
    }

    fn read_telemetry(&mut self) -> OisResult<Option<String>> {
        let reports = self.reports.lock();
        Ok(reports.telemetry.last().map(|batch| {
            batch
                .records
                .iter()
                .map(|record| {
                    record
                        .iter()
                        .map(|word| format!("0x{:04x}", word))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .collect::<Vec<_>>()
                .join("\n")
        }))
    }

    fn write_ois_data(&mut self, bytes: &[u8]) -> OisResult<()> {
        let mut reports = self.reports.lock();
        Self::check_writable(&reports)?;
        reports.ois_data = Some(bytes.to_vec());
        Ok(())
    }

    fn read_ois_data(&mut self) -> OisResult<Option<Vec<u8>>> {
        Ok(self.reports.lock().ois_data.clone())
    }
}
