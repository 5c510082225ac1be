//! File-backed report sink.
//!
//! Formats:
//!
//! - calibration: the six words `avgX avgY maxX maxY minX minY` as `0x%04x` on one line
//! - telemetry: `# `-prefixed JSON metadata, then CSV with one six-word record per iteration
//! - register dump and OIS data: one `0x%02x` byte per line
//!
//! Every write goes to a temporary file in the output directory which is then renamed over the
//! target, so a reader never sees a half-written report.

use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::ReportSink;
use crate::config::ReportsConfig;
use crate::engine::calibration::CalibrationResult;
use crate::engine::telemetry::{TelemetryBatch, TELEMETRY_REGISTERS};
use crate::error::{OisError, OisResult};

#[derive(Serialize)]
struct TelemetryMetadata {
    captured_at: String,
    iterations: usize,
    elapsed_ms: u128,
    per_iteration_us: u128,
    registers: Vec<String>,
}

/// [`ReportSink`] writing human-readable report files.
#[derive(Debug, Clone)]
pub struct FileReportSink {
    calibration_path: PathBuf,
    telemetry_path: PathBuf,
    dump_path: PathBuf,
    ois_data_path: PathBuf,
}

impl FileReportSink {
    /// Sink writing to the paths named by `config`.
    pub fn new(config: &ReportsConfig) -> Self {
        Self {
            calibration_path: config.calibration_path(),
            telemetry_path: config.telemetry_path(),
            dump_path: config.dump_path(),
            ois_data_path: config.ois_data_path(),
        }
    }

    /// Path of the calibration report.
    pub fn calibration_path(&self) -> &Path {
        &self.calibration_path
    }

    /// Path of the telemetry report.
    pub fn telemetry_path(&self) -> &Path {
        &self.telemetry_path
    }

    /// Path of the register dump.
    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    /// Path of the saved OIS parameter window.
    pub fn ois_data_path(&self) -> &Path {
        &self.ois_data_path
    }
}

fn persistence_error(path: &Path, action: &str, err: impl std::fmt::Display) -> OisError {
    OisError::Persistence(format!("Failed to {} {:?}: {}", action, path, err))
}

/// Write `path` through a sibling temporary file and rename it into place.
fn replace_file<F>(path: &Path, fill: F) -> OisResult<()>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        if !dir.exists() {
            fs::create_dir_all(dir).map_err(|e| persistence_error(dir, "create directory", e))?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let result = File::create(&tmp_path)
        .map(BufWriter::new)
        .and_then(|mut writer| {
            fill(&mut writer)?;
            writer.flush()
        });
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(persistence_error(path, "write", e));
    }

    fs::rename(&tmp_path, path).map_err(|e| persistence_error(path, "replace", e))?;
    debug!(path = %path.display(), "report written");
    Ok(())
}

fn write_byte_lines(path: &Path, bytes: &[u8]) -> OisResult<()> {
    replace_file(path, |out| {
        for byte in bytes {
            writeln!(out, "0x{:02x}", byte)?;
        }
        Ok(())
    })
}

fn parse_byte_lines(path: &Path, text: &str) -> OisResult<Vec<u8>> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let digits = line.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16)
                .map_err(|e| persistence_error(path, &format!("parse byte '{}' in", line), e))
        })
        .collect()
}

fn read_if_present(path: &Path) -> OisResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) if text.is_empty() => Ok(None),
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(persistence_error(path, "read", e)),
    }
}

impl ReportSink for FileReportSink {
    fn write_calibration(&mut self, result: &CalibrationResult) -> OisResult<()> {
        let line = result
            .to_words()
            .iter()
            .map(|word| format!("0x{:04x}", word))
            .collect::<Vec<_>>()
            .join(" ");
        replace_file(&self.calibration_path, |out| writeln!(out, "{}", line))?;
        info!(path = %self.calibration_path.display(), "gyro calibration stored");
        Ok(())
    }

    fn write_telemetry(&mut self, batch: &TelemetryBatch) -> OisResult<()> {
        let iterations = batch.records.len();
        let metadata = TelemetryMetadata {
            captured_at: batch.captured_at.to_rfc3339(),
            iterations,
            elapsed_ms: batch.elapsed.as_millis(),
            per_iteration_us: batch.per_iteration_us(),
            registers: TELEMETRY_REGISTERS
                .iter()
                .map(|reg| format!("0x{:04x}", reg))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&metadata)
            .map_err(|e| persistence_error(&self.telemetry_path, "serialize metadata for", e))?;

        replace_file(&self.telemetry_path, |out| {
            for line in json.lines() {
                writeln!(out, "# {}", line)?;
            }
            let mut writer = csv::Writer::from_writer(out);
            let header: Vec<String> = TELEMETRY_REGISTERS
                .iter()
                .map(|reg| format!("0x{:04x}", reg))
                .collect();
            writer.write_record(&header)?;
            for record in &batch.records {
                writer.write_record(record.iter().map(|word| format!("0x{:04x}", word)))?;
            }
            writer.flush()
        })?;

        info!(
            path = %self.telemetry_path.display(),
            iterations,
            "telemetry batch stored"
        );
        Ok(())
    }

    fn write_byte_dump(&mut self, bytes: &[u8]) -> OisResult<()> {
        write_byte_lines(&self.dump_path, bytes)?;
        info!(path = %self.dump_path.display(), len = bytes.len(), "register dump stored");
        Ok(())
    }

    fn read_telemetry(&mut self) -> OisResult<Option<String>> {
        read_if_present(&self.telemetry_path)
    }

    fn write_ois_data(&mut self, bytes: &[u8]) -> OisResult<()> {
        write_byte_lines(&self.ois_data_path, bytes)?;
        info!(path = %self.ois_data_path.display(), len = bytes.len(), "OIS data saved");
        Ok(())
    }

    fn read_ois_data(&mut self) -> OisResult<Option<Vec<u8>>> {
        match read_if_present(&self.ois_data_path)? {
            Some(text) => parse_byte_lines(&self.ois_data_path, &text).map(Some),
            None => Ok(None),
        }
    }
}
