//! Batched telemetry sampling.
//!
//! Each iteration reads three register pairs. The batch is timed as a whole, and only a batch
//! where every iteration completed is handed to the report sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{error, info};

use super::OisDevice;
use crate::adapters::RegisterBusAdapter;
use crate::error::{OisError, OisResult};

/// Register pairs read each iteration.
pub const TELEMETRY_PAIRS: [(u16, u16); 3] = [(0x8455, 0x8456), (0x8234, 0x8236), (0x8280, 0x82C0)];

/// The registers of [`TELEMETRY_PAIRS`] in record order.
pub const TELEMETRY_REGISTERS: [u16; 6] = [0x8455, 0x8456, 0x8234, 0x8236, 0x8280, 0x82C0];

/// Supported batch sizes.
pub const BATCH_SIZES: [usize; 2] = [1024, 2048];

/// A complete telemetry batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    /// One six-word record per iteration
    pub records: Vec<[u16; 6]>,
    /// Wall time of the whole read loop
    pub elapsed: Duration,
    /// When the batch finished
    pub captured_at: DateTime<Utc>,
}

impl TelemetryBatch {
    /// Mean time per iteration in microseconds.
    pub fn per_iteration_us(&self) -> u128 {
        per_iteration_us(self.elapsed, self.records.len())
    }
}

fn per_iteration_us(elapsed: Duration, iterations: usize) -> u128 {
    if iterations == 0 {
        return 0;
    }
    elapsed.as_micros() / iterations as u128
}

fn read_record(bus: &mut RegisterBusAdapter) -> OisResult<[u16; 6]> {
    let mut record = [0u16; 6];
    for (slot, &(x_reg, y_reg)) in record.chunks_exact_mut(2).zip(TELEMETRY_PAIRS.iter()) {
        let (x, y) = bus.read_pair(x_reg, y_reg)?;
        slot[0] = x;
        slot[1] = y;
    }
    Ok(record)
}

/// Read `count` records. The first failing read aborts with [`OisError::PartialBatchFailure`].
pub fn sample_batch(bus: &mut RegisterBusAdapter, count: usize) -> OisResult<TelemetryBatch> {
    let mut records = Vec::with_capacity(count);
    let start = Instant::now();
    let mut failure = None;

    for i in 0..count {
        match read_record(bus) {
            Ok(record) => records.push(record),
            Err(e) => {
                error!(iteration = i, error = %e, "read x,y failed");
                failure = Some(e);
                break;
            }
        }
    }

    let elapsed = start.elapsed();
    info!(
        iterations = records.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        per_iteration_us = per_iteration_us(elapsed, records.len()) as u64,
        "read x,y values"
    );

    if let Some(source) = failure {
        return Err(OisError::PartialBatchFailure {
            completed: records.len(),
            requested: count,
            source: Box::new(source),
        });
    }

    Ok(TelemetryBatch {
        records,
        elapsed,
        captured_at: Utc::now(),
    })
}

impl OisDevice {
    /// Sample `count` telemetry iterations and persist the batch.
    ///
    /// `count` must be one of [`BATCH_SIZES`]; anything else is rejected before any bus access.
    /// An aborted batch is discarded.
    pub fn sample_telemetry(&self, count: usize) -> OisResult<()> {
        let mut dev = self.lock();
        let result = if BATCH_SIZES.contains(&count) {
            dev.require_power().and_then(|_| {
                let dev = &mut *dev;
                let batch = sample_batch(&mut dev.bus, count)?;
                dev.reports.write_telemetry(&batch)?;
                info!(count, "telemetry batch stored");
                Ok(())
            })
        } else {
            Err(OisError::invalid(format!(
                "unsupported telemetry batch size {} (expected 1024 or 2048)",
                count
            )))
        };
        dev.finish("sample_telemetry", result)
    }
}
