//! Gyro offset calibration.
//!
//! Sixteen X/Y offset pairs are read with a 5 ms settle between pairs. The average is the
//! arithmetic-shifted sum (`sum >> 4`) and min/max come from the raw samples. Any read failure
//! aborts the run before anything is computed or persisted.

use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use super::OisDevice;
use crate::adapters::RegisterBusAdapter;
use crate::error::{BusError, OisResult};

/// Gyro offset register, X axis.
pub const GYRO_OFFSET_X: u16 = 0x8455;
/// Gyro offset register, Y axis.
pub const GYRO_OFFSET_Y: u16 = 0x8456;
/// Samples per axis.
pub const SAMPLE_COUNT: usize = 16;
/// `log2(SAMPLE_COUNT)`.
pub const SAMPLE_SHIFT: u32 = 4;
/// Settle time between sample pairs.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(5);

/// Samples of one axis: slot 0 holds the aggregate, slots 1..=16 the raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisSamples {
    slots: [i16; SAMPLE_COUNT + 1],
}

impl AxisSamples {
    /// Aggregate slot.
    pub fn aggregate(&self) -> i16 {
        self.slots[0]
    }

    /// Raw samples in read order.
    pub fn samples(&self) -> &[i16] {
        &self.slots[1..]
    }

    fn min(&self) -> i16 {
        self.samples().iter().fold(i16::MAX, |acc, &s| acc.min(s))
    }

    fn max(&self) -> i16 {
        self.samples().iter().fold(i16::MIN, |acc, &s| acc.max(s))
    }
}

/// Complete set of calibration samples for both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationSampleSet {
    /// X axis
    pub x: AxisSamples,
    /// Y axis
    pub y: AxisSamples,
}

impl CalibrationSampleSet {
    /// Build a set from sixteen raw pairs, computing the aggregates.
    pub fn from_samples(x: [i16; SAMPLE_COUNT], y: [i16; SAMPLE_COUNT]) -> Self {
        let mut set = Self::default();
        set.x.slots[1..].copy_from_slice(&x);
        set.y.slots[1..].copy_from_slice(&y);
        set.x.slots[0] = shifted_average(&x);
        set.y.slots[0] = shifted_average(&y);
        set
    }

    /// Reduce the samples to the six reported words.
    pub fn result(&self) -> CalibrationResult {
        CalibrationResult {
            avg_x: self.x.aggregate(),
            avg_y: self.y.aggregate(),
            max_x: self.x.max(),
            max_y: self.y.max(),
            min_x: self.x.min(),
            min_y: self.y.min(),
        }
    }
}

/// `sum >> 4` with sign-preserving shift. The sum of sixteen i16 fits an i32.
fn shifted_average(samples: &[i16]) -> i16 {
    let sum: i32 = samples.iter().map(|&s| i32::from(s)).sum();
    (sum >> SAMPLE_SHIFT) as i16
}

/// Gyro calibration result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Average X offset
    pub avg_x: i16,
    /// Average Y offset
    pub avg_y: i16,
    /// Largest X sample
    pub max_x: i16,
    /// Largest Y sample
    pub max_y: i16,
    /// Smallest X sample
    pub min_x: i16,
    /// Smallest Y sample
    pub min_y: i16,
}

impl CalibrationResult {
    /// The six words in report order `{avgX, avgY, maxX, maxY, minX, minY}`.
    pub fn to_words(&self) -> [u16; 6] {
        [
            self.avg_x as u16,
            self.avg_y as u16,
            self.max_x as u16,
            self.max_y as u16,
            self.min_x as u16,
            self.min_y as u16,
        ]
    }
}

/// Read the sixteen offset pairs. The first failing read aborts the run.
pub fn collect_samples(bus: &mut RegisterBusAdapter) -> Result<CalibrationSampleSet, BusError> {
    let mut x = [0i16; SAMPLE_COUNT];
    let mut y = [0i16; SAMPLE_COUNT];

    for (i, (xs, ys)) in x.iter_mut().zip(y.iter_mut()).enumerate() {
        *xs = bus.read_i16(GYRO_OFFSET_X)?;
        *ys = bus.read_i16(GYRO_OFFSET_Y)?;
        debug!(sample = i, x = *xs, y = *ys, "gyro offset sample");
        thread::sleep(SAMPLE_INTERVAL);
    }

    Ok(CalibrationSampleSet::from_samples(x, y))
}

impl OisDevice {
    /// Run the gyro offset calibration and persist the six result words.
    ///
    /// Nothing is persisted and the last result is kept if any sample read fails.
    pub fn run_calibration(&self) -> OisResult<CalibrationResult> {
        let mut dev = self.lock();
        let result = dev.require_power().and_then(|_| {
            let dev = &mut *dev;
            let samples = collect_samples(&mut dev.bus)?;
            let result = samples.result();
            info!(
                avg_x = %format!("0x{:04x}", result.avg_x as u16),
                avg_y = %format!("0x{:04x}", result.avg_y as u16),
                "gyro calibration aggregate"
            );
            dev.reports.write_calibration(&result)?;
            dev.last_calibration = Some(result);
            Ok(result)
        });
        dev.finish("run_calibration", result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_samples() {
        let set = CalibrationSampleSet::from_samples([0x10; 16], [0x20; 16]);
        let result = set.result();
        assert_eq!(result.avg_x, 0x10);
        assert_eq!(result.min_x, 0x10);
        assert_eq!(result.max_x, 0x10);
        assert_eq!(result.avg_y, 0x20);
    }

    #[test]
    fn test_negative_sum_shifts_toward_negative_infinity() {
        // sum = -1 -> -1 >> 4 = -1 (division would give 0)
        let mut x = [0i16; 16];
        x[3] = -1;
        let set = CalibrationSampleSet::from_samples(x, [0; 16]);
        assert_eq!(set.x.aggregate(), -1);
        assert_eq!(set.result().min_x, -1);
        assert_eq!(set.result().max_x, 0);
    }

    #[test]
    fn test_extremes_do_not_overflow() {
        let set = CalibrationSampleSet::from_samples([i16::MIN; 16], [i16::MAX; 16]);
        assert_eq!(set.x.aggregate(), i16::MIN);
        assert_eq!(set.y.aggregate(), i16::MAX);
    }

    #[test]
    fn test_aggregate_slot_excluded_from_scan() {
        let mut x = [100i16; 16];
        x[0] = -100;
        let set = CalibrationSampleSet::from_samples(x, [0; 16]);
        // aggregate is (15 * 100 - 100) >> 4 = 87
        assert_eq!(set.x.aggregate(), 87);
        assert_eq!(set.result().min_x, -100);
        assert_eq!(set.result().max_x, 100);
        assert_eq!(set.x.samples().len(), 16);
    }

    #[test]
    fn test_words_order() {
        let result = CalibrationResult {
            avg_x: 1,
            avg_y: 2,
            max_x: 3,
            max_y: 4,
            min_x: -5,
            min_y: 6,
        };
        assert_eq!(result.to_words(), [1, 2, 3, 4, 0xFFFB, 6]);
    }
}
