//! At-rest accelerometer calibration.
//!
//! The device must stay still while samples are collected; nothing here can
//! verify that. The accumulator is exposed separately so async callers can
//! pace the reads with their own timer instead of [`SettleDelay`].

use core::{fmt, num::NonZeroU16, time::Duration};

use crate::io::{AccelerationSource, SensorError, SettleDelay};
use crate::motion::{AccelerationSample, CalibrationOffset, STANDARD_GRAVITY};

/// Number of samples averaged when no override is configured.
pub const CALIBRATION_SAMPLES: NonZeroU16 = match NonZeroU16::new(100) {
    Some(count) => count,
    None => panic!("calibration sample count must be non-zero"),
};

/// Pause between consecutive calibration reads.
pub const CALIBRATION_SPACING: Duration = Duration::from_millis(50);

/// Parameters for a calibration pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CalibrationSettings {
    pub samples: NonZeroU16,
    pub spacing: Duration,
}

impl CalibrationSettings {
    #[must_use]
    pub const fn new(samples: NonZeroU16, spacing: Duration) -> Self {
        Self { samples, spacing }
    }
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self::new(CALIBRATION_SAMPLES, CALIBRATION_SPACING)
    }
}

/// Calibration could not produce an offset.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CalibrationError {
    /// Every read failed, so there is nothing to average.
    NoSamples { failures: u16 },
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationError::NoSamples { failures } => {
                write!(f, "no usable samples ({failures} failed reads)")
            }
        }
    }
}

/// Running per-axis sums for a calibration pass.
#[derive(Copy, Clone, Debug, Default)]
pub struct CalibrationAccumulator {
    sum_x: f64,
    sum_y: f64,
    sum_z: f64,
    count: u32,
    failures: u16,
}

impl CalibrationAccumulator {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sum_x: 0.0,
            sum_y: 0.0,
            sum_z: 0.0,
            count: 0,
            failures: 0,
        }
    }

    /// Adds a successful reading.
    pub fn add(&mut self, sample: AccelerationSample) {
        self.sum_x += f64::from(sample.x);
        self.sum_y += f64::from(sample.y);
        self.sum_z += f64::from(sample.z);
        self.count = self.count.saturating_add(1);
    }

    /// Adds the outcome of one read; failed reads are counted and skipped.
    pub fn record(&mut self, reading: Result<AccelerationSample, SensorError>) {
        match reading {
            Ok(sample) => self.add(sample),
            Err(_) => self.failures = self.failures.saturating_add(1),
        }
    }

    /// Number of samples averaged so far.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Number of reads that failed.
    #[must_use]
    pub const fn failures(&self) -> u16 {
        self.failures
    }

    /// Produces the offset: x and y are the raw means, z is the mean minus gravity.
    #[allow(clippy::cast_possible_truncation)]
    pub fn finish(&self) -> Result<CalibrationOffset, CalibrationError> {
        if self.count == 0 {
            return Err(CalibrationError::NoSamples {
                failures: self.failures,
            });
        }

        let count = f64::from(self.count);
        let mean_x = (self.sum_x / count) as f32;
        let mean_y = (self.sum_y / count) as f32;
        let mean_z = (self.sum_z / count) as f32;

        Ok(CalibrationOffset::new(
            mean_x,
            mean_y,
            mean_z - STANDARD_GRAVITY,
        ))
    }
}

/// Samples `source` at rest and returns the per-axis bias.
///
/// Each read is followed by `settings.spacing` on `delay`.
pub fn calibrate<S, D>(
    source: &mut S,
    delay: &mut D,
    settings: CalibrationSettings,
) -> Result<CalibrationOffset, CalibrationError>
where
    S: AccelerationSource,
    D: SettleDelay,
{
    let mut accumulator = CalibrationAccumulator::new();

    for _ in 0..settings.samples.get() {
        accumulator.record(source.read_acceleration());
        delay.settle(settings.spacing);
    }

    accumulator.finish()
}
