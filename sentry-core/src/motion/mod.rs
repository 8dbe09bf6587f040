//! Acceleration samples and the threshold-based motion classifier.
//!
//! Everything here is a pure function of its inputs so the same evaluation can
//! run inside the firmware control task, the host emulator, and the tests
//! without touching sensor hardware.

use core::fmt;

/// Standard gravity in m/s², used both for the z-axis calibration baseline and
/// the z-axis motion test.
pub const STANDARD_GRAVITY: f32 = 9.81;

/// Single accelerometer reading in m/s².
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct AccelerationSample {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl AccelerationSample {
    /// Creates a sample from per-axis accelerations.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Converts raw big-endian register counts into m/s² for the given range.
    #[must_use]
    pub fn from_raw_counts(raw: [i16; 3], range: AccelRange) -> Self {
        Self {
            x: range.counts_to_ms2(raw[0]),
            y: range.counts_to_ms2(raw[1]),
            z: range.counts_to_ms2(raw[2]),
        }
    }

    /// Decodes the six data bytes starting at `ACCEL_XOUT_H`.
    #[must_use]
    pub fn from_register_bytes(data: [u8; 6], range: AccelRange) -> Self {
        let raw = [
            i16::from_be_bytes([data[0], data[1]]),
            i16::from_be_bytes([data[2], data[3]]),
            i16::from_be_bytes([data[4], data[5]]),
        ];
        Self::from_raw_counts(raw, range)
    }
}

impl fmt::Display for AccelerationSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Full-scale range configured on the accelerometer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccelRange {
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    /// Raw counts reported for one g at this range.
    #[must_use]
    pub const fn lsb_per_g(self) -> f32 {
        match self {
            Self::G2 => 16384.0,
            Self::G4 => 8192.0,
            Self::G8 => 4096.0,
            Self::G16 => 2048.0,
        }
    }

    /// `AFS_SEL` value written to `ACCEL_CONFIG` bits 4:3.
    #[must_use]
    pub const fn register_bits(self) -> u8 {
        let select = match self {
            Self::G2 => 0,
            Self::G4 => 1,
            Self::G8 => 2,
            Self::G16 => 3,
        };
        select << 3
    }

    #[must_use]
    pub fn counts_to_ms2(self, counts: i16) -> f32 {
        f32::from(counts) / self.lsb_per_g() * STANDARD_GRAVITY
    }
}

/// Per-axis bias captured at rest. The z component is relative to gravity.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct CalibrationOffset {
    x: f32,
    y: f32,
    z: f32,
}

impl CalibrationOffset {
    /// Offset that leaves samples untouched.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn x(&self) -> f32 {
        self.x
    }

    #[must_use]
    pub const fn y(&self) -> f32 {
        self.y
    }

    #[must_use]
    pub const fn z(&self) -> f32 {
        self.z
    }

    /// Subtracts the bias from every axis of `sample`.
    #[must_use]
    pub fn correct(&self, sample: AccelerationSample) -> AccelerationSample {
        AccelerationSample::new(sample.x - self.x, sample.y - self.y, sample.z - self.z)
    }
}

impl fmt::Display for CalibrationOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X: {:.2}, Y: {:.2}, Z: {:.2}", self.x, self.y, self.z)
    }
}

/// Error returned when a threshold is not a strictly positive number.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct InvalidThreshold;

impl fmt::Display for InvalidThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("motion threshold must be strictly positive")
    }
}

/// Per-axis deviation (m/s²) above which a sample counts as motion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct MotionThreshold(f32);

impl MotionThreshold {
    /// Validates and wraps a threshold. NaN, zero, negatives and infinity are rejected.
    pub fn new(value: f32) -> Result<Self, InvalidThreshold> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(InvalidThreshold)
        }
    }

    /// Threshold used by the deployed device.
    #[must_use]
    pub const fn default_threshold() -> Self {
        Self(2.0)
    }

    #[must_use]
    pub const fn get(self) -> f32 {
        self.0
    }
}

impl Default for MotionThreshold {
    fn default() -> Self {
        Self::default_threshold()
    }
}

/// Result of evaluating one sample.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MotionClassification {
    Motion,
    NoMotion,
}

impl MotionClassification {
    #[must_use]
    pub const fn is_motion(self) -> bool {
        matches!(self, Self::Motion)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::NoMotion => "still",
        }
    }
}

impl fmt::Display for MotionClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies `sample` against `threshold` after removing `offset`.
///
/// The z axis is compared as `|(z - offset.z) - g|`. Because `offset.z` is
/// already gravity-relative, gravity is effectively applied twice on this
/// axis; deployed devices rely on this exact rule, so it is kept as is.
#[must_use]
pub fn evaluate(
    sample: AccelerationSample,
    offset: &CalibrationOffset,
    threshold: MotionThreshold,
) -> MotionClassification {
    let corrected = offset.correct(sample);
    let limit = threshold.get();

    if corrected.x.abs() > limit
        || corrected.y.abs() > limit
        || (corrected.z - STANDARD_GRAVITY).abs() > limit
    {
        MotionClassification::Motion
    } else {
        MotionClassification::NoMotion
    }
}
