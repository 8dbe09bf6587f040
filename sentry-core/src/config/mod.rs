//! Compile-time defaults and validation for the control loop.

use core::{fmt, time::Duration};

use crate::activation::IndicatorPalette;
use crate::calibration::CalibrationSettings;
use crate::motion::MotionThreshold;

/// Period of the remote-state poll task.
pub const POLL_PERIOD: Duration = Duration::from_secs(30);
/// Period of the motion-check task while armed.
pub const MOTION_CHECK_PERIOD: Duration = Duration::from_secs(1);
/// Motion threshold of the deployed device, in m/s².
pub const MOTION_THRESHOLD: MotionThreshold = MotionThreshold::default_threshold();
/// Upper bound on a single remote exchange.
pub const REMOTE_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for a [`ControlLoop`](crate::scheduler::ControlLoop).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    pub poll_period: Duration,
    pub motion_period: Duration,
    pub threshold: MotionThreshold,
    pub calibration: CalibrationSettings,
    pub palette: IndicatorPalette,
    pub io_timeout: Duration,
}

impl ControllerConfig {
    /// Validates the timing relationships the scheduler depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("poll"));
        }
        if self.motion_period.is_zero() {
            return Err(ConfigError::ZeroPeriod("motion"));
        }
        if self.io_timeout.is_zero() || self.io_timeout > self.poll_period {
            return Err(ConfigError::TimeoutExceedsPoll {
                timeout: self.io_timeout,
                poll_period: self.poll_period,
            });
        }
        Ok(())
    }

    /// Returns a copy with a different motion threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: MotionThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Returns a copy with different calibration settings.
    #[must_use]
    pub const fn with_calibration(mut self, calibration: CalibrationSettings) -> Self {
        self.calibration = calibration;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_period: POLL_PERIOD,
            motion_period: MOTION_CHECK_PERIOD,
            threshold: MOTION_THRESHOLD,
            calibration: CalibrationSettings::default(),
            palette: IndicatorPalette::default(),
            io_timeout: REMOTE_IO_TIMEOUT,
        }
    }
}

/// Rejected configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroPeriod(&'static str),
    TimeoutExceedsPoll {
        timeout: Duration,
        poll_period: Duration,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroPeriod(task) => write!(f, "{task} period must be non-zero"),
            ConfigError::TimeoutExceedsPoll {
                timeout,
                poll_period,
            } => write!(
                f,
                "remote I/O timeout {timeout:?} must be non-zero and at most the poll period {poll_period:?}"
            ),
        }
    }
}
