//! Monotonic instant used by the control loop on the device.
//!
//! `sentry-core` measures time with `core::time::Duration`; Embassy uses its
//! own tick-based types. [`FirmwareInstant`] sits between the two.

use core::ops::Add;

use embassy_time::{Duration, Instant};
use sentry_core::telemetry::TelemetryInstant;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    #[must_use]
    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<core::time::Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: core::time::Duration) -> Self {
        Self(
            self.0
                .checked_add(core_duration_to_embassy(rhs))
                .unwrap_or(Instant::MAX),
        )
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let elapsed = self.0.saturating_duration_since(earlier.0);
        core::time::Duration::from_micros(elapsed.as_micros())
    }
}

/// Converts a core duration to Embassy ticks, saturating on overflow.
#[must_use]
pub fn core_duration_to_embassy(duration: core::time::Duration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    #[test]
    fn adds_core_durations() {
        let later = micros(1_000) + core::time::Duration::from_millis(50);
        assert_eq!(later.as_micros(), 51_000);
    }

    #[test]
    fn addition_saturates() {
        let end = micros(u64::MAX - 1) + core::time::Duration::from_secs(1);
        assert_eq!(end, FirmwareInstant::from(Instant::MAX));
    }

    #[test]
    fn elapsed_saturates_at_zero() {
        let earlier = micros(100);
        let later = micros(250);

        assert_eq!(
            later.saturating_duration_since(earlier),
            core::time::Duration::from_micros(150)
        );
        assert_eq!(
            earlier.saturating_duration_since(later),
            core::time::Duration::ZERO
        );
    }

    #[test]
    fn orders_by_tick() {
        assert!(micros(10) < micros(11));
        assert_eq!(micros(5).max(micros(3)), micros(5));
    }
}
