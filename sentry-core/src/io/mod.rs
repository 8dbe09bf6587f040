//! Collaborator contracts for the sensor, the remote endpoints, and the
//! physical outputs.
//!
//! Firmware and host targets provide the concrete implementations; the core
//! only ever sees these traits and the error kinds they report.

use core::fmt;

use crate::motion::AccelerationSample;

/// Failure reported when the accelerometer cannot be read.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorError {
    /// The bus transaction failed (NACK, arbitration loss, timeout).
    Bus,
    /// The device answered but is not ready or returned an unexpected identity.
    NotReady,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::Bus => f.write_str("sensor bus error"),
            SensorError::NotReady => f.write_str("sensor not ready"),
        }
    }
}

/// Failure reported when the remote armed-state value cannot be fetched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FetchError {
    /// The network link to the remote endpoint is down.
    Link,
    /// The request did not complete within the I/O timeout.
    Timeout,
    /// The endpoint answered with a non-success HTTP status.
    Status(u16),
    /// The feed holds no entries yet.
    NoData,
    /// The response could not be understood.
    Malformed,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Link => f.write_str("link unavailable"),
            FetchError::Timeout => f.write_str("timed out"),
            FetchError::Status(code) => write!(f, "status {code}"),
            FetchError::NoData => f.write_str("no data in feed"),
            FetchError::Malformed => f.write_str("malformed response"),
        }
    }
}

/// Failure reported when a motion event cannot be delivered.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NotifyError {
    /// The network link to the remote endpoint is down.
    Link,
    /// The request did not complete within the I/O timeout.
    Timeout,
    /// The endpoint answered with a non-success HTTP status.
    Status(u16),
    /// The outgoing request queue was full.
    Busy,
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Link => f.write_str("link unavailable"),
            NotifyError::Timeout => f.write_str("timed out"),
            NotifyError::Status(code) => write!(f, "status {code}"),
            NotifyError::Busy => f.write_str("request queue full"),
        }
    }
}

/// Polled accelerometer.
pub trait AccelerationSource {
    /// Performs a blocking read of the current acceleration.
    fn read_acceleration(&mut self) -> Result<AccelerationSample, SensorError>;
}

/// Remote value that decides whether the system should be armed.
pub trait RemoteStateSource {
    /// Returns the latest field value (`1` arms, `0` disarms).
    fn fetch_state(&mut self) -> Result<i32, FetchError>;
}

/// Remote endpoint that receives motion detections.
pub trait RemoteNotifier {
    /// Posts a single motion event. Failures are reported, never retried.
    fn send_motion_event(&mut self) -> Result<(), NotifyError>;
}

/// 8-bit RGB colour for the status indicator.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const OFF: Self = Self::new(0, 0, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);

    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    #[must_use]
    pub const fn is_off(self) -> bool {
        self.red == 0 && self.green == 0 && self.blue == 0
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Colour status indicator (the armed/disarmed pixel).
pub trait IndicatorOutput {
    fn set_color(&mut self, color: Rgb);
}

/// Binary alert output (the motion LED).
pub trait AlertOutput {
    fn set_level(&mut self, asserted: bool);
}

/// Blocking pause between calibration reads.
pub trait SettleDelay {
    fn settle(&mut self, duration: core::time::Duration);
}

/// Delay that returns immediately; useful for simulated sensors.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDelay;

impl NoopDelay {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SettleDelay for NoopDelay {
    fn settle(&mut self, _: core::time::Duration) {}
}
