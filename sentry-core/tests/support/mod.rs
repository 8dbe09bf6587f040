#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use heapless::{Deque, Vec as HeaplessVec};
use sentry_core::io::{
    AccelerationSource, AlertOutput, FetchError, IndicatorOutput, NotifyError, RemoteNotifier,
    RemoteStateSource, Rgb, SensorError,
};
use sentry_core::motion::{AccelerationSample, STANDARD_GRAVITY};
use sentry_core::scheduler::Devices;
use sentry_core::telemetry::TelemetryInstant;

pub const AT_REST: AccelerationSample = AccelerationSample::new(0.0, 0.0, STANDARD_GRAVITY);

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(u64);

impl MockInstant {
    pub fn micros(value: u64) -> Self {
        Self(value)
    }

    pub fn secs(value: u64) -> Self {
        Self(value * 1_000_000)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0.saturating_add(u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX)))
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Sensor that replays scripted readings, then repeats `fallback`.
pub struct ScriptedSensor {
    script: Deque<Result<AccelerationSample, SensorError>, 128>,
    fallback: AccelerationSample,
    pub reads: usize,
}

impl ScriptedSensor {
    pub fn steady(sample: AccelerationSample) -> Self {
        Self {
            script: Deque::new(),
            fallback: sample,
            reads: 0,
        }
    }

    pub fn then(mut self, reading: Result<AccelerationSample, SensorError>) -> Self {
        self.script
            .push_back(reading)
            .expect("sensor script capacity exceeded");
        self
    }

    pub fn set_fallback(&mut self, sample: AccelerationSample) {
        self.fallback = sample;
    }
}

impl AccelerationSource for ScriptedSensor {
    fn read_acceleration(&mut self) -> Result<AccelerationSample, SensorError> {
        self.reads += 1;
        self.script.pop_front().unwrap_or(Ok(self.fallback))
    }
}

/// Remote source that answers every fetch with `current`.
pub struct ScriptedRemote {
    pub current: Result<i32, FetchError>,
    pub fetches: usize,
}

impl ScriptedRemote {
    pub fn new(value: i32) -> Self {
        Self {
            current: Ok(value),
            fetches: 0,
        }
    }
}

impl RemoteStateSource for ScriptedRemote {
    fn fetch_state(&mut self) -> Result<i32, FetchError> {
        self.fetches += 1;
        self.current
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: usize,
    pub failure: Option<NotifyError>,
}

impl RemoteNotifier for RecordingNotifier {
    fn send_motion_event(&mut self) -> Result<(), NotifyError> {
        self.sent += 1;
        match self.failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct RecordingIndicator {
    pub colors: HeaplessVec<Rgb, 64>,
}

impl RecordingIndicator {
    pub fn current(&self) -> Option<Rgb> {
        self.colors.last().copied()
    }
}

impl IndicatorOutput for RecordingIndicator {
    fn set_color(&mut self, color: Rgb) {
        let _ = self.colors.push(color);
    }
}

#[derive(Default)]
pub struct RecordingAlert {
    pub levels: HeaplessVec<bool, 64>,
}

impl RecordingAlert {
    pub fn current(&self) -> Option<bool> {
        self.levels.last().copied()
    }
}

impl AlertOutput for RecordingAlert {
    fn set_level(&mut self, asserted: bool) {
        let _ = self.levels.push(asserted);
    }
}

pub type MockDevices = Devices<
    ScriptedSensor,
    ScriptedRemote,
    RecordingNotifier,
    RecordingIndicator,
    RecordingAlert,
>;

pub fn devices(sensor: ScriptedSensor, remote: ScriptedRemote) -> MockDevices {
    Devices::new(
        sensor,
        remote,
        RecordingNotifier::default(),
        RecordingIndicator::default(),
        RecordingAlert::default(),
    )
}
