use std::fmt::Write as _;
use std::ops::Add;
use std::time::Duration;

use crossterm::style::{Color, Stylize};
use sentry_core::calibration::calibrate;
use sentry_core::config::ControllerConfig;
use sentry_core::io::{
    AccelerationSource, AlertOutput, FetchError, IndicatorOutput, NoopDelay, NotifyError,
    RemoteNotifier, RemoteStateSource, Rgb, SensorError,
};
use sentry_core::motion::AccelerationSample;
use sentry_core::scheduler::{ControlLoop, Devices};
use sentry_core::telemetry::{EventId, TelemetryEventKind, TelemetryInstant, TelemetryRecord};

/// Reading reported by the simulated sensor while it sits still.
pub const RESTING: AccelerationSample = AccelerationSample::new(0.05, -0.03, 9.83);

/// Extra acceleration added on top of [`RESTING`] by `shake`.
const SHAKE_DELTA: AccelerationSample = AccelerationSample::new(3.5, -1.0, 0.0);

/// Longest single `advance`, to keep runaway loops out of the console.
const MAX_ADVANCE: Duration = Duration::from_secs(24 * 60 * 60);

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "remote",
        "remote <value>|empty|fail [timeout|status <code>]  - script the next fetch",
    ),
    (
        "notify",
        "notify ok|fail [status <code>]          - script the motion endpoint",
    ),
    (
        "shake",
        "shake                                  - move the sensor",
    ),
    (
        "still",
        "still                                  - put the sensor back at rest",
    ),
    (
        "tilt",
        "tilt <x> <y> <z>                       - set the raw reading in m/s²",
    ),
    (
        "sensor",
        "sensor ok|fail                         - make sensor reads succeed or fail",
    ),
    (
        "advance",
        "advance <seconds>                      - run the virtual clock forward",
    ),
    (
        "status",
        "status                                 - display controller state",
    ),
    (
        "help",
        "help [topic]                           - show help for a command",
    ),
];

/// Time since the session started.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    pub const START: Self = Self(Duration::ZERO);

    #[must_use]
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0.saturating_add(rhs))
    }
}

impl TelemetryInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

pub struct SimulatedSensor {
    pub reading: AccelerationSample,
    pub failing: bool,
}

impl AccelerationSource for SimulatedSensor {
    fn read_acceleration(&mut self) -> Result<AccelerationSample, SensorError> {
        if self.failing {
            Err(SensorError::Bus)
        } else {
            Ok(self.reading)
        }
    }
}

pub struct SimulatedRemote {
    pub response: Result<i32, FetchError>,
    pub fetches: usize,
}

impl RemoteStateSource for SimulatedRemote {
    fn fetch_state(&mut self) -> Result<i32, FetchError> {
        self.fetches += 1;
        self.response
    }
}

pub struct SimulatedNotifier {
    pub failure: Option<NotifyError>,
    pub delivered: usize,
}

impl RemoteNotifier for SimulatedNotifier {
    fn send_motion_event(&mut self) -> Result<(), NotifyError> {
        match self.failure {
            Some(err) => Err(err),
            None => {
                self.delivered += 1;
                Ok(())
            }
        }
    }
}

/// Indicator that reports colour changes as console lines.
#[derive(Default)]
pub struct ConsoleIndicator {
    pub color: Rgb,
    changes: Vec<String>,
}

impl IndicatorOutput for ConsoleIndicator {
    fn set_color(&mut self, color: Rgb) {
        if color != self.color {
            self.changes.push(format!("indicator {}", swatch(color)));
        }
        self.color = color;
    }
}

#[derive(Default)]
pub struct ConsoleAlert {
    pub level: bool,
    changes: Vec<String>,
}

impl AlertOutput for ConsoleAlert {
    fn set_level(&mut self, asserted: bool) {
        if asserted != self.level {
            let label = if asserted { "on" } else { "off" };
            self.changes.push(format!("alert {label}"));
        }
        self.level = asserted;
    }
}

pub type SimulatedDevices =
    Devices<SimulatedSensor, SimulatedRemote, SimulatedNotifier, ConsoleIndicator, ConsoleAlert>;

pub struct Session {
    control: ControlLoop<VirtualInstant>,
    devices: SimulatedDevices,
    now: VirtualInstant,
    next_event: EventId,
}

impl Session {
    /// Calibrates the simulated sensor and starts a disarmed controller.
    ///
    /// # Errors
    ///
    /// Returns a printable message when calibration fails or `config` is rejected.
    pub fn new(config: ControllerConfig) -> Result<(Self, Vec<String>), String> {
        let mut sensor = SimulatedSensor {
            reading: RESTING,
            failing: false,
        };
        let offset = calibrate(&mut sensor, &mut NoopDelay::new(), config.calibration)
            .map_err(|err| format!("calibration failed: {err}"))?;
        let control = ControlLoop::new(config, offset, VirtualInstant::START)
            .map_err(|err| format!("invalid configuration: {err}"))?;

        let devices = Devices::new(
            sensor,
            SimulatedRemote {
                response: Ok(0),
                fetches: 0,
            },
            SimulatedNotifier {
                failure: None,
                delivered: 0,
            },
            ConsoleIndicator::default(),
            ConsoleAlert::default(),
        );

        let mut session = Self {
            control,
            devices,
            now: VirtualInstant::START,
            next_event: 0,
        };
        let mut lines = vec![format!(
            "calibrated from {} samples, threshold {:.2} m/s²",
            config.calibration.samples,
            config.threshold.get()
        )];
        lines.extend(session.drain_output());
        Ok((session, lines))
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = words.collect();

        let result = match command.to_ascii_lowercase().as_str() {
            "help" => Ok(help(args.first().copied())),
            "remote" => self.script_remote(&args),
            "notify" => self.script_notifier(&args),
            "shake" => {
                self.devices.sensor.reading = AccelerationSample::new(
                    RESTING.x + SHAKE_DELTA.x,
                    RESTING.y + SHAKE_DELTA.y,
                    RESTING.z + SHAKE_DELTA.z,
                );
                Ok(vec![format!("sensor {}", self.devices.sensor.reading)])
            }
            "still" => {
                self.devices.sensor.reading = RESTING;
                Ok(vec![format!("sensor {}", self.devices.sensor.reading)])
            }
            "tilt" => self.tilt(&args),
            "sensor" => self.script_sensor(&args),
            "advance" => self.advance(&args),
            "status" => Ok(self.status()),
            other => Err(format!("unknown command `{other}`; try `help`")),
        };

        result.unwrap_or_else(|err| vec![format!("ERR {err}")])
    }

    #[must_use]
    pub fn now(&self) -> VirtualInstant {
        self.now
    }

    #[must_use]
    pub fn control(&self) -> &ControlLoop<VirtualInstant> {
        &self.control
    }

    #[must_use]
    pub fn devices(&self) -> &SimulatedDevices {
        &self.devices
    }

    /// Moves the clock forward, servicing every deadline on the way.
    pub fn advance_by(&mut self, span: Duration) -> Vec<String> {
        let target = self.now + span;
        let mut lines = Vec::new();

        while let Some(due) = self.control.next_deadline().filter(|due| *due <= target) {
            self.now = due;
            self.control.run_due(due, &mut self.devices);
            lines.extend(self.drain_output());
        }

        self.now = target;
        lines
    }

    fn advance(&mut self, args: &[&str]) -> Result<Vec<String>, String> {
        let [seconds] = args else {
            return Err("usage: advance <seconds>".to_string());
        };
        let seconds: f64 = seconds
            .parse()
            .map_err(|_| format!("`{seconds}` is not a number of seconds"))?;
        let span = Duration::try_from_secs_f64(seconds)
            .map_err(|_| format!("`{seconds}` is not a valid duration"))?;
        if span > MAX_ADVANCE {
            return Err(format!(
                "advance is limited to {}s",
                MAX_ADVANCE.as_secs()
            ));
        }

        let mut lines = self.advance_by(span);
        lines.push(format!("now {}", format_time(self.now)));
        Ok(lines)
    }

    fn script_remote(&mut self, args: &[&str]) -> Result<Vec<String>, String> {
        let response = match args {
            ["empty"] => Err(FetchError::NoData),
            ["fail"] | ["fail", "link"] => Err(FetchError::Link),
            ["fail", "timeout"] => Err(FetchError::Timeout),
            ["fail", "status", code] => Err(FetchError::Status(parse_status(code)?)),
            [value] => Ok(value
                .parse::<i32>()
                .map_err(|_| format!("`{value}` is not an integer"))?),
            _ => return Err("usage: remote <value>|empty|fail [timeout|status <code>]".into()),
        };

        self.devices.remote.response = response;
        let description = match response {
            Ok(value) => format!("remote will answer {value}"),
            Err(err) => format!("remote will fail: {err}"),
        };
        Ok(vec![description])
    }

    fn script_notifier(&mut self, args: &[&str]) -> Result<Vec<String>, String> {
        let failure = match args {
            ["ok"] => None,
            ["fail"] => Some(NotifyError::Link),
            ["fail", "status", code] => Some(NotifyError::Status(parse_status(code)?)),
            _ => return Err("usage: notify ok|fail [status <code>]".into()),
        };

        self.devices.notifier.failure = failure;
        let description = match failure {
            None => "notifier will accept events".to_string(),
            Some(err) => format!("notifier will fail: {err}"),
        };
        Ok(vec![description])
    }

    fn script_sensor(&mut self, args: &[&str]) -> Result<Vec<String>, String> {
        self.devices.sensor.failing = match args {
            ["ok"] => false,
            ["fail"] => true,
            _ => return Err("usage: sensor ok|fail".into()),
        };
        let label = if self.devices.sensor.failing {
            "sensor reads will fail"
        } else {
            "sensor reads will succeed"
        };
        Ok(vec![label.to_string()])
    }

    fn tilt(&mut self, args: &[&str]) -> Result<Vec<String>, String> {
        let [x, y, z] = args else {
            return Err("usage: tilt <x> <y> <z>".into());
        };
        let parse = |value: &str| {
            value
                .parse::<f32>()
                .ok()
                .filter(|parsed| parsed.is_finite())
                .ok_or_else(|| format!("`{value}` is not a finite number"))
        };

        self.devices.sensor.reading = AccelerationSample::new(parse(x)?, parse(y)?, parse(z)?);
        Ok(vec![format!("sensor {}", self.devices.sensor.reading)])
    }

    fn status(&self) -> Vec<String> {
        let control = &self.control;
        let latest = control
            .latest_classification()
            .map_or("none", |classification| classification.as_str());
        let next = control
            .next_deadline()
            .map_or_else(|| "idle".to_string(), format_time);

        vec![
            format!("time       {}", format_time(self.now)),
            format!("state      {}", control.state()),
            format!(
                "motion     {} (latest: {latest})",
                if control.motion_checks_running() {
                    "checking every second"
                } else {
                    "stopped"
                }
            ),
            format!("indicator  {}", swatch(self.devices.indicator.color)),
            format!(
                "alert      {}",
                if self.devices.alert.level { "on" } else { "off" }
            ),
            format!("offset     {}", control.offset()),
            format!("next tick  {next}"),
            format!(
                "remote     {} fetches, {} notifications delivered",
                self.devices.remote.fetches, self.devices.notifier.delivered
            ),
        ]
    }

    /// Collects output changes and telemetry appended since the last call.
    fn drain_output(&mut self) -> Vec<String> {
        let mut lines = std::mem::take(&mut self.devices.indicator.changes);
        lines.append(&mut self.devices.alert.changes);

        for record in self.control.telemetry().oldest_first() {
            if record.id >= self.next_event {
                lines.push(describe_record(record));
            }
        }
        if let Some(latest) = self.control.telemetry().latest() {
            self.next_event = event_after(latest.id);
        }
        lines
    }
}

/// Id the recorder assigns after `id`; ids wrap like the ring's counter.
fn event_after(id: EventId) -> EventId {
    id.wrapping_add(1)
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => HELP_TOPICS
            .iter()
            .map(|(_, usage)| (*usage).to_string())
            .collect(),
        Some(topic) => match HELP_TOPICS.iter().find(|(name, _)| *name == topic) {
            Some((_, usage)) => vec![(*usage).to_string()],
            None => vec![format!("ERR no help for `{topic}`")],
        },
    }
}

fn parse_status(code: &str) -> Result<u16, String> {
    code.parse()
        .map_err(|_| format!("`{code}` is not an HTTP status code"))
}

fn describe_record(record: &TelemetryRecord<VirtualInstant>) -> String {
    let mut line = format!("[{}] {}", format_time(record.timestamp), record.event);
    if let TelemetryEventKind::Armed {
        elapsed_since_previous: Some(elapsed),
    }
    | TelemetryEventKind::Disarmed {
        elapsed_since_previous: Some(elapsed),
    } = record.event
    {
        let _ = write!(line, " after {}", format_duration(elapsed));
    }
    line
}

fn format_time(instant: VirtualInstant) -> String {
    format!("t={}", format_duration(instant.since_start()))
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

fn swatch(color: Rgb) -> String {
    let dot = if color.is_off() { "○" } else { "●" };
    let styled = dot.with(Color::Rgb {
        r: color.red,
        g: color.green,
        b: color.blue,
    });
    format!("{styled} {color}")
}
