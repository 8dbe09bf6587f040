//! Single-owner control loop that services the poll and motion-check tasks.
//!
//! [`ControlLoop`] owns the calibration offset, the activation state machine,
//! both periodic timers, and the telemetry ring. Callers drive it from one
//! thread of control: ask for the next due task with [`ControlLoop::take_due`],
//! perform the I/O that task needs, and hand the result back. Every I/O
//! failure is recorded and otherwise ignored, so a bad tick never changes the
//! armed state or the timer set.
//!
//! Hosts with blocking collaborators can use [`ControlLoop::run_due`] instead,
//! which performs the whole cycle against a [`Devices`] bundle.

use core::{ops::Add, time::Duration};

use crate::activation::{
    ActivationStateMachine, ApplyOutcome, IndicatorState, MotionCheckControl, SystemState,
};
use crate::config::{ConfigError, ControllerConfig};
use crate::io::{
    AccelerationSource, AlertOutput, FetchError, IndicatorOutput, NotifyError, RemoteNotifier,
    RemoteStateSource, SensorError,
};
use crate::motion::{AccelerationSample, CalibrationOffset, MotionClassification, evaluate};
use crate::telemetry::{
    FaultKind, TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryInstant, TelemetryRecorder,
};

/// Fixed-rate periodic timer over an abstract monotonic instant.
///
/// The first tick fires one period after [`start`](Self::start). When the
/// caller falls more than a period behind, the missed ticks collapse into one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PeriodicTimer<TInstant> {
    period: Duration,
    next_due: Option<TInstant>,
}

impl<TInstant> PeriodicTimer<TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    /// Creates a stopped timer. `period` must be non-zero.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Arms the timer so the first tick lands one period after `now`.
    pub fn start(&mut self, now: TInstant) {
        self.next_due = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    #[must_use]
    pub const fn next_due(&self) -> Option<TInstant> {
        self.next_due
    }

    /// Returns the pending deadline if it has been reached at `now`.
    #[must_use]
    pub fn due_at(&self, now: TInstant) -> Option<TInstant> {
        self.next_due.filter(|due| *due <= now)
    }

    /// Consumes a due tick and schedules the next one. Returns `false` when
    /// the timer is stopped or not yet due.
    pub fn fire(&mut self, now: TInstant) -> bool {
        let Some(due) = self.due_at(now) else {
            return false;
        };

        let mut next = due + self.period;
        while !self.period.is_zero() && next <= now {
            next = next + self.period;
        }
        self.next_due = Some(next);
        true
    }
}

/// Periodic task selected by [`ControlLoop::take_due`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduledTask {
    /// Fetch the remote armed-state value.
    Poll,
    /// Read the accelerometer and classify the sample.
    MotionCheck,
}

impl ScheduledTask {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::MotionCheck => "motion-check",
        }
    }
}

/// Result of a poll tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    Applied(ApplyOutcome),
    FetchFailed(FetchError),
}

/// Result of a motion-check tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MotionTickOutcome {
    /// Threshold crossed; carries the offset-corrected sample.
    Motion(AccelerationSample),
    Still,
    SensorFault(SensorError),
    /// The tick arrived while disarmed and was dropped.
    Skipped,
}

impl MotionTickOutcome {
    /// Every tick classified as motion is reported, not just the first.
    #[must_use]
    pub const fn should_notify(&self) -> bool {
        matches!(self, Self::Motion(_))
    }
}

/// Blocking collaborators used by [`ControlLoop::run_due`].
pub struct Devices<S, R, N, I, A> {
    pub sensor: S,
    pub remote: R,
    pub notifier: N,
    pub indicator: I,
    pub alert: A,
}

impl<S, R, N, I, A> Devices<S, R, N, I, A> {
    pub const fn new(sensor: S, remote: R, notifier: N, indicator: I, alert: A) -> Self {
        Self {
            sensor,
            remote,
            notifier,
            indicator,
            alert,
        }
    }
}

struct MotionTimerHandle<'a, TInstant> {
    timer: &'a mut PeriodicTimer<TInstant>,
    now: TInstant,
}

impl<TInstant> MotionCheckControl for MotionTimerHandle<'_, TInstant>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant>,
{
    fn start(&mut self) {
        self.timer.start(self.now);
    }

    fn stop(&mut self) {
        self.timer.stop();
    }
}

/// Sensing-and-activation loop.
pub struct ControlLoop<TInstant, const TELEMETRY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    config: ControllerConfig,
    offset: CalibrationOffset,
    activation: ActivationStateMachine,
    poll_timer: PeriodicTimer<TInstant>,
    motion_timer: PeriodicTimer<TInstant>,
    latest: Option<MotionClassification>,
    telemetry: TelemetryRecorder<TInstant, TELEMETRY>,
}

impl<TInstant, const TELEMETRY: usize> ControlLoop<TInstant, TELEMETRY>
where
    TInstant: Copy + Ord + Add<Duration, Output = TInstant> + TelemetryInstant,
{
    /// Builds a disarmed loop around a finished calibration and starts the poll task.
    pub fn new(
        config: ControllerConfig,
        offset: CalibrationOffset,
        started_at: TInstant,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut poll_timer = PeriodicTimer::new(config.poll_period);
        poll_timer.start(started_at);

        let mut telemetry = TelemetryRecorder::new();
        telemetry.record(TelemetryEventKind::Calibrated(offset), started_at);

        Ok(Self {
            config,
            offset,
            activation: ActivationStateMachine::new(config.palette),
            poll_timer,
            motion_timer: PeriodicTimer::new(config.motion_period),
            latest: None,
            telemetry,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    #[must_use]
    pub const fn offset(&self) -> &CalibrationOffset {
        &self.offset
    }

    #[must_use]
    pub const fn state(&self) -> SystemState {
        self.activation.state()
    }

    #[must_use]
    pub const fn motion_checks_running(&self) -> bool {
        self.motion_timer.is_running()
    }

    #[must_use]
    pub const fn latest_classification(&self) -> Option<MotionClassification> {
        self.latest
    }

    /// Output levels implied by the current state and latest classification.
    #[must_use]
    pub fn indicator_state(&self) -> IndicatorState {
        IndicatorState::derive(self.state(), self.latest, self.activation.palette())
    }

    #[must_use]
    pub const fn telemetry(&self) -> &TelemetryRecorder<TInstant, TELEMETRY> {
        &self.telemetry
    }

    /// Earliest pending deadline across both tasks.
    #[must_use]
    pub fn next_deadline(&self) -> Option<TInstant> {
        match (self.poll_timer.next_due(), self.motion_timer.next_due()) {
            (Some(poll), Some(motion)) => Some(poll.min(motion)),
            (poll, motion) => poll.or(motion),
        }
    }

    /// Returns the next task due at `now` and schedules its following tick.
    ///
    /// Earlier deadlines win; a tie goes to the motion check.
    pub fn take_due(&mut self, now: TInstant) -> Option<ScheduledTask> {
        let task = match (self.motion_timer.due_at(now), self.poll_timer.due_at(now)) {
            (Some(motion), Some(poll)) if poll < motion => ScheduledTask::Poll,
            (Some(_), _) => ScheduledTask::MotionCheck,
            (None, Some(_)) => ScheduledTask::Poll,
            (None, None) => return None,
        };

        match task {
            ScheduledTask::Poll => self.poll_timer.fire(now),
            ScheduledTask::MotionCheck => self.motion_timer.fire(now),
        };
        Some(task)
    }

    /// Feeds the result of a remote fetch to the state machine.
    pub fn apply_remote<I, A>(
        &mut self,
        result: Result<i32, FetchError>,
        now: TInstant,
        indicator: &mut I,
        alert: &mut A,
    ) -> PollOutcome
    where
        I: IndicatorOutput + ?Sized,
        A: AlertOutput + ?Sized,
    {
        let value = match result {
            Ok(value) => value,
            Err(err) => {
                self.telemetry.record_fault(FaultKind::RemoteFetch(err), now);
                return PollOutcome::FetchFailed(err);
            }
        };

        let mut motion_checks = MotionTimerHandle {
            timer: &mut self.motion_timer,
            now,
        };
        let outcome = self
            .activation
            .apply(value, indicator, alert, &mut motion_checks);

        match outcome {
            ApplyOutcome::Transitioned(transition) => {
                self.latest = None;
                self.telemetry.record_transition(transition, now);
            }
            ApplyOutcome::Ignored { value, state } => {
                self.telemetry
                    .record(TelemetryEventKind::CommandIgnored { value, state }, now);
            }
        }

        PollOutcome::Applied(outcome)
    }

    /// Classifies one sensor reading and updates the outputs.
    pub fn check_motion<I, A>(
        &mut self,
        reading: Result<AccelerationSample, SensorError>,
        now: TInstant,
        indicator: &mut I,
        alert: &mut A,
    ) -> MotionTickOutcome
    where
        I: IndicatorOutput + ?Sized,
        A: AlertOutput + ?Sized,
    {
        if !self.state().is_armed() {
            return MotionTickOutcome::Skipped;
        }

        let sample = match reading {
            Ok(sample) => sample,
            Err(err) => {
                self.telemetry.record_fault(FaultKind::SensorRead(err), now);
                return MotionTickOutcome::SensorFault(err);
            }
        };

        let classification = evaluate(sample, &self.offset, self.config.threshold);
        self.latest = Some(classification);
        self.indicator_state().drive(indicator, alert);

        match classification {
            MotionClassification::Motion => {
                let corrected = self.offset.correct(sample);
                self.telemetry
                    .record(TelemetryEventKind::MotionDetected(corrected), now);
                MotionTickOutcome::Motion(corrected)
            }
            MotionClassification::NoMotion => MotionTickOutcome::Still,
        }
    }

    /// Records the outcome of a motion notification. Failures are not retried.
    pub fn record_notification(&mut self, result: Result<(), NotifyError>, now: TInstant) {
        match result {
            Ok(()) => {
                self.telemetry.record(TelemetryEventKind::NotifySent, now);
            }
            Err(err) => {
                self.telemetry
                    .record_fault(FaultKind::RemoteNotify(err), now);
            }
        }
    }

    /// Runs every task due at `now` against blocking collaborators.
    ///
    /// Returns the number of ticks serviced.
    pub fn run_due<S, R, N, I, A>(
        &mut self,
        now: TInstant,
        devices: &mut Devices<S, R, N, I, A>,
    ) -> usize
    where
        S: AccelerationSource,
        R: RemoteStateSource,
        N: RemoteNotifier,
        I: IndicatorOutput,
        A: AlertOutput,
    {
        let mut serviced = 0;

        while let Some(task) = self.take_due(now) {
            serviced += 1;
            match task {
                ScheduledTask::Poll => {
                    let result = devices.remote.fetch_state();
                    self.apply_remote(result, now, &mut devices.indicator, &mut devices.alert);
                }
                ScheduledTask::MotionCheck => {
                    let reading = devices.sensor.read_acceleration();
                    let outcome =
                        self.check_motion(reading, now, &mut devices.indicator, &mut devices.alert);
                    if outcome.should_notify() {
                        let result = devices.notifier.send_motion_event();
                        self.record_notification(result, now);
                    }
                }
            }
        }

        serviced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct Ticks(u64);

    impl Add<Duration> for Ticks {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + rhs.as_secs())
        }
    }

    #[test]
    fn first_tick_lands_one_period_after_start() {
        let mut timer = PeriodicTimer::new(Duration::from_secs(30));
        assert!(!timer.fire(Ticks(100)));

        timer.start(Ticks(0));
        assert_eq!(timer.next_due(), Some(Ticks(30)));
        assert!(!timer.fire(Ticks(29)));
        assert!(timer.fire(Ticks(30)));
        assert_eq!(timer.next_due(), Some(Ticks(60)));
    }

    #[test]
    fn missed_ticks_coalesce() {
        let mut timer = PeriodicTimer::new(Duration::from_secs(1));
        timer.start(Ticks(0));

        assert!(timer.fire(Ticks(5)));
        assert_eq!(timer.next_due(), Some(Ticks(6)));
        assert!(!timer.fire(Ticks(5)));
    }

    #[test]
    fn stop_clears_deadline() {
        let mut timer = PeriodicTimer::new(Duration::from_secs(1));
        timer.start(Ticks(0));
        timer.stop();

        assert!(!timer.is_running());
        assert_eq!(timer.due_at(Ticks(10)), None);
    }
}
