//! Glue between the control task and the sans-I/O [`ControlLoop`].
//!
//! Poll ticks turn into link requests and their results come back later as
//! [`LinkReply`]s. Motion ticks read the accelerometer inline, since an I2C
//! read completes in well under a millisecond.

use sentry_core::io::{AccelerationSource, AlertOutput, IndicatorOutput};
use sentry_core::link::LinkRequest;
use sentry_core::scheduler::{ControlLoop, ScheduledTask};

use crate::clock::FirmwareInstant;
use crate::link::{LinkClient, LinkReply};
use crate::telemetry::log_link_dropped;

pub type FirmwareControlLoop = ControlLoop<FirmwareInstant>;

pub struct Outputs<I, A> {
    pub indicator: I,
    pub alert: A,
}

/// Runs every task due at `now`. Returns the number of ticks serviced.
pub fn service_due<S, I, A>(
    control: &mut FirmwareControlLoop,
    now: FirmwareInstant,
    sensor: &mut S,
    outputs: &mut Outputs<I, A>,
    link: &mut LinkClient<'_>,
) -> usize
where
    S: AccelerationSource,
    I: IndicatorOutput,
    A: AlertOutput,
{
    let mut serviced = 0;
    while let Some(task) = control.take_due(now) {
        serviced += 1;
        match task {
            ScheduledTask::Poll => match link.request_fetch() {
                Ok(true) => {}
                Ok(false) => log_link_dropped(LinkRequest::FetchState, "previous fetch pending"),
                Err(err) => {
                    control.apply_remote(Err(err), now, &mut outputs.indicator, &mut outputs.alert);
                }
            },
            ScheduledTask::MotionCheck => {
                let reading = sensor.read_acceleration();
                let outcome = control.check_motion(
                    reading,
                    now,
                    &mut outputs.indicator,
                    &mut outputs.alert,
                );
                if outcome.should_notify()
                    && let Err(err) = link.send_notify()
                {
                    control.record_notification(Err(err), now);
                }
            }
        }
    }
    serviced
}

/// Applies a finished link exchange.
pub fn apply_reply<I, A>(
    control: &mut FirmwareControlLoop,
    reply: LinkReply,
    now: FirmwareInstant,
    outputs: &mut Outputs<I, A>,
    link: &mut LinkClient<'_>,
) where
    I: IndicatorOutput,
    A: AlertOutput,
{
    link.on_reply(&reply);
    match reply {
        LinkReply::Fetched(result) => {
            control.apply_remote(result, now, &mut outputs.indicator, &mut outputs.alert);
        }
        LinkReply::Notified(result) => control.record_notification(result, now),
    }
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;
    use sentry_core::activation::SystemState;
    use sentry_core::config::ControllerConfig;
    use sentry_core::io::{FetchError, NotifyError, Rgb, SensorError};
    use sentry_core::motion::{AccelerationSample, CalibrationOffset};
    use sentry_core::telemetry::{FaultKind, TelemetryEventKind};

    use super::*;
    use crate::link::{REQUEST_QUEUE_DEPTH, RequestQueue};

    struct FixedSensor(AccelerationSample);

    impl AccelerationSource for FixedSensor {
        fn read_acceleration(&mut self) -> Result<AccelerationSample, SensorError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct Indicator(Option<Rgb>);

    impl IndicatorOutput for Indicator {
        fn set_color(&mut self, color: Rgb) {
            self.0 = Some(color);
        }
    }

    #[derive(Default)]
    struct Alert(Option<bool>);

    impl AlertOutput for Alert {
        fn set_level(&mut self, asserted: bool) {
            self.0 = Some(asserted);
        }
    }

    fn secs(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_secs(value))
    }

    fn control_loop() -> FirmwareControlLoop {
        ControlLoop::new(ControllerConfig::default(), CalibrationOffset::ZERO, secs(0))
            .expect("default config is valid")
    }

    fn outputs() -> Outputs<Indicator, Alert> {
        Outputs {
            indicator: Indicator::default(),
            alert: Alert::default(),
        }
    }

    #[test]
    fn poll_tick_queues_a_single_fetch() {
        let queue = RequestQueue::new();
        let mut link = LinkClient::new(queue.sender());
        let mut control = control_loop();
        let mut outputs = outputs();
        let mut sensor = FixedSensor(AccelerationSample::new(0.0, 0.0, 9.81));

        assert_eq!(
            service_due(&mut control, secs(30), &mut sensor, &mut outputs, &mut link),
            1
        );
        assert_eq!(queue.try_receive(), Ok(LinkRequest::FetchState));

        // Still waiting on the first answer: the next poll is skipped.
        service_due(&mut control, secs(60), &mut sensor, &mut outputs, &mut link);
        assert!(queue.is_empty());
        assert!(link.fetch_pending());
    }

    #[test]
    fn fetch_reply_arms_and_motion_is_notified() {
        let queue = RequestQueue::new();
        let mut link = LinkClient::new(queue.sender());
        let mut control = control_loop();
        let mut outputs = outputs();
        let mut sensor = FixedSensor(AccelerationSample::new(3.0, 0.0, 9.81));

        service_due(&mut control, secs(30), &mut sensor, &mut outputs, &mut link);
        let _ = queue.try_receive();
        apply_reply(
            &mut control,
            LinkReply::Fetched(Ok(1)),
            secs(31),
            &mut outputs,
            &mut link,
        );
        assert_eq!(control.state(), SystemState::Armed);
        assert_eq!(outputs.indicator.0, Some(Rgb::GREEN));

        service_due(&mut control, secs(32), &mut sensor, &mut outputs, &mut link);
        assert_eq!(outputs.alert.0, Some(true));
        assert_eq!(queue.try_receive(), Ok(LinkRequest::NotifyMotion));

        apply_reply(
            &mut control,
            LinkReply::Notified(Err(NotifyError::Status(503))),
            secs(32),
            &mut outputs,
            &mut link,
        );
        assert_eq!(
            control.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::Fault(FaultKind::RemoteNotify(
                NotifyError::Status(503)
            )))
        );
    }

    #[test]
    fn full_request_queue_records_busy_notifier() {
        let queue = RequestQueue::new();
        let mut link = LinkClient::new(queue.sender());
        let mut control = control_loop();
        let mut outputs = outputs();
        let mut sensor = FixedSensor(AccelerationSample::new(0.0, 5.0, 9.81));

        apply_reply(
            &mut control,
            LinkReply::Fetched(Ok(1)),
            secs(1),
            &mut outputs,
            &mut link,
        );
        for _ in 0..REQUEST_QUEUE_DEPTH {
            let _ = link.send_notify();
        }

        service_due(&mut control, secs(2), &mut sensor, &mut outputs, &mut link);
        assert_eq!(
            control.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::Fault(FaultKind::RemoteNotify(
                NotifyError::Busy
            )))
        );
    }

    #[test]
    fn slow_link_still_delivers_remote_disarm() {
        let queue = RequestQueue::new();
        let mut link = LinkClient::new(queue.sender());
        let mut control = control_loop();
        let mut outputs = outputs();
        let mut sensor = FixedSensor(AccelerationSample::new(4.0, 0.0, 9.81));

        apply_reply(
            &mut control,
            LinkReply::Fetched(Ok(1)),
            secs(0),
            &mut outputs,
            &mut link,
        );

        // Motion every second, but the co-processor needs two seconds per
        // exchange and the remote now says disarm.
        let mut disarmed_at = None;
        for second in 1..=120 {
            service_due(&mut control, secs(second), &mut sensor, &mut outputs, &mut link);
            if second % 2 == 0
                && let Ok(request) = queue.try_receive()
            {
                let reply = match request {
                    LinkRequest::FetchState => LinkReply::Fetched(Ok(0)),
                    LinkRequest::NotifyMotion => LinkReply::Notified(Ok(())),
                };
                apply_reply(&mut control, reply, secs(second), &mut outputs, &mut link);
            }
            if control.state() == SystemState::Disarmed {
                disarmed_at = Some(second);
                break;
            }
        }

        let disarmed_at = disarmed_at.expect("remote disarm was never applied");
        assert!(disarmed_at < 60, "disarmed late, at {disarmed_at}s");
        assert!(!control.motion_checks_running());
        assert_eq!(outputs.alert.0, Some(false));
    }

    #[test]
    fn failed_fetch_reply_keeps_state() {
        let queue = RequestQueue::new();
        let mut link = LinkClient::new(queue.sender());
        let mut control = control_loop();
        let mut outputs = outputs();

        apply_reply(
            &mut control,
            LinkReply::Fetched(Err(FetchError::Timeout)),
            secs(35),
            &mut outputs,
            &mut link,
        );
        assert_eq!(control.state(), SystemState::Disarmed);
        assert_eq!(outputs.indicator.0, None);
    }
}
