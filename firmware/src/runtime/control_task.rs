use embassy_futures::select::{Either, select};
use embassy_time::{Instant, Timer};

use super::{BoardOutputs, Sensor};
use crate::clock::FirmwareInstant;
use crate::control::{FirmwareControlLoop, apply_reply, service_due};
use crate::link::{LinkClient, ReplyReceiver};
use crate::telemetry::TelemetryLog;

#[embassy_executor::task]
pub async fn run(
    mut control: FirmwareControlLoop,
    mut sensor: Sensor,
    mut outputs: BoardOutputs,
    mut link: LinkClient<'static>,
    replies: ReplyReceiver<'static>,
) -> ! {
    let mut log = TelemetryLog::new();
    log.flush(control.telemetry());

    loop {
        let deadline = control
            .next_deadline()
            .map_or(Instant::MAX, FirmwareInstant::into_embassy);

        match select(Timer::at(deadline), replies.receive()).await {
            Either::First(()) => {
                service_due(
                    &mut control,
                    FirmwareInstant::now(),
                    &mut sensor,
                    &mut outputs,
                    &mut link,
                );
            }
            Either::Second(reply) => {
                apply_reply(
                    &mut control,
                    reply,
                    FirmwareInstant::now(),
                    &mut outputs,
                    &mut link,
                );
            }
        }

        log.flush(control.telemetry());
    }
}
