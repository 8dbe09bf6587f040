//! Logging helpers that mirror the control loop's telemetry ring.
//!
//! `sentry-core` never logs; it appends to a [`TelemetryRecorder`]. After each
//! tick the control task hands the recorder to [`TelemetryLog::flush`], which
//! emits every record it has not seen yet through defmt on the device and
//! through stdout on the host.

use core::time::Duration;

use sentry_core::calibration::CalibrationError;
use sentry_core::io::SensorError;
use sentry_core::link::LinkRequest;
use sentry_core::telemetry::{
    EventId, FaultKind, TelemetryEventKind, TelemetryRecord, TelemetryRecorder,
};

use crate::clock::FirmwareInstant;

/// Tracks which telemetry records have already been logged.
pub struct TelemetryLog {
    next_id: EventId,
}

impl TelemetryLog {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Logs records appended since the previous flush. Returns how many were emitted.
    pub fn flush<const CAPACITY: usize>(
        &mut self,
        recorder: &TelemetryRecorder<FirmwareInstant, CAPACITY>,
    ) -> usize {
        let mut emitted = 0;
        for record in recorder.oldest_first() {
            if record.id >= self.next_id {
                emit_record(record);
                emitted += 1;
            }
        }

        if let Some(latest) = recorder.latest() {
            self.next_id = latest.id.wrapping_add(1);
        }
        emitted
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

const fn event_label(event: &TelemetryEventKind) -> &'static str {
    match event {
        TelemetryEventKind::Calibrated(_) => "calibrated",
        TelemetryEventKind::Armed { .. } => "armed",
        TelemetryEventKind::Disarmed { .. } => "disarmed",
        TelemetryEventKind::CommandIgnored { .. } => "ignored",
        TelemetryEventKind::MotionDetected(_) => "motion",
        TelemetryEventKind::NotifySent => "notify-sent",
        TelemetryEventKind::Fault(_) => "fault",
    }
}

const fn fault_label(fault: FaultKind) -> &'static str {
    match fault {
        FaultKind::SensorRead(_) => "sensor-read",
        FaultKind::RemoteFetch(_) => "remote-fetch",
        FaultKind::RemoteNotify(_) => "remote-notify",
    }
}

fn elapsed_micros(elapsed: Option<Duration>) -> Option<u64> {
    elapsed.map(|value| u64::try_from(value.as_micros()).unwrap_or(u64::MAX))
}

#[cfg(target_os = "none")]
fn emit_record(record: &TelemetryRecord<FirmwareInstant>) {
    let t = record.timestamp.as_micros();
    match record.event {
        TelemetryEventKind::Calibrated(offset) => defmt::info!(
            "calibration: offset x={} y={} z={} t={}us",
            offset.x(),
            offset.y(),
            offset.z(),
            t
        ),
        TelemetryEventKind::Armed {
            elapsed_since_previous,
        }
        | TelemetryEventKind::Disarmed {
            elapsed_since_previous,
        } => match elapsed_micros(elapsed_since_previous) {
            Some(delta) => defmt::info!(
                "activation: {} t={}us Δ={}us",
                event_label(&record.event),
                t,
                delta
            ),
            None => defmt::info!("activation: {} t={}us", event_label(&record.event), t),
        },
        TelemetryEventKind::CommandIgnored { value, state } => defmt::debug!(
            "activation: ignored value={} state={} t={}us",
            value,
            state.as_str(),
            t
        ),
        TelemetryEventKind::MotionDetected(sample) => defmt::warn!(
            "motion: detected x={} y={} z={} t={}us",
            sample.x,
            sample.y,
            sample.z,
            t
        ),
        TelemetryEventKind::NotifySent => defmt::info!("link: notify sent t={}us", t),
        TelemetryEventKind::Fault(fault) => defmt::warn!(
            "{}: fault {} ({}) t={}us",
            fault_subsystem(fault),
            fault_label(fault),
            defmt::Display2Format(&fault),
            t
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_record(record: &TelemetryRecord<FirmwareInstant>) {
    let t = record.timestamp.as_micros();
    match record.event {
        TelemetryEventKind::Calibrated(offset) => println!("calibration: offset {offset} t={t}us"),
        TelemetryEventKind::Armed {
            elapsed_since_previous,
        }
        | TelemetryEventKind::Disarmed {
            elapsed_since_previous,
        } => match elapsed_micros(elapsed_since_previous) {
            Some(delta) => println!(
                "activation: {} t={t}us Δ={delta}us",
                event_label(&record.event)
            ),
            None => println!("activation: {} t={t}us", event_label(&record.event)),
        },
        TelemetryEventKind::Fault(fault) => println!(
            "{}: fault {} ({fault}) t={t}us",
            fault_subsystem(fault),
            fault_label(fault)
        ),
        event => println!("{}: {event} t={t}us", event_subsystem(&event)),
    }
}

const fn fault_subsystem(fault: FaultKind) -> &'static str {
    match fault {
        FaultKind::SensorRead(_) => "motion",
        FaultKind::RemoteFetch(_) | FaultKind::RemoteNotify(_) => "link",
    }
}

#[cfg(not(target_os = "none"))]
const fn event_subsystem(event: &TelemetryEventKind) -> &'static str {
    match event {
        TelemetryEventKind::Calibrated(_) => "calibration",
        TelemetryEventKind::Armed { .. }
        | TelemetryEventKind::Disarmed { .. }
        | TelemetryEventKind::CommandIgnored { .. } => "activation",
        TelemetryEventKind::MotionDetected(_) => "motion",
        TelemetryEventKind::Fault(fault) => fault_subsystem(*fault),
        TelemetryEventKind::NotifySent => "link",
    }
}

#[cfg(target_os = "none")]
pub fn log_calibration_started(samples: u16) {
    defmt::info!("calibration: sampling {} readings, keep the sensor still", samples);
}

#[cfg(not(target_os = "none"))]
pub fn log_calibration_started(samples: u16) {
    println!("calibration: sampling {samples} readings, keep the sensor still");
}

#[cfg(target_os = "none")]
pub fn log_calibration_failed(error: CalibrationError) {
    defmt::error!("calibration: {}", defmt::Display2Format(&error));
}

#[cfg(not(target_os = "none"))]
pub fn log_calibration_failed(error: CalibrationError) {
    println!("calibration: {error}");
}

#[cfg(target_os = "none")]
pub fn log_sensor_init_failed(error: SensorError) {
    defmt::error!("motion: accelerometer init failed ({})", defmt::Display2Format(&error));
}

#[cfg(not(target_os = "none"))]
pub fn log_sensor_init_failed(error: SensorError) {
    println!("motion: accelerometer init failed ({error})");
}

#[cfg(target_os = "none")]
pub fn log_link_dropped(request: LinkRequest, reason: &'static str) {
    defmt::warn!("link: {} dropped ({})", request.as_str(), reason);
}

#[cfg(not(target_os = "none"))]
pub fn log_link_dropped(request: LinkRequest, reason: &'static str) {
    println!("link: {} dropped ({reason})", request.as_str());
}

#[cfg(test)]
mod tests {
    use embassy_time::Instant;
    use sentry_core::activation::{SystemState, Transition};
    use sentry_core::io::FetchError;

    use super::*;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    #[test]
    fn flush_emits_each_record_once() {
        let mut recorder = TelemetryRecorder::<FirmwareInstant, 8>::new();
        let mut log = TelemetryLog::new();

        recorder.record_transition(
            Transition::new(SystemState::Disarmed, SystemState::Armed),
            micros(100),
        );
        recorder.record(TelemetryEventKind::NotifySent, micros(200));
        assert_eq!(log.flush(&recorder), 2);
        assert_eq!(log.flush(&recorder), 0);

        recorder.record_fault(FaultKind::RemoteFetch(FetchError::Timeout), micros(300));
        assert_eq!(log.flush(&recorder), 1);
    }

    #[test]
    fn flush_skips_records_evicted_from_the_ring() {
        let mut recorder = TelemetryRecorder::<FirmwareInstant, 2>::new();
        let mut log = TelemetryLog::new();

        for tick in 0..5 {
            recorder.record(TelemetryEventKind::NotifySent, micros(tick));
        }
        assert_eq!(log.flush(&recorder), 2);
    }

    #[test]
    fn labels_route_faults_to_their_subsystem() {
        let sensor = FaultKind::SensorRead(sentry_core::io::SensorError::Bus);
        let fetch = FaultKind::RemoteFetch(FetchError::NoData);

        assert_eq!(fault_label(sensor), "sensor-read");
        assert_eq!(fault_subsystem(sensor), "motion");
        assert_eq!(fault_subsystem(fetch), "link");
        assert_eq!(event_label(&TelemetryEventKind::NotifySent), "notify-sent");
    }

    #[test]
    fn elapsed_is_reported_in_micros() {
        assert_eq!(elapsed_micros(None), None);
        assert_eq!(
            elapsed_micros(Some(Duration::from_millis(30_000))),
            Some(30_000_000)
        );
    }
}
