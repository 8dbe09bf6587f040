//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The control loop records every observable decision here (transitions,
//! ignored commands, detections, swallowed faults) so the firmware log
//! helpers and the emulator can surface them without the core doing any I/O.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::activation::{SystemState, Transition};
use crate::io::{FetchError, NotifyError, SensorError};
use crate::motion::{AccelerationSample, CalibrationOffset};

/// Identifier assigned to each telemetry record.
pub type EventId = u32;

/// Default number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 32;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// I/O failure swallowed at a task boundary.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultKind {
    SensorRead(SensorError),
    RemoteFetch(FetchError),
    RemoteNotify(NotifyError),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::SensorRead(err) => write!(f, "sensor-read ({err})"),
            FaultKind::RemoteFetch(err) => write!(f, "remote-fetch ({err})"),
            FaultKind::RemoteNotify(err) => write!(f, "remote-notify ({err})"),
        }
    }
}

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryEventKind {
    Calibrated(CalibrationOffset),
    Armed {
        elapsed_since_previous: Option<Duration>,
    },
    Disarmed {
        elapsed_since_previous: Option<Duration>,
    },
    /// Remote value that did not change the state.
    CommandIgnored { value: i32, state: SystemState },
    /// Offset-corrected acceleration that crossed the threshold.
    MotionDetected(AccelerationSample),
    NotifySent,
    Fault(FaultKind),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::Calibrated(offset) => write!(f, "calibrated {offset}"),
            TelemetryEventKind::Armed { .. } => f.write_str("armed"),
            TelemetryEventKind::Disarmed { .. } => f.write_str("disarmed"),
            TelemetryEventKind::CommandIgnored { value, state } => {
                write!(f, "command-ignored value={value} state={state}")
            }
            TelemetryEventKind::MotionDetected(sample) => write!(f, "motion {sample}"),
            TelemetryEventKind::NotifySent => f.write_str("notify-sent"),
            TelemetryEventKind::Fault(kind) => write!(f, "fault {kind}"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a state transition along with the time spent in the previous state.
    pub fn record_transition(&mut self, transition: Transition, timestamp: TInstant) -> EventId {
        let elapsed_since_previous = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        let event = match transition.to {
            SystemState::Armed => TelemetryEventKind::Armed {
                elapsed_since_previous,
            },
            SystemState::Disarmed => TelemetryEventKind::Disarmed {
                elapsed_since_previous,
            },
        };
        self.record(event, timestamp)
    }

    /// Records a swallowed I/O failure.
    pub fn record_fault(&mut self, fault: FaultKind, timestamp: TInstant) -> EventId {
        self.record(TelemetryEventKind::Fault(fault), timestamp)
    }

    /// Records an arbitrary telemetry event.
    pub fn record(&mut self, event: TelemetryEventKind, timestamp: TInstant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
