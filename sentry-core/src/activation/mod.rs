//! Armed/disarmed state machine driven by the remote command value.
//!
//! The machine owns the only copy of [`SystemState`]. Transitions happen only
//! when the remote value asks for the opposite state; every other value is
//! reported back as [`ApplyOutcome::Ignored`] and leaves outputs untouched.

use core::fmt;

use crate::io::{AlertOutput, IndicatorOutput, Rgb};
use crate::motion::MotionClassification;

/// Operating mode of the controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum SystemState {
    Armed,
    #[default]
    Disarmed,
}

impl SystemState {
    #[must_use]
    pub const fn is_armed(self) -> bool {
        matches!(self, Self::Armed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Armed => "armed",
            Self::Disarmed => "disarmed",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remote field value that requests arming.
pub const ARM_COMMAND: i32 = 1;
/// Remote field value that requests disarming.
pub const DISARM_COMMAND: i32 = 0;

/// Observable state change.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: SystemState,
    pub to: SystemState,
}

impl Transition {
    #[must_use]
    pub const fn new(from: SystemState, to: SystemState) -> Self {
        Self { from, to }
    }
}

/// Result of feeding one remote value to the machine.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ApplyOutcome {
    Transitioned(Transition),
    /// The value matched the current state or was outside `{0, 1}`.
    Ignored { value: i32, state: SystemState },
}

impl ApplyOutcome {
    #[must_use]
    pub const fn transition(self) -> Option<Transition> {
        match self {
            Self::Transitioned(transition) => Some(transition),
            Self::Ignored { .. } => None,
        }
    }
}

/// Start/stop handle for the periodic motion-check task.
pub trait MotionCheckControl {
    fn start(&mut self);
    fn stop(&mut self);
}

/// Colours shown by the status indicator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IndicatorPalette {
    pub armed: Rgb,
    pub disarmed: Rgb,
}

impl IndicatorPalette {
    #[must_use]
    pub const fn new(armed: Rgb, disarmed: Rgb) -> Self {
        Self { armed, disarmed }
    }
}

impl Default for IndicatorPalette {
    fn default() -> Self {
        Self::new(Rgb::GREEN, Rgb::OFF)
    }
}

/// What the physical outputs should show; never stored, always derived.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IndicatorState {
    pub color: Rgb,
    pub alert: bool,
}

impl IndicatorState {
    /// Maps the system state and, while armed, the latest classification to outputs.
    #[must_use]
    pub fn derive(
        state: SystemState,
        latest: Option<MotionClassification>,
        palette: &IndicatorPalette,
    ) -> Self {
        match state {
            SystemState::Armed => Self {
                color: palette.armed,
                alert: latest.is_some_and(MotionClassification::is_motion),
            },
            SystemState::Disarmed => Self {
                color: palette.disarmed,
                alert: false,
            },
        }
    }

    /// Writes the state to the outputs.
    pub fn drive<I, A>(&self, indicator: &mut I, alert: &mut A)
    where
        I: IndicatorOutput + ?Sized,
        A: AlertOutput + ?Sized,
    {
        indicator.set_color(self.color);
        alert.set_level(self.alert);
    }
}

/// Owner of the process-wide [`SystemState`].
#[derive(Clone, Debug)]
pub struct ActivationStateMachine {
    state: SystemState,
    palette: IndicatorPalette,
}

impl ActivationStateMachine {
    /// Creates a disarmed machine.
    #[must_use]
    pub const fn new(palette: IndicatorPalette) -> Self {
        Self {
            state: SystemState::Disarmed,
            palette,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SystemState {
        self.state
    }

    #[must_use]
    pub const fn palette(&self) -> &IndicatorPalette {
        &self.palette
    }

    /// Feeds one remote value and performs the side effects of any transition.
    ///
    /// Arming shows the armed colour and starts motion checks. Disarming turns
    /// the indicator off, clears the alert output, and stops motion checks.
    pub fn apply<I, A, M>(
        &mut self,
        value: i32,
        indicator: &mut I,
        alert: &mut A,
        motion_checks: &mut M,
    ) -> ApplyOutcome
    where
        I: IndicatorOutput + ?Sized,
        A: AlertOutput + ?Sized,
        M: MotionCheckControl + ?Sized,
    {
        let target = match (value, self.state) {
            (ARM_COMMAND, SystemState::Disarmed) => SystemState::Armed,
            (DISARM_COMMAND, SystemState::Armed) => SystemState::Disarmed,
            _ => {
                return ApplyOutcome::Ignored {
                    value,
                    state: self.state,
                };
            }
        };

        let transition = Transition::new(self.state, target);
        self.state = target;

        match target {
            SystemState::Armed => {
                indicator.set_color(self.palette.armed);
                motion_checks.start();
            }
            SystemState::Disarmed => {
                IndicatorState::derive(target, None, &self.palette).drive(indicator, alert);
                motion_checks.stop();
            }
        }

        ApplyOutcome::Transitioned(transition)
    }
}

impl Default for ActivationStateMachine {
    fn default() -> Self {
        Self::new(IndicatorPalette::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicator_derivation_table() {
        let palette = IndicatorPalette::default();

        let disarmed = IndicatorState::derive(
            SystemState::Disarmed,
            Some(MotionClassification::Motion),
            &palette,
        );
        assert_eq!(disarmed, IndicatorState { color: Rgb::OFF, alert: false });

        let armed_idle = IndicatorState::derive(SystemState::Armed, None, &palette);
        assert_eq!(armed_idle, IndicatorState { color: Rgb::GREEN, alert: false });

        let armed_still = IndicatorState::derive(
            SystemState::Armed,
            Some(MotionClassification::NoMotion),
            &palette,
        );
        assert!(!armed_still.alert);

        let armed_motion = IndicatorState::derive(
            SystemState::Armed,
            Some(MotionClassification::Motion),
            &palette,
        );
        assert_eq!(armed_motion, IndicatorState { color: Rgb::GREEN, alert: true });
    }
}
