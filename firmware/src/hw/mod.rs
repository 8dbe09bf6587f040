//! Board wiring: accelerometer, RGB indicator and alert LED.
//!
//! The LEDs are driven through plain push-pull outputs. Each RGB channel is
//! either fully on or off, lit when its component is at least half intensity.

pub mod accel;

use embedded_hal::digital::{OutputPin, PinState};
use sentry_core::io::{AlertOutput, IndicatorOutput, Rgb};

const CHANNEL_ON_LEVEL: u8 = 0x80;

fn channel_state(component: u8) -> PinState {
    PinState::from(component >= CHANNEL_ON_LEVEL)
}

/// Common-cathode RGB LED on three GPIOs.
pub struct RgbLed<P> {
    red: P,
    green: P,
    blue: P,
}

impl<P: OutputPin> RgbLed<P> {
    pub fn new(red: P, green: P, blue: P) -> Self {
        Self { red, green, blue }
    }
}

impl<P: OutputPin> IndicatorOutput for RgbLed<P> {
    fn set_color(&mut self, color: Rgb) {
        // GPIO writes on this part cannot fail.
        let _ = self.red.set_state(channel_state(color.red));
        let _ = self.green.set_state(channel_state(color.green));
        let _ = self.blue.set_state(channel_state(color.blue));
    }
}

/// Active-high alert LED.
pub struct AlertLed<P> {
    pin: P,
}

impl<P: OutputPin> AlertLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin> AlertOutput for AlertLed<P> {
    fn set_level(&mut self, on: bool) {
        let _ = self.pin.set_state(PinState::from(on));
    }
}
