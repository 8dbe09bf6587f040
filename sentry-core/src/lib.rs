#![no_std]

// Shared logic for the motion sentry: calibration, motion evaluation, the
// armed/disarmed state machine, and the scheduler that ties them together.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library and reaching hardware only through the traits in `io`.

pub mod activation;
pub mod calibration;
pub mod config;
pub mod io;
pub mod link;
pub mod motion;
pub mod scheduler;
pub mod telemetry;
