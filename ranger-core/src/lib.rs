#![no_std]

// Shared logic for the handheld ultrasonic ranger.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware is reached only through the capability traits
// defined next to the components that use them.

pub mod app;
pub mod battery;
pub mod display;
pub mod echo;
pub mod input;
pub mod ranging;
pub mod settings;
pub mod telemetry;
pub mod time;

pub use app::{LoopStatus, MainLoop, RangerConfig};
pub use time::Instant;
