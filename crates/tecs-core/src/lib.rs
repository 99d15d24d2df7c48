//! # TECS Core
//!
//! Total energy control system (TECS) for fixed-wing longitudinal guidance,
//! designed for `no_std` environments. This crate contains only the code that
//! needs to run on flight controllers:
//! - The total energy controller (throttle + pitch setpoint generation)
//! - Jerk-limited trajectory generation for altitude and height rate
//! - First-order filtering for noisy energy-rate signals
//! - Telemetry quantization for the downlink
//!
//! Throttle regulates the total specific energy rate; pitch regulates how the
//! energy is split between airspeed and height. Sensor dropouts, time gaps
//! and saturation are all handled as controller modes, never as errors.
//!
//! # Features
//! - `std`: Enable standard library support (default, used for testing)
//! - Disable default features for bare metal embedded use

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod controller;
pub mod filter;
pub mod params;
pub mod telemetry;
pub mod trajectory;

// Re-export core types
pub use controller::{TecsController, TecsInput, TecsMode, TecsStatus};
pub use filter::FirstOrderLpf;
pub use params::{TecsConfig, DT_DEFAULT, DT_MAX, DT_MIN, ONE_G};
pub use telemetry::{StatusBatcher, StatusFrame};
pub use trajectory::{compute_max_speed_from_distance, TrajectoryGenerator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
