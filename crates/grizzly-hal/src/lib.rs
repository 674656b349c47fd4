//! `grizzly-hal` – Actuator-side building blocks
//!
//! Small, hardware-agnostic pieces that sit between the safety kernel and the
//! motor drivers.
//!
//! # Modules
//!
//! - [`rate_limiter`] – [`RateLimiter`][rate_limiter::RateLimiter]: bounds the
//!   rate of change of one wheel's commanded speed.
//! - [`motors_monitor`] – [`MotorControllerMonitor`][motors_monitor::MotorControllerMonitor]:
//!   the boolean motor-driver health contract, with
//!   [`MotorStatusWatch`][motors_monitor::MotorStatusWatch] as the
//!   staleness-based implementation.

pub mod motors_monitor;
pub mod rate_limiter;

pub use motors_monitor::{MotorControllerMonitor, MotorStatusWatch};
pub use rate_limiter::RateLimiter;
