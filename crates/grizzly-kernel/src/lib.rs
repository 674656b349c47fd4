//! `grizzly-kernel` – Motion Safety
//!
//! The decision-making core of the Grizzly safety supervisor.  It owns no
//! I/O; callers feed it observations and a clock and publish what it returns.
//!
//! # Modules
//!
//! - [`config`] – [`MotionSafetyConfig`][config::MotionSafetyConfig]:
//!   tunables with defaults and validation.
//! - [`latest`] – [`LatestObservation`][latest::LatestObservation]:
//!   single-slot cell holding the newest value of an inbound stream.
//! - [`encoders_monitor`] – [`EncodersMonitor`][encoders_monitor::EncodersMonitor]:
//!   encoder liveness plus the debounced, sticky failed-encoder detector.
//! - [`motion_safety`] – [`MotionSafety`][motion_safety::MotionSafety]:
//!   the five-state vehicle safety state machine, its pure transition
//!   function [`decide`][motion_safety::decide], and the rate-limited drive
//!   pass-through.
//! - [`topic_frequency`] – [`FrequencyMonitor`][topic_frequency::FrequencyMonitor]:
//!   arrival-rate diagnostics for the controller status and drive command
//!   streams.

pub mod config;
pub mod encoders_monitor;
pub mod latest;
pub mod motion_safety;
pub mod topic_frequency;

pub use config::MotionSafetyConfig;
pub use encoders_monitor::EncodersMonitor;
pub use latest::{LatestObservation, Observed};
pub use motion_safety::{CycleInputs, CycleOutputs, MotionSafety, SafetyState, decide};
pub use topic_frequency::FrequencyMonitor;
