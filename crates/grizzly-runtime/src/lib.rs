//! `grizzly-runtime` – The Motion Safety Node
//!
//! The execution engine that keeps the safety state machine fed and its
//! outputs flowing to the vehicle.
//!
//! # Modules
//!
//! - [`node`] – [`MotionSafetyNode`][node::MotionSafetyNode]:
//!   subscribes to the inbound vehicle streams, runs the fixed-period
//!   watchdog cycle and the diagnostics poll, and serialises all of it
//!   through a single [`Dispatcher`][node::Dispatcher] on one Tokio task.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]:
//!   initialises the global `tracing` subscriber with an optional OTLP span
//!   exporter.  Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export
//!   to Jaeger, Grafana Tempo, or any OTLP-compatible collector.

pub mod node;
pub mod telemetry;

pub use node::{Dispatcher, MotionSafetyNode};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
