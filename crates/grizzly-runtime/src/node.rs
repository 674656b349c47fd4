//! [`MotionSafetyNode`] – wires [`MotionSafety`] to the event bus.
//!
//! All state lives in a [`Dispatcher`], which is plain synchronous code taking
//! the current time as an argument.  The node owns the bus subscriptions and
//! a single Tokio task that serialises every inbound event, every watchdog
//! cycle and every diagnostics poll through that dispatcher, so no locking is
//! needed.
//!
//! # Streams
//!
//! | Inbound | Handling |
//! |---|---|
//! | `cmd_drive` | counted, validated, turned into `safe_cmd_drive` immediately |
//! | `encoders` | validated, stored as the newest feedback |
//! | `mcu/status` | counted, stored as the newest controller status |
//! | `motors/status` | recorded per wheel for the motor driver health check |
//! | `estop` | a pressed estop is echoed to `mcu/estop` immediately |
//!
//! Every `watchdog_period` the state machine runs one cycle and publishes
//! `mcu/ambience` and `mcu/estop`.  Every `diagnostic_period` a batch of
//! health snapshots goes out on `diagnostics`.
//!
//! # Example
//!
//! ```rust,no_run
//! use grizzly_kernel::MotionSafetyConfig;
//! use grizzly_middleware::EventBus;
//! use grizzly_runtime::node::MotionSafetyNode;
//!
//! # async fn run() -> Result<(), grizzly_types::MotionError> {
//! let bus = EventBus::default();
//! let node = MotionSafetyNode::new(&MotionSafetyConfig::default(), bus.clone())?;
//! node.run(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use grizzly_hal::MotorStatusWatch;
use grizzly_kernel::{CycleOutputs, FrequencyMonitor, MotionSafety, MotionSafetyConfig};
use grizzly_middleware::{EventBus, Topic, TopicReceiver};
use grizzly_types::{DiagnosticStatus, Event, EventPayload, MotionError, Timestamp};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// `source` stamped on every event this node publishes.
pub const SOURCE: &str = "grizzly-runtime::motion_safety";

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Routes events into [`MotionSafety`] and publishes what comes back.
pub struct Dispatcher {
    safety: MotionSafety,
    motors: MotorStatusWatch,
    mcu_status_rate: FrequencyMonitor,
    cmd_drive_rate: FrequencyMonitor,
    bus: EventBus,
}

impl Dispatcher {
    /// Build a dispatcher publishing onto `bus`.  Frequency windows start at
    /// `now`.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: &MotionSafetyConfig, bus: EventBus, now: Timestamp) -> Result<Self, MotionError> {
        Ok(Self {
            safety: MotionSafety::new(config)?,
            motors: MotorStatusWatch::new(config.motors_timeout()),
            mcu_status_rate: FrequencyMonitor::new(
                "MCU status",
                config.expected_mcu_status_frequency,
                config.expected_mcu_status_frequency,
                now,
            ),
            cmd_drive_rate: FrequencyMonitor::new(
                "Drive command",
                config.min_cmd_drive_frequency,
                config.max_cmd_drive_frequency,
                now,
            ),
            bus,
        })
    }

    pub fn safety(&self) -> &MotionSafety {
        &self.safety
    }

    /// Handle one inbound event received on `topic` at `now`.
    ///
    /// Drive vectors carrying NaN or infinite speeds are dropped with a
    /// warning; so are payloads that do not belong on `topic`.
    ///
    /// # Errors
    ///
    /// Propagates bus publication errors.
    pub fn handle(&mut self, topic: Topic, event: Event, now: Timestamp) -> Result<(), MotionError> {
        match (topic, event.payload) {
            (Topic::CmdDrive, EventPayload::Drive(command)) => {
                self.cmd_drive_rate.tick();
                if let Err(e) = command.validate(topic.name()) {
                    warn!(error = %e, source = %event.source, "dropping drive command");
                    return Ok(());
                }
                let safe = self.safety.on_drive_command(&command, now);
                self.publish(Topic::SafeCmdDrive, now, EventPayload::Drive(safe))?;
            }
            (Topic::Encoders, EventPayload::Drive(feedback)) => {
                if let Err(e) = feedback.validate(topic.name()) {
                    warn!(error = %e, source = %event.source, "dropping encoder feedback");
                    return Ok(());
                }
                self.safety.on_encoders(feedback, now);
            }
            (Topic::McuStatus, EventPayload::ControllerStatus(status)) => {
                self.mcu_status_rate.tick();
                self.safety.on_controller_status(status, now);
            }
            (Topic::MotorStatus, EventPayload::MotorStatus(report)) => {
                self.motors.record(&report);
            }
            (Topic::UserEstop, EventPayload::Estop(engaged)) => {
                if self.safety.on_user_estop(engaged, now) {
                    self.publish(Topic::McuEstop, now, EventPayload::Estop(true))?;
                }
            }
            (topic, payload) => {
                warn!(%topic, ?payload, source = %event.source, "unexpected payload, ignored");
            }
        }
        Ok(())
    }

    /// Run one watchdog cycle and publish ambience and estop.
    ///
    /// # Errors
    ///
    /// Propagates bus publication errors.
    pub fn run_cycle(&mut self, now: Timestamp) -> Result<CycleOutputs, MotionError> {
        let outputs = self.safety.on_cycle(now, &self.motors);
        self.publish(Topic::Ambience, now, EventPayload::Ambience(outputs.ambience))?;
        self.publish(Topic::McuEstop, now, EventPayload::Estop(outputs.estop))?;
        Ok(outputs)
    }

    /// Collect and publish one round of health snapshots.
    ///
    /// # Errors
    ///
    /// Propagates bus publication errors.
    pub fn publish_diagnostics(&mut self, now: Timestamp) -> Result<Vec<DiagnosticStatus>, MotionError> {
        let statuses = vec![
            self.safety.diagnostic(now),
            self.safety.encoders().diagnostic(now),
            self.motors.diagnostic(now),
            self.mcu_status_rate.diagnostic(now),
            self.cmd_drive_rate.diagnostic(now),
        ];
        debug!(count = statuses.len(), "publishing diagnostics");
        self.publish(Topic::Diagnostics, now, EventPayload::Diagnostics(statuses.clone()))?;
        Ok(statuses)
    }

    fn publish(&self, topic: Topic, now: Timestamp, payload: EventPayload) -> Result<usize, MotionError> {
        self.bus.publish_to(topic, Event::new(now, SOURCE, payload))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// Long-running safety node: one task, one dispatcher, five subscriptions.
pub struct MotionSafetyNode {
    dispatcher: Dispatcher,
    watchdog_period: Duration,
    diagnostic_period: Duration,
    cmd_drive: TopicReceiver,
    encoders: TopicReceiver,
    mcu_status: TopicReceiver,
    motor_status: TopicReceiver,
    user_estop: TopicReceiver,
}

impl MotionSafetyNode {
    /// Subscribe to every inbound topic on `bus`.  Events published after this
    /// returns are buffered until [`MotionSafetyNode::run`] drains them.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidConfig`] for a bad configuration, or
    /// [`MotionError::Channel`] if a subscription cannot be made.
    pub fn new(config: &MotionSafetyConfig, bus: EventBus) -> Result<Self, MotionError> {
        Ok(Self {
            watchdog_period: period(config.watchdog_period, "watchdog_period")?,
            diagnostic_period: period(config.diagnostic_period, "diagnostic_period")?,
            cmd_drive: bus.subscribe_to(Topic::CmdDrive)?,
            encoders: bus.subscribe_to(Topic::Encoders)?,
            mcu_status: bus.subscribe_to(Topic::McuStatus)?,
            motor_status: bus.subscribe_to(Topic::MotorStatus)?,
            user_estop: bus.subscribe_to(Topic::UserEstop)?,
            dispatcher: Dispatcher::new(config, bus, Utc::now())?,
        })
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns the first bus publication error.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<(), MotionError> {
        let mut cycle = tokio::time::interval(self.watchdog_period);
        cycle.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut diagnostics = tokio::time::interval(self.diagnostic_period);
        diagnostics.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            watchdog_period = ?self.watchdog_period,
            diagnostic_period = ?self.diagnostic_period,
            "motion safety node running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(state = %self.dispatcher.safety().state(), "motion safety node stopping");
                    return Ok(());
                }
                _ = cycle.tick() => {
                    self.dispatcher.run_cycle(Utc::now())?;
                }
                _ = diagnostics.tick() => {
                    self.dispatcher.publish_diagnostics(Utc::now())?;
                }
                Some(event) = self.cmd_drive.recv() => {
                    self.dispatcher.handle(Topic::CmdDrive, event, Utc::now())?;
                }
                Some(event) = self.encoders.recv() => {
                    self.dispatcher.handle(Topic::Encoders, event, Utc::now())?;
                }
                Some(event) = self.mcu_status.recv() => {
                    self.dispatcher.handle(Topic::McuStatus, event, Utc::now())?;
                }
                Some(event) = self.motor_status.recv() => {
                    self.dispatcher.handle(Topic::MotorStatus, event, Utc::now())?;
                }
                Some(event) = self.user_estop.recv() => {
                    self.dispatcher.handle(Topic::UserEstop, event, Utc::now())?;
                }
            }
        }
    }
}

fn period(secs: f64, field: &str) -> Result<Duration, MotionError> {
    Duration::try_from_secs_f64(secs).map_err(|e| MotionError::InvalidConfig {
        field: field.to_string(),
        reason: e.to_string(),
    })
}
