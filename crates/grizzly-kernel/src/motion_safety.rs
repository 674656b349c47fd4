//! [`MotionSafety`] – the vehicle safety state machine.
//!
//! Sits between user drive commands and the motor drivers.  Motion is only
//! passed through once the vehicle has announced itself (lights and beeper)
//! for the configured starting period, and is cut off again on loss of
//! commands, unhealthy encoders or motor drivers, a user estop, or a latched
//! hardware fault.
//!
//! The transition policy lives in the pure function [`decide`]; the
//! [`MotionSafety`] struct owns the observations that feed it and applies its
//! result once per cycle.
//!
//! ```text
//!            command            starting period
//!  Stopped ───────────► Starting ──────────────► Moving
//!     ▲                    │                       │
//!     │ lapse        unhealthy/estop          unhealthy
//!     │                    ▼                       │
//!     └──────────── PendingStopped ◄───────────────┘
//!   (still, quiet, estop latched)
//!
//!  any state ── precharge stuck / encoder failed ──► Fault (terminal)
//! ```

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use grizzly_hal::{MotorControllerMonitor, RateLimiter};
use grizzly_types::{
    Ambience, ControllerStatus, DiagnosticLevel, DiagnosticStatus, DriveVector, MotionError,
    Timestamp, WheelIndex, secs_from_delta,
};
use tracing::{error, info};

use crate::config::MotionSafetyConfig;
use crate::encoders_monitor::EncodersMonitor;
use crate::latest::LatestObservation;

/// A movement command this recent counts as an active request to move.
const MOVEMENT_REQUEST_WINDOW_MS: i64 = 100;
/// Moving without a movement command for this long stops the vehicle.
const MOVING_COMMAND_TIMEOUT_MS: i64 = 3_000;
/// Commands must have been quiet this long before leaving PendingStopped.
const PENDING_STOP_QUIET_MS: i64 = 1_000;
/// Precharge held continuously for longer than this is a hardware fault.
const PRECHARGE_LIMIT_MS: i64 = 4_000;

pub const PRECHARGE_FAULT: &str = "Precharge persisted for more than four seconds.";
pub const ENCODER_FAULT: &str = "Encoder failure detected.";

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// Safety state of the vehicle.  Exactly one is current at any time.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SafetyState {
    /// Zero output, waiting for a movement command.
    #[default]
    Stopped,
    /// Warning lights and beeper active; output still zero until `deadline`.
    Starting { deadline: Timestamp },
    /// Rate-limited commands are passed through.
    Moving,
    /// Estop asserted until the vehicle is still, quiet, and reset.
    PendingStopped,
    /// Latched hardware fault.  There is no transition out; recovery requires
    /// a process restart.
    Fault { reason: String },
}

impl SafetyState {
    pub fn name(&self) -> &'static str {
        match self {
            SafetyState::Stopped => "Stopped",
            SafetyState::Starting { .. } => "Starting",
            SafetyState::Moving => "Moving",
            SafetyState::PendingStopped => "PendingStopped",
            SafetyState::Fault { .. } => "Fault",
        }
    }

    /// Diagnostic severity of being in this state.
    pub fn level(&self) -> DiagnosticLevel {
        match self {
            SafetyState::PendingStopped => DiagnosticLevel::Warn,
            SafetyState::Fault { .. } => DiagnosticLevel::Error,
            _ => DiagnosticLevel::Ok,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, SafetyState::Fault { .. })
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transition policy
// ────────────────────────────────────────────────────────────────────────────

/// Snapshot of everything the transition policy looks at in one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleInputs {
    pub now: Timestamp,
    pub encoders_ok: bool,
    pub motors_ok: bool,
    /// Hardware estop latched on the controller.
    pub estopped: bool,
    /// Encoders report wheel motion.
    pub moving: bool,
    /// Timestamp of the newest non-stationary drive command, if any.
    pub last_movement_command: Option<Timestamp>,
    pub starting_duration: TimeDelta,
}

impl CycleInputs {
    /// A movement command arrived less than `window` ago.
    pub fn commanded_within(&self, window: TimeDelta) -> bool {
        self.last_movement_command
            .is_some_and(|stamp| self.now - stamp < window)
    }

    /// No movement command for more than `window`.  A vehicle that was never
    /// commanded has always lapsed.
    pub fn command_lapsed(&self, window: TimeDelta) -> bool {
        self.last_movement_command
            .is_none_or(|stamp| self.now - stamp > window)
    }

    fn healthy(&self) -> bool {
        self.encoders_ok && self.motors_ok
    }
}

/// Per-cycle outputs to the vehicle controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CycleOutputs {
    pub estop: bool,
    pub ambience: Ambience,
}

/// Evaluate one cycle of the transition table.
///
/// The checks fall through in a fixed order (Stopped, Starting, Moving,
/// PendingStopped, Fault) so a state entered earlier in the cycle is evaluated
/// again further down.  Outputs follow the blocks that were visited: the
/// warning ambience whenever the Starting block ran, and estop whenever the
/// PendingStopped or Fault block ran.
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use grizzly_kernel::motion_safety::{CycleInputs, SafetyState, decide};
///
/// let now = Utc::now();
/// let inputs = CycleInputs {
///     now,
///     encoders_ok: true,
///     motors_ok: true,
///     estopped: false,
///     moving: false,
///     last_movement_command: Some(now),
///     starting_duration: TimeDelta::seconds(2),
/// };
/// let (next, out) = decide(&SafetyState::Stopped, &inputs);
/// assert_eq!(next, SafetyState::Starting { deadline: now + TimeDelta::seconds(2) });
/// assert!(!out.estop);
/// ```
pub fn decide(state: &SafetyState, inputs: &CycleInputs) -> (SafetyState, CycleOutputs) {
    let now = inputs.now;
    let mut state = state.clone();
    let mut outputs = CycleOutputs::default();

    if state == SafetyState::Stopped
        && inputs.commanded_within(TimeDelta::milliseconds(MOVEMENT_REQUEST_WINDOW_MS))
        && !inputs.estopped
    {
        // A deadline past the end of representable time is never reached.
        let deadline = now
            .checked_add_signed(inputs.starting_duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        state = SafetyState::Starting { deadline };
    }

    if let SafetyState::Starting { deadline } = state {
        outputs.ambience = Ambience::warning();
        if now > deadline {
            state = SafetyState::Moving;
        }
        if inputs.command_lapsed(TimeDelta::milliseconds(MOVEMENT_REQUEST_WINDOW_MS)) {
            state = SafetyState::Stopped;
        }
        if !inputs.healthy() || inputs.estopped {
            state = SafetyState::PendingStopped;
        }
    }

    if state == SafetyState::Moving {
        if !inputs.healthy() {
            state = SafetyState::PendingStopped;
        }
        if inputs.command_lapsed(TimeDelta::milliseconds(MOVING_COMMAND_TIMEOUT_MS)) {
            state = SafetyState::Stopped;
        }
    }

    if state == SafetyState::PendingStopped {
        outputs.estop = true;
        if !inputs.moving
            && inputs.command_lapsed(TimeDelta::milliseconds(PENDING_STOP_QUIET_MS))
            && inputs.estopped
        {
            state = SafetyState::Stopped;
        }
    }

    if state.is_fault() {
        outputs.estop = true;
    }

    (state, outputs)
}

// ────────────────────────────────────────────────────────────────────────────
// MotionSafety
// ────────────────────────────────────────────────────────────────────────────

/// Owns the safety state and every observation it depends on.
///
/// Not internally synchronised: all `on_*` calls must be serialised by the
/// caller (the runtime drives it from a single task).
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use grizzly_kernel::config::MotionSafetyConfig;
/// use grizzly_kernel::motion_safety::{MotionSafety, SafetyState};
/// use grizzly_types::DriveVector;
///
/// let mut safety = MotionSafety::new(&MotionSafetyConfig::default()).unwrap();
/// let now = Utc::now();
///
/// // Not yet Moving: commands are replaced with zeros.
/// let safe = safety.on_drive_command(&DriveVector::new(now, [1.0; 4]), now);
/// assert_eq!(safe.speeds, [0.0; 4]);
/// assert_eq!(*safety.state(), SafetyState::Stopped);
/// ```
#[derive(Debug, Clone)]
pub struct MotionSafety {
    state: SafetyState,
    encoders: EncodersMonitor,
    limiters: [RateLimiter; 4],

    controller_status: LatestObservation<ControllerStatus>,
    user_estop: LatestObservation<bool>,
    last_movement_command: Option<Timestamp>,
    last_non_precharge: Option<Timestamp>,

    starting_duration: TimeDelta,
    stationary_epsilon: f64,
}

impl MotionSafety {
    /// Build the state machine in [`SafetyState::Stopped`].
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: &MotionSafetyConfig) -> Result<Self, MotionError> {
        config.validate()?;
        let max_rate = config.max_rate();
        Ok(Self {
            state: SafetyState::Stopped,
            encoders: EncodersMonitor::new(
                config.encoders_timeout(),
                config.encoder_speed_error_diff_threshold,
                config.encoder_fault_time_to_failure(),
            ),
            limiters: std::array::from_fn(|_| RateLimiter::new(max_rate)),
            controller_status: LatestObservation::new(),
            user_estop: LatestObservation::new(),
            last_movement_command: None,
            last_non_precharge: None,
            starting_duration: config.starting_duration(),
            stationary_epsilon: config.stationary_epsilon,
        })
    }

    pub fn state(&self) -> &SafetyState {
        &self.state
    }

    pub fn encoders(&self) -> &EncodersMonitor {
        &self.encoders
    }

    pub fn last_movement_command(&self) -> Option<Timestamp> {
        self.last_movement_command
    }

    /// Hardware estop latched according to the newest controller status.
    pub fn estopped(&self) -> bool {
        self.controller_status
            .value()
            .is_some_and(ControllerStatus::estop_latched)
    }

    // ── Inbound observations ────────────────────────────────────────────────

    pub fn on_encoders(&mut self, feedback: DriveVector, now: Timestamp) {
        self.encoders.record_feedback(feedback, now);
    }

    pub fn on_controller_status(&mut self, status: ControllerStatus, now: Timestamp) {
        self.controller_status.update(status, now);
    }

    /// Handle a user estop signal.
    ///
    /// Returns `true` when an estop must be asserted immediately.  Unless the
    /// machine is already in Fault it also moves to PendingStopped without
    /// waiting for the next cycle.  A released (`false`) signal is recorded but
    /// changes nothing.
    pub fn on_user_estop(&mut self, engaged: bool, now: Timestamp) -> bool {
        self.user_estop.update(engaged, now);
        if !engaged {
            return false;
        }
        if !self.state.is_fault() && self.state != SafetyState::PendingStopped {
            info!(from = %self.state, "user estop, stopping");
            self.state = SafetyState::PendingStopped;
        }
        true
    }

    /// Turn an inbound drive command into the command safe to send on.
    ///
    /// Non-stationary commands refresh the movement-request clock.  Only in
    /// Moving are the wheel speeds passed through, each via its rate limiter;
    /// in every other state the result is all zeros.  The result keeps the
    /// inbound timestamp and is what the encoder monitor compares against.
    pub fn on_drive_command(&mut self, command: &DriveVector, now: Timestamp) -> DriveVector {
        if !command.is_stationary(self.stationary_epsilon) {
            self.last_movement_command = Some(command.timestamp);
        }

        let mut safe = DriveVector::zero(command.timestamp);
        if self.state == SafetyState::Moving {
            for wheel in WheelIndex::ALL {
                safe[wheel] = self.limiters[wheel.index()].apply(command[wheel], now);
            }
        }

        self.encoders.record_command(safe, now);
        safe
    }

    // ── Cycle ───────────────────────────────────────────────────────────────

    /// Run one fixed-period cycle: fault check, health check, transition.
    pub fn on_cycle(&mut self, now: Timestamp, motors: &dyn MotorControllerMonitor) -> CycleOutputs {
        self.check_faults();

        let inputs = CycleInputs {
            now,
            encoders_ok: self.encoders.ok(now),
            motors_ok: motors.ok(now),
            estopped: self.estopped(),
            moving: self.encoders.moving(self.stationary_epsilon),
            last_movement_command: self.last_movement_command,
            starting_duration: self.starting_duration,
        };

        let (next, outputs) = decide(&self.state, &inputs);
        if next != self.state {
            info!(
                from = %self.state,
                to = %next,
                encoders_ok = inputs.encoders_ok,
                motors_ok = inputs.motors_ok,
                estopped = inputs.estopped,
                "motion state changed"
            );
            self.state = next;
        }
        outputs
    }

    fn check_faults(&mut self) {
        if let Some(status) = self.controller_status.value().copied() {
            if !status.precharge_active() {
                self.last_non_precharge = Some(status.timestamp);
            }
            // Opens at the first status rather than the epoch: a controller
            // that reports precharge from power-up gets the full limit.
            let clear_since = *self.last_non_precharge.get_or_insert(status.timestamp);
            if status.timestamp - clear_since > TimeDelta::milliseconds(PRECHARGE_LIMIT_MS) {
                self.set_fault(PRECHARGE_FAULT);
            }
        }

        if self.encoders.update().is_some() {
            self.set_fault(ENCODER_FAULT);
        }
    }

    /// Latch Fault.  The first reason is kept.
    fn set_fault(&mut self, reason: &str) {
        if self.state.is_fault() {
            return;
        }
        error!(from = %self.state, reason, "motion safety fault");
        self.state = SafetyState::Fault {
            reason: reason.to_string(),
        };
    }

    // ── Diagnostics ─────────────────────────────────────────────────────────

    pub fn diagnostic(&self, now: Timestamp) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Motion Safety");
        match &self.state {
            SafetyState::Fault { reason } => {
                stat.summary(DiagnosticLevel::Error, format!("Fault: {reason}"));
            }
            state => stat.summary(
                state.level(),
                format!("Motion state machine state is: {state}"),
            ),
        }

        stat.add("state", &self.state);
        match self.last_movement_command {
            Some(stamp) => stat.add("last move command (seconds)", secs_from_delta(now - stamp)),
            None => stat.add("last move command (seconds)", "never"),
        }
        match self.controller_status.received_at() {
            Some(at) => stat.add("controller status age (seconds)", secs_from_delta(now - at)),
            None => stat.add("controller status age (seconds)", "never"),
        }
        stat.add("vehicle in motion", self.encoders.moving(self.stationary_epsilon));
        stat.add("user estop", self.user_estop.value().copied().unwrap_or(false));
        stat
    }
}
