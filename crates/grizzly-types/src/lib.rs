use std::fmt;
use std::ops::{Index, IndexMut};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wall-clock instant attached to every observation and output.
pub type Timestamp = DateTime<Utc>;

/// Convert a configured period in seconds to a [`TimeDelta`], rounded to the
/// nearest microsecond.
pub fn delta_from_secs(secs: f64) -> TimeDelta {
    TimeDelta::microseconds((secs * 1e6).round() as i64)
}

/// Length of `delta` in (fractional) seconds.
pub fn secs_from_delta(delta: TimeDelta) -> f64 {
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_seconds() as f64,
    }
}

/// Fixed wheel ordering shared by every wheel-indexed vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WheelIndex {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl WheelIndex {
    /// All wheels in vector order.
    pub const ALL: [WheelIndex; 4] = [
        WheelIndex::FrontLeft,
        WheelIndex::FrontRight,
        WheelIndex::RearLeft,
        WheelIndex::RearRight,
    ];

    /// Position of this wheel inside a [`DriveVector`].
    pub fn index(self) -> usize {
        match self {
            WheelIndex::FrontLeft => 0,
            WheelIndex::FrontRight => 1,
            WheelIndex::RearLeft => 2,
            WheelIndex::RearRight => 3,
        }
    }

    /// Human-readable wheel name used in diagnostics, e.g. `"front left"`.
    pub fn name(self) -> &'static str {
        match self {
            WheelIndex::FrontLeft => "front left",
            WheelIndex::FrontRight => "front right",
            WheelIndex::RearLeft => "rear left",
            WheelIndex::RearRight => "rear right",
        }
    }
}

impl fmt::Display for WheelIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A set of four wheel speeds (rad/s), either commanded or measured.
///
/// Indexable by [`WheelIndex`]:
///
/// ```
/// use chrono::Utc;
/// use grizzly_types::{DriveVector, WheelIndex};
///
/// let drive = DriveVector::new(Utc::now(), [1.0, 2.0, 3.0, 4.0]);
/// assert_eq!(drive[WheelIndex::RearLeft], 3.0);
/// assert!(!drive.is_stationary(0.001));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveVector {
    pub timestamp: Timestamp,
    pub speeds: [f64; 4],
}

impl DriveVector {
    pub fn new(timestamp: Timestamp, speeds: [f64; 4]) -> Self {
        Self { timestamp, speeds }
    }

    /// All-zero command stamped with `timestamp`.
    pub fn zero(timestamp: Timestamp) -> Self {
        Self::new(timestamp, [0.0; 4])
    }

    /// `true` when no wheel speed magnitude exceeds `epsilon`.
    pub fn is_stationary(&self, epsilon: f64) -> bool {
        self.speeds.iter().all(|speed| speed.abs() <= epsilon)
    }

    /// Reject vectors carrying NaN or infinite speeds.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::NonFinite`] naming `stream` when any wheel speed
    /// is not finite.
    pub fn validate(&self, stream: &str) -> Result<(), MotionError> {
        if self.speeds.iter().all(|speed| speed.is_finite()) {
            Ok(())
        } else {
            Err(MotionError::NonFinite {
                stream: stream.to_string(),
            })
        }
    }
}

impl Index<WheelIndex> for DriveVector {
    type Output = f64;

    fn index(&self, wheel: WheelIndex) -> &f64 {
        &self.speeds[wheel.index()]
    }
}

impl IndexMut<WheelIndex> for DriveVector {
    fn index_mut(&mut self, wheel: WheelIndex) -> &mut f64 {
        &mut self.speeds[wheel.index()]
    }
}

/// Raw status report from the vehicle MCU.
///
/// The error bitmask is kept opaque; only the bits the safety layer reads have
/// named predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub timestamp: Timestamp,
    pub error: u32,
}

impl ControllerStatus {
    /// Hardware estop is latched and waiting for a reset.
    pub const ERROR_ESTOP_RESET: u32 = 1 << 1;
    /// Motor driver bus is precharging (brake detect line active).
    pub const ERROR_BRK_DET: u32 = 1 << 2;

    pub fn new(timestamp: Timestamp, error: u32) -> Self {
        Self { timestamp, error }
    }

    pub fn precharge_active(&self) -> bool {
        self.error & Self::ERROR_BRK_DET != 0
    }

    pub fn estop_latched(&self) -> bool {
        self.error & Self::ERROR_ESTOP_RESET != 0
    }
}

/// Which per-wheel motor-driver stream a [`MotorStatus`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorReportKind {
    Status,
    Feedback,
}

/// Arrival notice for one motor driver's status or feedback message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotorStatus {
    pub wheel: WheelIndex,
    pub kind: MotorReportKind,
    pub timestamp: Timestamp,
}

/// Light/beeper pattern understood by the MCU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmbiencePattern {
    #[default]
    Off,
    Solid,
    SlowFlash,
    DoubleFlash,
}

/// Full vehicle ambience command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ambience {
    pub beacon: AmbiencePattern,
    pub headlight: AmbiencePattern,
    pub taillight: AmbiencePattern,
    pub beep: AmbiencePattern,
}

impl Ambience {
    /// Everything off.
    pub fn quiescent() -> Self {
        Self::default()
    }

    /// Every channel double-flashing; announces imminent motion.
    pub fn warning() -> Self {
        Self {
            beacon: AmbiencePattern::DoubleFlash,
            headlight: AmbiencePattern::DoubleFlash,
            taillight: AmbiencePattern::DoubleFlash,
            beep: AmbiencePattern::DoubleFlash,
        }
    }
}

/// Severity of a [`DiagnosticStatus`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    #[default]
    Ok,
    Warn,
    Error,
}

/// Read-only health snapshot of one monitored component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticStatus {
    pub name: String,
    pub level: DiagnosticLevel,
    pub message: String,
    pub values: Vec<(String, String)>,
}

impl DiagnosticStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            level: DiagnosticLevel::Ok,
            message: String::new(),
            values: Vec::new(),
        }
    }

    /// Set the severity and summary text.
    pub fn summary(&mut self, level: DiagnosticLevel, message: impl Into<String>) {
        self.level = level;
        self.message = message.into();
    }

    /// Append a key/value attribute.
    pub fn add(&mut self, key: impl Into<String>, value: impl fmt::Display) {
        self.values.push((key.into(), value.to_string()));
    }

    /// Look up an attribute by key.
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Envelope for everything routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: Timestamp,
    /// e.g., "grizzly-runtime::motion_safety"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(timestamp: Timestamp, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            timestamp,
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Commanded, measured, or rate-limited wheel speeds.
    Drive(DriveVector),
    ControllerStatus(ControllerStatus),
    MotorStatus(MotorStatus),
    /// User estop request inbound, or estop assertion outbound.
    Estop(bool),
    Ambience(Ambience),
    Diagnostics(Vec<DiagnosticStatus>),
}

/// Global error type for configuration, input validation, and transport failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MotionError {
    #[error("Invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("Non-finite wheel speed received on {stream}")]
    NonFinite { stream: String },

    #[error("Event Bus Error: {0}")]
    Channel(String),

    #[error("Config Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn second_conversions_agree() {
        assert_eq!(delta_from_secs(0.11), TimeDelta::milliseconds(110));
        assert_eq!(delta_from_secs(2.0), TimeDelta::seconds(2));
        assert!((secs_from_delta(TimeDelta::milliseconds(50)) - 0.05).abs() < 1e-12);
        assert!((secs_from_delta(TimeDelta::milliseconds(-250)) + 0.25).abs() < 1e-12);
    }

    #[test]
    fn wheel_order_matches_vector_layout() {
        let drive = DriveVector::new(stamp(), [0.1, 0.2, 0.3, 0.4]);
        for (i, wheel) in WheelIndex::ALL.iter().enumerate() {
            assert_eq!(wheel.index(), i);
            assert_eq!(drive[*wheel], drive.speeds[i]);
        }
    }

    #[test]
    fn index_mut_writes_the_right_wheel() {
        let mut drive = DriveVector::zero(stamp());
        drive[WheelIndex::FrontRight] = 2.5;
        assert_eq!(drive.speeds, [0.0, 2.5, 0.0, 0.0]);
    }

    #[test]
    fn stationary_uses_magnitude() {
        let still = DriveVector::new(stamp(), [0.0005, -0.0005, 0.0, 0.0]);
        assert!(still.is_stationary(0.001));

        let reversing = DriveVector::new(stamp(), [-0.5, 0.0, 0.0, 0.0]);
        assert!(!reversing.is_stationary(0.001));
    }

    #[test]
    fn validate_rejects_nan_and_infinity() {
        assert!(DriveVector::zero(stamp()).validate("cmd_drive").is_ok());

        let nan = DriveVector::new(stamp(), [f64::NAN, 0.0, 0.0, 0.0]);
        assert!(matches!(
            nan.validate("encoders"),
            Err(MotionError::NonFinite { ref stream }) if stream == "encoders"
        ));

        let inf = DriveVector::new(stamp(), [0.0, 0.0, f64::INFINITY, 0.0]);
        assert!(inf.validate("cmd_drive").is_err());
    }

    #[test]
    fn controller_status_bit_predicates() {
        let clear = ControllerStatus::new(stamp(), 0);
        assert!(!clear.precharge_active());
        assert!(!clear.estop_latched());

        let both = ControllerStatus::new(
            stamp(),
            ControllerStatus::ERROR_BRK_DET | ControllerStatus::ERROR_ESTOP_RESET,
        );
        assert!(both.precharge_active());
        assert!(both.estop_latched());

        // Unrelated bits are ignored.
        let other = ControllerStatus::new(stamp(), 1 << 7);
        assert!(!other.precharge_active());
        assert!(!other.estop_latched());
    }

    #[test]
    fn ambience_presets() {
        assert_eq!(Ambience::quiescent().beep, AmbiencePattern::Off);
        let warning = Ambience::warning();
        assert_eq!(warning.beacon, AmbiencePattern::DoubleFlash);
        assert_eq!(warning.beep, AmbiencePattern::DoubleFlash);
    }

    #[test]
    fn diagnostic_levels_are_ordered() {
        assert!(DiagnosticLevel::Error > DiagnosticLevel::Warn);
        assert!(DiagnosticLevel::Warn > DiagnosticLevel::Ok);
    }

    #[test]
    fn diagnostic_status_collects_values() {
        let mut stat = DiagnosticStatus::new("Encoders");
        stat.summary(DiagnosticLevel::Warn, "stale");
        stat.add("age (s)", 0.25);
        assert_eq!(stat.level, DiagnosticLevel::Warn);
        assert_eq!(stat.value("age (s)"), Some("0.25"));
        assert_eq!(stat.value("missing"), None);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            stamp(),
            "grizzly-runtime::test",
            EventPayload::Drive(DriveVector::new(stamp(), [1.0, 1.0, -1.0, -1.0])),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, event.source);
        match back.payload {
            EventPayload::Drive(drive) => assert_eq!(drive.speeds, [1.0, 1.0, -1.0, -1.0]),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn motion_error_display() {
        let err = MotionError::InvalidConfig {
            field: "wheel_radius".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("wheel_radius"));
        assert!(err.to_string().contains("must be positive"));
    }
}
