//! [`MotionSafetyConfig`] – tunables for the safety kernel.
//!
//! Every field has a default, so a partial TOML table (or none at all) yields
//! a usable configuration.  Periods and timeouts are in seconds.

use chrono::TimeDelta;
use grizzly_types::{MotionError, delta_from_secs};
use serde::{Deserialize, Serialize};

/// Longest accepted period or timeout (s).
pub const MAX_DURATION_SECS: f64 = 3_600.0;

/// Parameters for [`MotionSafety`][crate::motion_safety::MotionSafety] and the
/// node that drives it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSafetyConfig {
    /// Encoder feedback older than this is considered lost (s).
    pub encoders_timeout: f64,
    /// How far the worst wheel error must exceed the runner-up before that
    /// wheel is suspected of a failed encoder (rad/s).
    pub encoder_speed_error_diff_threshold: f64,
    /// How long a suspect encoder must persist before it is latched as failed (s).
    pub encoder_fault_time_to_failure: f64,
    /// Track width (m).  Kept with the other chassis geometry; the limiter
    /// itself only needs the wheel radius.
    pub vehicle_width: f64,
    /// Wheel radius (m).
    pub wheel_radius: f64,
    /// Maximum vehicle acceleration (m/s²).
    pub max_acceleration: f64,
    /// Warning period between a motion request and the first non-zero output (s).
    pub starting_duration: f64,
    /// State machine cycle period (s).
    pub watchdog_period: f64,
    /// Wheel speeds at or below this magnitude count as stationary (rad/s).
    pub stationary_epsilon: f64,
    /// Motor driver status older than this is considered lost (s).
    pub motors_timeout: f64,
    /// Period of the diagnostics poll (s).
    pub diagnostic_period: f64,
    /// Expected controller status rate (Hz).
    pub expected_mcu_status_frequency: f64,
    /// Acceptable drive command rate band (Hz).
    pub min_cmd_drive_frequency: f64,
    pub max_cmd_drive_frequency: f64,
}

impl Default for MotionSafetyConfig {
    fn default() -> Self {
        Self {
            encoders_timeout: 0.11,
            encoder_speed_error_diff_threshold: 0.5,
            encoder_fault_time_to_failure: 0.5,
            vehicle_width: 1.01,
            wheel_radius: 0.333,
            max_acceleration: 1.0,
            starting_duration: 2.0,
            watchdog_period: 0.05,
            stationary_epsilon: 0.001,
            motors_timeout: 0.1,
            diagnostic_period: 1.0,
            expected_mcu_status_frequency: 50.0,
            min_cmd_drive_frequency: 10.0,
            max_cmd_drive_frequency: 50.0,
        }
    }
}

impl MotionSafetyConfig {
    /// Per-wheel limit on the rate of change of commanded wheel speed,
    /// `max_acceleration / wheel_radius` (rad/s²).
    pub fn max_rate(&self) -> f64 {
        self.max_acceleration / self.wheel_radius
    }

    pub fn encoders_timeout(&self) -> TimeDelta {
        delta_from_secs(self.encoders_timeout)
    }

    pub fn encoder_fault_time_to_failure(&self) -> TimeDelta {
        delta_from_secs(self.encoder_fault_time_to_failure)
    }

    pub fn starting_duration(&self) -> TimeDelta {
        delta_from_secs(self.starting_duration)
    }

    pub fn motors_timeout(&self) -> TimeDelta {
        delta_from_secs(self.motors_timeout)
    }

    /// Check every field for a physically meaningful value.
    ///
    /// # Errors
    ///
    /// Returns [`MotionError::InvalidConfig`] for the first offending field.
    pub fn validate(&self) -> Result<(), MotionError> {
        let positive = [
            ("encoders_timeout", self.encoders_timeout),
            ("vehicle_width", self.vehicle_width),
            ("wheel_radius", self.wheel_radius),
            ("max_acceleration", self.max_acceleration),
            ("watchdog_period", self.watchdog_period),
            ("motors_timeout", self.motors_timeout),
            ("diagnostic_period", self.diagnostic_period),
            ("expected_mcu_status_frequency", self.expected_mcu_status_frequency),
            ("min_cmd_drive_frequency", self.min_cmd_drive_frequency),
            ("max_cmd_drive_frequency", self.max_cmd_drive_frequency),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(field, format!("must be a positive number, got {value}")));
            }
        }

        let non_negative = [
            (
                "encoder_speed_error_diff_threshold",
                self.encoder_speed_error_diff_threshold,
            ),
            (
                "encoder_fault_time_to_failure",
                self.encoder_fault_time_to_failure,
            ),
            ("starting_duration", self.starting_duration),
            ("stationary_epsilon", self.stationary_epsilon),
        ];
        for (field, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(invalid(field, format!("must be zero or positive, got {value}")));
            }
        }

        let durations = [
            ("encoders_timeout", self.encoders_timeout),
            (
                "encoder_fault_time_to_failure",
                self.encoder_fault_time_to_failure,
            ),
            ("starting_duration", self.starting_duration),
            ("watchdog_period", self.watchdog_period),
            ("motors_timeout", self.motors_timeout),
            ("diagnostic_period", self.diagnostic_period),
        ];
        for (field, value) in durations {
            if value > MAX_DURATION_SECS {
                return Err(invalid(
                    field,
                    format!("must not exceed {MAX_DURATION_SECS} s, got {value}"),
                ));
            }
        }

        if self.min_cmd_drive_frequency > self.max_cmd_drive_frequency {
            return Err(invalid(
                "min_cmd_drive_frequency",
                format!(
                    "{} exceeds max_cmd_drive_frequency {}",
                    self.min_cmd_drive_frequency, self.max_cmd_drive_frequency
                ),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> MotionError {
    MotionError::InvalidConfig {
        field: field.to_string(),
        reason,
    }
}
