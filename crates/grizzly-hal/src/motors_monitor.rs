//! Motor-controller health contract.
//!
//! The safety state machine only needs a yes/no answer from the motor
//! drivers.  [`MotorControllerMonitor`] is that seam; [`MotorStatusWatch`] is
//! the stock implementation, which treats missing or stale driver messages as
//! unhealthy.

use chrono::TimeDelta;
use grizzly_types::{
    DiagnosticLevel, DiagnosticStatus, MotorReportKind, MotorStatus, Timestamp, WheelIndex,
    secs_from_delta,
};

/// Boolean health check for the four motor drivers.
pub trait MotorControllerMonitor: Send + Sync {
    /// `true` when the drivers may be trusted to execute drive commands at
    /// time `now`.
    fn ok(&self, now: Timestamp) -> bool;
}

/// Tracks arrival of per-wheel driver status and feedback messages.
///
/// Healthy means: every wheel has reported both status and feedback at least
/// once, and every wheel's latest status is no older than the timeout.
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use grizzly_hal::motors_monitor::{MotorControllerMonitor, MotorStatusWatch};
///
/// let watch = MotorStatusWatch::new(TimeDelta::milliseconds(100));
/// assert!(!watch.ok(Utc::now())); // nothing heard yet
/// ```
#[derive(Debug, Clone)]
pub struct MotorStatusWatch {
    timeout: TimeDelta,
    last_status: [Option<Timestamp>; 4],
    last_feedback: [Option<Timestamp>; 4],
}

impl MotorStatusWatch {
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            timeout,
            last_status: [None; 4],
            last_feedback: [None; 4],
        }
    }

    /// Record an inbound driver message, replacing the previous one of the
    /// same kind for that wheel.
    pub fn record(&mut self, report: &MotorStatus) {
        let slot = report.wheel.index();
        match report.kind {
            MotorReportKind::Status => self.last_status[slot] = Some(report.timestamp),
            MotorReportKind::Feedback => self.last_feedback[slot] = Some(report.timestamp),
        }
    }

    /// First wheel that fails the health check, if any.
    pub fn first_unhealthy(&self, now: Timestamp) -> Option<WheelIndex> {
        WheelIndex::ALL.into_iter().find(|wheel| {
            let slot = wheel.index();
            match (self.last_status[slot], self.last_feedback[slot]) {
                (Some(status), Some(_)) => now - status > self.timeout,
                _ => true,
            }
        })
    }

    /// Diagnostic snapshot at time `now`.  Reports the first wheel that is
    /// missing a message or has gone stale.
    pub fn diagnostic(&self, now: Timestamp) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Motor drivers");
        for wheel in WheelIndex::ALL {
            let slot = wheel.index();
            let (Some(status), Some(_)) = (self.last_status[slot], self.last_feedback[slot]) else {
                stat.summary(
                    DiagnosticLevel::Error,
                    format!("Motor {wheel} driver status and/or feedback message not received"),
                );
                return stat;
            };
            let age = now - status;
            if age > self.timeout {
                stat.summary(
                    DiagnosticLevel::Error,
                    format!(
                        "Last motor {wheel} status message is stale ({:.3} seconds old). Check motor driver connectivity.",
                        secs_from_delta(age)
                    ),
                );
                return stat;
            }
        }
        stat.summary(DiagnosticLevel::Ok, "Motor drivers look good.");
        stat
    }
}

impl MotorControllerMonitor for MotorStatusWatch {
    fn ok(&self, now: Timestamp) -> bool {
        self.first_unhealthy(now).is_none()
    }
}
