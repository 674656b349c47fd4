//! [`EncodersMonitor`] – encoder liveness and failed-encoder detection.
//!
//! A failed encoder (or its cabling) reads zero, or buzzes around zero, no
//! matter what the wheel is commanded to do.  The monitor compares the latest
//! measured wheel speeds against the latest command that went to the motors:
//!
//! 1. Compute the per-wheel absolute error and pick the wheel with the largest
//!    one as the *candidate*.
//! 2. The candidate only counts if its measured speed is near zero **and** its
//!    error exceeds the second-largest error by at least the configured
//!    threshold.  A stalled or heavily loaded vehicle raises every wheel's
//!    error together, so it is not mistaken for a single failed encoder.
//! 3. A candidate must persist, with no clean sample in between, for longer
//!    than the time-to-failure before the wheel is latched as failed.  The
//!    latch is sticky for the life of the process.

use chrono::TimeDelta;
use grizzly_types::{
    DiagnosticLevel, DiagnosticStatus, DriveVector, Timestamp, WheelIndex, secs_from_delta,
};
use tracing::{debug, warn};

use crate::latest::LatestObservation;

/// Measured speeds above this (rad/s) rule a wheel out as a failed encoder.
const CANDIDATE_MAX_MEASURED_SPEED: f64 = 0.01;

/// Encoder sanity monitor.
#[derive(Debug, Clone)]
pub struct EncodersMonitor {
    encoders_timeout: TimeDelta,
    error_diff_threshold: f64,
    time_to_failure: TimeDelta,

    feedback: LatestObservation<DriveVector>,
    command: LatestObservation<DriveVector>,

    failed_wheel: Option<WheelIndex>,
    time_of_last_clean_reading: Option<Timestamp>,
}

impl EncodersMonitor {
    pub fn new(
        encoders_timeout: TimeDelta,
        error_diff_threshold: f64,
        time_to_failure: TimeDelta,
    ) -> Self {
        Self {
            encoders_timeout,
            error_diff_threshold,
            time_to_failure,
            feedback: LatestObservation::new(),
            command: LatestObservation::new(),
            failed_wheel: None,
            time_of_last_clean_reading: None,
        }
    }

    /// Store the newest measured wheel speeds.
    pub fn record_feedback(&mut self, feedback: DriveVector, received_at: Timestamp) {
        self.feedback.update(feedback, received_at);
    }

    /// Store the newest wheel speed command sent to the motors.
    pub fn record_command(&mut self, command: DriveVector, received_at: Timestamp) {
        self.command.update(command, received_at);
    }

    /// Wheel latched as failed, if any.  Never cleared once set.
    pub fn failed_wheel(&self) -> Option<WheelIndex> {
        self.failed_wheel
    }

    /// Timestamp of the most recent feedback sample without a candidate.
    pub fn time_of_last_clean_reading(&self) -> Option<Timestamp> {
        self.time_of_last_clean_reading
    }

    /// Pick the wheel whose encoder looks failed in this one sample, if any.
    pub fn detect_candidate(
        &self,
        measured: &DriveVector,
        commanded: &DriveVector,
    ) -> Option<WheelIndex> {
        let mut errors = [0.0_f64; 4];
        for wheel in WheelIndex::ALL {
            errors[wheel.index()] = (measured[wheel] - commanded[wheel]).abs();
        }

        // First wheel holding the maximum error.
        let mut candidate = WheelIndex::FrontLeft;
        for wheel in WheelIndex::ALL {
            if errors[wheel.index()] > errors[candidate.index()] {
                candidate = wheel;
            }
        }
        let max_error = errors[candidate.index()];

        errors[candidate.index()] = 0.0;
        let runner_up = errors.iter().copied().fold(0.0_f64, f64::max);
        let max_error_diff = max_error - runner_up;

        if measured[candidate] > CANDIDATE_MAX_MEASURED_SPEED {
            return None;
        }
        if max_error_diff < self.error_diff_threshold {
            return None;
        }
        Some(candidate)
    }

    /// Evaluate the latest feedback/command pair.
    ///
    /// Returns the suspect wheel when a candidate has persisted past the
    /// time-to-failure as of this sample, latching it as the failed wheel the
    /// first time.  Returns `None` when either stream is still empty, when the
    /// sample is clean, or while the candidate is still being debounced.
    ///
    /// The debounce clock only resets on a clean sample.  Until the first clean
    /// sample it starts at the first evaluated sample.
    pub fn update(&mut self) -> Option<WheelIndex> {
        let (Some(feedback), Some(command)) = (self.feedback.value(), self.command.value()) else {
            return None;
        };
        let stamp = feedback.timestamp;

        let Some(candidate) = self.detect_candidate(feedback, command) else {
            self.time_of_last_clean_reading = Some(stamp);
            return None;
        };

        // With no clean reading yet the clock opens at this sample, not at the
        // epoch, so the very first candidate is still debounced.
        let clean_since = *self.time_of_last_clean_reading.get_or_insert(stamp);
        if stamp - clean_since <= self.time_to_failure {
            debug!(wheel = %candidate, "encoder failure candidate");
            return None;
        }

        if self.failed_wheel.is_none() {
            warn!(wheel = %candidate, "encoder failure latched");
            self.failed_wheel = Some(candidate);
        }
        Some(candidate)
    }

    /// Liveness verdict at time `now`.
    ///
    /// - No feedback yet, or feedback older than the timeout: **not ok**.
    /// - No command yet, or a stale command: **ok** (nothing expected to move).
    /// - Otherwise ok unless a failed wheel has been latched.
    pub fn ok(&self, now: Timestamp) -> bool {
        let Some(feedback) = self.feedback.value() else {
            return false;
        };
        if now - feedback.timestamp > self.encoders_timeout {
            return false;
        }

        match self.command.value() {
            Some(command) if now - command.timestamp <= self.encoders_timeout => {
                self.failed_wheel.is_none()
            }
            _ => true,
        }
    }

    /// `true` when the latest feedback shows any wheel turning faster than
    /// `stationary_epsilon`.
    pub fn moving(&self, stationary_epsilon: f64) -> bool {
        self.feedback
            .value()
            .is_some_and(|feedback| !feedback.is_stationary(stationary_epsilon))
    }

    /// Diagnostic snapshot at time `now`.
    pub fn diagnostic(&self, now: Timestamp) -> DiagnosticStatus {
        let mut stat = DiagnosticStatus::new("Encoders");

        let Some(feedback) = self.feedback.value() else {
            stat.summary(DiagnosticLevel::Error, "No encoders messages received.");
            return stat;
        };

        let age = now - feedback.timestamp;
        stat.add("Age of last encoders message", secs_from_delta(age));
        if age > self.encoders_timeout {
            stat.summary(DiagnosticLevel::Error, "Last encoders message is stale.");
            return stat;
        }

        if let Some(wheel) = self.failed_wheel {
            stat.add("Failed encoder", wheel);
            stat.summary(
                DiagnosticLevel::Error,
                format!(
                    "Encoder failure detected in {wheel} wheel. Not a recoverable error, please service system."
                ),
            );
            return stat;
        }

        stat.summary(DiagnosticLevel::Ok, "Encoders look good.");
        stat
    }
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;

    fn t(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn monitor() -> EncodersMonitor {
        EncodersMonitor::new(TimeDelta::milliseconds(110), 0.5, TimeDelta::milliseconds(500))
    }

    fn feed(mon: &mut EncodersMonitor, ms: i64, measured: [f64; 4], commanded: [f64; 4]) -> Option<WheelIndex> {
        mon.record_command(DriveVector::new(t(ms), commanded), t(ms));
        mon.record_feedback(DriveVector::new(t(ms), measured), t(ms));
        mon.update()
    }

    fn wheel_strategy() -> impl Strategy<Value = WheelIndex> {
        prop::sample::select(WheelIndex::ALL.to_vec())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Errors that never lead the runner-up by the threshold yield no
        /// candidate, whatever the speeds.
        #[test]
        fn spread_below_threshold_has_no_candidate(
            commanded in prop::array::uniform4(-5.0f64..5.0),
            base in 0.0f64..3.0,
            spread in prop::array::uniform4(0.0f64..0.49),
            negative in prop::array::uniform4(any::<bool>()),
        ) {
            let mut measured = commanded;
            for i in 0..4 {
                let error = base + spread[i];
                measured[i] += if negative[i] { -error } else { error };
            }
            let mon = monitor();
            prop_assert_eq!(
                mon.detect_candidate(&DriveVector::new(t(0), measured), &DriveVector::new(t(0), commanded)),
                None
            );
        }

        /// A wheel reading near zero while the others track the command
        /// latches once it has persisted past the time-to-failure, and stays
        /// latched through later clean samples.
        #[test]
        fn dead_wheel_latches_and_sticks(
            wheel in wheel_strategy(),
            dead in -0.01f64..=0.01,
            commanded in prop::array::uniform4(1.0f64..5.0),
            tracking in prop::array::uniform4(-0.1f64..0.1),
            period_ms in 10i64..100,
        ) {
            let mut measured = commanded;
            for i in 0..4 {
                measured[i] += tracking[i];
            }
            measured[wheel.index()] = dead;

            let mut mon = monitor();
            let mut ms = 0;
            while ms <= 500 {
                prop_assert_eq!(feed(&mut mon, ms, measured, commanded), None);
                ms += period_ms;
            }
            prop_assert_eq!(feed(&mut mon, ms, measured, commanded), Some(wheel));

            for _ in 0..5 {
                ms += period_ms;
                prop_assert_eq!(feed(&mut mon, ms, commanded, commanded), None);
            }
            prop_assert_eq!(mon.failed_wheel(), Some(wheel));
        }

        /// Candidate runs shorter than the time-to-failure, each preceded by
        /// a clean sample, never latch.
        #[test]
        fn clean_sample_between_short_runs_prevents_latch(
            wheel in wheel_strategy(),
            runs in prop::collection::vec(0usize..=9, 1..30),
        ) {
            let commanded = [2.0; 4];
            let mut dead = commanded;
            dead[wheel.index()] = 0.0;

            let mut mon = monitor();
            let mut ms = 0;
            for run in runs {
                prop_assert_eq!(feed(&mut mon, ms, commanded, commanded), None);
                for _ in 0..run {
                    ms += 50;
                    prop_assert_eq!(feed(&mut mon, ms, dead, commanded), None);
                }
                ms += 50;
            }
            prop_assert_eq!(mon.failed_wheel(), None);
        }
    }
}
