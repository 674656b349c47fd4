//! Per-wheel acceleration limiter.
//!
//! Bounds how fast a single commanded wheel speed may change.  One
//! [`RateLimiter`] is kept per wheel; the caller supplies the commanded value
//! and the current time and receives the value that may safely be sent on.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeDelta, Utc};
//! use grizzly_hal::rate_limiter::RateLimiter;
//!
//! let mut limiter = RateLimiter::new(2.0); // rad/s per second
//! let t0 = Utc::now();
//!
//! assert_eq!(limiter.apply(0.0, t0), 0.0); // first call passes through
//! let out = limiter.apply(10.0, t0 + TimeDelta::milliseconds(500));
//! assert!((out - 1.0).abs() < 1e-9); // 2.0 * 0.5 s
//! ```

use grizzly_types::{Timestamp, secs_from_delta};
use tracing::trace;

/// Rate-of-change limiter for one scalar command.
///
/// The maximum rate is fixed at construction; see
/// `MotionSafetyConfig::max_rate` for how the wheel value is derived.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max_rate: f64,
    previous_output: Option<f64>,
    previous_timestamp: Option<Timestamp>,
}

impl RateLimiter {
    /// Create a limiter allowing at most `max_rate` units of change per second.
    ///
    /// Negative rates are treated as their magnitude.
    pub fn new(max_rate: f64) -> Self {
        Self {
            max_rate: max_rate.abs(),
            previous_output: None,
            previous_timestamp: None,
        }
    }

    /// Return the configured maximum rate.
    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    /// Most recent output, if [`RateLimiter::apply`] has been called.
    pub fn previous_output(&self) -> Option<f64> {
        self.previous_output
    }

    /// Limit `commanded` against the previous output.
    ///
    /// The first call passes `commanded` through unchanged and seeds the
    /// limiter.  Every later call moves at most `max_rate * dt` away from the
    /// previous output, where `dt` is the time since the previous call.  A
    /// timestamp earlier than the previous one counts as `dt = 0`, holding the
    /// previous output.
    pub fn apply(&mut self, commanded: f64, now: Timestamp) -> f64 {
        let output = match (self.previous_output, self.previous_timestamp) {
            (Some(previous), Some(then)) => {
                let dt = secs_from_delta(now - then).max(0.0);
                let max_delta = self.max_rate * dt;
                commanded.clamp(previous - max_delta, previous + max_delta)
            }
            _ => commanded,
        };
        if output != commanded {
            trace!(commanded, output, "wheel command rate-limited");
        }

        self.previous_output = Some(output);
        self.previous_timestamp = Some(now);
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn t(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    #[test]
    fn first_call_passes_through() {
        let mut limiter = RateLimiter::new(1.0);
        assert_eq!(limiter.previous_output(), None);
        assert_eq!(limiter.apply(42.0, t(0)), 42.0);
        assert_eq!(limiter.previous_output(), Some(42.0));
    }

    #[test]
    fn increase_is_capped() {
        let mut limiter = RateLimiter::new(3.0);
        limiter.apply(0.0, t(0));
        // 3.0 rad/s² * 0.1 s = 0.3
        let out = limiter.apply(5.0, t(100));
        assert!((out - 0.3).abs() < 1e-9);
    }

    #[test]
    fn decrease_is_capped() {
        let mut limiter = RateLimiter::new(3.0);
        limiter.apply(2.0, t(0));
        let out = limiter.apply(-2.0, t(200));
        assert!((out - 1.4).abs() < 1e-9);
    }

    #[test]
    fn small_changes_are_unaffected() {
        let mut limiter = RateLimiter::new(3.0);
        limiter.apply(1.0, t(0));
        let out = limiter.apply(1.1, t(100));
        assert!((out - 1.1).abs() < 1e-9);
    }

    #[test]
    fn ramp_converges_to_target() {
        let mut limiter = RateLimiter::new(2.0);
        limiter.apply(0.0, t(0));
        let mut out = 0.0;
        for step in 1..=20 {
            out = limiter.apply(1.0, t(step * 50));
        }
        // 2.0 * 0.05 = 0.1 per step, reached after 10 steps and held.
        assert!((out - 1.0).abs() < 1e-9);
    }

    #[test]
    fn change_never_exceeds_rate_times_dt() {
        let mut limiter = RateLimiter::new(1.5);
        let commands = [0.0, 4.0, -3.0, 2.5, 2.5, -0.5, 10.0, 0.0];
        let gaps_ms = [0, 20, 70, 10, 300, 45, 5, 1000];

        let mut now = t(0);
        let mut previous = limiter.apply(commands[0], now);
        for (cmd, gap) in commands.iter().zip(gaps_ms.iter()).skip(1) {
            let dt = *gap as f64 / 1000.0;
            now += TimeDelta::milliseconds(*gap);
            let out = limiter.apply(*cmd, now);
            assert!(
                (out - previous).abs() <= 1.5 * dt + 1e-9,
                "step to {cmd} moved {} in {dt}s",
                out - previous
            );
            previous = out;
        }
    }

    #[test]
    fn zero_dt_holds_previous_output() {
        let mut limiter = RateLimiter::new(5.0);
        limiter.apply(1.0, t(100));
        assert_eq!(limiter.apply(3.0, t(100)), 1.0);
    }

    #[test]
    fn out_of_order_timestamp_holds_previous_output() {
        let mut limiter = RateLimiter::new(5.0);
        limiter.apply(1.0, t(100));
        assert_eq!(limiter.apply(3.0, t(50)), 1.0);
    }

    #[test]
    fn negative_rate_uses_magnitude() {
        let limiter = RateLimiter::new(-2.0);
        assert_eq!(limiter.max_rate(), 2.0);
    }
}
