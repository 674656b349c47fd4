//! [`FrequencyMonitor`] – arrival-rate check for an inbound stream.
//!
//! Each arrival calls [`FrequencyMonitor::tick`].  Every diagnostics poll
//! compares the current arrival count with the count recorded a few polls ago
//! and reports whether the resulting rate falls within the acceptable band.
//!
//! The comparison window slides over the last [`WINDOW_SIZE`] polls, so at a
//! 1 Hz poll the rate is averaged over roughly five seconds.

use grizzly_types::{DiagnosticLevel, DiagnosticStatus, Timestamp, secs_from_delta};

/// Number of polls the rate is averaged over.
pub const WINDOW_SIZE: usize = 5;
/// Fractional slack applied to both ends of the acceptable band.
pub const TOLERANCE: f64 = 0.01;

// ────────────────────────────────────────────────────────────────────────────
// Internal sample
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct PollSample {
    at: Timestamp,
    count: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// FrequencyMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Tracks how often a stream delivers messages.
///
/// # Example
///
/// ```
/// use chrono::{TimeDelta, Utc};
/// use grizzly_kernel::topic_frequency::FrequencyMonitor;
/// use grizzly_types::DiagnosticLevel;
///
/// let start = Utc::now();
/// let mut mon = FrequencyMonitor::new("Drive command", 10.0, 50.0, start);
/// for _ in 0..20 {
///     mon.tick();
/// }
/// let stat = mon.diagnostic(start + TimeDelta::seconds(1));
/// assert_eq!(stat.level, DiagnosticLevel::Ok);
/// ```
#[derive(Debug, Clone)]
pub struct FrequencyMonitor {
    name: String,
    min_frequency: f64,
    max_frequency: f64,
    count: u64,
    history: [PollSample; WINDOW_SIZE],
    next_slot: usize,
}

impl FrequencyMonitor {
    /// Create a monitor accepting rates in `[min_frequency, max_frequency]` Hz
    /// (widened by [`TOLERANCE`]).  The window starts at `start`.
    pub fn new(name: impl Into<String>, min_frequency: f64, max_frequency: f64, start: Timestamp) -> Self {
        Self {
            name: name.into(),
            min_frequency,
            max_frequency,
            count: 0,
            history: [PollSample { at: start, count: 0 }; WINDOW_SIZE],
            next_slot: 0,
        }
    }

    /// Record one arrival.
    pub fn tick(&mut self) {
        self.count += 1;
    }

    /// Total arrivals since construction.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Close the current window at `now` and report on it.
    ///
    /// Each call advances the sliding window, so this should be called once
    /// per diagnostics poll.
    pub fn diagnostic(&mut self, now: Timestamp) -> DiagnosticStatus {
        let oldest = self.history[self.next_slot];
        let events = self.count - oldest.count;
        let window = secs_from_delta(now - oldest.at);
        let frequency = if window > 0.0 {
            events as f64 / window
        } else {
            0.0
        };

        self.history[self.next_slot] = PollSample {
            at: now,
            count: self.count,
        };
        self.next_slot = (self.next_slot + 1) % WINDOW_SIZE;

        let min_acceptable = self.min_frequency * (1.0 - TOLERANCE);
        let max_acceptable = self.max_frequency * (1.0 + TOLERANCE);

        let mut stat = DiagnosticStatus::new(self.name.clone());
        if events == 0 {
            stat.summary(DiagnosticLevel::Error, "No events recorded.");
        } else if frequency < min_acceptable {
            stat.summary(DiagnosticLevel::Warn, "Frequency too low.");
        } else if self.max_frequency.is_finite() && frequency > max_acceptable {
            stat.summary(DiagnosticLevel::Warn, "Frequency too high.");
        } else {
            stat.summary(DiagnosticLevel::Ok, "Desired frequency met");
        }

        stat.add("Events in window", events);
        stat.add("Events since startup", self.count);
        stat.add("Duration of window (s)", window);
        stat.add("Actual frequency (Hz)", frequency);
        if self.min_frequency == self.max_frequency {
            stat.add("Target frequency (Hz)", self.min_frequency);
        }
        if self.min_frequency > 0.0 {
            stat.add("Minimum acceptable frequency (Hz)", min_acceptable);
        }
        if self.max_frequency.is_finite() {
            stat.add("Maximum acceptable frequency (Hz)", max_acceptable);
        }
        stat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn t(ms: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + TimeDelta::milliseconds(ms)
    }

    fn ticks(mon: &mut FrequencyMonitor, n: usize) {
        for _ in 0..n {
            mon.tick();
        }
    }

    #[test]
    fn silent_stream_is_an_error() {
        let mut mon = FrequencyMonitor::new("MCU status", 50.0, 50.0, t(0));
        let stat = mon.diagnostic(t(1000));
        assert_eq!(stat.name, "MCU status");
        assert_eq!(stat.level, DiagnosticLevel::Error);
        assert_eq!(stat.message, "No events recorded.");
    }

    #[test]
    fn rate_on_target_is_ok() {
        let mut mon = FrequencyMonitor::new("MCU status", 50.0, 50.0, t(0));
        ticks(&mut mon, 50);
        let stat = mon.diagnostic(t(1000));
        assert_eq!(stat.level, DiagnosticLevel::Ok);
        assert_eq!(stat.value("Events in window"), Some("50"));
        assert_eq!(stat.value("Actual frequency (Hz)"), Some("50"));
        assert_eq!(stat.value("Target frequency (Hz)"), Some("50"));
    }

    #[test]
    fn rate_within_tolerance_is_ok() {
        let mut mon = FrequencyMonitor::new("MCU status", 50.0, 50.0, t(0));
        // 199 events over 4 s = 49.75 Hz, inside the 1% slack.
        ticks(&mut mon, 199);
        let stat = mon.diagnostic(t(4000));
        assert_eq!(stat.level, DiagnosticLevel::Ok);
    }

    #[test]
    fn slow_and_fast_streams_warn() {
        let mut slow = FrequencyMonitor::new("Drive command", 10.0, 50.0, t(0));
        ticks(&mut slow, 5);
        let stat = slow.diagnostic(t(1000));
        assert_eq!(stat.level, DiagnosticLevel::Warn);
        assert_eq!(stat.message, "Frequency too low.");

        let mut fast = FrequencyMonitor::new("Drive command", 10.0, 50.0, t(0));
        ticks(&mut fast, 80);
        let stat = fast.diagnostic(t(1000));
        assert_eq!(stat.level, DiagnosticLevel::Warn);
        assert_eq!(stat.message, "Frequency too high.");
        assert!(stat.value("Target frequency (Hz)").is_none());
    }

    #[test]
    fn window_slides_over_recent_polls() {
        let mut mon = FrequencyMonitor::new("Drive command", 10.0, 50.0, t(0));
        // Five seconds at 20 Hz fill the window.
        for second in 1..=5 {
            ticks(&mut mon, 20);
            mon.diagnostic(t(second * 1000));
        }
        assert_eq!(mon.count(), 100);

        // Then the stream stops.  The window still sees old events for a while.
        for second in 6..=9 {
            let stat = mon.diagnostic(t(second * 1000));
            assert_ne!(stat.level, DiagnosticLevel::Error, "at {second}s");
        }
        let stat = mon.diagnostic(t(10_000));
        assert_eq!(stat.level, DiagnosticLevel::Error);
        assert_eq!(stat.value("Events since startup"), Some("100"));
    }

    #[test]
    fn zero_length_window_reports_zero_frequency() {
        let mut mon = FrequencyMonitor::new("Drive command", 10.0, 50.0, t(0));
        ticks(&mut mon, 3);
        let stat = mon.diagnostic(t(0));
        assert_eq!(stat.value("Actual frequency (Hz)"), Some("0"));
        assert_eq!(stat.level, DiagnosticLevel::Warn);
    }

    #[test]
    fn unbounded_maximum_never_too_fast() {
        let mut mon = FrequencyMonitor::new("Encoders", 10.0, f64::INFINITY, t(0));
        ticks(&mut mon, 10_000);
        let stat = mon.diagnostic(t(1000));
        assert_eq!(stat.level, DiagnosticLevel::Ok);
        assert!(stat.value("Maximum acceptable frequency (Hz)").is_none());
    }
}
