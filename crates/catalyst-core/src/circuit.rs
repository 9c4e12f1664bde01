//! Circuit breaker guarding against runaway task-failure loops (spec 4.1.8).
//!
//! Tracks consecutive task failures plan-wide; once the threshold trips,
//! dispatch is paused for a cooldown window instead of burning further
//! agent invocations against a plan that is clearly stuck.

use std::time::{Duration, SystemTime};

const DEFAULT_THRESHOLD: u32 = 3;
const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(300);

/// Plan-wide failure circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitBreaker {
    consecutive_failures: u32,
    opened_at: Option<SystemTime>,
    threshold: u32,
    reset_timeout: Duration,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
            threshold: DEFAULT_THRESHOLD,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
        }
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            opened_at: None,
            threshold,
            reset_timeout,
        }
    }

    /// Record a task failure. Opens the circuit once `threshold`
    /// consecutive failures have been observed.
    pub fn record_failure(&mut self, now: SystemTime) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold && self.opened_at.is_none() {
            self.opened_at = Some(now);
        }
    }

    /// Record a task success; resets the consecutive-failure count and
    /// closes the circuit.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// `Some(remaining)` while the circuit is open, `None` once it has
    /// been open for at least `reset_timeout` (auto half-opens) or it was
    /// never opened.
    pub fn remaining_cooldown(&self, now: SystemTime) -> Option<Duration> {
        let opened_at = self.opened_at?;
        let elapsed = now.duration_since(opened_at).unwrap_or(Duration::ZERO);
        if elapsed >= self.reset_timeout {
            None
        } else {
            Some(self.reset_timeout - elapsed)
        }
    }

    /// True while dispatch should be refused.
    pub fn is_open(&self, now: SystemTime) -> bool {
        self.remaining_cooldown(now).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_threshold() {
        let mut cb = CircuitBreaker::default();
        let now = SystemTime::now();
        cb.record_failure(now);
        cb.record_failure(now);
        assert!(!cb.is_open(now));
    }

    #[test]
    fn opens_at_threshold() {
        let mut cb = CircuitBreaker::default();
        let now = SystemTime::now();
        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_failure(now);
        assert!(cb.is_open(now));
    }

    #[test]
    fn success_resets_consecutive_count() {
        let mut cb = CircuitBreaker::default();
        let now = SystemTime::now();
        cb.record_failure(now);
        cb.record_failure(now);
        cb.record_success();
        cb.record_failure(now);
        assert!(!cb.is_open(now));
    }

    #[test]
    fn closes_after_reset_timeout_elapses() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let opened_at = SystemTime::UNIX_EPOCH;
        cb.record_failure(opened_at);
        assert!(cb.is_open(opened_at + Duration::from_secs(5)));
        assert!(!cb.is_open(opened_at + Duration::from_secs(11)));
    }

    #[test]
    fn remaining_cooldown_counts_down() {
        let mut cb = CircuitBreaker::new(1, Duration::from_secs(10));
        let opened_at = SystemTime::UNIX_EPOCH;
        cb.record_failure(opened_at);
        let remaining = cb.remaining_cooldown(opened_at + Duration::from_secs(4)).unwrap();
        assert_eq!(remaining, Duration::from_secs(6));
    }
}
