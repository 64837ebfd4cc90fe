use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ErrorClass};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Failure classes that end the attempt sequence immediately.
    /// Empty means every failure is retried up to `max_attempts`.
    #[serde(default)]
    pub non_retryable: BTreeSet<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            non_retryable: BTreeSet::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.multiplier = multiplier;
        self.max_delay = max_delay;
        self
    }

    /// Marks a failure class as permanent.
    pub fn never_retry(mut self, class: ErrorClass) -> Self {
        self.non_retryable.insert(class);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.multiplier));
        }
        if self.max_delay < self.base_delay {
            return Err(ConfigError::MaxDelayBelowBase {
                base_ms: self.base_delay.as_millis(),
                max_ms: self.max_delay.as_millis(),
            });
        }
        Ok(())
    }

    /// Delay for a given 1-indexed attempt:
    /// `min(base_delay * multiplier^(attempt - 1), max_delay)`.
    ///
    /// The executor waits `delay_for_attempt(k)` after attempt `k` fails and
    /// before attempt `k + 1` starts.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw_nanos = self.base_delay.as_nanos() as f64 * self.multiplier.powi(exponent);
        let max_nanos = self.max_delay.as_nanos() as f64;

        if !raw_nanos.is_finite() || raw_nanos >= max_nanos {
            self.max_delay
        } else {
            Duration::from_nanos(raw_nanos as u64)
        }
    }

    /// Backoff after attempt `k`, stretched to honor a server hint such as
    /// `Retry-After`. Never exceeds `max_delay`.
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match hint {
            Some(hint) if hint > backoff => hint.min(self.max_delay),
            _ => backoff,
        }
    }

    pub fn is_retryable(&self, class: ErrorClass) -> bool {
        !self.non_retryable.contains(&class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, multiplier: f64, max_ms: u64) -> RetryPolicy {
        RetryPolicy::default().with_backoff(
            Duration::from_millis(base_ms),
            multiplier,
            Duration::from_millis(max_ms),
        )
    }

    #[test]
    fn default_values() {
        let p = RetryPolicy::default();
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.base_delay, Duration::from_millis(1000));
        assert_eq!(p.multiplier, 2.0);
        assert!(p.non_retryable.is_empty());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn exponential_delays_follow_formula() {
        let p = policy(100, 2.0, 10_000);
        let expected = [100, 200, 400, 800, 1600];
        for (k, ms) in (1..=5).zip(expected) {
            assert_eq!(p.delay_for_attempt(k), Duration::from_millis(ms), "attempt {k}");
        }
    }

    #[test]
    fn server_hint_stretches_but_never_exceeds_cap() {
        let p = policy(100, 2.0, 5000);
        assert_eq!(p.delay_with_hint(1, None), Duration::from_millis(100));
        assert_eq!(
            p.delay_with_hint(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            p.delay_with_hint(3, Some(Duration::from_millis(50))),
            Duration::from_millis(400)
        );
        assert_eq!(
            p.delay_with_hint(1, Some(Duration::from_secs(120))),
            Duration::from_millis(5000)
        );
    }

    #[test]
    fn delays_are_capped_at_max() {
        let p = policy(1000, 3.0, 5000);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(p.delay_for_attempt(2), Duration::from_millis(3000));
        assert_eq!(p.delay_for_attempt(3), Duration::from_millis(5000));
        assert_eq!(p.delay_for_attempt(40), Duration::from_millis(5000));
        assert_eq!(p.delay_for_attempt(u32::MAX), Duration::from_millis(5000));
    }

    #[test]
    fn multiplier_of_one_is_fixed_delay() {
        let p = policy(250, 1.0, 1000);
        assert_eq!(p.delay_for_attempt(1), Duration::from_millis(250));
        assert_eq!(p.delay_for_attempt(7), Duration::from_millis(250));
    }

    #[test]
    fn validation_rejects_bad_policies() {
        assert_eq!(
            RetryPolicy::default().with_max_attempts(0).validate(),
            Err(ConfigError::ZeroAttempts)
        );
        assert!(matches!(
            policy(100, 0.5, 1000).validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            policy(100, f64::NAN, 1000).validate(),
            Err(ConfigError::InvalidMultiplier(_))
        ));
        assert!(matches!(
            policy(2000, 2.0, 1000).validate(),
            Err(ConfigError::MaxDelayBelowBase { .. })
        ));
    }

    #[test]
    fn non_retryable_classes() {
        let p = RetryPolicy::default().never_retry(ErrorClass::Validation);
        assert!(!p.is_retryable(ErrorClass::Validation));
        assert!(p.is_retryable(ErrorClass::ServerFault));
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "max_attempts": 4,
            "base_delay": { "secs": 0, "nanos": 500000000 },
            "multiplier": 1.5,
            "max_delay": { "secs": 10, "nanos": 0 },
            "non_retryable": ["authentication"]
        }"#;
        let p: RetryPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(p.max_attempts, 4);
        assert_eq!(p.base_delay, Duration::from_millis(500));
        assert!(p.non_retryable.contains(&ErrorClass::Authentication));
    }
}
