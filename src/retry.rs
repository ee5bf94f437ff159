//! Retry eligibility and exponential backoff with additive jitter.
//!
//! A [`RetryPolicy`] is pure configuration: it decides, for a failed attempt,
//! whether another attempt is allowed and how long to wait before it. The
//! request loop in [`crate::DeliveryClient`] owns the sleeping.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::{
    category::{classify, ErrorCategory},
    DeliveryError,
};

/// Retry configuration, fixed for the lifetime of a client.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay, doubled for every attempt already made.
    pub backoff_factor: Duration,
    /// Upper bound of the exponential delay.
    pub max_backoff: Duration,
    /// Upper bound of a server-provided `Retry-After` wait.
    pub max_retry_after: Duration,
    /// Lower bound of the jitter fraction added on top of the delay.
    pub jitter_min: f64,
    /// Upper bound of the jitter fraction added on top of the delay.
    pub jitter_max: f64,
    /// Floor applied after jitter.
    pub min_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_retry_after: Duration::from_secs(60),
            jitter_min: 0.1,
            jitter_max: 0.3,
            min_delay: Duration::from_millis(100),
        }
    }
}

/// Outcome of evaluating a failed attempt against a [`RetryPolicy`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then issue the next attempt.
    Retry {
        category: ErrorCategory,
        delay: Duration,
    },
    /// Surface the error to the caller.
    GiveUp {
        category: ErrorCategory,
        reason: String,
    },
}

impl RetryPolicy {
    /// Total number of physical attempts a logical operation may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides whether the failure of attempt `attempt` (0-based) is retried.
    pub fn decide(&self, attempt: u32, error: &DeliveryError) -> RetryDecision {
        let failure = error.failure();
        let category = classify(&failure);

        if attempt >= self.max_retries {
            return RetryDecision::GiveUp {
                category,
                reason: format!("maximum retries ({}) exhausted", self.max_retries),
            };
        }

        if !category.is_retryable() {
            return RetryDecision::GiveUp {
                category,
                reason: format!("non-retryable {category} error"),
            };
        }

        RetryDecision::Retry {
            category,
            delay: self.backoff_delay(attempt, category, failure.retry_after()),
        }
    }

    /// Delay before jitter and floor are applied.
    ///
    /// Exponential in `attempt` and capped at `max_backoff`. A rate-limited
    /// failure with a numeric `Retry-After` uses that value instead, capped at
    /// `max_retry_after`.
    pub fn base_delay(
        &self,
        attempt: u32,
        category: ErrorCategory,
        retry_after: Option<&str>,
    ) -> Duration {
        if category == ErrorCategory::RateLimit {
            if let Some(hint) = retry_after.and_then(parse_retry_after) {
                return hint.min(self.max_retry_after);
            }
        }

        let exponent = attempt.min(32) as i32;
        let seconds = self.backoff_factor.as_secs_f64() * 2f64.powi(exponent);
        if seconds >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::try_from_secs_f64(seconds).unwrap_or(self.max_backoff)
    }

    /// Full backoff: base delay plus jitter, never below `min_delay`.
    pub fn backoff_delay(
        &self,
        attempt: u32,
        category: ErrorCategory,
        retry_after: Option<&str>,
    ) -> Duration {
        let base = self.base_delay(attempt, category, retry_after);
        apply_jitter(base, self.jitter_min, self.jitter_max).max(self.min_delay)
    }
}

/// Parses a `Retry-After` value given as a positive number of seconds.
///
/// HTTP-date values are not supported and yield `None`.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let seconds = value.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds.min(f64::from(u32::MAX))))
}

/// Adds a uniformly random fraction in `[min, max]` of `delay` to `delay`.
fn apply_jitter(delay: Duration, min: f64, max: f64) -> Duration {
    let low = min.min(max).max(0.0);
    let high = min.max(max).max(0.0);
    if high == 0.0 {
        return delay;
    }

    let fraction = if low == high {
        low
    } else {
        rand::rng().random_range(low..=high)
    };
    let extra =
        Duration::try_from_secs_f64(delay.as_secs_f64() * fraction).unwrap_or(Duration::ZERO);
    delay.saturating_add(extra)
}

/// One physical exchange within a logical operation.
#[derive(Clone, Copy, Debug)]
pub struct Attempt {
    /// 0-based ordinal within the logical operation.
    pub index: u32,
    pub started_at: Instant,
}

impl Attempt {
    pub(crate) fn first() -> Self {
        Self {
            index: 0,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn next(self) -> Self {
        Self {
            index: self.index + 1,
            started_at: Instant::now(),
        }
    }

    /// 1-based attempt number, as reported in logs.
    pub fn number(&self) -> u32 {
        self.index + 1
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{apply_jitter, parse_retry_after, RetryDecision, RetryPolicy};
    use crate::{DeliveryError, ErrorCategory};

    fn no_jitter() -> RetryPolicy {
        RetryPolicy {
            jitter_min: 0.0,
            jitter_max: 0.0,
            ..Default::default()
        }
    }

    fn http(status: u16, retry_after: Option<&str>) -> DeliveryError {
        DeliveryError::Http {
            status,
            body: String::new(),
            retry_after: retry_after.map(str::to_owned),
        }
    }

    #[test]
    fn exponential_backoff_doubles_until_cap() {
        let policy = no_jitter();
        let delays: Vec<_> = (0..7)
            .map(|attempt| policy.base_delay(attempt, ErrorCategory::Timeout, None))
            .collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(2));
        assert_eq!(delays[2], Duration::from_secs(4));
        assert_eq!(delays[3], Duration::from_secs(8));
        assert_eq!(delays[4], Duration::from_secs(16));
        assert_eq!(delays[5], Duration::from_secs(30));
        assert_eq!(delays[6], Duration::from_secs(30));
        assert_eq!(
            policy.base_delay(u32::MAX, ErrorCategory::Timeout, None),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn backoff_with_jitter_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 0..8 {
            let exponential = 2f64.powi(attempt as i32);
            let capped = exponential.min(30.0);
            for _ in 0..50 {
                let delay = policy
                    .backoff_delay(attempt, ErrorCategory::ServerError, None)
                    .as_secs_f64();
                assert!(delay >= capped * 1.1 - 1e-6, "attempt {attempt}: {delay}");
                assert!(delay <= capped * 1.3 + 1e-6, "attempt {attempt}: {delay}");
                assert!(delay >= 0.1);
            }
        }
    }

    #[test]
    fn tiny_delays_are_floored() {
        let policy = RetryPolicy {
            backoff_factor: Duration::from_millis(1),
            ..Default::default()
        };
        let delay = policy.backoff_delay(0, ErrorCategory::Connection, None);
        assert_eq!(delay, Duration::from_millis(100));
    }

    #[test]
    fn huge_policy_values_saturate_instead_of_overflowing() {
        let policy = RetryPolicy {
            backoff_factor: Duration::from_secs(u64::MAX / 4),
            max_backoff: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(policy.base_delay(40, ErrorCategory::Timeout, None), Duration::MAX);
        assert!(policy.backoff_delay(40, ErrorCategory::Timeout, None) >= Duration::MAX / 2);

        let capped = RetryPolicy {
            backoff_factor: Duration::from_secs(u64::MAX / 4),
            ..Default::default()
        };
        assert_eq!(
            capped.base_delay(3, ErrorCategory::ServerError, None),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn retry_after_overrides_exponential_for_rate_limits() {
        let policy = no_jitter();
        assert_eq!(
            policy.base_delay(0, ErrorCategory::RateLimit, Some("7")),
            Duration::from_secs(7)
        );
        assert_eq!(
            policy.base_delay(3, ErrorCategory::RateLimit, Some("2.5")),
            Duration::from_millis(2_500)
        );
        assert_eq!(
            policy.base_delay(0, ErrorCategory::RateLimit, Some("120")),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn unusable_retry_after_falls_back_to_exponential() {
        let policy = no_jitter();
        for hint in ["soon", "Wed, 21 Oct 2015 07:28:00 GMT", "0", "-3", "NaN", ""] {
            assert_eq!(
                policy.base_delay(2, ErrorCategory::RateLimit, Some(hint)),
                Duration::from_secs(4),
                "hint {hint:?}"
            );
        }
    }

    #[test]
    fn retry_after_is_ignored_outside_rate_limits() {
        let policy = no_jitter();
        assert_eq!(
            policy.base_delay(1, ErrorCategory::ServerError, Some("9")),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn parse_retry_after_accepts_positive_seconds_only() {
        assert_eq!(parse_retry_after(" 3 "), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_retry_after("0"), None);
        assert_eq!(parse_retry_after("inf"), None);
        assert_eq!(parse_retry_after("Fri, 31 Dec 1999 23:59:59 GMT"), None);
    }

    #[test]
    fn jitter_is_only_ever_added() {
        let base = Duration::from_secs(10);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let jittered = apply_jitter(base, 0.1, 0.3);
            let secs = jittered.as_secs_f64();
            assert!(secs >= 11.0 - 1e-6, "{secs}");
            assert!(secs <= 13.0 + 1e-6, "{secs}");
            seen.insert(jittered.as_micros());
        }
        assert!(seen.len() > 1, "jitter should create variation");

        assert_eq!(apply_jitter(base, -0.5, 0.0), base);
    }

    #[test]
    fn decide_stops_at_max_retries() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..Default::default()
        };
        let err = http(503, None);

        assert!(matches!(
            policy.decide(0, &err),
            RetryDecision::Retry {
                category: ErrorCategory::ServerError,
                ..
            }
        ));
        assert!(matches!(policy.decide(1, &err), RetryDecision::Retry { .. }));
        match policy.decide(2, &err) {
            RetryDecision::GiveUp { reason, category } => {
                assert_eq!(category, ErrorCategory::ServerError);
                assert!(reason.contains("maximum retries"));
            }
            RetryDecision::Retry { .. } => panic!("must not retry past max_retries"),
        }
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn decide_never_retries_client_errors() {
        let policy = RetryPolicy::default();
        match policy.decide(0, &http(400, None)) {
            RetryDecision::GiveUp { reason, category } => {
                assert_eq!(category, ErrorCategory::ClientError);
                assert!(reason.contains("non-retryable"));
            }
            RetryDecision::Retry { .. } => panic!("client errors must not be retried"),
        }
        assert!(matches!(
            policy.decide(0, &DeliveryError::Config("bad".to_owned())),
            RetryDecision::GiveUp {
                category: ErrorCategory::Unknown,
                ..
            }
        ));
    }

    #[test]
    fn decide_uses_retry_after_for_rate_limits() {
        let policy = no_jitter();
        assert_eq!(
            policy.decide(0, &http(429, Some("4"))),
            RetryDecision::Retry {
                category: ErrorCategory::RateLimit,
                delay: Duration::from_secs(4),
            }
        );
    }

    #[test]
    fn zero_max_retries_never_retries() {
        let policy = RetryPolicy {
            max_retries: 0,
            ..Default::default()
        };
        assert!(matches!(
            policy.decide(0, &DeliveryError::PoolTimeout { waited_ms: 1 }),
            RetryDecision::GiveUp {
                category: ErrorCategory::Timeout,
                ..
            }
        ));
    }
}
