//! Retry layer for provider calls.
//!
//! `RateLimitSignal` is what the provider hands back when the per-minute quota is
//! exhausted. `RetryPolicy` decides whether and how long to wait before the next
//! attempt, and `CallExecutor` drives one call through a policy.

pub mod executor;
pub mod policy;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub use executor::CallExecutor;
pub use policy::{BackoffPolicy, HonorDelayPolicy, RetryPolicy, RetryStrategy};

/// Delay applied when the provider rejects a call without a usable hint.
pub const DEFAULT_RETRY_DELAY_SECS: f64 = 1.0;

/// Quota exhaustion reported by the provider (HTTP 429).
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{message}")]
pub struct RateLimitSignal {
    pub message: String,
    /// Seconds the provider asked us to wait. `None` when no hint was given.
    pub retry_after_secs: Option<f64>,
}

impl RateLimitSignal {
    pub fn new(message: impl Into<String>, retry_after_secs: Option<f64>) -> Self {
        Self {
            message: message.into(),
            // A hint that does not fit in a Duration counts as no hint at all.
            retry_after_secs: retry_after_secs
                .filter(|secs| Duration::try_from_secs_f64(*secs).is_ok()),
        }
    }
}

/// One planned re-attempt. Produced by a policy right before it sleeps.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryAttempt {
    /// The attempt that just failed, starting at 1.
    pub attempt_number: u32,
    pub wait: Duration,
    pub cause: RateLimitSignal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_keeps_provider_hint() {
        let signal = RateLimitSignal::new("quota", Some(12.0));
        assert_eq!(signal.retry_after_secs, Some(12.0));
    }

    #[test]
    fn test_signal_discards_non_finite_hint() {
        assert_eq!(RateLimitSignal::new("quota", Some(f64::NAN)).retry_after_secs, None);
        assert_eq!(RateLimitSignal::new("quota", Some(f64::INFINITY)).retry_after_secs, None);
    }

    #[test]
    fn test_signal_discards_negative_hint() {
        let signal = RateLimitSignal::new("quota", Some(-3.0));
        assert_eq!(signal.retry_after_secs, None);
    }

    #[test]
    fn test_signal_discards_hint_too_large_for_a_duration() {
        assert_eq!(RateLimitSignal::new("quota", Some(1e20)).retry_after_secs, None);
    }

    #[test]
    fn test_signal_displays_message() {
        let signal = RateLimitSignal::new("Rate limit exceeded", Some(2.0));
        assert_eq!(signal.to_string(), "Rate limit exceeded");
    }
}
