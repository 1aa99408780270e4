//! Retry policies for quota-limited provider calls.
//!
//! Two strategies share one interface:
//! - `HonorDelayPolicy` sleeps for whatever the provider's RetryInfo asked for,
//!   plus a safety margin, and keeps retrying.
//! - `BackoffPolicy` ignores the hint and backs off exponentially with jitter,
//!   giving up after a fixed attempt count or elapsed budget.
//!
//! Both only ever see `RateLimitSignal`s. Every other failure bypasses the policy.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{RateLimitSignal, RetryAttempt, DEFAULT_RETRY_DELAY_SECS};

/// Which policy the pipeline runs with. Chosen once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    HonorDelay,
    Exponential,
}

impl FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "honor_delay" | "honor-delay" | "retry_after" => Ok(RetryStrategy::HonorDelay),
            "exponential" | "exponential_backoff" | "backoff" => Ok(RetryStrategy::Exponential),
            other => Err(format!(
                "unknown retry strategy '{other}' (expected 'honor_delay' or 'exponential')"
            )),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Honor-provider-delay
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct HonorDelayPolicy {
    /// Added on top of the provider hint so we land after the refill, not on it.
    pub safety_margin: Duration,
    /// Wait used when the provider gave no hint.
    pub default_delay: Duration,
    /// Hard ceiling on attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for HonorDelayPolicy {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(1),
            default_delay: Duration::from_secs_f64(DEFAULT_RETRY_DELAY_SECS),
            max_attempts: None,
        }
    }
}

impl HonorDelayPolicy {
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn wait_for(&self, signal: &RateLimitSignal) -> Duration {
        match signal.retry_after_secs {
            Some(secs) => Duration::try_from_secs_f64(secs)
                .ok()
                .and_then(|hint| hint.checked_add(self.safety_margin))
                .unwrap_or(self.default_delay),
            None => self.default_delay,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Exponential backoff with jitter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Upper bound (exclusive) of the uniform jitter added to every wait.
    pub jitter: Duration,
    pub max_attempts: u32,
    /// Wall-clock budget measured from the first attempt.
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
            jitter: Duration::from_secs(2),
            max_attempts: 6,
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^(attempt-1), cap)`, before jitter.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.max(1) - 1;
        let factor = 2u32.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.cap)
    }

    fn jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return Duration::ZERO;
        }
        let secs = rand::rng().random_range(0.0..self.jitter.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn exhausted(&self, attempt: u32, elapsed: Duration) -> bool {
        attempt >= self.max_attempts || elapsed >= self.max_elapsed
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Policy facade
// ────────────────────────────────────────────────────────────────────────────

/// A retry strategy for quota rejections.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryPolicy {
    HonorDelay(HonorDelayPolicy),
    Backoff(BackoffPolicy),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::HonorDelay(HonorDelayPolicy::default())
    }
}

impl RetryPolicy {
    /// Builds the policy for a configured strategy. `max_attempts` only applies
    /// to the honor-delay variant; the backoff variant has its own fixed cap.
    pub fn from_strategy(strategy: RetryStrategy, max_attempts: Option<u32>) -> Self {
        match strategy {
            RetryStrategy::HonorDelay => RetryPolicy::HonorDelay(
                HonorDelayPolicy::default().with_max_attempts(max_attempts),
            ),
            RetryStrategy::Exponential => RetryPolicy::Backoff(BackoffPolicy::default()),
        }
    }

    pub fn strategy(&self) -> RetryStrategy {
        match self {
            RetryPolicy::HonorDelay(_) => RetryStrategy::HonorDelay,
            RetryPolicy::Backoff(_) => RetryStrategy::Exponential,
        }
    }

    /// Decides what happens after attempt number `attempt` (1-based) was rejected
    /// with `signal`, `elapsed` after the first attempt started.
    ///
    /// Returns `None` when the stop condition is met and the signal must surface.
    pub fn plan(
        &self,
        attempt: u32,
        elapsed: Duration,
        signal: &RateLimitSignal,
    ) -> Option<RetryAttempt> {
        let wait = match self {
            RetryPolicy::HonorDelay(policy) => {
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    return None;
                }
                policy.wait_for(signal)
            }
            RetryPolicy::Backoff(policy) => {
                if policy.exhausted(attempt, elapsed) {
                    return None;
                }
                policy.base_delay(attempt) + policy.jitter()
            }
        };

        Some(RetryAttempt {
            attempt_number: attempt,
            wait,
            cause: signal.clone(),
        })
    }
}
