//! Drives a single provider call through a `RetryPolicy`.

use std::future::Future;
use std::sync::Arc;

use tokio::time::{sleep, Instant};
use tracing::warn;

use super::policy::RetryPolicy;
use crate::llm_client::LlmError;
use crate::pipeline::tracker::PerformanceTracker;

/// Wraps one outbound call with a retry policy.
///
/// Cheap to clone and safe to share between workers: the only shared mutable
/// state is the tracker's atomic counters.
#[derive(Clone)]
pub struct CallExecutor {
    policy: RetryPolicy,
    tracker: Arc<PerformanceTracker>,
}

impl CallExecutor {
    pub fn new(policy: RetryPolicy, tracker: Arc<PerformanceTracker>) -> Self {
        Self { policy, tracker }
    }

    /// Runs `call` until it succeeds, fails with a non-quota error, or the policy
    /// gives up. In the last case the final `QuotaExceeded` is returned as-is.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.tracker.record_provider_call();

            let signal = match call().await {
                Ok(value) => return Ok(value),
                Err(LlmError::QuotaExceeded(signal)) => signal,
                Err(other) => return Err(other),
            };
            self.tracker.record_retry();

            let Some(planned) = self.policy.plan(attempt, started.elapsed(), &signal) else {
                warn!(
                    call = label,
                    attempts = attempt,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Giving up on rate-limited call"
                );
                return Err(LlmError::QuotaExceeded(signal));
            };

            warn!(
                call = label,
                attempt = planned.attempt_number,
                wait_secs = planned.wait.as_secs_f64(),
                retry_after_secs = ?planned.cause.retry_after_secs,
                "Rate limited, retrying"
            );
            sleep(planned.wait).await;
        }
    }
}
