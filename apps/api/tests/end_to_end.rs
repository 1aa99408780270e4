//! Whole-pipeline runs against an in-process token bucket, on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use coverletter_api::llm_client::{LlmError, Provider};
use coverletter_api::pipeline::{WorkContext, WorkerPool, WorkflowRequest, WorkflowRunner};
use coverletter_api::retry::{BackoffPolicy, CallExecutor, RateLimitSignal, RetryPolicy};
use coverletter_api::simulator::TokenBucket;

const CAPACITY: u32 = 15;
const PERIOD: Duration = Duration::from_secs(60);

/// Behaves like the simulator's `/generate` without the HTTP hop.
struct BucketProvider {
    bucket: Arc<TokenBucket>,
    latency: Duration,
}

#[async_trait]
impl Provider for BucketProvider {
    async fn generate_content(&self, _prompt: &str, _schema: &Value) -> Result<Value, LlmError> {
        if !self.bucket.consume().await {
            let status = self.bucket.status().await;
            return Err(LlmError::QuotaExceeded(RateLimitSignal::new(
                "Rate limit exceeded",
                Some(status.seconds_until_next_refill),
            )));
        }
        tokio::time::sleep(self.latency).await;
        Ok(json!({"generated_text": "ok"}))
    }
}

async fn run_pipeline(policy: RetryPolicy, workflows: usize) -> WorkContext {
    let bucket = TokenBucket::start(CAPACITY, PERIOD);
    let context = WorkContext::new();
    let executor = CallExecutor::new(policy, Arc::clone(&context.tracker));
    let provider = BucketProvider {
        bucket,
        latency: Duration::from_secs(3),
    };
    let runner = WorkflowRunner::new(Arc::new(provider), executor);

    let (shutdown_tx, _) = broadcast::channel(1);
    let workers = WorkerPool::new(5, context.clone(), runner).spawn(&shutdown_tx);

    for _ in 0..workflows {
        context.submit(WorkflowRequest::synthetic(0));
    }

    tokio::time::timeout(Duration::from_secs(3600), context.queue.join())
        .await
        .expect("pipeline did not drain within an hour of simulated time");

    shutdown_tx.send(()).unwrap();
    for worker in workers {
        worker.await.unwrap();
    }
    context
}

#[tokio::test(start_paused = true)]
async fn backoff_pipeline_completes_every_workflow_through_requeue() {
    let context = run_pipeline(RetryPolicy::Backoff(BackoffPolicy::default()), 20).await;
    let tracker = &context.tracker;

    assert_eq!(tracker.completed_requests(), 20);
    assert_eq!(tracker.dropped_requests(), 0);
    assert!(tracker.provider_calls() >= 20);
    assert!(tracker.retries() >= 5);
    // 40 calls at 15 per minute cannot fit into backoff's 60 second budget.
    assert!(tracker.requeues() >= 1);

    let snapshot = tracker.snapshot(context.queue.len());
    assert!(snapshot.is_complete);
    assert_eq!(snapshot.pending_requests, 0);
    assert!(context.is_idle());
}

#[tokio::test(start_paused = true)]
async fn honor_delay_pipeline_completes_without_requeue() {
    let context = run_pipeline(RetryPolicy::default(), 20).await;
    let tracker = &context.tracker;

    assert_eq!(tracker.completed_requests(), 20);
    assert_eq!(tracker.requeues(), 0);
    assert!(tracker.retries() >= 5);
    // Every successful call consumed a token: 20 workflows x 2 calls.
    assert_eq!(tracker.provider_calls() - tracker.retries(), 40);
}
