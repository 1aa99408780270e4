use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use super::job::{WorkflowJob, WorkflowOutput};
use super::prompts;
use crate::llm_client::{LlmError, Provider};
use crate::retry::CallExecutor;

const ANALYZE_CALL: &str = "analyze_job_posting";
const SEARCH_QUERY_CALL: &str = "generate_search_query";
const ITEM_CALL: &str = "generate_cover_letter_item";

/// Runs one cover-letter workflow: analyze the posting, derive search queries,
/// then generate every item concurrently.
///
/// Every provider call goes through the same `CallExecutor`, so all of them share
/// one retry policy and one set of counters.
#[derive(Clone)]
pub struct WorkflowRunner {
    provider: Arc<dyn Provider>,
    executor: CallExecutor,
}

impl WorkflowRunner {
    pub fn new(provider: Arc<dyn Provider>, executor: CallExecutor) -> Self {
        Self { provider, executor }
    }

    /// Issues `2 + item_count` provider calls on success. Fails on the first
    /// call that fails after retries; outstanding item calls are cancelled and
    /// nothing from a failed run is kept.
    pub async fn run(&self, job: &WorkflowJob) -> Result<WorkflowOutput, LlmError> {
        let request = &job.request;
        let started = Instant::now();

        let analysis = self
            .call(
                ANALYZE_CALL,
                &prompts::build_analyze_prompt(&request.job_posting),
                &prompts::analysis_schema(),
            )
            .await?;
        debug!(job_id = %job.id, "Job posting analyzed");

        let search_queries = self
            .call(
                SEARCH_QUERY_CALL,
                &prompts::build_search_query_prompt(&analysis, &request.items),
                &prompts::search_query_schema(),
            )
            .await?;
        debug!(job_id = %job.id, "Search queries generated");

        let item_schema = prompts::item_schema();
        let item_schema = &item_schema;
        let analysis_ref = &analysis;
        // The first failed item drops its siblings mid-flight.
        let items = try_join_all(request.items.iter().map(|item| async move {
            let prompt = prompts::build_item_prompt(analysis_ref, item, &request.references);
            self.call(ITEM_CALL, &prompt, item_schema).await
        }))
        .await?;

        info!(
            job_id = %job.id,
            items = items.len(),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Workflow finished"
        );

        Ok(WorkflowOutput {
            analysis,
            search_queries,
            items,
        })
    }

    async fn call(&self, label: &str, prompt: &str, schema: &Value) -> Result<Value, LlmError> {
        self.executor
            .execute(label, || self.provider.generate_content(prompt, schema))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::job::WorkflowRequest;
    use crate::pipeline::tracker::PerformanceTracker;
    use crate::retry::{HonorDelayPolicy, RateLimitSignal, RetryPolicy};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Answers every prompt after a fixed latency. Item prompts whose question
    /// contains `fail_on` return `EmptyContent` immediately instead.
    struct ScriptedProvider {
        latency: Duration,
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
        quota_failures: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(latency: Duration) -> Self {
            Self {
                latency,
                calls: AtomicUsize::new(0),
                fail_on: None,
                quota_failures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate_content(&self, prompt: &str, _schema: &Value) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self
                .quota_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(LlmError::QuotaExceeded(RateLimitSignal::new(
                    "Rate limit exceeded",
                    Some(2.0),
                )));
            }
            if let Some(marker) = self.fail_on {
                if prompt.contains(marker) {
                    return Err(LlmError::EmptyContent);
                }
            }
            sleep(self.latency).await;
            Ok(json!({"ok": true}))
        }
    }

    fn runner(provider: Arc<ScriptedProvider>, tracker: Arc<PerformanceTracker>) -> WorkflowRunner {
        let executor = CallExecutor::new(RetryPolicy::HonorDelay(HonorDelayPolicy::default()), tracker);
        WorkflowRunner::new(provider, executor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_items_issue_five_calls_with_concurrent_fan_out() {
        let provider = Arc::new(ScriptedProvider::new(Duration::from_secs(1)));
        let tracker = Arc::new(PerformanceTracker::new());
        let runner = runner(Arc::clone(&provider), Arc::clone(&tracker));
        let job = WorkflowJob::new(WorkflowRequest::synthetic(3));

        let started = Instant::now();
        let output = runner.run(&job).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.provider_calls(), 5);
        assert_eq!(output.items.len(), 3);
        // analyze (1s) + search (1s) + max(item) (1s), not 1 + 1 + 3.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_items_issue_two_calls() {
        let provider = Arc::new(ScriptedProvider::new(Duration::from_millis(10)));
        let runner = runner(Arc::clone(&provider), Arc::new(PerformanceTracker::new()));
        let job = WorkflowJob::new(WorkflowRequest::synthetic(0));

        let output = runner.run(&job).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert!(output.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_failure_fails_workflow_without_waiting_for_siblings() {
        let provider = Arc::new(ScriptedProvider {
            fail_on: Some("Question: Question 2:"),
            ..ScriptedProvider::new(Duration::from_secs(10))
        });
        let runner = runner(Arc::clone(&provider), Arc::new(PerformanceTracker::new()));
        let job = WorkflowJob::new(WorkflowRequest::synthetic(3));

        let started = Instant::now();
        let result = runner.run(&job).await;

        assert!(matches!(result, Err(LlmError::EmptyContent)));
        // Analyze and search took 10s each; the failing item returned at once.
        assert_eq!(started.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quota_rejections_are_retried_inside_the_workflow() {
        let provider = Arc::new(ScriptedProvider {
            quota_failures: AtomicUsize::new(2),
            ..ScriptedProvider::new(Duration::from_millis(100))
        });
        let tracker = Arc::new(PerformanceTracker::new());
        let runner = runner(Arc::clone(&provider), Arc::clone(&tracker));
        let job = WorkflowJob::new(WorkflowRequest::synthetic(1));

        runner.run(&job).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
        assert_eq!(tracker.retries(), 2);
    }
}
