use async_trait::async_trait;
use tracing::{error, info};

use super::job::{WorkflowJob, WorkflowOutput};
use crate::llm_client::LlmError;

/// Receives the terminal outcome of every workflow job.
///
/// `on_dropped` is the only place a job that failed for a non-quota reason is
/// seen again. Implementations that care about lost work (dead-letter storage,
/// alerting) hook in here.
#[async_trait]
pub trait JobObserver: Send + Sync {
    async fn on_completed(&self, job: &WorkflowJob, output: &WorkflowOutput);

    async fn on_dropped(&self, job: &WorkflowJob, error: &LlmError);
}

/// Default observer: logs and forgets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

#[async_trait]
impl JobObserver for TracingObserver {
    async fn on_completed(&self, job: &WorkflowJob, output: &WorkflowOutput) {
        info!(
            job_id = %job.id,
            attempts = job.attempts(),
            items = output.items.len(),
            "Workflow completed"
        );
    }

    async fn on_dropped(&self, job: &WorkflowJob, error: &LlmError) {
        error!(
            job_id = %job.id,
            attempts = job.attempts(),
            kind = ?error.kind(),
            error = %error,
            "Workflow dropped"
        );
    }
}
