use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::job::{OutcomeKind, WorkflowJob};
use super::observer::{JobObserver, TracingObserver};
use super::workflow::WorkflowRunner;
use super::WorkContext;
use crate::llm_client::LlmError;

pub const DEFAULT_WORKER_COUNT: usize = 5;

/// A fixed number of workers draining the shared queue.
///
/// A job whose workflow ran out of quota retries goes back to the end of the
/// queue with no cap on how often. Any other failure drops the job and reports
/// it to the observer.
pub struct WorkerPool {
    size: usize,
    context: WorkContext,
    runner: WorkflowRunner,
    observer: Arc<dyn JobObserver>,
}

impl WorkerPool {
    pub fn new(size: usize, context: WorkContext, runner: WorkflowRunner) -> Self {
        Self {
            size: size.max(1),
            context,
            runner,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Starts every worker. Each one stops after its current job once a value
    /// is sent on `shutdown` (or the sender is dropped).
    pub fn spawn(self, shutdown: &broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        info!(workers = self.size, "Starting worker pool");
        self.context.workers.fetch_add(self.size, Ordering::SeqCst);
        (0..self.size)
            .map(|id| {
                let worker = Worker {
                    id,
                    context: self.context.clone(),
                    runner: self.runner.clone(),
                    observer: Arc::clone(&self.observer),
                };
                let shutdown_rx = shutdown.subscribe();
                tokio::spawn(async move { worker.run(shutdown_rx).await })
            })
            .collect()
    }
}

struct Worker {
    id: usize,
    context: WorkContext,
    runner: WorkflowRunner,
    observer: Arc<dyn JobObserver>,
}

impl Worker {
    async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(worker = self.id, "Worker started");

        loop {
            let job = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                job = self.context.queue.dequeue() => job,
            };

            let job_id = job.id;
            self.context.busy_workers.fetch_add(1, Ordering::SeqCst);
            // A panicking workflow must still release its queue slot.
            if AssertUnwindSafe(self.process(job)).catch_unwind().await.is_err() {
                error!(worker = self.id, %job_id, "Workflow panicked, dropping job");
                self.context.tracker.record_drop();
            }
            self.context.busy_workers.fetch_sub(1, Ordering::SeqCst);
            self.context.queue.task_done();
        }

        info!(worker = self.id, "Worker shutting down");
    }

    async fn process(&self, mut job: WorkflowJob) {
        let tracker = &self.context.tracker;
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            worker = self.id,
            job_id = %job.id,
            attempt = job.attempts() + 1,
            items = job.item_count(),
            "Processing workflow"
        );

        match self.runner.run(&job).await {
            Ok(output) => {
                let elapsed = started.elapsed();
                job.record(started_at, elapsed, OutcomeKind::Completed, None);
                tracker.record_completion(elapsed);
                self.observer.on_completed(&job, &output).await;
            }
            Err(LlmError::QuotaExceeded(signal)) => {
                job.record(
                    started_at,
                    started.elapsed(),
                    OutcomeKind::RateLimited,
                    Some(signal.message.clone()),
                );
                tracker.record_requeue();
                warn!(
                    worker = self.id,
                    job_id = %job.id,
                    attempts = job.attempts(),
                    retry_after_secs = ?signal.retry_after_secs,
                    "Workflow rate limited, re-enqueuing"
                );
                // Back on the queue before task_done so `join` never sees zero in between.
                self.context.queue.enqueue(job);
            }
            Err(error) => {
                job.record(
                    started_at,
                    started.elapsed(),
                    OutcomeKind::Failed,
                    Some(error.to_string()),
                );
                tracker.record_drop();
                self.observer.on_dropped(&job, &error).await;
            }
        }
    }
}
