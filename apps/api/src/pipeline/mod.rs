//! The cover-letter workflow pipeline: jobs, the queue they wait in, the
//! workers that drain it, and the counters that describe how it went.

pub mod handlers;
pub mod job;
pub mod observer;
pub mod prompts;
pub mod queue;
pub mod tracker;
pub mod worker;
pub mod workflow;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use uuid::Uuid;

pub use job::{WorkflowJob, WorkflowOutput, WorkflowRequest};
pub use observer::{JobObserver, TracingObserver};
pub use queue::TaskQueue;
pub use tracker::PerformanceTracker;
pub use worker::WorkerPool;
pub use workflow::WorkflowRunner;

/// State shared by the control plane and the worker pool.
#[derive(Debug, Clone, Default)]
pub struct WorkContext {
    pub queue: Arc<TaskQueue>,
    pub tracker: Arc<PerformanceTracker>,
    /// Workers currently running a workflow.
    pub busy_workers: Arc<AtomicUsize>,
    /// Workers spawned by the pool.
    pub workers: Arc<AtomicUsize>,
}

impl WorkContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and enqueues a new workflow. Returns the job id.
    pub fn submit(&self, request: WorkflowRequest) -> Uuid {
        let job = WorkflowJob::new(request);
        let id = job.id;
        self.tracker.record_submission();
        self.queue.enqueue(job);
        id
    }

    pub fn busy_workers(&self) -> usize {
        self.busy_workers.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.load(Ordering::SeqCst)
    }

    /// Nothing queued and no workflow running.
    pub fn is_idle(&self) -> bool {
        self.queue.unfinished() == 0
    }
}
