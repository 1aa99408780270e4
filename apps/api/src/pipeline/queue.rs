//! Unbounded FIFO of pending workflow jobs.
//!
//! `enqueue` never blocks. `dequeue` parks the caller until a job is available.
//! Every enqueue must be balanced by a `task_done` once the dequeued job has been
//! handled, which is what `join` waits on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;

use super::job::WorkflowJob;

#[derive(Debug, Default)]
pub struct TaskQueue {
    jobs: Mutex<VecDeque<WorkflowJob>>,
    available: Notify,
    /// Enqueued but not yet marked done.
    unfinished: AtomicUsize,
    drained: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<WorkflowJob>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a job to the back of the queue and wakes one waiting consumer.
    pub fn enqueue(&self, mut job: WorkflowJob) {
        job.enqueued_at = Utc::now();
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.jobs().push_back(job);
        self.available.notify_one();
    }

    /// Pops the front job without waiting.
    pub fn try_dequeue(&self) -> Option<WorkflowJob> {
        self.jobs().pop_front()
    }

    /// Waits until a job is available and takes it.
    pub async fn dequeue(&self) -> WorkflowJob {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent enqueue can't slip by.
            notified.as_mut().enable();

            if let Some(job) = self.try_dequeue() {
                return job;
            }
            notified.await;
        }
    }

    /// Marks one previously dequeued job as handled.
    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.drained.notify_waiters();
        }
    }

    /// Waits until every enqueued job has been marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.unfinished() == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs().is_empty()
    }

    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }
}
