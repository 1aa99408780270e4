//! Pipeline counters shared by every worker.
//!
//! Counters are plain atomics. Durations and timestamps sit behind a mutex that is
//! never held across an await.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Default)]
struct Timeline {
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    finished_at: Option<DateTime<Utc>>,
    finished: Option<Instant>,
    workflow_times: Vec<Duration>,
}

#[derive(Debug, Default)]
pub struct PerformanceTracker {
    total_requests: AtomicU64,
    completed_requests: AtomicU64,
    /// Failed attempts, including ones that went back to the queue.
    failed_requests: AtomicU64,
    /// Jobs discarded after a non-quota failure.
    dropped_requests: AtomicU64,
    retry_counts: AtomicU64,
    provider_call_counts: AtomicU64,
    queue_reinsert_counts: AtomicU64,
    /// Submitted but not yet completed or dropped. Survives `reset`.
    in_flight: AtomicU64,
    timeline: Mutex<Timeline>,
}

/// Point-in-time view served by `/performance-status`.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    pub total_requests: u64,
    pub completed_requests: u64,
    pub failed_requests: u64,
    pub dropped_requests: u64,
    pub pending_requests: u64,
    pub queue_size: usize,
    pub provider_calls: u64,
    pub retry_counts: u64,
    pub queue_reinsert_counts: u64,
    pub average_workflow_secs: f64,
    pub min_workflow_secs: Option<f64>,
    pub max_workflow_secs: Option<f64>,
    pub throughput_per_sec: f64,
    pub is_complete: bool,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn timeline(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A workflow was submitted. The first submission starts the clock.
    pub fn record_submission(&self) {
        {
            let mut timeline = self.timeline();
            if timeline.started.is_none() {
                timeline.started = Some(Instant::now());
                timeline.started_at = Some(Utc::now());
                info!("Performance measurement started");
            }
            timeline.finished = None;
            timeline.finished_at = None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.total_requests.fetch_add(1, Ordering::SeqCst);
    }

    /// Called before every provider attempt, retries included.
    pub fn record_provider_call(&self) {
        self.provider_call_counts.fetch_add(1, Ordering::SeqCst);
    }

    /// Called on every quota rejection.
    pub fn record_retry(&self) {
        self.retry_counts.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_completion(&self, duration: Duration) {
        self.timeline().workflow_times.push(duration);
        self.completed_requests.fetch_add(1, Ordering::SeqCst);
        self.settle();
        self.finish_if_idle();
    }

    /// A workflow ran out of retries and was put back on the queue.
    pub fn record_requeue(&self) {
        self.failed_requests.fetch_add(1, Ordering::SeqCst);
        self.queue_reinsert_counts.fetch_add(1, Ordering::SeqCst);
    }

    /// A workflow failed for a non-quota reason and was discarded.
    pub fn record_drop(&self) {
        self.failed_requests.fetch_add(1, Ordering::SeqCst);
        self.dropped_requests.fetch_add(1, Ordering::SeqCst);
        self.settle();
        self.finish_if_idle();
    }

    fn settle(&self) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::SeqCst)
    }

    pub fn completed_requests(&self) -> u64 {
        self.completed_requests.load(Ordering::SeqCst)
    }

    pub fn dropped_requests(&self) -> u64 {
        self.dropped_requests.load(Ordering::SeqCst)
    }

    pub fn provider_calls(&self) -> u64 {
        self.provider_call_counts.load(Ordering::SeqCst)
    }

    pub fn retries(&self) -> u64 {
        self.retry_counts.load(Ordering::SeqCst)
    }

    pub fn requeues(&self) -> u64 {
        self.queue_reinsert_counts.load(Ordering::SeqCst)
    }

    /// Submitted workflows that have neither completed nor been dropped,
    /// including ones submitted before the last reset.
    pub fn outstanding(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn finish_if_idle(&self) {
        if self.total_requests() == 0 || self.outstanding() > 0 {
            return;
        }
        {
            let mut timeline = self.timeline();
            if timeline.finished.is_some() {
                return;
            }
            timeline.finished = Some(Instant::now());
            timeline.finished_at = Some(Utc::now());
        }
        self.log_summary();
    }

    pub fn snapshot(&self, queue_size: usize) -> PerformanceSnapshot {
        let timeline = self.timeline();
        let elapsed = match (timeline.started, timeline.finished) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        };
        let times = &timeline.workflow_times;
        let average = if times.is_empty() {
            0.0
        } else {
            times.iter().map(Duration::as_secs_f64).sum::<f64>() / times.len() as f64
        };
        let completed = self.completed_requests();
        let throughput = if elapsed.is_zero() {
            0.0
        } else {
            completed as f64 / elapsed.as_secs_f64()
        };
        let pending = self.outstanding();

        PerformanceSnapshot {
            started_at: timeline.started_at,
            finished_at: timeline.finished_at,
            elapsed_secs: elapsed.as_secs_f64(),
            total_requests: self.total_requests(),
            completed_requests: completed,
            failed_requests: self.failed_requests.load(Ordering::SeqCst),
            dropped_requests: self.dropped_requests(),
            pending_requests: pending,
            queue_size,
            provider_calls: self.provider_calls(),
            retry_counts: self.retries(),
            queue_reinsert_counts: self.requeues(),
            average_workflow_secs: average,
            min_workflow_secs: times.iter().min().map(Duration::as_secs_f64),
            max_workflow_secs: times.iter().max().map(Duration::as_secs_f64),
            throughput_per_sec: throughput,
            is_complete: self.total_requests() > 0 && pending == 0 && queue_size == 0,
        }
    }

    /// Zeroes every reported counter and forgets all durations. Workflows still in
    /// flight stay outstanding.
    pub fn reset(&self) {
        *self.timeline() = Timeline::default();
        for counter in [
            &self.total_requests,
            &self.completed_requests,
            &self.failed_requests,
            &self.dropped_requests,
            &self.retry_counts,
            &self.provider_call_counts,
            &self.queue_reinsert_counts,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    fn log_summary(&self) {
        let s = self.snapshot(0);
        info!(
            total_secs = s.elapsed_secs,
            total = s.total_requests,
            completed = s.completed_requests,
            failed = s.failed_requests,
            dropped = s.dropped_requests,
            avg_workflow_secs = s.average_workflow_secs,
            throughput = s.throughput_per_sec,
            provider_calls = s.provider_calls,
            retries = s.retry_counts,
            requeues = s.queue_reinsert_counts,
            "All submitted workflows settled"
        );
    }
}
