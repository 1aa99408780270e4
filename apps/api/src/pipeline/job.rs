//! Queue entries and the data they carry.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Default character limit for synthesized cover-letter questions.
const SYNTHETIC_CHAR_LIMIT: u32 = 700;

/// One cover-letter question to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub id: String,
    pub question: String,
    pub char_limit: u32,
}

/// Everything a workflow needs to produce one cover letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Raw job posting text (already fetched; crawling happens elsewhere).
    pub job_posting: String,
    #[serde(default)]
    pub items: Vec<ItemRequest>,
    /// Past cover-letter passages the vector store returned for this user.
    #[serde(default)]
    pub references: Vec<String>,
}

impl WorkflowRequest {
    /// A request with `items` placeholder questions, used by the load-testing
    /// control plane where only the call count matters.
    pub fn synthetic(items: usize) -> Self {
        Self {
            job_posting: "Backend Engineer. Build and operate rate-limited API integrations."
                .to_string(),
            items: (1..=items)
                .map(|n| ItemRequest {
                    id: n.to_string(),
                    question: format!("Question {n}: describe a relevant experience."),
                    char_limit: SYNTHETIC_CHAR_LIMIT,
                })
                .collect(),
            references: Vec::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Provider calls one successful run issues: analyze + search query + one per item.
    pub fn expected_calls(&self) -> usize {
        2 + self.item_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    RateLimited,
    Failed,
}

/// Result of one execution attempt of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    pub kind: OutcomeKind,
    pub message: Option<String>,
}

/// A queued workflow invocation.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowJob {
    pub id: Uuid,
    pub request: WorkflowRequest,
    /// Refreshed every time the job (re-)enters the queue.
    pub enqueued_at: DateTime<Utc>,
    pub attempt_history: Vec<JobOutcome>,
}

impl WorkflowJob {
    pub fn new(request: WorkflowRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            enqueued_at: Utc::now(),
            attempt_history: Vec::new(),
        }
    }

    pub fn item_count(&self) -> usize {
        self.request.item_count()
    }

    /// Number of attempts already recorded.
    pub fn attempts(&self) -> u32 {
        self.attempt_history.len() as u32
    }

    pub fn record(
        &mut self,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        kind: OutcomeKind,
        message: Option<String>,
    ) {
        let attempt = self.attempts() + 1;
        self.attempt_history.push(JobOutcome {
            attempt,
            started_at,
            elapsed,
            kind,
            message,
        });
    }
}

/// Structured results of a successful workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutput {
    pub analysis: Value,
    pub search_queries: Value,
    pub items: Vec<Value>,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }
}
