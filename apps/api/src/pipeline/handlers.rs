use std::time::Duration;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipeline::job::WorkflowRequest;
use crate::pipeline::tracker::PerformanceSnapshot;
use crate::state::AppState;

/// Largest fan-out accepted for a single workflow.
pub const MAX_ITEMS_PER_WORKFLOW: usize = 50;
const COMPLETION_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub job_id: Uuid,
    pub queue_size: usize,
    pub expected_api_calls: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueStatusResponse {
    pub queue_size: usize,
    pub worker_count: usize,
    pub busy_workers: usize,
    pub unfinished_jobs: usize,
    pub provider_calls: u64,
    pub retry_counts: u64,
    pub queue_reinsert_counts: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub message: String,
    #[serde(flatten)]
    pub performance: PerformanceSnapshot,
}

fn submit(state: &AppState, request: WorkflowRequest) -> SubmitResponse {
    let items = request.item_count();
    let expected_api_calls = request.expected_calls();
    let job_id = state.context.submit(request);
    let total = state.context.tracker.total_requests();
    info!(%job_id, items, total, "Workflow enqueued");

    SubmitResponse {
        message: format!("Workflow with {items} items enqueued ({total} submitted so far)"),
        job_id,
        queue_size: state.context.queue.len(),
        expected_api_calls,
    }
}

/// POST /start-workflow/:items
pub async fn handle_start_workflow(
    State(state): State<AppState>,
    items: Result<Path<usize>, PathRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let Path(items) = items.map_err(|rejection| {
        AppError::Validation(format!("items must be a non-negative integer: {rejection}"))
    })?;
    if items > MAX_ITEMS_PER_WORKFLOW {
        return Err(AppError::Validation(format!(
            "items must be at most {MAX_ITEMS_PER_WORKFLOW}"
        )));
    }
    let response = submit(&state, WorkflowRequest::synthetic(items));
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /api/v1/cover-letters
pub async fn handle_submit_cover_letter(
    State(state): State<AppState>,
    Json(request): Json<WorkflowRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    validate_request(&request)?;
    let response = submit(&state, request);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

fn validate_request(request: &WorkflowRequest) -> Result<(), AppError> {
    if request.job_posting.trim().is_empty() {
        return Err(AppError::Validation("job_posting must not be empty".into()));
    }
    if request.items.len() > MAX_ITEMS_PER_WORKFLOW {
        return Err(AppError::Validation(format!(
            "at most {MAX_ITEMS_PER_WORKFLOW} items per cover letter"
        )));
    }
    if let Some(item) = request
        .items
        .iter()
        .find(|item| item.question.trim().is_empty() || item.char_limit == 0)
    {
        return Err(AppError::Validation(format!(
            "item '{}' needs a question and a positive char_limit",
            item.id
        )));
    }
    Ok(())
}

/// GET /performance-status
pub async fn handle_performance_status(State(state): State<AppState>) -> Json<PerformanceSnapshot> {
    let context = &state.context;
    Json(context.tracker.snapshot(context.queue.len()))
}

/// GET /queue-status
pub async fn handle_queue_status(State(state): State<AppState>) -> Json<QueueStatusResponse> {
    let context = &state.context;
    Json(QueueStatusResponse {
        queue_size: context.queue.len(),
        worker_count: context.worker_count(),
        busy_workers: context.busy_workers(),
        unfinished_jobs: context.queue.unfinished(),
        provider_calls: context.tracker.provider_calls(),
        retry_counts: context.tracker.retries(),
        queue_reinsert_counts: context.tracker.requeues(),
    })
}

/// POST /reset-performance
pub async fn handle_reset_performance(State(state): State<AppState>) -> Json<MessageResponse> {
    state.context.tracker.reset();
    info!("Performance counters reset");
    Json(MessageResponse {
        message: "Performance counters reset".to_string(),
    })
}

/// GET /wait-for-completion
///
/// Holds the request open until every submitted workflow has completed or been
/// dropped and the queue is empty.
pub async fn handle_wait_for_completion(State(state): State<AppState>) -> Json<CompletionResponse> {
    let context = &state.context;
    while !context.is_idle() {
        tokio::time::sleep(COMPLETION_POLL_INTERVAL).await;
    }

    let performance = context.tracker.snapshot(context.queue.len());
    let message = if performance.total_requests == 0 {
        "No workflows have been submitted".to_string()
    } else {
        "All workflows finished".to_string()
    };
    Json(CompletionResponse {
        message,
        performance,
    })
}
