use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::token_bucket::BucketStatus;
use super::{generate_success_body, quota_error_body, SimulatorState};

const BURST_SIZE: usize = 20;

#[derive(Debug, Serialize)]
pub struct BurstResult {
    pub request: usize,
    pub status: &'static str,
    pub remaining_tokens: u32,
}

#[derive(Debug, Serialize)]
pub struct BurstResponse {
    pub test_results: Vec<BurstResult>,
    pub final_status: BucketStatus,
}

/// GET /
pub async fn handle_root(State(state): State<SimulatorState>) -> Json<Value> {
    let status = state.bucket.status().await;
    Json(json!({
        "message": "Provider quota simulator",
        "requests_per_period": state.bucket.capacity(),
        "current_status": status,
        "endpoints": {
            "POST /generate": "generate text (consumes one token)",
            "GET /status": "current bucket state",
            "POST /reset": "refill the bucket and restart the period",
            "GET /test-burst": "fire 20 consumes back to back"
        }
    }))
}

/// POST /generate
///
/// The request body is ignored. An empty bucket answers 429 with a RetryInfo
/// delay equal to the time left until the next refill.
pub async fn handle_generate(State(state): State<SimulatorState>) -> impl IntoResponse {
    if !state.bucket.consume().await {
        let status = state.bucket.status().await;
        warn!(
            retry_after_secs = status.seconds_until_next_refill,
            "Quota exhausted, rejecting generate"
        );
        let body = quota_error_body(status.seconds_until_next_refill, status.capacity);
        return (StatusCode::TOO_MANY_REQUESTS, Json(body));
    }

    tokio::time::sleep(state.generate_delay).await;

    let remaining = state.bucket.status().await.available;
    let text = json!({
        "generated_text": "Simulated provider response.",
        "remaining_tokens": remaining,
    });
    (StatusCode::OK, Json(generate_success_body(&text)))
}

/// GET /status
pub async fn handle_status(State(state): State<SimulatorState>) -> Json<Value> {
    let status = state.bucket.status().await;
    Json(json!({
        "rate_limit_status": status,
        "requests_per_period": state.bucket.capacity(),
        "refill_period_secs": state.bucket.refill_period().as_secs_f64(),
    }))
}

/// POST /reset
pub async fn handle_reset(State(state): State<SimulatorState>) -> Json<Value> {
    state.bucket.reset().await;
    Json(json!({
        "message": "Token bucket reset",
        "status": state.bucket.status().await,
    }))
}

/// GET /test-burst
pub async fn handle_test_burst(State(state): State<SimulatorState>) -> Json<BurstResponse> {
    let mut test_results = Vec::with_capacity(BURST_SIZE);
    for request in 1..=BURST_SIZE {
        let consumed = state.bucket.consume().await;
        test_results.push(BurstResult {
            request,
            status: if consumed { "success" } else { "rate_limited" },
            remaining_tokens: state.bucket.status().await.available,
        });
    }

    let final_status = state.bucket.status().await;
    info!(
        succeeded = test_results.iter().filter(|r| r.status == "success").count(),
        available = final_status.available,
        "Burst test finished"
    );
    Json(BurstResponse {
        test_results,
        final_status,
    })
}
