//! Standalone stand-in for the provider: a token bucket behind the same
//! `generateContent`-style HTTP contract, returning RetryInfo-bearing 429s once
//! the per-period quota is spent.

pub mod handlers;
pub mod token_bucket;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};

pub use token_bucket::{BucketStatus, TokenBucket};

#[derive(Clone)]
pub struct SimulatorState {
    pub bucket: Arc<TokenBucket>,
    /// Artificial latency of a successful `/generate`.
    pub generate_delay: Duration,
}

pub fn build_router(state: SimulatorState) -> Router {
    Router::new()
        .route("/", get(handlers::handle_root))
        .route("/generate", post(handlers::handle_generate))
        .route("/status", get(handlers::handle_status))
        .route("/reset", post(handlers::handle_reset))
        .route("/test-burst", get(handlers::handle_test_burst))
        .with_state(state)
}

/// Provider-shaped 429 body carrying a RetryInfo entry.
pub fn quota_error_body(retry_delay_secs: f64, quota_value: u32) -> Value {
    json!({
        "error": {
            "code": 429,
            "message": "You exceeded your current quota, please check your plan and billing details.",
            "status": "RESOURCE_EXHAUSTED",
            "details": [
                {
                    "@type": "type.googleapis.com/google.rpc.QuotaFailure",
                    "violations": [
                        {
                            "quotaMetric": "generativelanguage.googleapis.com/generate_content_free_tier_requests",
                            "quotaId": "GenerateRequestsPerMinutePerProjectPerModel-FreeTier",
                            "quotaValue": quota_value.to_string()
                        }
                    ]
                },
                {
                    "@type": "type.googleapis.com/google.rpc.Help",
                    "links": [
                        {
                            "description": "Learn more about Gemini API quotas",
                            "url": "https://ai.google.dev/gemini-api/docs/rate-limits"
                        }
                    ]
                },
                {
                    "@type": "type.googleapis.com/google.rpc.RetryInfo",
                    "retryDelay": format!("{retry_delay_secs:.1}s")
                }
            ]
        }
    })
}

/// Provider-shaped success body whose text part is itself JSON.
pub fn generate_success_body(text: &Value) -> Value {
    json!({
        "candidates": [
            {
                "content": {
                    "role": "model",
                    "parts": [{"text": text.to_string()}]
                },
                "finishReason": "STOP"
            }
        ],
        "usageMetadata": {
            "promptTokenCount": 0,
            "candidatesTokenCount": 0
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{parse_retry_delay, rate_limit_signal_from_body, GenerateContentResponse};

    #[test]
    fn test_quota_error_body_round_trips_through_retry_parser() {
        let body = quota_error_body(42.0, 15);
        assert_eq!(parse_retry_delay(&body), Some(42.0));
        assert_eq!(body["error"]["details"][2]["retryDelay"], "42.0s");
    }

    #[test]
    fn test_quota_error_body_keeps_fractional_delay() {
        let signal = rate_limit_signal_from_body(&quota_error_body(12.34, 15).to_string());
        assert_eq!(signal.retry_after_secs, Some(12.3));
        assert!(signal.message.starts_with("You exceeded your current quota"));
    }

    #[test]
    fn test_success_body_parses_as_provider_response() {
        let body = generate_success_body(&json!({"generated_text": "hello"}));
        let response: GenerateContentResponse = serde_json::from_value(body).unwrap();
        let text: Value = serde_json::from_str(response.text().unwrap()).unwrap();
        assert_eq!(text["generated_text"], "hello");
    }
}
