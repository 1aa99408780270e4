//! LLM client: the single point of entry for all provider calls.
//!
//! Speaks the Gemini `generateContent` REST shape. The endpoint is configurable so
//! the same client can be pointed at the quota simulator.
//!
//! This client makes exactly one HTTP request per call. Retrying on quota
//! exhaustion is the job of `retry::CallExecutor`, never of this module.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::retry::RateLimitSignal;

pub mod prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Model used when `GEMINI_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
const RETRY_INFO_TYPE_SUFFIX: &str = "RetryInfo";
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Builds the `generateContent` URL for a Gemini model.
pub fn gemini_endpoint(model: &str) -> String {
    format!("{GEMINI_API_BASE}/{model}:generateContent")
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(RateLimitSignal),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

/// Coarse classification used by the retry layer and the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Retryable: the provider's quota is exhausted.
    QuotaExceeded,
    /// Not retried by the policies; propagates to the worker.
    TransientNetworkFailure,
    /// Malformed response or rejected request; never retried.
    PermanentCallFailure,
}

impl LlmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            LlmError::Http(_) => ErrorKind::TransientNetworkFailure,
            LlmError::Api { .. } | LlmError::Parse(_) | LlmError::EmptyContent => {
                ErrorKind::PermanentCallFailure
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_mime_type: &'a str,
    response_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u32,
    #[serde(default)]
    pub candidates_token_count: u32,
}

impl GenerateContentResponse {
    /// Extracts the text of the first part of the first candidate.
    pub fn text(&self) -> Option<&str> {
        self.candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .find_map(|p| p.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct ProviderErrorEnvelope {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<Value>,
}

// ────────────────────────────────────────────────────────────────────────────
// RetryInfo parsing
// ────────────────────────────────────────────────────────────────────────────

/// Reads `error.details[@type=*RetryInfo].retryDelay` ("12s") from a 429 body.
///
/// Returns `None` when the entry is missing or the delay is malformed.
pub fn parse_retry_delay(body: &Value) -> Option<f64> {
    body.get("error")?
        .get("details")?
        .as_array()?
        .iter()
        .find(|detail| {
            detail
                .get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.ends_with(RETRY_INFO_TYPE_SUFFIX))
        })?
        .get("retryDelay")?
        .as_str()?
        .trim()
        .strip_suffix('s')?
        .parse::<f64>()
        .ok()
        .filter(|secs| Duration::try_from_secs_f64(*secs).is_ok())
}

/// Turns the raw body of a 429 response into a `RateLimitSignal`.
pub fn rate_limit_signal_from_body(body: &str) -> RateLimitSignal {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let retry_after = parse_retry_delay(&value);
    let message = serde_json::from_value::<ProviderErrorEnvelope>(value)
        .ok()
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| "Rate limit exceeded".to_string());

    RateLimitSignal::new(message, retry_after)
}

// ────────────────────────────────────────────────────────────────────────────
// Provider seam
// ────────────────────────────────────────────────────────────────────────────

/// Anything that can answer a structured-generation prompt.
///
/// `LlmClient` is the production implementation; tests plug in scripted fakes.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate_content(&self, prompt: &str, response_schema: &Value)
        -> Result<Value, LlmError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// HTTP client for the provider's `generateContent` endpoint.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LlmClient {
    pub fn new(endpoint: String, api_key: Option<String>) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Makes a single call and returns the full response object.
    /// A 429 becomes `LlmError::QuotaExceeded` carrying the parsed RetryInfo.
    pub async fn call(
        &self,
        prompt: &str,
        response_schema: &Value,
    ) -> Result<GenerateContentResponse, LlmError> {
        let request_body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user"),
                parts: vec![RequestPart { text: prompt }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![RequestPart {
                    text: prompts::JSON_ONLY_SYSTEM,
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema,
            },
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&request_body);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            let signal = rate_limit_signal_from_body(&body);
            warn!(
                retry_after_secs = ?signal.retry_after_secs,
                "Provider quota exhausted"
            );
            return Err(LlmError::QuotaExceeded(signal));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ProviderErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;

        if let Some(usage) = &parsed.usage_metadata {
            debug!(
                "LLM call succeeded: prompt_tokens={}, candidate_tokens={}",
                usage.prompt_token_count, usage.candidates_token_count
            );
        }

        Ok(parsed)
    }

    /// Calls the provider and deserializes the text response as JSON.
    pub async fn call_json(
        &self,
        prompt: &str,
        response_schema: &Value,
    ) -> Result<Value, LlmError> {
        let response = self.call(prompt, response_schema).await?;
        let text = response.text().ok_or(LlmError::EmptyContent)?;
        serde_json::from_str(strip_json_fences(text)).map_err(LlmError::Parse)
    }
}

#[async_trait]
impl Provider for LlmClient {
    async fn generate_content(
        &self,
        prompt: &str,
        response_schema: &Value,
    ) -> Result<Value, LlmError> {
        self.call_json(prompt, response_schema).await
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let Some(stripped) = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
    else {
        return text;
    };
    stripped
        .trim_start()
        .strip_suffix("```")
        .map(|s| s.trim())
        .unwrap_or(stripped.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn quota_body(delay: &str) -> Value {
        json!({
            "error": {
                "code": 429,
                "message": "You exceeded your current quota",
                "status": "RESOURCE_EXHAUSTED",
                "details": [
                    {
                        "@type": "type.googleapis.com/google.rpc.QuotaFailure",
                        "violations": [{"quotaMetric": "GenerateRequestsPerMinute"}]
                    },
                    {
                        "@type": "type.googleapis.com/google.rpc.RetryInfo",
                        "retryDelay": delay
                    }
                ]
            }
        })
    }

    #[test]
    fn test_parse_retry_delay_reads_retry_info() {
        assert_eq!(parse_retry_delay(&quota_body("12s")), Some(12.0));
        assert_eq!(parse_retry_delay(&quota_body("37.5s")), Some(37.5));
    }

    #[test]
    fn test_parse_retry_delay_missing_entry() {
        let body = json!({"error": {"code": 429, "details": []}});
        assert_eq!(parse_retry_delay(&body), None);
        assert_eq!(parse_retry_delay(&json!({})), None);
    }

    #[test]
    fn test_parse_retry_delay_malformed_value() {
        assert_eq!(parse_retry_delay(&quota_body("soon")), None);
        assert_eq!(parse_retry_delay(&quota_body("12")), None);
        assert_eq!(parse_retry_delay(&quota_body("-4s")), None);
    }

    #[test]
    fn test_parse_retry_delay_rejects_unrepresentable_delay() {
        assert_eq!(parse_retry_delay(&quota_body("1e20s")), None);
        assert_eq!(parse_retry_delay(&quota_body("infs")), None);

        let signal = rate_limit_signal_from_body(&quota_body("1e20s").to_string());
        assert_eq!(signal.retry_after_secs, None);
    }

    #[test]
    fn test_signal_from_body_without_retry_info() {
        let signal = rate_limit_signal_from_body("not json at all");
        assert_eq!(signal.retry_after_secs, None);
        assert_eq!(signal.message, "Rate limit exceeded");
    }

    #[test]
    fn test_signal_from_body_keeps_provider_message() {
        let signal = rate_limit_signal_from_body(&quota_body("8s").to_string());
        assert_eq!(signal.message, "You exceeded your current quota");
        assert_eq!(signal.retry_after_secs, Some(8.0));
    }

    #[test]
    fn test_error_kinds() {
        let quota = LlmError::QuotaExceeded(RateLimitSignal::new("q", None));
        assert_eq!(quota.kind(), ErrorKind::QuotaExceeded);

        let api = LlmError::Api {
            status: 400,
            message: "bad schema".into(),
        };
        assert_eq!(api.kind(), ErrorKind::PermanentCallFailure);
        assert_eq!(LlmError::EmptyContent.kind(), ErrorKind::PermanentCallFailure);
    }

    #[test]
    fn test_response_text_takes_first_part() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "{\"a\":1}"}]}}],
            "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 3}
        }))
        .unwrap();
        assert_eq!(response.text(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_response_without_candidates_has_no_text() {
        let response: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(response.text().is_none());
    }

    #[test]
    fn test_gemini_endpoint_includes_model() {
        assert_eq!(
            gemini_endpoint("gemini-2.5-flash-lite"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash-lite:generateContent"
        );
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_without_tag() {
        let input = "```\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }
}
