//! Extraction adapter boundary: ordered page texts → structured records.
//!
//! The LLM call itself is an external collaborator behind the
//! [`ExtractionAdapter`] trait; the core owns everything around it: chunking
//! long periods at page boundaries, the bounded-retry policy, and schema
//! validation of the raw output. Malformed output is retried exactly once
//! (models occasionally emit truncated JSON and recover on a second call),
//! then treated as a permanent failure. A failed period produces **no**
//! partial result - the caller marks it `failed` and the next run retries
//! from the kept pages.

use crate::document::PeriodKey;
use crate::error::StageFailure;
use crate::prompts::{build_extraction_prompt, combine_page_texts};
use crate::records::RawStormRecord;
use crate::retry::{RetryPolicy, Transience};
use crate::scoring::ScoringRules;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// One extraction request: the prompt for one chunk of one period.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub period: String,
    /// 1-based chunk number within the period.
    pub chunk: usize,
    pub chunks: usize,
    pub prompt: String,
}

/// Adapter-boundary error taxonomy.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Rate limit, 5xx, timeout - worth retrying.
    #[error("transient: {0}")]
    Transient(String),
    /// Auth failure, bad request - retrying cannot help.
    #[error("permanent: {0}")]
    Permanent(String),
    /// The adapter responded but the payload is not the expected schema.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Transience for ExtractError {
    fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Transient(_))
    }
}

/// The external LLM boundary: one prompt in, one raw JSON payload out.
///
/// Implementations classify their own failures into [`ExtractError`]; the
/// retry policy and schema validation live in the core, not here.
pub trait ExtractionAdapter: Send + Sync {
    fn extract<'a>(
        &'a self,
        request: &'a ExtractionRequest,
    ) -> BoxFuture<'a, Result<Value, ExtractError>>;
}

/// Validate the raw payload against the expected schema shape.
///
/// Accepts `{"storm_events": [...]}` (the prompted shape) or a bare array.
pub fn validate_payload(payload: &Value) -> Result<Vec<RawStormRecord>, String> {
    let events = match payload {
        Value::Object(map) => map
            .get("storm_events")
            .ok_or("missing 'storm_events' key")?,
        Value::Array(_) => payload,
        other => {
            return Err(format!(
                "expected object or array, got {}",
                type_name(other)
            ))
        }
    };
    let Value::Array(items) = events else {
        return Err(format!("'storm_events' is {}, not an array", type_name(events)));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            if !item.is_object() {
                return Err(format!("record {i} is {}, not an object", type_name(item)));
            }
            serde_json::from_value(item.clone()).map_err(|e| format!("record {i}: {e}"))
        })
        .collect()
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Split ordered pages into consecutive chunks at page boundaries so that
/// each chunk's combined text stays within `max_chars`.
///
/// A single page larger than the budget still gets its own chunk - pages
/// are never split mid-text.
pub fn chunk_pages(pages: &[(usize, String)], max_chars: usize) -> Vec<&[(usize, String)]> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut size = 0usize;
    for (i, (_, text)) in pages.iter().enumerate() {
        if i > start && size + text.len() > max_chars {
            chunks.push(&pages[start..i]);
            start = i;
            size = 0;
        }
        size += text.len();
    }
    if start < pages.len() {
        chunks.push(&pages[start..]);
    }
    chunks
}

/// Run extraction for one period: chunk, prompt, call with retries, validate.
///
/// `pages` is the continuation-ordered `(page index, text)` sequence from
/// the orderer. Chunks are extracted strictly in page order; record lists
/// are concatenated in that same order. Returns all raw records or a single
/// `StageFailure` for the period - never a partial result.
pub async fn extract_period(
    adapter: &dyn ExtractionAdapter,
    policy: &RetryPolicy,
    rules: &ScoringRules,
    period: &PeriodKey,
    pages: &[(usize, String)],
    max_chars: usize,
) -> Result<Vec<RawStormRecord>, StageFailure> {
    let chunks = chunk_pages(pages, max_chars);
    let n_chunks = chunks.len();
    if n_chunks > 1 {
        info!("period {period}: input split into {n_chunks} chunks");
    }

    let mut all_records = Vec::new();
    for (chunk_no, chunk) in chunks.into_iter().enumerate() {
        let combined = combine_page_texts(chunk, rules);
        let request = ExtractionRequest {
            period: period.to_string(),
            chunk: chunk_no + 1,
            chunks: n_chunks,
            prompt: build_extraction_prompt(&period.to_string(), &combined),
        };
        let what = format!("extract {period} [{}/{}]", request.chunk, n_chunks);

        // Malformed output gets exactly one retry: the first occurrence is
        // downgraded to transient, the second surfaces as-is.
        let malformed_seen = AtomicBool::new(false);
        let outcome = policy
            .run(&what, |_attempt| {
                let request = &request;
                let malformed_seen = &malformed_seen;
                async move {
                    let payload = adapter.extract(request).await?;
                    match validate_payload(&payload) {
                        Ok(records) => Ok(records),
                        Err(detail) => {
                            if malformed_seen.swap(true, Ordering::Relaxed) {
                                Err(ExtractError::Malformed(detail))
                            } else {
                                warn!("{detail}; retrying once");
                                Err(ExtractError::Transient(format!(
                                    "malformed output: {detail}"
                                )))
                            }
                        }
                    }
                }
            })
            .await;

        match outcome {
            Ok(records) => all_records.extend(records),
            Err((_, ExtractError::Malformed(detail))) => {
                return Err(StageFailure::MalformedExtraction {
                    period: period.to_string(),
                    detail,
                })
            }
            Err((attempts, err)) => {
                return Err(StageFailure::ExtractionFailed {
                    period: period.to_string(),
                    attempts,
                    detail: err.to_string(),
                })
            }
        }
    }

    Ok(all_records)
}

// ── Bundled Gemini adapter ───────────────────────────────────────────────

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Extraction adapter for the Gemini `generateContent` API.
pub struct GeminiExtractor {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiExtractor {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, crate::error::PipelineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| crate::error::PipelineError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{GEMINI_BASE_URL}/{}:generateContent", self.model)
    }
}

impl ExtractionAdapter for GeminiExtractor {
    fn extract<'a>(
        &'a self,
        request: &'a ExtractionRequest,
    ) -> BoxFuture<'a, Result<Value, ExtractError>> {
        Box::pin(async move {
            let body = serde_json::json!({
                "contents": [{ "parts": [{ "text": request.prompt }] }],
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "temperature": 0.1,
                },
            });

            let response = self
                .client
                .post(self.endpoint())
                .query(&[("key", self.api_key.as_str())])
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() || e.is_connect() {
                        ExtractError::Transient(e.to_string())
                    } else {
                        ExtractError::Permanent(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(ExtractError::Transient(format!("HTTP {status}")));
            }
            if !status.is_success() {
                return Err(ExtractError::Permanent(format!("HTTP {status}")));
            }

            let envelope: Value = response
                .json()
                .await
                .map_err(|e| ExtractError::Malformed(format!("response envelope: {e}")))?;

            let text = envelope
                .pointer("/candidates/0/content/parts/0/text")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    ExtractError::Malformed("no candidate text in response".into())
                })?;

            serde_json::from_str(strip_json_fences(text))
                .map_err(|e| ExtractError::Malformed(format!("candidate is not JSON: {e}")))
        })
    }
}

/// Models sometimes wrap JSON in markdown fences despite the prompt.
fn strip_json_fences(text: &str) -> &str {
    text.trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
