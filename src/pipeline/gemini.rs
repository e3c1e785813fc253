//! Native client for the Gemini `generateContent` REST endpoint.
//!
//! ## Request Layout
//!
//! One content turn with two parts, in this order:
//! 1. **inlineData**: `{ mimeType, data }`, the base64 image
//! 2. **text**: the fixed instruction
//!
//! The credential travels in the `x-goog-api-key` header so it never shows
//! up in URLs that reqwest might include in its error messages.

use crate::config::SolverConfig;
use crate::error::{InferenceError, SolveError};
use crate::pipeline::encode::EncodedPayload;
use crate::pipeline::llm::{Solution, Solver};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// ── Wire types ───────────────────────────────────────────────────────────

/// Request body for `models/{model}:generateContent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
}

/// A content turn; used in both requests and responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Untagged union of text and inline media parts.
///
/// Variant order matters for `#[serde(untagged)]` decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

/// Base64 inline payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// Top-level `generateContent` response envelope.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<UsageMetadata>,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u64>,
    pub candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Finish reasons that mean the model declined rather than broke.
const REFUSAL_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
    "IMAGE_SAFETY",
];

impl GenerateContentRequest {
    /// Image part first, instruction second.
    pub fn new(payload: &EncodedPayload, instruction: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: payload.mime_type.clone(),
                            data: payload.data.clone(),
                        },
                    },
                    Part::Text {
                        text: instruction.to_string(),
                    },
                ],
            }],
        }
    }
}

impl GenerateContentResponse {
    /// Extract the answer text, classifying refusals and empty replies.
    pub fn into_solution(self) -> Result<Solution, SolveError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            let reason = self
                .prompt_feedback
                .and_then(|f| f.block_reason)
                .map(|r| format!("prompt blocked: {r}"));
            return Err(match reason {
                Some(reason) => InferenceError::Refused { reason }.into(),
                None => SolveError::MalformedResponse {
                    detail: "response contained no candidates".into(),
                },
            });
        };

        let text: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| match p {
                Part::Text { text } => Some(text),
                Part::InlineData { .. } => None,
            })
            .collect();

        if text.is_empty() {
            return Err(match candidate.finish_reason {
                Some(r) if REFUSAL_FINISH_REASONS.contains(&r.as_str()) => {
                    InferenceError::Refused {
                        reason: format!("finish reason {r}"),
                    }
                    .into()
                }
                other => SolveError::MalformedResponse {
                    detail: format!(
                        "candidate has no text part (finish reason: {})",
                        other.as_deref().unwrap_or("none")
                    ),
                },
            });
        }

        let usage = self.usage_metadata;
        Ok(Solution {
            text,
            model: self.model_version,
            input_tokens: usage.as_ref().and_then(|u| u.prompt_token_count),
            output_tokens: usage.as_ref().and_then(|u| u.candidates_token_count),
            duration_ms: 0,
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Gemini REST client; one instance is shared for the process lifetime.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    label: String,
    timeout_secs: Option<u64>,
}

impl GeminiClient {
    pub fn new(config: &SolverConfig) -> Result<Self, crate::NeuralMathError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.api_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| crate::NeuralMathError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint(),
            api_key: config.api_key.clone(),
            label: format!("gemini/{}", config.model.trim_start_matches("models/")),
            timeout_secs: config.api_timeout_secs,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn classify_transport(&self, e: reqwest::Error) -> InferenceError {
        if e.is_timeout() {
            InferenceError::Timeout {
                secs: self.timeout_secs.unwrap_or(0),
            }
        } else {
            InferenceError::Network {
                detail: e.without_url().to_string(),
            }
        }
    }
}

#[async_trait]
impl Solver for GeminiClient {
    fn name(&self) -> &str {
        &self.label
    }

    async fn solve(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<Solution, SolveError> {
        let start = Instant::now();
        let body = GenerateContentRequest::new(payload, instruction);

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_transport(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.classify_transport(e))?;

        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!("{}: HTTP {}: {}", self.label, status.as_u16(), err);
            return Err(err.into());
        }

        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| SolveError::MalformedResponse {
                detail: format!("invalid JSON body: {e}"),
            })?;

        let mut solution = parsed.into_solution()?;
        solution.duration_ms = start.elapsed().as_millis() as u64;
        if solution.model.is_none() {
            solution.model = Some(self.label.clone());
        }
        debug!(
            "{}: {:?} input tokens, {:?} output tokens, {}ms",
            self.label, solution.input_tokens, solution.output_tokens, solution.duration_ms
        );
        Ok(solution)
    }
}

/// Map a non-success HTTP status and its body to an [`InferenceError`].
pub fn classify_status(status: StatusCode, body: &str) -> InferenceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|env| match (env.error.status, env.error.message) {
            (Some(s), Some(m)) => format!("{s}: {m}"),
            (None, Some(m)) => m,
            (Some(s), None) => s,
            (None, None) => String::new(),
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("no body").to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InferenceError::Auth { detail: message },
        StatusCode::TOO_MANY_REQUESTS => InferenceError::Quota { detail: message },
        _ => InferenceError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}
