//! Inference: the [`Solver`] seam and the single-request driver.
//!
//! Everything that talks to a model implements [`Solver`]. The web front end
//! and the CLI receive an `Arc<dyn Solver>` instead of building a client
//! themselves, so tests swap in a double without touching the network.
//!
//! There is no retry loop here. One completed read produces exactly one
//! request; if it fails, the user selects the file again.

use crate::error::{InferenceError, SolveError};
use crate::pipeline::encode::{encode_image, EncodedPayload};
use crate::pipeline::ingest::SelectedImage;
use async_trait::async_trait;
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, LlmError, ProviderFactory,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Text returned by the model for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Solution {
    /// The answer, verbatim.
    pub text: String,
    /// Model that produced it, when the service reports one.
    pub model: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    /// Wall-clock time of the request.
    pub duration_ms: u64,
}

impl Solution {
    /// A solution carrying only text; used by doubles and simple backends.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
            input_tokens: None,
            output_tokens: None,
            duration_ms: 0,
        }
    }
}

/// A multimodal backend that answers one image + instruction request.
#[async_trait]
pub trait Solver: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Issue one request: the inline image part first, then the instruction.
    async fn solve(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<Solution, SolveError>;
}

/// Encode `image` and issue exactly one request through `solver`.
pub async fn solve_image(
    solver: &dyn Solver,
    image: &SelectedImage,
    instruction: &str,
) -> Result<Solution, SolveError> {
    let start = Instant::now();
    let payload = encode_image(image);
    info!(
        "Sending '{}' ({}) to {}",
        image.name,
        payload.mime_type,
        solver.name()
    );

    match solver.solve(&payload, instruction).await {
        Ok(mut solution) => {
            let elapsed = start.elapsed();
            if solution.duration_ms == 0 {
                solution.duration_ms = elapsed.as_millis() as u64;
            }
            debug!(
                "'{}': {} chars in {:?}",
                image.name,
                solution.text.len(),
                elapsed
            );
            Ok(solution)
        }
        Err(e) => {
            warn!("'{}': request failed: {}", image.name, e);
            Err(e)
        }
    }
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Routes requests through any vision-capable `edgequake_llm` provider.
pub struct ProviderSolver {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
    timeout: Option<Duration>,
}

impl ProviderSolver {
    /// Wrap an already-constructed provider.
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
            options: CompletionOptions {
                temperature: Some(0.1),
                max_tokens: Some(2048),
                ..Default::default()
            },
            timeout: None,
        }
    }

    /// Build a named provider (`openai`, `anthropic`, `ollama`, …); the
    /// provider reads its own API key from the environment.
    ///
    /// Without an explicit `model`, `EDGEQUAKE_MODEL` is consulted, then the
    /// provider's entry in [`default_model_for`].
    pub fn from_name(
        provider_name: &str,
        model: Option<&str>,
    ) -> Result<Self, crate::NeuralMathError> {
        let model = model
            .map(str::to_string)
            .or_else(|| std::env::var("EDGEQUAKE_MODEL").ok().filter(|m| !m.is_empty()))
            .or_else(|| default_model_for(provider_name).map(str::to_string))
            .ok_or_else(|| crate::NeuralMathError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: "No default model is known for this provider; pass --model".to_string(),
            })?;

        let provider = ProviderFactory::create_llm_provider(provider_name, &model).map_err(|e| {
            crate::NeuralMathError::ProviderNotConfigured {
                provider: provider_name.to_string(),
                hint: format!("{e}"),
            }
        })?;
        Ok(Self::new(provider, format!("{provider_name}/{model}")))
    }

    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout = secs.map(Duration::from_secs);
        self
    }
}

#[async_trait]
impl Solver for ProviderSolver {
    fn name(&self) -> &str {
        &self.label
    }

    async fn solve(
        &self,
        payload: &EncodedPayload,
        instruction: &str,
    ) -> Result<Solution, SolveError> {
        let start = Instant::now();
        let image = ImageData::new(payload.data.clone(), payload.mime_type.clone());
        let messages = vec![ChatMessage::user_with_images(instruction, vec![image])];

        let call = self.provider.chat(&messages, Some(&self.options));
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                InferenceError::Timeout {
                    secs: limit.as_secs(),
                }
            })?,
            None => call.await,
        };

        let response = result.map_err(|e| classify_llm_error(e, self.timeout))?;

        if response.content.trim().is_empty() {
            return Err(SolveError::MalformedResponse {
                detail: format!("{} returned an empty completion", self.label),
            });
        }

        Ok(Solution {
            text: response.content,
            model: Some(self.label.clone()),
            input_tokens: Some(response.prompt_tokens as u64),
            output_tokens: Some(response.completion_tokens as u64),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Vision-capable model used when a named provider is given without one.
pub fn default_model_for(provider_name: &str) -> Option<&'static str> {
    match provider_name.to_ascii_lowercase().as_str() {
        "gemini" => Some(crate::config::DEFAULT_MODEL),
        "openai" => Some("gpt-4.1-nano"),
        "anthropic" | "claude" => Some("claude-3-5-sonnet-latest"),
        "mistral" => Some("pixtral-large-latest"),
        "ollama" | "lmstudio" => Some("llava"),
        "mock" => Some("mock-model"),
        _ => None,
    }
}

/// Map a provider failure onto the classes the UI distinguishes.
fn classify_llm_error(err: LlmError, timeout: Option<Duration>) -> InferenceError {
    match err {
        LlmError::RateLimited(detail) => InferenceError::Quota { detail },
        LlmError::AuthError(detail) => InferenceError::Auth { detail },
        LlmError::NetworkError(detail) => InferenceError::Network { detail },
        LlmError::Timeout => InferenceError::Timeout {
            secs: timeout.map_or(0, |t| t.as_secs()),
        },
        other => InferenceError::Provider {
            detail: other.to_string(),
        },
    }
}
