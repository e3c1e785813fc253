//! Configuration types for the solver and the web front end.
//!
//! Inference behaviour is controlled through [`SolverConfig`], built via its
//! [`SolverConfigBuilder`] or loaded with [`SolverConfig::from_env`]. The web
//! front end has its own [`ServerConfig`]; the binary fills it from CLI
//! flags and their `NEURALMATH_*` environment fallbacks. The only required
//! setting is the inference credential; everything else has a default.

use crate::error::NeuralMathError;
use crate::prompts::SOLVE_INSTRUCTION;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::{debug, warn};

/// Primary credential variable.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Accepted alias for [`API_KEY_ENV`].
pub const API_KEY_ALIAS_ENV: &str = "NEURALMATH_API_KEY";

/// Default Gemini model, as shipped by the original web form.
pub const DEFAULT_MODEL: &str = "gemini-1.5-pro";
/// Public Generative Language API root.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration for a single inference request.
///
/// # Example
/// ```rust
/// use neuralmath::SolverConfig;
///
/// let config = SolverConfig::builder()
///     .api_key("test-key")
///     .model("gemini-1.5-flash")
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "gemini-1.5-flash");
/// ```
#[derive(Clone)]
pub struct SolverConfig {
    /// Static credential for the inference service. Required.
    pub api_key: String,

    /// Model identifier, with or without the `models/` prefix. Default: `gemini-1.5-pro`.
    pub model: String,

    /// API root the `models/{model}:generateContent` path is appended to.
    pub api_base: String,

    /// Instruction sent after the image. Default: [`SOLVE_INSTRUCTION`].
    pub instruction: String,

    /// Optional per-request timeout in seconds. Default: none.
    ///
    /// With `None` the request resolves or fails according to the service
    /// and the transport's own limits.
    pub api_timeout_secs: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            instruction: SOLVE_INSTRUCTION.to_string(),
            api_timeout_secs: None,
        }
    }
}

impl fmt::Debug for SolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolverConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("instruction_len", &self.instruction.len())
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

fn redact(key: &str) -> &'static str {
    if key.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl SolverConfig {
    /// Create a new builder for `SolverConfig`.
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load the configuration from the environment.
    ///
    /// Reads the credential from `GEMINI_API_KEY` (or `NEURALMATH_API_KEY`),
    /// and optionally `NEURALMATH_MODEL`, `NEURALMATH_API_BASE` and
    /// `NEURALMATH_API_TIMEOUT`.
    pub fn from_env() -> Result<Self, NeuralMathError> {
        let api_key = read_api_key().ok_or_else(|| NeuralMathError::ProviderNotConfigured {
            provider: "gemini".to_string(),
            hint: format!("Set {API_KEY_ENV} (or {API_KEY_ALIAS_ENV}) to your API key."),
        })?;

        let mut builder = Self::builder().api_key(api_key);
        if let Some(model) = non_empty_var("NEURALMATH_MODEL") {
            builder = builder.model(model);
        }
        if let Some(base) = non_empty_var("NEURALMATH_API_BASE") {
            builder = builder.api_base(base);
        }
        if let Some(secs) = parse_var::<u64>("NEURALMATH_API_TIMEOUT") {
            builder = builder.api_timeout_secs(secs);
        }
        builder.build()
    }

    /// The `models/…` resource name the request is addressed to.
    pub fn model_resource(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    /// Full `generateContent` URL for the configured model.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model_resource()
        )
    }
}

/// Builder for [`SolverConfig`].
#[derive(Debug)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into();
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = instruction.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = Some(secs);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SolverConfig, NeuralMathError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(NeuralMathError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!("Set {API_KEY_ENV} (or {API_KEY_ALIAS_ENV}) to your API key."),
            });
        }
        if c.model.trim().is_empty() {
            return Err(NeuralMathError::InvalidConfig("model must not be empty".into()));
        }
        if !(c.api_base.starts_with("http://") || c.api_base.starts_with("https://")) {
            return Err(NeuralMathError::InvalidConfig(format!(
                "API base must be an HTTP/HTTPS URL, got '{}'",
                c.api_base
            )));
        }
        if c.instruction.trim().is_empty() {
            return Err(NeuralMathError::InvalidConfig(
                "instruction must not be empty".into(),
            ));
        }
        if c.api_timeout_secs == Some(0) {
            return Err(NeuralMathError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Web front end ────────────────────────────────────────────────────────

/// Settings for the `serve` front end.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `127.0.0.1:3000`.
    pub bind: SocketAddr,

    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// How concurrent completions are reconciled. Default: [`OverwritePolicy::LatestSelection`].
    pub policy: OverwritePolicy,

    /// Seconds between automatic page refreshes while a request is pending. Default: 2.
    pub refresh_secs: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            max_upload_bytes: 20 * 1024 * 1024,
            policy: OverwritePolicy::default(),
            refresh_secs: 2,
        }
    }
}

/// Which completion wins when several requests are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverwritePolicy {
    /// Only the response to the most recent selection is accepted;
    /// completions for superseded selections are discarded. (default)
    #[default]
    LatestSelection,
    /// Every completion overwrites the result; the last to resolve wins,
    /// regardless of which selection it belongs to.
    CompletionOrder,
}

impl FromStr for OverwritePolicy {
    type Err = NeuralMathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" | "latest-selection" => Ok(Self::LatestSelection),
            "completion" | "completion-order" => Ok(Self::CompletionOrder),
            other => Err(NeuralMathError::InvalidConfig(format!(
                "unknown overwrite policy '{other}' (expected latest-selection or completion-order)"
            ))),
        }
    }
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LatestSelection => f.write_str("latest-selection"),
            Self::CompletionOrder => f.write_str("completion-order"),
        }
    }
}

// ── Environment helpers ──────────────────────────────────────────────────

fn read_api_key() -> Option<String> {
    non_empty_var(API_KEY_ENV).or_else(|| non_empty_var(API_KEY_ALIAS_ENV))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: fmt::Display,
{
    let raw = non_empty_var(key)?;
    match raw.parse() {
        Ok(v) => {
            debug!("{key} set from environment");
            Some(v)
        }
        Err(e) => {
            warn!("Ignoring invalid {key} value '{raw}': {e}");
            None
        }
    }
}
