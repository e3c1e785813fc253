//! Error types for the neuralmath library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`NeuralMathError`]: **Fatal**: the program cannot start serving or
//!   solving at all (no credential, bad configuration, port already taken).
//!   Returned as `Err(NeuralMathError)` from setup functions.
//!
//! * [`SolveError`]: **Per attempt**: one upload could not be turned into a
//!   solution (unreadable file, rejected request, empty response). It is
//!   stored in the session's result slot so the page can show it, and the
//!   next upload starts from a clean attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All fatal errors returned by the neuralmath library.
#[derive(Debug, Error)]
pub enum NeuralMathError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// The inference credential is missing.
    #[error("Inference provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Server errors ─────────────────────────────────────────────────────
    /// Could not bind the web front end to its address.
    #[error("Failed to bind '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why a single solve attempt failed.
///
/// Every variant is user-visible: the web page shows its `Display` text in
/// the error panel, and `/api/state` serialises it.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SolveError {
    /// No file was chosen.
    #[error("No file selected")]
    EmptySelection,

    /// The selected file could not be read.
    #[error("Could not read file '{name}': {detail}")]
    ReadFailure { name: String, detail: String },

    /// The inference service rejected or failed the request.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The service answered, but without the expected text.
    #[error("Malformed response from inference service: {detail}")]
    MalformedResponse { detail: String },
}

/// Classified failure of the outbound inference call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum InferenceError {
    /// Transport failure: DNS, connection reset, TLS.
    #[error("Network error contacting inference service: {detail}")]
    Network { detail: String },

    /// HTTP 401/403: the credential is wrong or lacks access.
    #[error("Inference service rejected the credential: {detail}")]
    Auth { detail: String },

    /// HTTP 429: quota or rate limit exhausted.
    #[error("Inference quota exceeded: {detail}")]
    Quota { detail: String },

    /// Any other non-success status (400 malformed payload, 5xx, …).
    #[error("Inference request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// A provider-side failure with no HTTP status to report.
    #[error("Inference provider error: {detail}")]
    Provider { detail: String },

    /// The model declined to answer (safety block or similar).
    #[error("Inference service refused the request: {reason}")]
    Refused { reason: String },

    /// The configured per-request timeout elapsed.
    #[error("Inference request timed out after {secs}s")]
    Timeout { secs: u64 },
}
