//! # neuralmath
//!
//! Solve photographed handwritten mathematics with a multimodal model.
//!
//! A user picks an image, it is previewed immediately, base64-encoded and
//! sent to the inference service with a fixed instruction, and the textual
//! answer is shown verbatim. The crate ships that flow as a single-page web
//! form (`neuralmath serve`), a one-shot command (`neuralmath solve`) and a
//! library.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Ingest   take the selection (file part or data: URI), keep its bytes
//!  ├─ 2. Encode   bytes → base64 EncodedPayload (type passed through)
//!  ├─ 3. Request  one generateContent call: [inlineData, instruction]
//!  └─ 4. Present  answer verbatim, or a distinct error panel
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use neuralmath::{ingest_path, solve_image, GeminiClient, SolverConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Credential read from GEMINI_API_KEY
//!     let config = SolverConfig::from_env()?;
//!     let client = GeminiClient::new(&config)?;
//!     let image = ingest_path("equation.png", None).await?;
//!     let solution = solve_image(&client, &image, &config.instruction).await?;
//!     println!("{}", solution.text);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `neuralmath` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod server;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{OverwritePolicy, ServerConfig, SolverConfig, SolverConfigBuilder};
pub use error::{InferenceError, NeuralMathError, SolveError};
pub use pipeline::encode::{
    encode_bytes, encode_image, parse_data_uri, strip_data_uri, EncodedPayload,
};
pub use pipeline::gemini::GeminiClient;
pub use pipeline::ingest::{ingest_data_uri, ingest_path, ingest_upload, SelectedImage};
pub use pipeline::llm::{solve_image, ProviderSolver, Solution, Solver};
pub use render::{render_cli, render_page};
pub use server::{router, serve, AppState};
pub use session::{ResultSlot, Session, SessionView, Ticket};
