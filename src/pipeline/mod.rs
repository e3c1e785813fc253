//! Pipeline stages for turning an uploaded image into a solution.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ encode ──▶ llm / gemini
//! (file)     (base64)   (one request)
//! ```
//!
//! 1. [`ingest`]: accept the selected file or data URI, decide its media type
//! 2. [`encode`]: base64-wrap the bytes with their declared media type
//! 3. [`llm`]: the [`llm::Solver`] seam and the single-request driver
//! 4. [`gemini`]: the native `generateContent` client; the only stage with
//!    network I/O by default

pub mod encode;
pub mod gemini;
pub mod ingest;
pub mod llm;
