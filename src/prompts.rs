//! The instruction sent alongside every uploaded image.
//!
//! Callers can override it via [`crate::config::SolverConfig::instruction`];
//! the constant here is used only when no override is provided.

/// Fixed instruction appended after the inline image part.
///
/// The model is asked to answer only mathematical content and to avoid
/// emphasis markup, because the answer is displayed verbatim.
pub const SOLVE_INSTRUCTION: &str = "Please solve the following mathematical expression and provide a clear, concise explanation of the solution. Respond only if the question is mathematical. Do Not emphasise any words by using bold, italics, or underlining. Do not include any additional information or irrelevant content.";
