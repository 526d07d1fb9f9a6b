//! LLM domain — the skin ANALYZE request.
//!
//! Public API for the analysis layer of Skinalyze.
//! External code should only use the items exported here.
//!
//!   - gemini.rs  — Gemini `generateContent` client
//!   - prompts.rs — instructions + response schema
//!   - types.rs   — AnalysisResult + validation

mod gemini;
pub mod prompts;
pub mod types;

pub use gemini::{GeminiClient, GEMINI_MAX_TOKENS};
pub use types::{parse_analysis, AnalysisResult};

use crate::capture::ImagePayload;

/// Why an analysis produced no result. Neither variant is ever shown raw to
/// the user; the session converts both into one generic message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalysisError {
    #[error("analysis service unavailable: {0}")]
    ServiceUnavailable(String),
    /// `raw` is the service text as received, kept for diagnostics only.
    #[error("malformed analysis response: {reason}")]
    MalformedResponse { reason: String, raw: String },
}

/// One-shot image analysis. Implementations make exactly one attempt and
/// never return a partially populated result.
#[async_trait::async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, image: &ImagePayload) -> Result<AnalysisResult, AnalysisError>;
}
