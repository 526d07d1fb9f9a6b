//! ANALYZE response type and its validation.
//!
//! The model reply deserializes directly into `AnalysisResult`; anything
//! that does not satisfy the schema is rejected as a whole.

use super::AnalysisError;
use serde::{Deserialize, Serialize};

/// Structured outcome of one successful analysis.
///
/// Serialized with the same keys the model returns, so the webview renders
/// exactly what the service produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub condition: String,
    pub description: String,
    pub confidence: f64,
    #[serde(rename = "isNormal")]
    pub is_normal: bool,
    pub cautionary_note: String,
}

impl AnalysisResult {
    /// Check the constraints serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.condition.trim().is_empty() {
            return Err("condition is empty".to_string());
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!("confidence {} outside [0, 1]", self.confidence));
        }
        if self.cautionary_note.trim().is_empty() {
            return Err("cautionary_note is empty".to_string());
        }
        Ok(())
    }

    /// Confidence as a whole percentage, for the confidence bar.
    pub fn confidence_percent(&self) -> u8 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u8
    }

    /// Anything not judged normal gets the cautionary styling.
    pub fn is_concerning(&self) -> bool {
        !self.is_normal
    }
}

/// Parse the model's reply text into a validated `AnalysisResult`.
///
/// Atomic: either every field is present and in range, or the whole reply
/// is `MalformedResponse` carrying the raw text for the log.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let malformed = |reason: String| AnalysisError::MalformedResponse {
        reason,
        raw: text.to_string(),
    };

    let result: AnalysisResult =
        serde_json::from_str(text.trim()).map_err(|e| malformed(e.to_string()))?;
    result.validate().map_err(malformed)?;
    Ok(result)
}
