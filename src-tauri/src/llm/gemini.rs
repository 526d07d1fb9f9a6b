//! Gemini ANALYZE client — single `generateContent` call via Google AI API.
//!
//! One request per analysis:
//! - image sent inline (`inlineData`) next to the task instruction
//! - role and limits in `systemInstruction`
//! - `responseMimeType: "application/json"` + `responseSchema` force the
//!   five-field reply, so no fence stripping is needed
//!
//! No retry and no timeout: a single attempt is the whole contract.

use super::prompts::{self, ANALYZE_INSTRUCTION, ANALYZE_SYSTEM_PROMPT};
use super::types::{self, AnalysisResult};
use super::{AnalysisError, Analyzer};
use crate::capture::ImagePayload;
use crate::config::AnalysisConfig;
use std::sync::{PoisonError, RwLock};

pub const GEMINI_MAX_TOKENS: u32 = 1024;

/// Gemini Flash pricing (per 1M tokens):
/// Input:  $0.30 (text / image)
/// Output: $2.50
const INPUT_COST_PER_MILLION: f64 = 0.30;
const OUTPUT_COST_PER_MILLION: f64 = 2.50;

/// Client for the Gemini vision endpoint.
///
/// The API key can be swapped at runtime (settings panel) without
/// rebuilding the session that holds this client.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: RwLock<Option<String>>,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: RwLock::new(config.api_key),
            model: config.model,
            api_base: config.api_base,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_api_key(&self, key: impl Into<String>) {
        *self.api_key.write().unwrap_or_else(PoisonError::into_inner) = Some(key.into());
        log::info!("[LLM] API key updated");
    }

    pub fn is_configured(&self) -> bool {
        self.current_key().is_some()
    }

    fn current_key(&self) -> Option<String> {
        self.api_key
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|k| !k.is_empty())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        )
    }

    /// Request body for one ANALYZE call.
    pub fn build_request(image: &ImagePayload) -> serde_json::Value {
        serde_json::json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [
                        {
                            "inlineData": {
                                "mimeType": image.mime().as_str(),
                                "data": image.to_base64()
                            }
                        },
                        {
                            "text": ANALYZE_INSTRUCTION
                        }
                    ]
                }
            ],
            "systemInstruction": {
                "parts": [
                    {
                        "text": ANALYZE_SYSTEM_PROMPT
                    }
                ]
            },
            "generationConfig": {
                "maxOutputTokens": GEMINI_MAX_TOKENS,
                "temperature": 0.2,
                "responseMimeType": "application/json",
                "responseSchema": prompts::analysis_schema()
            }
        })
    }
}

#[async_trait::async_trait]
impl Analyzer for GeminiClient {
    async fn analyze(&self, image: &ImagePayload) -> Result<AnalysisResult, AnalysisError> {
        let api_key = self.current_key().ok_or_else(|| {
            log::warn!("[LLM] No Gemini API key configured — skipping request");
            AnalysisError::ServiceUnavailable("no API key configured".to_string())
        })?;

        log::info!("[LLM] Provider: gemini");
        log::info!("[LLM] Model: {}", self.model);
        log::info!(
            "[LLM] Image: {} ({}, {} bytes)",
            image.digest(),
            image.mime().as_str(),
            image.bytes().len()
        );

        let start = std::time::Instant::now();

        // API key in URL query param, same as the rest of the Google AI API.
        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key.as_str())])
            .header("content-type", "application/json")
            .json(&Self::build_request(image))
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                log::error!("[LLM] HTTP request failed: {}", e);
                AnalysisError::ServiceUnavailable(e.to_string())
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            let e = e.without_url();
            log::error!("[LLM] Failed to read response body: {}", e);
            AnalysisError::ServiceUnavailable(e.to_string())
        })?;

        if !status.is_success() {
            log::error!("[LLM] Gemini API returned {}: {}", status, body);
            return Err(AnalysisError::ServiceUnavailable(format!(
                "service returned {}",
                status
            )));
        }

        log::info!("[LLM] API latency: {}ms", start.elapsed().as_millis());
        log_usage(&body);

        let reply = extract_reply_text(&body)?;
        match types::parse_analysis(&reply) {
            Ok(result) => {
                log::info!("[LLM] Parse result: success");
                log::info!(
                    "[LLM] Condition: {} (confidence {:.2}, normal={})",
                    result.condition,
                    result.confidence,
                    result.is_normal
                );
                Ok(result)
            }
            Err(e) => {
                if let AnalysisError::MalformedResponse { reason, raw } = &e {
                    log::warn!("[LLM] Failed to parse AnalysisResult: {}", reason);
                    log::warn!("[LLM] Raw reply: {}", raw);
                }
                Err(e)
            }
        }
    }
}

/// Concatenate the text parts of the first candidate.
///
/// Gemini format: candidates[0].content.parts[*].text
fn extract_reply_text(body: &str) -> Result<String, AnalysisError> {
    let malformed = |reason: &str| {
        log::warn!("[LLM] {} — raw body: {}", reason, body);
        AnalysisError::MalformedResponse {
            reason: reason.to_string(),
            raw: body.to_string(),
        }
    };

    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|_| malformed("response body is not JSON"))?;

    if let Some(reason) = json
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        log::warn!("[LLM] Prompt blocked: {}", reason);
    }

    let parts = json
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| malformed("response has no candidate content"))?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(malformed("candidate has no text"));
    }
    Ok(text)
}

/// Log token usage and estimated cost from `usageMetadata`.
fn log_usage(body: &str) {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        return;
    };
    let Some(usage) = json.get("usageMetadata") else {
        return;
    };
    let input_tokens = usage["promptTokenCount"].as_u64().unwrap_or(0);
    let output_tokens = usage["candidatesTokenCount"].as_u64().unwrap_or(0);
    log::info!("[LLM] Input tokens: {}", input_tokens);
    log::info!("[LLM] Output tokens: {}", output_tokens);
    let cost = (input_tokens as f64 * INPUT_COST_PER_MILLION
        + output_tokens as f64 * OUTPUT_COST_PER_MILLION)
        / 1_000_000.0;
    log::info!("[LLM] Estimated cost: ${:.6}", cost);
}
