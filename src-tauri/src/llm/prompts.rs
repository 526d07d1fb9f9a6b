//! Prompt constants and output schema for the skin ANALYZE request.
//!
//! These are the contract between Skinalyze and the vision model. The
//! schema field names must stay in sync with `AnalysisResult`.

/// Fixed disclaimer the model must return in `cautionary_note`.
pub const CAUTIONARY_NOTE: &str = "This is an AI-generated analysis and not a medical diagnosis. Consult a healthcare professional for any health concerns.";

/// Application-wide disclaimer shown under every screen.
pub const APP_DISCLAIMER: &str = "This tool provides an AI-based preliminary analysis and is not a substitute for professional medical diagnosis. Always consult with a qualified healthcare provider for any health concerns.";

/// System-level instruction: the model's role and its limits.
pub const ANALYZE_SYSTEM_PROMPT: &str = "You are an AI assistant designed for preliminary visual analysis of skin images. Your purpose is to identify potential common dermatological conditions from images. You are NOT a medical professional. Your analysis must be cautious and descriptive. Do not provide medical advice, treatment plans, or diagnoses. Your response must be in JSON format.";

/// Task instruction sent alongside the image.
pub const ANALYZE_INSTRUCTION: &str = "Analyze this image of a skin area. Based on visual evidence, identify the most likely condition or determine if it appears normal. Provide a brief description, a confidence score, and a mandatory cautionary note. Structure your response strictly according to the provided JSON schema.";

/// Required top-level keys of the model reply.
pub const REQUIRED_FIELDS: [&str; 5] = [
    "condition",
    "description",
    "confidence",
    "isNormal",
    "cautionary_note",
];

/// Response schema in the Gemini `responseSchema` dialect.
pub fn analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "condition": {
                "type": "STRING",
                "description": "The most likely skin condition identified. Examples: 'Appears Normal', 'Possible Eczema', 'Acne Vulgaris', 'Suspected Fungal Infection'. Use cautious, non-clinical language."
            },
            "description": {
                "type": "STRING",
                "description": "A brief, neutral, visual description of the skin in the image. Focus on what you see (e.g., 'redness, small bumps, dry patches')."
            },
            "confidence": {
                "type": "NUMBER",
                "description": "A confidence score from 0.0 to 1.0 for the identified condition."
            },
            "isNormal": {
                "type": "BOOLEAN",
                "description": "True if the condition is 'Appears Normal', otherwise false."
            },
            "cautionary_note": {
                "type": "STRING",
                "description": format!("A mandatory, fixed disclaimer: '{}'", CAUTIONARY_NOTE)
            }
        },
        "required": REQUIRED_FIELDS,
        "propertyOrdering": REQUIRED_FIELDS
    })
}
