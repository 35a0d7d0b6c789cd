//! Google Gemini `generateContent` wire format types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// -- Request types --

/// `generateContent` request (the model is part of the URL)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleRequest {
    /// Conversation turns
    pub contents: Vec<GoogleContent>,
    /// System instruction (folded system and developer messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GoogleContent>,
    /// Tool declarations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GoogleTool>>,
    /// Function calling mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<GoogleToolConfig>,
    /// Sampling configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GoogleGenerationConfig>,
}

/// Turn content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoogleContent {
    /// "user" or "model"; absent for system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts
    #[serde(default)]
    pub parts: Vec<GooglePart>,
}

/// Content part
///
/// Exactly one payload field is set; unknown fields are preserved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePart {
    /// Text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Whether `text` is a thought summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Inline media
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<GoogleInlineData>,
    /// Tool call made by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GoogleFunctionCall>,
    /// Tool result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GoogleFunctionResponse>,
    /// Fields this client does not model
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GooglePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// Inline media
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleInlineData {
    /// MIME type
    pub mime_type: String,
    /// Base64-encoded bytes
    pub data: String,
}

/// Tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionCall {
    /// Call identifier (newer models only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: Value,
}

/// Tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionResponse {
    /// Call identifier being answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Function name being answered
    pub name: String,
    /// Result object
    pub response: Value,
}

/// Tool declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleTool {
    /// Function declarations
    pub function_declarations: Vec<GoogleFunctionDeclaration>,
}

/// Function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleFunctionDeclaration {
    /// Function name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the parameters
    pub parameters: Value,
}

/// Tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleToolConfig {
    /// Function calling configuration
    pub function_calling_config: GoogleFunctionCallingConfig,
}

/// Function calling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleFunctionCallingConfig {
    /// "AUTO", "ANY" or "NONE"
    pub mode: String,
    /// Restrict calls to these functions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_function_names: Option<Vec<String>>,
}

/// Sampling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleGenerationConfig {
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Thinking configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<GoogleThinkingConfig>,
}

impl GoogleGenerationConfig {
    /// Whether no field is set
    pub const fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.max_output_tokens.is_none()
            && self.stop_sequences.is_none()
            && self.thinking_config.is_none()
    }
}

/// Thinking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleThinkingConfig {
    /// Thinking token budget
    pub thinking_budget: u32,
}

// -- Response types --

/// `generateContent` response; also the shape of every streamed chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleResponse {
    /// Response candidates
    #[serde(default)]
    pub candidates: Vec<GoogleCandidate>,
    /// Token usage
    #[serde(default)]
    pub usage_metadata: Option<GoogleUsageMetadata>,
    /// Model version that served the call
    #[serde(default)]
    pub model_version: Option<String>,
    /// Response identifier
    #[serde(default)]
    pub response_id: Option<String>,
    /// Prompt-level safety verdict
    #[serde(default)]
    pub prompt_feedback: Option<GooglePromptFeedback>,
}

/// Response candidate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCandidate {
    /// Generated content
    #[serde(default)]
    pub content: Option<GoogleContent>,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
    /// Candidate index
    #[serde(default)]
    pub index: Option<u32>,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleUsageMetadata {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Generated tokens
    #[serde(default)]
    pub candidates_token_count: u32,
    /// Total tokens
    #[serde(default)]
    pub total_token_count: u32,
}

/// Prompt-level safety verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GooglePromptFeedback {
    /// Why the prompt was blocked
    #[serde(default)]
    pub block_reason: Option<String>,
}
