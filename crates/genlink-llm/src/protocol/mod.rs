//! Wire format types for each provider API
//!
//! Pure serde structs matching the providers' JSON. They only exist at the
//! boundary; the rest of the crate works on [`crate::types`].

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod responses;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error envelope shared by all supported providers
///
/// `OpenAI` and Google send `{"error": {...}}`; Anthropic adds a top-level
/// `"type": "error"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireErrorEnvelope {
    /// Error details
    pub error: WireError,
}

/// Provider error details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireError {
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Error type (`OpenAI`, Anthropic)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Error code, a string for `OpenAI` and a number for Google
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    /// Canonical status name (Google, e.g. `"INVALID_ARGUMENT"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Offending parameter (`OpenAI`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
}

impl WireError {
    /// Error code as text, preferring the symbolic form
    pub fn code_text(&self) -> Option<String> {
        match &self.code {
            Some(Value::String(code)) => Some(code.clone()),
            Some(Value::Number(_)) | None => self.status.clone(),
            Some(other) => Some(other.to_string()),
        }
    }
}
