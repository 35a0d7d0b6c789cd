//! Conversion between normalized types and provider wire formats
//!
//! Each submodule owns one provider: request building, canonical response
//! conversion and the stream frame decoder.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod responses;

use std::borrow::Cow;

use genlink_config::GenerationDefaults;
use serde_json::Value;

use crate::error::{LlmError, snippet};
use crate::protocol::{WireError, WireErrorEnvelope};
use crate::types::{ContentItem, GenerateOptions, GenerateRequest, Message};

/// Sampling values after merging caller options, client defaults and clamps
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sampling {
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Request view handed to the adapters
///
/// Built by the client: caller options are merged over client defaults,
/// the provider default output limit fills any gap, and the configured
/// output limit is applied last.
#[derive(Debug, Clone)]
pub struct PreparedRequest<'a> {
    /// Model identifier
    pub model: &'a str,
    /// Conversation in order
    pub messages: &'a [Message],
    /// Caller options
    pub options: Cow<'a, GenerateOptions>,
    /// Effective sampling values
    pub sampling: Sampling,
    /// Continuation token to send, already checked against capabilities
    pub continuation_token: Option<&'a str>,
    /// Whether the provider should stream
    pub stream: bool,
}

impl<'a> PreparedRequest<'a> {
    /// Start from the caller's request with no defaults applied
    pub fn new(model: &'a str, request: &'a GenerateRequest) -> Self {
        let options = request.options();
        let sampling = Sampling {
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };
        Self {
            model,
            messages: &request.messages,
            options,
            sampling,
            continuation_token: None,
            stream: false,
        }
    }

    /// Fill unset sampling values from client defaults
    #[must_use]
    pub fn with_defaults(mut self, defaults: &GenerationDefaults) -> Self {
        self.sampling.temperature = self.sampling.temperature.or(defaults.temperature);
        self.sampling.top_p = self.sampling.top_p.or(defaults.top_p);
        self.sampling.max_tokens = self.sampling.max_tokens.or(defaults.max_tokens);
        self
    }

    /// Fill an unset output limit with the provider's required default
    #[must_use]
    pub fn with_provider_max_tokens(mut self, default: Option<u32>) -> Self {
        self.sampling.max_tokens = self.sampling.max_tokens.or(default);
        self
    }

    /// Apply the configured output limit
    #[must_use]
    pub fn clamp_max_tokens(mut self, limit: Option<u32>) -> Self {
        if let (Some(limit), Some(requested)) = (limit, self.sampling.max_tokens)
            && requested > limit
        {
            tracing::debug!(requested, limit, "clamping max tokens to provider limit");
            self.sampling.max_tokens = Some(limit);
        }
        self
    }

    #[must_use]
    pub const fn with_continuation(mut self, token: Option<&'a str>) -> Self {
        self.continuation_token = token;
        self
    }

    #[must_use]
    pub const fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Model identifier, failing when unset
    pub fn require_model(&self) -> Result<&'a str, LlmError> {
        if self.model.trim().is_empty() {
            return Err(LlmError::InvalidRequest("model is not set".to_owned()));
        }
        Ok(self.model)
    }

    /// Stop sequences, or `None` when empty
    pub fn stop(&self) -> Option<Vec<String>> {
        (!self.options.stop.is_empty()).then(|| self.options.stop.clone())
    }
}

/// Reasoning effort tier for a thinking token budget
pub const fn reasoning_effort(budget: u32) -> &'static str {
    match budget {
        0..=1024 => "low",
        1025..=8192 => "medium",
        _ => "high",
    }
}

/// Fold system and developer messages into one instruction text
///
/// Returns `None` when the conversation has no instruction messages.
pub fn fold_instructions(messages: &[Message]) -> Result<Option<String>, LlmError> {
    let mut sections = Vec::new();
    for message in messages.iter().filter(|m| m.role.is_instruction()) {
        if message
            .items
            .iter()
            .any(|item| !matches!(item, ContentItem::Text { .. }))
        {
            return Err(LlmError::InvalidRequest(format!(
                "{} messages can only carry text for this provider",
                message.role
            )));
        }
        let text = message.text();
        if !text.is_empty() {
            sections.push(text.into_owned());
        }
    }

    Ok((!sections.is_empty()).then(|| sections.join("\n\n")))
}

/// Detect a provider error envelope inside an otherwise successful body or frame
pub fn error_from_value(value: &Value, status: Option<u16>) -> Option<LlmError> {
    if !value.get("error").is_some_and(Value::is_object) {
        return None;
    }
    let envelope: WireErrorEnvelope = serde_json::from_value(value.clone()).ok()?;
    Some(classify_error(status, envelope.error))
}

/// Build the error for a non-success HTTP response
pub fn error_from_body(status: u16, body: &[u8]) -> LlmError {
    if let Ok(value) = serde_json::from_slice::<Value>(body)
        && let Some(error) = error_from_value(&value, Some(status))
    {
        return error;
    }

    let message = match snippet(body) {
        text if text.is_empty() => http::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("request failed")
            .to_owned(),
        text => text,
    };
    LlmError::provider(Some(status), message)
}

/// Map a provider error onto the taxonomy
///
/// Rejected continuation tokens and tool results that cannot be correlated
/// become [`LlmError::Continuation`]; everything else is a provider error.
pub fn classify_error(status: Option<u16>, error: WireError) -> LlmError {
    let code = error.code_text();
    if is_continuation_failure(code.as_deref(), &error.message) {
        return LlmError::Continuation {
            message: error.message,
            status,
        };
    }

    LlmError::Provider {
        status,
        message: error.message,
        error_type: error.error_type,
        code,
    }
}

fn is_continuation_failure(code: Option<&str>, message: &str) -> bool {
    if code == Some("previous_response_not_found") {
        return true;
    }

    let message = message.to_ascii_lowercase();
    message.contains("previous_response_id")
        || message.contains("previous response")
        || message.contains("no tool call found")
        || message.contains("tool_use_id")
        || message.contains("must be a response to a preceeding message")
        || message.contains("must be a response to a preceding message")
        || message.contains("function response turn")
}
