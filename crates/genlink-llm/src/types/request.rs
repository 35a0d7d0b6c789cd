use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::message::{Message, Role};
use super::tool::{ToolChoice, ToolDefinition};

/// Normalized generation request
///
/// Adapters only ever borrow it; nothing in a call mutates the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Conversation in order
    pub messages: Vec<Message>,
    /// Per-call options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerateOptions>,
}

impl GenerateRequest {
    pub const fn new(messages: Vec<Message>) -> Self {
        Self { messages, options: None }
    }

    #[must_use]
    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Options, or the defaults when none were given
    pub fn options(&self) -> Cow<'_, GenerateOptions> {
        self.options
            .as_ref()
            .map_or_else(|| Cow::Owned(GenerateOptions::default()), Cow::Borrowed)
    }

    /// Whether the call offers tools to the model
    pub fn uses_tools(&self) -> bool {
        self.options.as_ref().is_some_and(|o| !o.tools.is_empty())
    }

    /// Whether the call carries image or file input
    pub fn uses_media(&self) -> bool {
        self.options.as_ref().is_some_and(|o| o.multimodal) || self.messages.iter().any(Message::has_media)
    }

    /// Whether the conversation already contains tool turns
    pub fn has_tool_turns(&self) -> bool {
        self.messages
            .iter()
            .any(|m| m.role == Role::Tool || !m.tool_calls.is_empty())
    }
}

/// Caller options for one generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Tools offered to the model
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Tool selection policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    /// Caller intends to send image or file input
    pub multimodal: bool,
    /// Provider-issued handle of the response to continue from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    /// Conversation key for the client's session store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Allow several tool calls in one turn
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Thinking token budget for reasoning models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_budget: Option<u32>,
    /// Refuse the non-streaming fallback on streaming calls
    pub disable_stream_fallback: bool,
    /// Retry once without the continuation token when the provider rejects it
    pub allow_fresh_restart: bool,
}
