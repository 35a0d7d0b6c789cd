//! Anthropic Messages API wire format types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WireError;

// -- Request types --

/// Messages API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
    /// Model identifier
    pub model: String,
    /// Maximum tokens to generate (required by Anthropic)
    pub max_tokens: u32,
    /// System prompt (folded system and developer messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<AnthropicMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<AnthropicTool>>,
    /// Tool choice configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<AnthropicToolChoice>,
    /// Extended thinking configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<AnthropicThinking>,
}

/// Conversation message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// "user" or "assistant"
    pub role: String,
    /// Content blocks
    pub content: Vec<AnthropicContentBlock>,
}

/// Content block in a request message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContentBlock {
    /// Text
    Text {
        /// The text
        text: String,
    },
    /// Image
    Image {
        /// Image source
        source: AnthropicSource,
    },
    /// PDF or plain-text document
    Document {
        /// Document source
        source: AnthropicSource,
    },
    /// Tool call previously made by the assistant
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input
        input: Value,
    },
    /// Tool result
    ToolResult {
        /// Tool use this result answers
        tool_use_id: String,
        /// Result text
        content: String,
        /// Whether the tool failed
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    /// Anything else, sent as-is
    #[serde(untagged)]
    Raw(Value),
}

/// Image or document source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicSource {
    /// Inline base64 content
    Base64 {
        /// MIME type
        media_type: String,
        /// Base64-encoded bytes
        data: String,
    },
    /// Remote URL
    Url {
        /// The URL
        url: String,
    },
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicTool {
    /// Tool name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the input
    pub input_schema: Value,
}

/// Tool choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicToolChoice {
    /// "auto", "any", "tool" or "none"
    #[serde(rename = "type")]
    pub choice_type: String,
    /// Tool name when `choice_type` is "tool"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Restrict the model to one tool call per turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_parallel_tool_use: Option<bool>,
}

/// Extended thinking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicThinking {
    /// Always "enabled"
    #[serde(rename = "type")]
    pub thinking_type: String,
    /// Thinking token budget
    pub budget_tokens: u32,
}

// -- Response types --

/// Messages API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Always "assistant"
    #[serde(default)]
    pub role: Option<String>,
    /// Response content blocks
    pub content: Vec<AnthropicResponseBlock>,
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Content block in a response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicResponseBlock {
    /// Generated text
    Text {
        /// The text
        text: String,
    },
    /// Tool call
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Tool input
        #[serde(default)]
        input: Value,
    },
    /// Thinking, redacted thinking and server tool blocks
    #[serde(other)]
    Other,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AnthropicUsage {
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u32,
}

// -- Streaming types --

/// Server-sent event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    /// Stream started
    MessageStart {
        /// Message metadata
        message: AnthropicStreamMessage,
    },
    /// Content block started
    ContentBlockStart {
        /// Block index (shared across text and tool blocks)
        index: u32,
        /// Initial block
        content_block: AnthropicStreamBlock,
    },
    /// Content block fragment
    ContentBlockDelta {
        /// Block index
        index: u32,
        /// Fragment
        delta: AnthropicStreamDelta,
    },
    /// Content block finished
    ContentBlockStop {
        /// Block index
        index: u32,
    },
    /// Message-level update with stop reason and usage
    MessageDelta {
        /// Stop reason
        delta: AnthropicMessageDelta,
        /// Cumulative usage
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    /// Stream finished
    MessageStop,
    /// Keep-alive
    Ping,
    /// Error inside the stream
    Error {
        /// Error details
        error: WireError,
    },
    /// Event types added after this client was written
    #[serde(other)]
    Other,
}

/// Message metadata at stream start
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicStreamMessage {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Initial usage (input tokens)
    #[serde(default)]
    pub usage: Option<AnthropicUsage>,
}

/// Initial content block
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamBlock {
    /// Text block
    Text {
        /// Initial text (usually empty)
        #[serde(default)]
        text: String,
    },
    /// Tool call block
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
    },
    /// Thinking and server tool blocks
    #[serde(other)]
    Other,
}

/// Content block fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamDelta {
    /// Text fragment
    TextDelta {
        /// The text
        text: String,
    },
    /// Tool input JSON fragment
    InputJsonDelta {
        /// Partial JSON
        partial_json: String,
    },
    /// Thinking and signature fragments
    #[serde(other)]
    Other,
}

/// Message-level update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnthropicMessageDelta {
    /// Stop reason
    #[serde(default)]
    pub stop_reason: Option<String>,
}
