//! `OpenAI` Chat Completions wire format types

use serde::{Deserialize, Serialize};

// -- Request types --

/// Chat completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier
    pub model: String,
    /// Conversation messages
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Stream options (e.g. `include_usage`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<ChatStreamOptions>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    /// Tool choice (`"auto"`, `"none"`, `"required"` or a function selector)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    /// Allow several tool calls in one turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Reasoning effort for reasoning models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

/// Stream options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamOptions {
    /// Send a final usage chunk
    #[serde(default)]
    pub include_usage: bool,
}

/// Message within a request or response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role
    pub role: String,
    /// Content (string or array of content parts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChatContent>,
    /// Participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
    /// Tool call this message responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Content is either a string or an array of parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    /// Plain text
    Text(String),
    /// Typed parts
    Parts(Vec<ChatContentPart>),
}

/// Typed content part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    /// Text part
    Text {
        /// The text
        text: String,
    },
    /// Image by URL or data URL
    ImageUrl {
        /// Image location
        image_url: ChatImageUrl,
    },
    /// Inline file
    File {
        /// File payload
        file: ChatFile,
    },
    /// Anything else, sent as-is
    #[serde(untagged)]
    Raw(serde_json::Value),
}

/// Image reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatImageUrl {
    /// URL or data URL
    pub url: String,
    /// Resolution hint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Inline file payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFile {
    /// Data URL with base64 content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    /// Original file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// Tool call in a request or non-streaming response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatToolCall {
    /// Tool call identifier
    pub id: String,
    /// Always "function"
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    /// Function invocation
    pub function: ChatFunctionCall,
}

/// Function name and JSON-encoded arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionCall {
    /// Function name
    pub name: String,
    /// Arguments as a JSON string
    #[serde(default)]
    pub arguments: String,
}

/// Tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTool {
    /// Always "function"
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function definition
    pub function: ChatFunctionDefinition,
}

/// Function definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatFunctionDefinition {
    /// Function name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the parameters
    pub parameters: serde_json::Value,
}

pub(crate) fn function_type() -> String {
    "function".to_owned()
}

// -- Response types --

/// Chat completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Completion choices
    pub choices: Vec<ChatChoice>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// Completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Generated message
    pub message: ChatResponseMessage,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Generated message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponseMessage {
    /// Role (always "assistant")
    #[serde(default)]
    pub role: Option<String>,
    /// Text content
    #[serde(default)]
    pub content: Option<String>,
    /// Refusal text, when the model declined
    #[serde(default)]
    pub refusal: Option<String>,
    /// Tool calls
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChatUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u32,
}

// -- Streaming types --

/// Streaming chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunk {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Choice deltas
    #[serde(default)]
    pub choices: Vec<ChatChunkChoice>,
    /// Usage, present on the final chunk when requested
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// Choice delta within a chunk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunkChoice {
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Incremental content
    #[serde(default)]
    pub delta: ChatChunkDelta,
    /// Set on the last chunk of the choice
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental content
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunkDelta {
    /// Role, sent on the first chunk
    #[serde(default)]
    pub role: Option<String>,
    /// Text fragment
    #[serde(default)]
    pub content: Option<String>,
    /// Refusal fragment, sent instead of content
    #[serde(default)]
    pub refusal: Option<String>,
    /// Tool call fragments
    #[serde(default)]
    pub tool_calls: Option<Vec<ChatChunkToolCall>>,
}

/// Tool call fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunkToolCall {
    /// Position of the tool call within the choice
    #[serde(default)]
    pub index: u32,
    /// Identifier, sent on the first fragment
    #[serde(default)]
    pub id: Option<String>,
    /// Function fragment
    #[serde(default)]
    pub function: Option<ChatChunkFunction>,
}

/// Function fragment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChunkFunction {
    /// Function name, sent on the first fragment
    #[serde(default)]
    pub name: Option<String>,
    /// Argument text fragment
    #[serde(default)]
    pub arguments: Option<String>,
}
