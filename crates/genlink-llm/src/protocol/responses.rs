//! `OpenAI` Responses API wire format types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::WireError;

// -- Request types --

/// Responses API request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    /// Model identifier
    pub model: String,
    /// Conversation items
    pub input: Vec<ResponsesInputItem>,
    /// Top-level instructions (folded system and developer messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Response to continue from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ResponsesTool>>,
    /// Tool choice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    /// Allow several tool calls in one turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    /// Reasoning configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ResponsesReasoning>,
    /// Whether to stream the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Input item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesInputItem {
    /// Conversation message
    Message {
        /// "user" or "assistant"
        role: String,
        /// Content parts
        content: Vec<ResponsesContentPart>,
    },
    /// Tool call previously made by the model
    FunctionCall {
        /// Correlation id
        call_id: String,
        /// Function name
        name: String,
        /// JSON-encoded arguments
        arguments: String,
    },
    /// Result of a tool call
    FunctionCallOutput {
        /// Correlation id
        call_id: String,
        /// Tool output
        output: String,
    },
    /// Anything else, sent as-is
    #[serde(untagged)]
    Raw(Value),
}

/// Message content part
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesContentPart {
    /// User text
    InputText {
        /// The text
        text: String,
    },
    /// Earlier assistant text
    OutputText {
        /// The text
        text: String,
    },
    /// Image by URL or data URL
    InputImage {
        /// Image location
        image_url: String,
        /// Resolution hint
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// File by URL or inline data
    InputFile {
        /// Remote file URL
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_url: Option<String>,
        /// Data URL with base64 content
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_data: Option<String>,
        /// Original file name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    /// Anything else, sent as-is
    #[serde(untagged)]
    Raw(Value),
}

/// Function tool definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesTool {
    /// Always "function"
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema of the parameters
    pub parameters: Value,
}

/// Reasoning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesReasoning {
    /// "low", "medium" or "high"
    pub effort: String,
}

// -- Response types --

/// Responses API response object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    /// Response identifier, usable as `previous_response_id`
    pub id: String,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// "completed", "incomplete", "failed", ...
    #[serde(default)]
    pub status: Option<String>,
    /// Output items
    pub output: Vec<ResponsesOutputItem>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    /// Why the response is incomplete
    #[serde(default)]
    pub incomplete_details: Option<ResponsesIncompleteDetails>,
    /// Error for failed responses
    #[serde(default)]
    pub error: Option<WireError>,
}

/// Output item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesOutputItem {
    /// Assistant message
    Message {
        /// Content parts
        #[serde(default)]
        content: Vec<ResponsesOutputContent>,
    },
    /// Tool call
    FunctionCall {
        /// Correlation id
        call_id: String,
        /// Function name
        name: String,
        /// JSON-encoded arguments
        #[serde(default)]
        arguments: String,
    },
    /// Reasoning summaries, web search calls and other items
    #[serde(other)]
    Other,
}

/// Output message content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesOutputContent {
    /// Generated text
    OutputText {
        /// The text
        text: String,
    },
    /// Refusal
    Refusal {
        /// Refusal text
        refusal: String,
    },
    /// Annotations and other parts
    #[serde(other)]
    Other,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    /// Prompt tokens
    #[serde(default)]
    pub input_tokens: u32,
    /// Generated tokens
    #[serde(default)]
    pub output_tokens: u32,
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u32,
}

/// Why a response stopped early
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesIncompleteDetails {
    /// e.g. `"max_output_tokens"` or `"content_filter"`
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Streaming types --

/// Server-sent event of a streamed response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesStreamEvent {
    /// Response object created
    #[serde(rename = "response.created")]
    Created {
        /// Initial response object
        response: ResponsesStreamResponse,
    },
    /// Output item started
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded {
        /// Position among output items
        output_index: u32,
        /// The item so far
        item: ResponsesStreamItem,
    },
    /// Output item finished
    #[serde(rename = "response.output_item.done")]
    OutputItemDone {
        /// Position among output items
        output_index: u32,
        /// The complete item
        item: ResponsesStreamItem,
    },
    /// Text fragment
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta {
        /// Position among output items
        #[serde(default)]
        output_index: u32,
        /// Text fragment
        delta: String,
    },
    /// Refusal fragment
    #[serde(rename = "response.refusal.delta")]
    RefusalDelta {
        /// Position among output items
        #[serde(default)]
        output_index: u32,
        /// Refusal text fragment
        delta: String,
    },
    /// Tool argument fragment
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta {
        /// Position among output items
        output_index: u32,
        /// Argument text fragment
        delta: String,
    },
    /// Response finished normally
    #[serde(rename = "response.completed")]
    Completed {
        /// Final response object
        response: ResponsesStreamResponse,
    },
    /// Response stopped early
    #[serde(rename = "response.incomplete")]
    Incomplete {
        /// Final response object
        response: ResponsesStreamResponse,
    },
    /// Response failed
    #[serde(rename = "response.failed")]
    Failed {
        /// Final response object
        response: ResponsesStreamResponse,
    },
    /// Stream-level error
    #[serde(rename = "error")]
    Error {
        /// Error message
        #[serde(default)]
        message: String,
        /// Error code
        #[serde(default)]
        code: Option<String>,
    },
    /// Progress, annotation and reasoning events
    #[serde(other)]
    Other,
}

/// Response object as seen inside stream events
///
/// Lenient: only the fields the stream decoder needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesStreamResponse {
    /// Response identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Model used
    #[serde(default)]
    pub model: Option<String>,
    /// Token usage
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    /// Why the response is incomplete
    #[serde(default)]
    pub incomplete_details: Option<ResponsesIncompleteDetails>,
    /// Error for failed responses
    #[serde(default)]
    pub error: Option<WireError>,
}

/// Output item as seen inside stream events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsesStreamItem {
    /// Assistant message
    Message {},
    /// Tool call
    FunctionCall {
        /// Correlation id
        #[serde(default)]
        call_id: Option<String>,
        /// Function name
        #[serde(default)]
        name: Option<String>,
        /// Arguments so far
        #[serde(default)]
        arguments: String,
    },
    /// Reasoning and other items
    #[serde(other)]
    Other,
}
