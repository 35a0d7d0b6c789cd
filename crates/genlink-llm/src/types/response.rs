use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::ToolCall;

/// Normalized finish reasons
///
/// Vendor values without a normalized equivalent pass through unchanged.
pub mod finish_reason {
    pub const STOP: &str = "stop";
    pub const TOOL_CALLS: &str = "tool_calls";
    pub const LENGTH: &str = "length";
    pub const ERROR: &str = "error";

    /// Map a vendor finish reason onto the normalized vocabulary
    pub fn normalize(raw: &str) -> String {
        match raw {
            "stop" | "end_turn" | "stop_sequence" | "STOP" | "completed" => STOP.to_owned(),
            "length" | "max_tokens" | "MAX_TOKENS" | "max_output_tokens" => LENGTH.to_owned(),
            "tool_calls" | "tool_use" | "function_call" => TOOL_CALLS.to_owned(),
            "error" | "failed" => ERROR.to_owned(),
            other => other.to_owned(),
        }
    }
}

/// One candidate turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Position within the response, stable across a stream
    pub index: u32,
    /// Generated message
    pub message: Message,
    /// Why generation stopped
    pub finish_reason: String,
}

/// Token usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,
    /// Tokens generated
    pub completion_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl Usage {
    /// Usage with a computed total
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.completion_tokens == 0 && self.total_tokens == 0
    }

    /// Fold a newer usage report into this one
    ///
    /// Providers re-send running totals, so non-zero fields replace rather
    /// than add. A zero total is recomputed from the parts.
    pub const fn merge_latest(&mut self, newer: Self) {
        if newer.prompt_tokens > 0 {
            self.prompt_tokens = newer.prompt_tokens;
        }
        if newer.completion_tokens > 0 {
            self.completion_tokens = newer.completion_tokens;
        }
        self.total_tokens = if newer.total_tokens > 0 {
            newer.total_tokens
        } else {
            self.prompt_tokens.saturating_add(self.completion_tokens)
        };
    }
}

/// Normalized generation response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Provider-assigned response id, usable as a continuation token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Model that served the call
    pub model: String,
    /// Candidate turns
    pub choices: Vec<Choice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Served by the non-streaming fallback of a streaming call
    #[serde(default)]
    pub fallback: bool,
}

impl GenerateResponse {
    /// Text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// Finish reason of the first choice
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().map(|c| c.finish_reason.as_str())
    }

    /// Tool calls of the first choice
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.choices
            .first()
            .map(|c| c.message.tool_calls.as_slice())
            .unwrap_or_default()
    }
}
