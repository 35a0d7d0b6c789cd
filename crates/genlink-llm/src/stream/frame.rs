use serde_json::Value;

use crate::error::LlmError;
use crate::types::{Role, Usage};

/// Terminator sent by `OpenAI`-style streams
pub const DONE_SENTINEL: &str = "[DONE]";

/// One server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type line, when other than the default "message"
    pub event: Option<String>,
    /// Concatenated data lines
    pub data: String,
}

impl Frame {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            event: None,
            data: data.into(),
        }
    }

    /// Whether this frame is the end-of-stream sentinel
    pub fn is_done(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }

    /// Whether the frame carries no data at all
    pub fn is_empty(&self) -> bool {
        self.data.trim().is_empty()
    }

    /// Decode the data as JSON
    ///
    /// # Errors
    ///
    /// Malformed JSON is a protocol error carrying a bounded excerpt.
    pub fn json(&self) -> Result<Value, LlmError> {
        serde_json::from_str(&self.data)
            .map_err(|e| LlmError::malformed_json("malformed JSON in stream frame", self.data.as_bytes(), e))
    }
}

impl From<eventsource_stream::Event> for Frame {
    fn from(event: eventsource_stream::Event) -> Self {
        Self {
            event: (!event.event.is_empty() && event.event != "message").then_some(event.event),
            data: event.data,
        }
    }
}

/// Normalized meaning of a frame
///
/// `choice` is the choice index; `position` is the tool call's stable
/// position within that choice.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameDelta {
    /// Response metadata
    Start {
        /// Provider response id
        id: Option<String>,
        /// Model that serves the call
        model: Option<String>,
    },
    /// Author role for a choice
    Role {
        /// Choice index
        choice: u32,
        /// Role
        role: Role,
    },
    /// Text fragment
    Text {
        /// Choice index
        choice: u32,
        /// Fragment, appended as-is
        text: String,
    },
    /// Tool call announced
    ToolStart {
        /// Choice index
        choice: u32,
        /// Tool call position
        position: u32,
        /// Correlation id, when already known
        id: Option<String>,
        /// Tool name, when already known
        name: Option<String>,
    },
    /// Tool argument fragment
    ToolArguments {
        /// Choice index
        choice: u32,
        /// Tool call position
        position: u32,
        /// Fragment, appended as-is
        fragment: String,
    },
    /// Choice finished
    Finish {
        /// Choice index
        choice: u32,
        /// Normalized finish reason
        reason: String,
    },
    /// Usage report, possibly a running total
    Usage(Usage),
    /// End of stream
    Done,
}

/// Provider-specific frame classifier
///
/// Decoders keep whatever cross-frame state their grammar needs (e.g.
/// mapping content block indexes to tool positions) and are created fresh
/// for every call.
pub trait FrameDecoder: Send {
    /// Classify one frame
    ///
    /// # Errors
    ///
    /// Malformed JSON and provider error events end the stream. Well-formed
    /// frames of an unknown shape decode to no deltas.
    fn decode(&mut self, frame: &Frame) -> Result<Vec<FrameDelta>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn done_sentinel_detected() {
        assert!(Frame::new(" [DONE] ").is_done());
        assert!(!Frame::new("{}").is_done());
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        let err = Frame::new(r#"{"choices": ["#).json().unwrap_err();
        assert!(matches!(err, LlmError::Protocol { ref snippet, .. } if snippet == r#"{"choices": ["#));
    }

    #[test]
    fn default_event_name_is_dropped() {
        let frame = Frame::from(eventsource_stream::Event {
            event: "message".to_owned(),
            data: "{}".to_owned(),
            id: String::new(),
            retry: None,
        });
        assert_eq!(frame.event, None);
    }
}
