//! Provider-agnostic request and response vocabulary
//!
//! Every adapter reads and writes these types; wire formats convert to and
//! from them.

pub mod message;
pub mod request;
pub mod response;
pub mod tool;

pub use message::{ContentItem, MediaRef, MediaSource, Message, Role};
pub use request::{GenerateOptions, GenerateRequest};
pub use response::{Choice, GenerateResponse, Usage, finish_reason};
pub use tool::{ToolCall, ToolChoice, ToolDefinition};

use crate::error::LlmError;

/// One item of a generation event stream
///
/// `Ok` carries one finalized choice; an `Err` is always the last item.
pub type StreamEvent = Result<GenerateResponse, LlmError>;
