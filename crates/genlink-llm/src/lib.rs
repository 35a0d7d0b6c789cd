//! Generation protocol adapter for genlink
//!
//! Issues one normalized generation request against `OpenAI` Chat
//! Completions, the `OpenAI` Responses API, Anthropic Messages or Google
//! Gemini, and returns one normalized response or event stream. Streaming
//! replies are reassembled by a per-call aggregator that rebuilds text and
//! tool-call arguments, meters usage and reports each call exactly once to
//! an optional lifecycle hook.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod capability;
pub mod client;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod parse;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use capability::{Capabilities, Feature};
pub use client::{GenerationClient, GenerationClientBuilder};
pub use error::{ErrorKind, LlmError};
pub use lifecycle::{CallHook, CallInfo, CallKind, TracingHook, UsageListener};
pub use provider::Provider;
pub use session::SessionStore;
pub use stream::EventStream;
pub use transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};
pub use types::{
    Choice, ContentItem, GenerateOptions, GenerateRequest, GenerateResponse, MediaSource, Message, Role, StreamEvent,
    ToolCall, ToolChoice, ToolDefinition, Usage,
};
