//! Lenient parsing of whole response bodies
//!
//! Tries, in order: a provider error envelope (even on a success status),
//! the provider's canonical shape, the same inside a `response`, `data` or
//! `result` wrapper, an event-stream body replayed through the stream
//! aggregator, and a bare `{"content": "..."}` reply. Anything else is a
//! protocol error carrying a bounded excerpt of the body.

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;

use crate::convert::error_from_value;
use crate::error::LlmError;
use crate::provider::Provider;
use crate::stream::{Frame, StreamAggregator};
use crate::types::{Choice, GenerateResponse, Message, finish_reason};

const WRAPPER_KEYS: [&str; 3] = ["response", "data", "result"];

/// Parse a whole response body for `provider`
pub fn parse_body(provider: Provider, body: &[u8]) -> Result<GenerateResponse, LlmError> {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return Err(LlmError::protocol("empty response body", body));
    }

    match serde_json::from_slice::<Value>(trimmed) {
        Ok(value) => parse_value(provider, &value, body),
        Err(_) if looks_like_event_stream(trimmed) => replay_event_stream(provider, trimmed),
        Err(e) => Err(LlmError::malformed_json("response body is not valid JSON", body, e)),
    }
}

fn parse_value(provider: Provider, value: &Value, body: &[u8]) -> Result<GenerateResponse, LlmError> {
    if let Some(error) = error_from_value(value, None) {
        return Err(error);
    }
    if let Some(parsed) = provider.parse_canonical(value) {
        return parsed;
    }

    for key in WRAPPER_KEYS {
        let Some(inner) = value.get(key).filter(|v| v.is_object()) else {
            continue;
        };
        if let Some(error) = error_from_value(inner, None) {
            return Err(error);
        }
        if let Some(parsed) = provider.parse_canonical(inner) {
            tracing::debug!(provider = provider.name(), wrapper = key, "unwrapped response envelope");
            return parsed;
        }
    }

    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return Ok(bare_reply(value, content));
    }

    Err(LlmError::protocol("unrecognized response shape", body))
}

fn bare_reply(value: &Value, content: &str) -> GenerateResponse {
    let text_field = |key: &str| value.get(key).and_then(Value::as_str).map(ToOwned::to_owned);
    GenerateResponse {
        id: text_field("id"),
        model: text_field("model").unwrap_or_default(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(content),
            finish_reason: text_field("finish_reason")
                .map_or_else(|| finish_reason::STOP.to_owned(), |r| finish_reason::normalize(&r)),
        }],
        usage: None,
        fallback: false,
    }
}

fn looks_like_event_stream(body: &[u8]) -> bool {
    ["data:", "event:", "id:", "retry:", ":"]
        .iter()
        .any(|prefix| body.starts_with(prefix.as_bytes()))
}

/// Run an event-stream body that arrived whole through the aggregator
fn replay_event_stream(provider: Provider, body: &[u8]) -> Result<GenerateResponse, LlmError> {
    // A final blank line terminates the last event
    let mut text = body.to_vec();
    text.extend_from_slice(b"\n\n");

    let events = futures_util::stream::iter([Ok::<_, LlmError>(Bytes::from(text))])
        .eventsource()
        .collect::<Vec<_>>()
        .now_or_never()
        .unwrap_or_default();

    let mut decoder = provider.decoder();
    let mut aggregator = StreamAggregator::new();
    let mut frames = 0_usize;
    for event in events {
        let event = event.map_err(|e| LlmError::protocol(format!("invalid event stream: {e}"), body))?;
        frames += 1;
        for delta in decoder.decode(&Frame::from(event))? {
            aggregator.apply(delta);
        }
        if aggregator.is_done() {
            break;
        }
    }

    if frames == 0 {
        return Err(LlmError::protocol("event stream carried no events", body));
    }
    Ok(aggregator.partial())
}
