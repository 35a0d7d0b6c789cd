//! Event-stream bodies

use serde_json::Value;
use wiremock::ResponseTemplate;

/// Render `data:` frames, each followed by a blank line
pub fn frames(events: &[Value]) -> String {
    events.iter().map(|event| format!("data: {event}\n\n")).collect()
}

/// Render named events the way Anthropic sends them
pub fn named_frames(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("event: {}\ndata: {event}\n\n", event["type"].as_str().unwrap_or("message")))
        .collect()
}

pub fn response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}
