//! Conversion between normalized types and the Anthropic Messages API

use std::collections::BTreeMap;

use serde_json::Value;

use super::{PreparedRequest, classify_error, error_from_value, fold_instructions};
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse, AnthropicResponseBlock,
    AnthropicSource, AnthropicStreamBlock, AnthropicStreamDelta, AnthropicStreamEvent, AnthropicThinking,
    AnthropicTool, AnthropicToolChoice, AnthropicUsage,
};
use crate::stream::{Frame, FrameDecoder, FrameDelta};
use crate::types::{
    Choice, ContentItem, GenerateResponse, MediaRef, MediaSource, Message, Role, ToolCall, ToolChoice, Usage,
    finish_reason,
};

/// Output limit sent when neither the caller nor the configuration sets one
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

// -- Outbound --

impl TryFrom<&PreparedRequest<'_>> for AnthropicRequest {
    type Error = LlmError;

    fn try_from(prepared: &PreparedRequest<'_>) -> Result<Self, Self::Error> {
        let model = prepared.require_model()?;
        let options = &prepared.options;

        let mut messages: Vec<AnthropicMessage> = Vec::new();
        for message in prepared.messages.iter().filter(|m| !m.role.is_instruction()) {
            match message.role {
                Role::Tool => {
                    let block = tool_result_block(message)?;
                    // Consecutive tool results share one user turn
                    if let Some(last) = messages
                        .last_mut()
                        .filter(|last| last.role == "user" && is_tool_result_turn(last))
                    {
                        last.content.push(block);
                    } else {
                        messages.push(AnthropicMessage {
                            role: "user".to_owned(),
                            content: vec![block],
                        });
                    }
                }
                Role::Assistant => messages.push(assistant_message(message)),
                _ => messages.push(AnthropicMessage {
                    role: "user".to_owned(),
                    content: message.parts().iter().map(content_block).collect(),
                }),
            }
        }

        let tools = (!options.tools.is_empty()).then(|| {
            options
                .tools
                .iter()
                .map(|tool| AnthropicTool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool.input_schema(),
                })
                .collect()
        });

        let disable_parallel = options
            .parallel_tool_calls
            .filter(|_| tools.is_some())
            .map(|parallel| !parallel);
        let tool_choice = match (&options.tool_choice, disable_parallel) {
            (Some(choice), _) => Some(tool_choice(choice, disable_parallel)),
            (None, Some(_)) => Some(tool_choice(&ToolChoice::Auto, disable_parallel)),
            (None, None) => None,
        };

        Ok(Self {
            model: model.to_owned(),
            max_tokens: prepared.sampling.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: fold_instructions(prepared.messages)?,
            messages,
            temperature: prepared.sampling.temperature,
            top_p: prepared.sampling.top_p,
            stop_sequences: prepared.stop(),
            stream: prepared.stream.then_some(true),
            tools,
            tool_choice,
            thinking: options.reasoning_budget.map(|budget_tokens| AnthropicThinking {
                thinking_type: "enabled".to_owned(),
                budget_tokens,
            }),
        })
    }
}

fn is_tool_result_turn(message: &AnthropicMessage) -> bool {
    message
        .content
        .iter()
        .all(|block| matches!(block, AnthropicContentBlock::ToolResult { .. }))
}

fn tool_result_block(message: &Message) -> Result<AnthropicContentBlock, LlmError> {
    let tool_use_id = message
        .tool_call_id
        .clone()
        .ok_or_else(|| LlmError::InvalidRequest("tool message is missing tool_call_id".to_owned()))?;
    Ok(AnthropicContentBlock::ToolResult {
        tool_use_id,
        content: message.text().into_owned(),
        is_error: None,
    })
}

fn assistant_message(message: &Message) -> AnthropicMessage {
    let mut content: Vec<AnthropicContentBlock> = if message.items.is_empty() {
        if message.content.is_empty() {
            Vec::new()
        } else {
            vec![AnthropicContentBlock::Text {
                text: message.content.clone(),
            }]
        }
    } else {
        message.items.iter().map(content_block).collect()
    };

    content.extend(message.tool_calls.iter().map(|call| AnthropicContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.arguments.clone(),
    }));

    AnthropicMessage {
        role: "assistant".to_owned(),
        content,
    }
}

fn content_block(item: &ContentItem) -> AnthropicContentBlock {
    match item {
        ContentItem::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        ContentItem::Image { source, .. } => AnthropicContentBlock::Image {
            source: media_source(source),
        },
        ContentItem::File { source, .. } => AnthropicContentBlock::Document {
            source: media_source(source),
        },
        ContentItem::Raw { value } => AnthropicContentBlock::Raw(value.clone()),
    }
}

fn media_source(source: &MediaSource) -> AnthropicSource {
    match source.resolve() {
        MediaRef::Url(url) => AnthropicSource::Url { url: url.to_owned() },
        MediaRef::Inline { media_type, data } => AnthropicSource::Base64 {
            media_type: media_type.to_owned(),
            data: data.to_owned(),
        },
    }
}

fn tool_choice(choice: &ToolChoice, disable_parallel_tool_use: Option<bool>) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::Function(name) => ("tool", Some(name.clone())),
    };
    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
        disable_parallel_tool_use: disable_parallel_tool_use.filter(|_| choice_type != "none"),
    }
}

// -- Inbound --

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Self::new(usage.input_tokens, usage.output_tokens)
    }
}

impl From<AnthropicResponse> for GenerateResponse {
    fn from(response: AnthropicResponse) -> Self {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in response.content {
            match block {
                AnthropicResponseBlock::Text { text: t } => text.push_str(&t),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    let input = if input.is_null() {
                        Value::Object(serde_json::Map::new())
                    } else {
                        input
                    };
                    tool_calls.push(ToolCall::from_value(id, name, input));
                }
                AnthropicResponseBlock::Other => {}
            }
        }

        let finish = response.stop_reason.map_or_else(
            || {
                if tool_calls.is_empty() {
                    finish_reason::STOP.to_owned()
                } else {
                    finish_reason::TOOL_CALLS.to_owned()
                }
            },
            |r| finish_reason::normalize(&r),
        );

        Self {
            id: response.id,
            model: response.model.unwrap_or_default(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text).with_tool_calls(tool_calls),
                finish_reason: finish,
            }],
            usage: response.usage.map(Into::into),
            fallback: false,
        }
    }
}

/// Parse a canonical Messages API body
pub fn parse_canonical(value: &Value) -> Option<GenerateResponse> {
    let is_message = value.get("type").and_then(Value::as_str) == Some("message")
        || value.get("stop_reason").is_some()
        || value.get("role").and_then(Value::as_str) == Some("assistant");
    if !is_message || !value.get("content").is_some_and(Value::is_array) {
        return None;
    }
    serde_json::from_value::<AnthropicResponse>(value.clone())
        .ok()
        .map(Into::into)
}

// -- Streaming --

/// Frame decoder for Messages API events
///
/// Content block indexes are shared between text and tool blocks; tool
/// blocks are renumbered to consecutive positions.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    tool_positions: BTreeMap<u32, u32>,
}

impl AnthropicStreamDecoder {
    fn tool_position(&mut self, index: u32) -> u32 {
        let next = u32::try_from(self.tool_positions.len()).unwrap_or(u32::MAX);
        *self.tool_positions.entry(index).or_insert(next)
    }
}

impl FrameDecoder for AnthropicStreamDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<Vec<FrameDelta>, LlmError> {
        if frame.is_done() {
            return Ok(vec![FrameDelta::Done]);
        }
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let value = frame.json()?;
        let event: AnthropicStreamEvent = match serde_json::from_value(value.clone()) {
            Ok(event) => event,
            Err(e) => {
                if let Some(error) = error_from_value(&value, None) {
                    return Err(error);
                }
                tracing::debug!(error = %e, "skipping unrecognized anthropic event");
                return Ok(Vec::new());
            }
        };

        let mut deltas = Vec::new();
        match event {
            AnthropicStreamEvent::MessageStart { message } => {
                deltas.push(FrameDelta::Start {
                    id: message.id,
                    model: message.model,
                });
                deltas.push(FrameDelta::Role {
                    choice: 0,
                    role: Role::Assistant,
                });
                if let Some(usage) = message.usage {
                    deltas.push(FrameDelta::Usage(running_usage(usage)));
                }
            }
            AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
                AnthropicStreamBlock::Text { text } => {
                    if !text.is_empty() {
                        deltas.push(FrameDelta::Text { choice: 0, text });
                    }
                }
                AnthropicStreamBlock::ToolUse { id, name } => {
                    let position = self.tool_position(index);
                    deltas.push(FrameDelta::ToolStart {
                        choice: 0,
                        position,
                        id: Some(id),
                        name: Some(name),
                    });
                }
                AnthropicStreamBlock::Other => {}
            },
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicStreamDelta::TextDelta { text } => {
                    if !text.is_empty() {
                        deltas.push(FrameDelta::Text { choice: 0, text });
                    }
                }
                AnthropicStreamDelta::InputJsonDelta { partial_json } => {
                    if !self.tool_positions.contains_key(&index) {
                        tracing::warn!(index, "tool input for a block that never started");
                    }
                    let position = self.tool_position(index);
                    deltas.push(FrameDelta::ToolArguments {
                        choice: 0,
                        position,
                        fragment: partial_json,
                    });
                }
                AnthropicStreamDelta::Other => {}
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => {
                if let Some(usage) = usage {
                    deltas.push(FrameDelta::Usage(running_usage(usage)));
                }
                if let Some(reason) = delta.stop_reason {
                    deltas.push(FrameDelta::Finish {
                        choice: 0,
                        reason: finish_reason::normalize(&reason),
                    });
                }
            }
            AnthropicStreamEvent::MessageStop => deltas.push(FrameDelta::Done),
            AnthropicStreamEvent::Error { error } => return Err(classify_error(None, error)),
            AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping | AnthropicStreamEvent::Other => {}
        }

        Ok(deltas)
    }
}

/// Stream usage without a total, so merging recomputes it from the parts
const fn running_usage(usage: AnthropicUsage) -> Usage {
    Usage {
        prompt_tokens: usage.input_tokens,
        completion_tokens: usage.output_tokens,
        total_tokens: 0,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{GenerateOptions, GenerateRequest, ToolDefinition};

    fn wire(request: &GenerateRequest) -> Value {
        let prepared = PreparedRequest::new("claude-sonnet-4-5", request);
        serde_json::to_value(AnthropicRequest::try_from(&prepared).unwrap()).unwrap()
    }

    #[test]
    fn system_and_developer_are_folded() {
        let request = GenerateRequest::new(vec![
            Message::system("Be terse"),
            Message::developer("Answer in digits"),
            Message::user("2+2?"),
        ]);
        let body = wire(&request);
        assert_eq!(body["system"], "Be terse\n\nAnswer in digits");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn consecutive_tool_results_merge() {
        let request = GenerateRequest::new(vec![
            Message::user("Weather in NYC and Paris?"),
            Message::assistant("Checking.").with_tool_calls(vec![
                ToolCall::from_raw("toolu_1", "weather", r#"{"city":"NYC"}"#),
                ToolCall::from_raw("toolu_2", "weather", r#"{"city":"Paris"}"#),
            ]),
            Message::tool_result("toolu_1", "72F"),
            Message::tool_result("toolu_2", "18C"),
        ]);
        let body = wire(&request);

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1], json!({"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "NYC"}}));
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(
            messages[2]["content"],
            json!([
                {"type": "tool_result", "tool_use_id": "toolu_1", "content": "72F"},
                {"type": "tool_result", "tool_use_id": "toolu_2", "content": "18C"}
            ])
        );
    }

    #[test]
    fn tool_choice_and_parallelism() {
        let request = GenerateRequest::new(vec![Message::user("hi")]).with_options(GenerateOptions {
            tools: vec![ToolDefinition::new("weather")],
            tool_choice: Some(ToolChoice::Required),
            parallel_tool_calls: Some(false),
            reasoning_budget: Some(2048),
            ..GenerateOptions::default()
        });
        let body = wire(&request);
        assert_eq!(body["tool_choice"], json!({"type": "any", "disable_parallel_tool_use": true}));
        assert_eq!(body["thinking"], json!({"type": "enabled", "budget_tokens": 2048}));
    }

    #[test]
    fn image_urls_are_sources() {
        let request = GenerateRequest::new(vec![Message::user("").with_items(vec![ContentItem::image(
            MediaSource::url("https://example.com/cat.png"),
        )])]);
        let body = wire(&request);
        assert_eq!(
            body["messages"][0]["content"][0],
            json!({"type": "image", "source": {"type": "url", "url": "https://example.com/cat.png"}})
        );
    }

    #[test]
    fn canonical_response_parses() {
        let value = json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "NYC"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 20, "output_tokens": 8}
        });
        let response = parse_canonical(&value).unwrap();
        assert_eq!(response.text(), Some("Let me check."));
        assert_eq!(response.finish_reason(), Some("tool_calls"));
        assert_eq!(response.tool_calls()[0].arguments, json!({"city": "NYC"}));
        assert_eq!(response.usage, Some(Usage::new(20, 8)));
    }

    #[test]
    fn decoder_maps_block_indexes_to_positions() {
        let mut decoder = AnthropicStreamDecoder::default();
        let frames = [
            r#"{"type":"message_start","message":{"id":"msg_1","model":"claude-sonnet-4-5","usage":{"input_tokens":12,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Checking"}}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"weather","input":{}}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"city\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"NYC\"}"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":15}}"#,
            r#"{"type":"message_stop"}"#,
        ];

        let deltas: Vec<FrameDelta> = frames
            .iter()
            .flat_map(|data| decoder.decode(&Frame::new(*data)).unwrap())
            .collect();

        assert!(deltas.contains(&FrameDelta::ToolStart {
            choice: 0,
            position: 0,
            id: Some("toolu_1".to_owned()),
            name: Some("weather".to_owned()),
        }));
        assert!(deltas.contains(&FrameDelta::ToolArguments {
            choice: 0,
            position: 0,
            fragment: "\"NYC\"}".to_owned(),
        }));
        assert!(deltas.contains(&FrameDelta::Finish {
            choice: 0,
            reason: "tool_calls".to_owned(),
        }));
        assert_eq!(deltas.last(), Some(&FrameDelta::Done));
    }

    #[test]
    fn tool_input_without_block_start_is_kept() {
        let mut decoder = AnthropicStreamDecoder::default();
        let deltas = decoder
            .decode(&Frame::new(
                r#"{"type":"content_block_delta","index":3,"delta":{"type":"input_json_delta","partial_json":"{\"q\":1}"}}"#,
            ))
            .unwrap();
        assert_eq!(
            deltas,
            vec![FrameDelta::ToolArguments {
                choice: 0,
                position: 0,
                fragment: r#"{"q":1}"#.to_owned(),
            }]
        );
    }

    #[test]
    fn decoder_reports_overload() {
        let mut decoder = AnthropicStreamDecoder::default();
        let err = decoder
            .decode(&Frame::new(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#))
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::Provider { status: None, ref error_type, .. } if error_type.as_deref() == Some("overloaded_error")
        ));
    }

    #[test]
    fn pings_and_unknown_events_are_ignored() {
        let mut decoder = AnthropicStreamDecoder::default();
        assert!(decoder.decode(&Frame::new(r#"{"type":"ping"}"#)).unwrap().is_empty());
        assert!(decoder.decode(&Frame::new(r#"{"type":"brand_new_event"}"#)).unwrap().is_empty());
    }
}
