//! Conversion between normalized types and the `OpenAI` Responses API

use std::collections::BTreeMap;

use serde_json::Value;

use super::{PreparedRequest, classify_error, error_from_value, fold_instructions, reasoning_effort};
use crate::error::LlmError;
use crate::protocol::WireError;
use crate::protocol::openai::function_type;
use crate::protocol::responses::{
    ResponsesContentPart, ResponsesInputItem, ResponsesOutputContent, ResponsesOutputItem, ResponsesReasoning,
    ResponsesRequest, ResponsesResponse, ResponsesStreamEvent, ResponsesStreamItem, ResponsesTool, ResponsesUsage,
};
use crate::stream::{Frame, FrameDecoder, FrameDelta};
use crate::types::{
    Choice, ContentItem, GenerateResponse, MediaRef, Message, Role, ToolCall, ToolChoice, Usage, finish_reason,
};

// -- Outbound --

impl TryFrom<&PreparedRequest<'_>> for ResponsesRequest {
    type Error = LlmError;

    fn try_from(prepared: &PreparedRequest<'_>) -> Result<Self, Self::Error> {
        let model = prepared.require_model()?;
        let options = &prepared.options;

        if !options.stop.is_empty() {
            return Err(LlmError::InvalidRequest(
                "the responses API does not accept stop sequences".to_owned(),
            ));
        }

        // A continued response already holds the earlier turns
        let turns = if prepared.continuation_token.is_some() {
            new_turns(prepared.messages)
        } else {
            prepared.messages
        };

        let mut input = Vec::new();
        for message in turns.iter().filter(|m| !m.role.is_instruction()) {
            push_input(&mut input, message)?;
        }

        let has_tools = !options.tools.is_empty();
        let tools = has_tools.then(|| {
            options
                .tools
                .iter()
                .map(|tool| ResponsesTool {
                    tool_type: function_type(),
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.input_schema(),
                })
                .collect()
        });

        Ok(Self {
            model: model.to_owned(),
            input,
            instructions: fold_instructions(prepared.messages)?,
            previous_response_id: prepared.continuation_token.map(ToOwned::to_owned),
            max_output_tokens: prepared.sampling.max_tokens,
            temperature: prepared.sampling.temperature,
            top_p: prepared.sampling.top_p,
            tools,
            tool_choice: options.tool_choice.as_ref().map(tool_choice),
            parallel_tool_calls: options.parallel_tool_calls.filter(|_| has_tools),
            reasoning: options.reasoning_budget.map(|budget| ResponsesReasoning {
                effort: reasoning_effort(budget).to_owned(),
            }),
            stream: prepared.stream.then_some(true),
        })
    }
}

/// Messages after the last assistant turn
fn new_turns(messages: &[Message]) -> &[Message] {
    messages
        .iter()
        .rposition(|m| m.role == Role::Assistant)
        .map_or(messages, |last| &messages[last + 1..])
}

fn push_input(input: &mut Vec<ResponsesInputItem>, message: &Message) -> Result<(), LlmError> {
    match message.role {
        Role::Tool => {
            let call_id = message
                .tool_call_id
                .clone()
                .ok_or_else(|| LlmError::InvalidRequest("tool message is missing tool_call_id".to_owned()))?;
            input.push(ResponsesInputItem::FunctionCallOutput {
                call_id,
                output: message.text().into_owned(),
            });
        }
        Role::Assistant => {
            let text = message.text();
            if !text.is_empty() {
                input.push(ResponsesInputItem::Message {
                    role: "assistant".to_owned(),
                    content: vec![ResponsesContentPart::OutputText { text: text.into_owned() }],
                });
            }
            input.extend(message.tool_calls.iter().map(|call| ResponsesInputItem::FunctionCall {
                call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments_text(),
            }));
        }
        _ => {
            let content = message
                .parts()
                .iter()
                .map(input_part)
                .collect::<Vec<_>>();
            input.push(ResponsesInputItem::Message {
                role: "user".to_owned(),
                content,
            });
        }
    }
    Ok(())
}

fn input_part(item: &ContentItem) -> ResponsesContentPart {
    match item {
        ContentItem::Text { text } => ResponsesContentPart::InputText { text: text.clone() },
        ContentItem::Image { source, detail } => ResponsesContentPart::InputImage {
            image_url: source.to_url().into_owned(),
            detail: detail.clone(),
        },
        ContentItem::File { source, filename } => match source.resolve() {
            MediaRef::Url(url) => ResponsesContentPart::InputFile {
                file_url: Some(url.to_owned()),
                file_data: None,
                filename: filename.clone(),
            },
            MediaRef::Inline { media_type, data } => ResponsesContentPart::InputFile {
                file_url: None,
                file_data: Some(format!("data:{media_type};base64,{data}")),
                filename: filename.clone(),
            },
        },
        ContentItem::Raw { value } => ResponsesContentPart::Raw(value.clone()),
    }
}

fn tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::from("auto"),
        ToolChoice::None => Value::from("none"),
        ToolChoice::Required => Value::from("required"),
        ToolChoice::Function(name) => serde_json::json!({"type": "function", "name": name}),
    }
}

// -- Inbound --

impl From<ResponsesUsage> for Usage {
    fn from(usage: ResponsesUsage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: if usage.total_tokens > 0 {
                usage.total_tokens
            } else {
                usage.input_tokens.saturating_add(usage.output_tokens)
            },
        }
    }
}

impl TryFrom<ResponsesResponse> for GenerateResponse {
    type Error = LlmError;

    fn try_from(response: ResponsesResponse) -> Result<Self, Self::Error> {
        if response.status.as_deref() == Some("failed") {
            return Err(classify_error(None, response.error.unwrap_or_else(|| WireError {
                message: "response failed".to_owned(),
                ..WireError::default()
            })));
        }

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for item in response.output {
            match item {
                ResponsesOutputItem::Message { content } => {
                    for part in content {
                        match part {
                            ResponsesOutputContent::OutputText { text: t } => text.push_str(&t),
                            ResponsesOutputContent::Refusal { refusal } => text.push_str(&refusal),
                            ResponsesOutputContent::Other => {}
                        }
                    }
                }
                ResponsesOutputItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } => tool_calls.push(ToolCall::from_raw(call_id, name, arguments)),
                ResponsesOutputItem::Other => {}
            }
        }

        let finish = if response.status.as_deref() == Some("incomplete") {
            response
                .incomplete_details
                .and_then(|d| d.reason)
                .map_or_else(|| finish_reason::LENGTH.to_owned(), |r| finish_reason::normalize(&r))
        } else if tool_calls.is_empty() {
            finish_reason::STOP.to_owned()
        } else {
            finish_reason::TOOL_CALLS.to_owned()
        };

        Ok(Self {
            id: Some(response.id),
            model: response.model.unwrap_or_default(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(text).with_tool_calls(tool_calls),
                finish_reason: finish,
            }],
            usage: response.usage.map(Into::into),
            fallback: false,
        })
    }
}

/// Parse a canonical Responses API body
///
/// Returns `None` when the value is not a response object.
pub fn parse_canonical(value: &Value) -> Option<Result<GenerateResponse, LlmError>> {
    if value.get("object").and_then(Value::as_str).is_some_and(|o| o != "response")
        || !value.get("output").is_some_and(Value::is_array)
    {
        return None;
    }
    let response: ResponsesResponse = serde_json::from_value(value.clone()).ok()?;
    Some(GenerateResponse::try_from(response))
}

// -- Streaming --

/// Frame decoder for Responses API events
///
/// Output items are addressed by `output_index`; function calls are given
/// consecutive tool positions in the order they appear.
#[derive(Debug, Default)]
pub struct ResponsesStreamDecoder {
    started: bool,
    positions: BTreeMap<u32, u32>,
    args_seen: BTreeMap<u32, bool>,
    saw_tool: bool,
}

impl ResponsesStreamDecoder {
    fn position(&mut self, output_index: u32) -> u32 {
        let next = u32::try_from(self.positions.len()).unwrap_or(u32::MAX);
        *self.positions.entry(output_index).or_insert(next)
    }

    fn start(&mut self, deltas: &mut Vec<FrameDelta>, id: Option<String>, model: Option<String>) {
        if !self.started {
            self.started = true;
            deltas.push(FrameDelta::Start { id, model });
            deltas.push(FrameDelta::Role {
                choice: 0,
                role: Role::Assistant,
            });
        }
    }
}

impl FrameDecoder for ResponsesStreamDecoder {
    fn decode(&mut self, frame: &Frame) -> Result<Vec<FrameDelta>, LlmError> {
        if frame.is_done() {
            return Ok(vec![FrameDelta::Done]);
        }
        if frame.is_empty() {
            return Ok(Vec::new());
        }

        let value = frame.json()?;
        if let Some(error) = error_from_value(&value, None) {
            return Err(error);
        }

        let event: ResponsesStreamEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized responses event");
                return Ok(Vec::new());
            }
        };

        let mut deltas = Vec::new();
        match event {
            ResponsesStreamEvent::Created { response } => self.start(&mut deltas, response.id, response.model),
            ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
                if let ResponsesStreamItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } = item
                {
                    self.saw_tool = true;
                    let position = self.position(output_index);
                    deltas.push(FrameDelta::ToolStart {
                        choice: 0,
                        position,
                        id: call_id,
                        name,
                    });
                    if !arguments.is_empty() {
                        self.args_seen.insert(output_index, true);
                        deltas.push(FrameDelta::ToolArguments {
                            choice: 0,
                            position,
                            fragment: arguments,
                        });
                    }
                }
            }
            ResponsesStreamEvent::OutputItemDone { output_index, item } => {
                // Arguments only arrive here when no deltas were streamed
                if let ResponsesStreamItem::FunctionCall {
                    call_id,
                    name,
                    arguments,
                } = item
                {
                    self.saw_tool = true;
                    let position = self.position(output_index);
                    deltas.push(FrameDelta::ToolStart {
                        choice: 0,
                        position,
                        id: call_id,
                        name,
                    });
                    if !self.args_seen.get(&output_index).copied().unwrap_or_default() && !arguments.is_empty() {
                        self.args_seen.insert(output_index, true);
                        deltas.push(FrameDelta::ToolArguments {
                            choice: 0,
                            position,
                            fragment: arguments,
                        });
                    }
                }
            }
            ResponsesStreamEvent::OutputTextDelta { delta, .. } | ResponsesStreamEvent::RefusalDelta { delta, .. } => {
                self.start(&mut deltas, None, None);
                if !delta.is_empty() {
                    deltas.push(FrameDelta::Text { choice: 0, text: delta });
                }
            }
            ResponsesStreamEvent::FunctionCallArgumentsDelta { output_index, delta } => {
                self.args_seen.insert(output_index, true);
                let position = self.position(output_index);
                deltas.push(FrameDelta::ToolArguments {
                    choice: 0,
                    position,
                    fragment: delta,
                });
            }
            ResponsesStreamEvent::Completed { response } => {
                self.start(&mut deltas, response.id, response.model);
                if let Some(usage) = response.usage {
                    deltas.push(FrameDelta::Usage(usage.into()));
                }
                let reason = if self.saw_tool {
                    finish_reason::TOOL_CALLS
                } else {
                    finish_reason::STOP
                };
                deltas.push(FrameDelta::Finish {
                    choice: 0,
                    reason: reason.to_owned(),
                });
                deltas.push(FrameDelta::Done);
            }
            ResponsesStreamEvent::Incomplete { response } => {
                self.start(&mut deltas, response.id, response.model);
                if let Some(usage) = response.usage {
                    deltas.push(FrameDelta::Usage(usage.into()));
                }
                let reason = response
                    .incomplete_details
                    .and_then(|d| d.reason)
                    .map_or_else(|| finish_reason::LENGTH.to_owned(), |r| finish_reason::normalize(&r));
                deltas.push(FrameDelta::Finish { choice: 0, reason });
                deltas.push(FrameDelta::Done);
            }
            ResponsesStreamEvent::Failed { response } => {
                return Err(classify_error(None, response.error.unwrap_or_else(|| WireError {
                    message: "response failed".to_owned(),
                    ..WireError::default()
                })));
            }
            ResponsesStreamEvent::Error { message, code } => {
                return Err(classify_error(None, WireError {
                    message,
                    code: code.map(Value::from),
                    ..WireError::default()
                }));
            }
            ResponsesStreamEvent::Other => {}
        }

        Ok(deltas)
    }
}
