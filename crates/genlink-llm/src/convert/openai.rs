//! Conversion between normalized types and `OpenAI` Chat Completions

use serde_json::Value;

use super::{PreparedRequest, error_from_value, reasoning_effort};
use crate::error::LlmError;
use crate::protocol::openai::{
    ChatChunk, ChatContent, ChatContentPart, ChatFile, ChatFunctionCall, ChatFunctionDefinition, ChatImageUrl,
    ChatMessage, ChatRequest, ChatResponse, ChatStreamOptions, ChatTool, ChatToolCall, ChatUsage, function_type,
};
use crate::stream::{Frame, FrameDecoder, FrameDelta};
use crate::types::{
    Choice, ContentItem, GenerateResponse, MediaRef, Message, Role, ToolCall, ToolChoice, Usage, finish_reason,
};

// -- Outbound: normalized request -> Chat Completions --

impl TryFrom<&PreparedRequest<'_>> for ChatRequest {
    type Error = LlmError;

    fn try_from(prepared: &PreparedRequest<'_>) -> Result<Self, Self::Error> {
        let model = prepared.require_model()?;
        let options = &prepared.options;

        let messages = prepared
            .messages
            .iter()
            .map(chat_message)
            .collect::<Result<Vec<_>, _>>()?;

        let has_tools = !options.tools.is_empty();
        let tools = has_tools.then(|| {
            options
                .tools
                .iter()
                .map(|tool| ChatTool {
                    tool_type: function_type(),
                    function: ChatFunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema(),
                    },
                })
                .collect()
        });

        Ok(Self {
            model: model.to_owned(),
            messages,
            temperature: prepared.sampling.temperature,
            top_p: prepared.sampling.top_p,
            max_tokens: prepared.sampling.max_tokens,
            stop: prepared.stop(),
            stream: prepared.stream.then_some(true),
            stream_options: prepared.stream.then_some(ChatStreamOptions { include_usage: true }),
            tools,
            tool_choice: options.tool_choice.as_ref().map(tool_choice),
            parallel_tool_calls: options.parallel_tool_calls.filter(|_| has_tools),
            reasoning_effort: options.reasoning_budget.map(|b| reasoning_effort(b).to_owned()),
        })
    }
}

fn chat_message(message: &Message) -> Result<ChatMessage, LlmError> {
    if message.role == Role::Tool && message.tool_call_id.is_none() {
        return Err(LlmError::InvalidRequest("tool message is missing tool_call_id".to_owned()));
    }

    let content = if message.items.is_empty() {
        // Assistant turns that only call tools carry no content
        (!message.content.is_empty() || message.tool_calls.is_empty()).then(|| ChatContent::Text(message.content.clone()))
    } else if message.role == Role::Tool {
        Some(ChatContent::Text(message.text().into_owned()))
    } else {
        let parts = message
            .items
            .iter()
            .map(chat_part)
            .collect::<Result<Vec<_>, _>>()?;
        Some(ChatContent::Parts(parts))
    };

    let tool_calls = (!message.tool_calls.is_empty()).then(|| {
        message
            .tool_calls
            .iter()
            .map(|call| ChatToolCall {
                id: call.id.clone(),
                call_type: function_type(),
                function: ChatFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments_text(),
                },
            })
            .collect()
    });

    Ok(ChatMessage {
        role: message.role.to_string(),
        content,
        name: message.name.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    })
}

fn chat_part(item: &ContentItem) -> Result<ChatContentPart, LlmError> {
    Ok(match item {
        ContentItem::Text { text } => ChatContentPart::Text { text: text.clone() },
        ContentItem::Image { source, detail } => ChatContentPart::ImageUrl {
            image_url: ChatImageUrl {
                url: source.to_url().into_owned(),
                detail: detail.clone(),
            },
        },
        ContentItem::File { source, filename } => match source.resolve() {
            MediaRef::Url(url) => {
                return Err(LlmError::InvalidRequest(format!(
                    "chat completions only accepts inline files, got URL {url}"
                )));
            }
            MediaRef::Inline { media_type, data } => ChatContentPart::File {
                file: ChatFile {
                    file_data: Some(format!("data:{media_type};base64,{data}")),
                    filename: filename.clone(),
                },
            },
        },
        ContentItem::Raw { value } => ChatContentPart::Raw(value.clone()),
    })
}

fn tool_choice(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::from("auto"),
        ToolChoice::None => Value::from("none"),
        ToolChoice::Required => Value::from("required"),
        ToolChoice::Function(name) => serde_json::json!({
            "type": "function",
            "function": {"name": name},
        }),
    }
}

// -- Inbound: Chat Completions -> normalized response --

impl From<ChatUsage> for Usage {
    fn from(usage: ChatUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<ChatResponse> for GenerateResponse {
    fn from(response: ChatResponse) -> Self {
        let choices = response
            .choices
            .into_iter()
            .map(|choice| {
                let tool_calls: Vec<ToolCall> = choice
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|call| ToolCall::from_raw(call.id, call.function.name, call.function.arguments))
                    .collect();

                let finish = choice.finish_reason.filter(|r| !r.is_empty()).map_or_else(
                    || {
                        if tool_calls.is_empty() {
                            finish_reason::STOP.to_owned()
                        } else {
                            finish_reason::TOOL_CALLS.to_owned()
                        }
                    },
                    |r| finish_reason::normalize(&r),
                );

                let content = choice
                    .message
                    .content
                    .or(choice.message.refusal)
                    .unwrap_or_default();

                Choice {
                    index: choice.index,
                    message: Message::assistant(content).with_tool_calls(tool_calls),
                    finish_reason: finish,
                }
            })
            .collect();

        Self {
            id: response.id,
            model: response.model.unwrap_or_default(),
            choices,
            usage: response.usage.map(Into::into),
            fallback: false,
        }
    }
}

/// Parse a canonical Chat Completions body
pub fn parse_canonical(value: &Value) -> Option<GenerateResponse> {
    if !value.get("choices").is_some_and(Value::is_array) {
        return None;
    }
    serde_json::from_value::<ChatResponse>(value.clone())
        .ok()
        .map(Into::into)
}

// -- Streaming --

/// Frame decoder for Chat Completions chunks
#[derive(Debug, Default)]
pub struct ChatStreamDecoder {
    started: bool,
}

impl FrameDecoder for ChatStreamDecoder {
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

        let chunk: ChatChunk = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized chat completion chunk");
                return Ok(Vec::new());
            }
        };

        let mut deltas = Vec::new();

        if !self.started && (chunk.id.is_some() || chunk.model.is_some()) {
            self.started = true;
            deltas.push(FrameDelta::Start {
                id: chunk.id.clone(),
                model: chunk.model.clone(),
            });
        }

        if let Some(usage) = chunk.usage {
            deltas.push(FrameDelta::Usage(usage.into()));
        }

        for choice in chunk.choices {
            let index = choice.index;

            if let Some(role) = choice.delta.role.as_deref().and_then(|r| r.parse::<Role>().ok()) {
                deltas.push(FrameDelta::Role { choice: index, role });
            }

            let text = choice.delta.content.or(choice.delta.refusal);
            if let Some(text) = text.filter(|t| !t.is_empty()) {
                deltas.push(FrameDelta::Text { choice: index, text });
            }

            for call in choice.delta.tool_calls.unwrap_or_default() {
                let (name, arguments) = call
                    .function
                    .map_or((None, None), |f| (f.name, f.arguments));

                if call.id.is_some() || name.is_some() {
                    deltas.push(FrameDelta::ToolStart {
                        choice: index,
                        position: call.index,
                        id: call.id,
                        name,
                    });
                }
                if let Some(fragment) = arguments {
                    deltas.push(FrameDelta::ToolArguments {
                        choice: index,
                        position: call.index,
                        fragment,
                    });
                }
            }

            if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
                deltas.push(FrameDelta::Finish {
                    choice: index,
                    reason: finish_reason::normalize(&reason),
                });
            }
        }

        Ok(deltas)
    }
}
