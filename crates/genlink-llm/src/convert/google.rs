//! Conversion between normalized types and Google Gemini `generateContent`

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::{Map, Value};

use super::{PreparedRequest, error_from_value, fold_instructions};
use crate::error::LlmError;
use crate::protocol::google::{
    GoogleCandidate, GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration,
    GoogleFunctionResponse, GoogleGenerationConfig, GoogleInlineData, GooglePart, GoogleRequest, GoogleResponse,
    GoogleThinkingConfig, GoogleTool, GoogleToolConfig, GoogleUsageMetadata,
};
use crate::stream::{Frame, FrameDecoder, FrameDelta};
use crate::types::{
    Choice, ContentItem, GenerateResponse, MediaRef, Message, Role, ToolCall, ToolChoice, Usage, finish_reason,
};

// -- Outbound --

impl TryFrom<&PreparedRequest<'_>> for GoogleRequest {
    type Error = LlmError;

    fn try_from(prepared: &PreparedRequest<'_>) -> Result<Self, Self::Error> {
        prepared.require_model()?;
        let options = &prepared.options;

        // Tool results are matched to their call by id to recover the function name
        let call_names: HashMap<&str, &str> = prepared
            .messages
            .iter()
            .flat_map(|m| m.tool_calls.iter())
            .map(|call| (call.id.as_str(), call.name.as_str()))
            .collect();

        let mut contents: Vec<GoogleContent> = Vec::new();
        for message in prepared.messages.iter().filter(|m| !m.role.is_instruction()) {
            match message.role {
                Role::Tool => {
                    let part = function_response(message, &call_names)?;
                    if let Some(last) = contents.last_mut().filter(|last| is_function_response_turn(last)) {
                        last.parts.push(part);
                    } else {
                        contents.push(GoogleContent {
                            role: Some("user".to_owned()),
                            parts: vec![part],
                        });
                    }
                }
                Role::Assistant => {
                    let mut parts = content_parts(message)?;
                    parts.extend(message.tool_calls.iter().map(|call| GooglePart {
                        function_call: Some(GoogleFunctionCall {
                            id: Some(call.id.clone()),
                            name: call.name.clone(),
                            args: call.arguments.clone(),
                        }),
                        ..GooglePart::default()
                    }));
                    contents.push(GoogleContent {
                        role: Some("model".to_owned()),
                        parts,
                    });
                }
                _ => contents.push(GoogleContent {
                    role: Some("user".to_owned()),
                    parts: content_parts(message)?,
                }),
            }
        }

        let system_instruction = fold_instructions(prepared.messages)?.map(|text| GoogleContent {
            role: None,
            parts: vec![GooglePart::text(text)],
        });

        let tools = (!options.tools.is_empty()).then(|| {
            vec![GoogleTool {
                function_declarations: options
                    .tools
                    .iter()
                    .map(|tool| GoogleFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.input_schema(),
                    })
                    .collect(),
            }]
        });

        let generation_config = GoogleGenerationConfig {
            temperature: prepared.sampling.temperature,
            top_p: prepared.sampling.top_p,
            max_output_tokens: prepared.sampling.max_tokens,
            stop_sequences: prepared.stop(),
            thinking_config: options
                .reasoning_budget
                .map(|thinking_budget| GoogleThinkingConfig { thinking_budget }),
        };

        Ok(Self {
            contents,
            system_instruction,
            tools,
            tool_config: options.tool_choice.as_ref().map(tool_config),
            generation_config: (!generation_config.is_empty()).then_some(generation_config),
        })
    }
}

fn is_function_response_turn(content: &GoogleContent) -> bool {
    content.role.as_deref() == Some("user")
        && !content.parts.is_empty()
        && content.parts.iter().all(|p| p.function_response.is_some())
}

fn function_response(message: &Message, call_names: &HashMap<&str, &str>) -> Result<GooglePart, LlmError> {
    let id = message
        .tool_call_id
        .as_deref()
        .ok_or_else(|| LlmError::InvalidRequest("tool message is missing tool_call_id".to_owned()))?;

    let name = match message.name.as_deref() {
        Some(name) => name,
        None => call_names.get(id).copied().ok_or_else(|| LlmError::Continuation {
            message: format!("no tool call found for tool result {id}"),
            status: None,
        })?,
    };

    let text = message.text();
    let response = match serde_json::from_str::<Value>(&text) {
        Ok(value @ Value::Object(_)) => value,
        _ => serde_json::json!({ "content": text }),
    };

    Ok(GooglePart {
        function_response: Some(GoogleFunctionResponse {
            id: Some(id.to_owned()),
            name: name.to_owned(),
            response,
        }),
        ..GooglePart::default()
    })
}

fn content_parts(message: &Message) -> Result<Vec<GooglePart>, LlmError> {
    if message.items.is_empty() {
        if message.content.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![GooglePart::text(message.content.clone())]);
    }

    message
        .items
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => Ok(GooglePart::text(text.clone())),
            ContentItem::Image { source, .. } | ContentItem::File { source, .. } => match source.resolve() {
                MediaRef::Url(url) => Err(LlmError::InvalidRequest(format!(
                    "gemini only accepts inline media, got URL {url}"
                ))),
                MediaRef::Inline { media_type, data } => Ok(GooglePart {
                    inline_data: Some(GoogleInlineData {
                        mime_type: media_type.to_owned(),
                        data: data.to_owned(),
                    }),
                    ..GooglePart::default()
                }),
            },
            ContentItem::Raw { value } => serde_json::from_value(value.clone())
                .map_err(|e| LlmError::InvalidRequest(format!("raw content is not a gemini part: {e}"))),
        })
        .collect()
}

fn tool_config(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::Function(name) => ("ANY", Some(vec![name.clone()])),
    };
    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names,
        },
    }
}

// -- Inbound --

impl From<GoogleUsageMetadata> for Usage {
    fn from(usage: GoogleUsageMetadata) -> Self {
        Self {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: if usage.total_token_count > 0 {
                usage.total_token_count
            } else {
                usage
                    .prompt_token_count
                    .saturating_add(usage.candidates_token_count)
            },
        }
    }
}

fn candidate_index(candidate: &GoogleCandidate, fallback: usize) -> u32 {
    candidate
        .index
        .unwrap_or_else(|| u32::try_from(fallback).unwrap_or(u32::MAX))
}

fn function_args(args: Value) -> Value {
    if args.is_null() { Value::Object(Map::new()) } else { args }
}

/// Map a Gemini finish reason, accounting for tool calls reported as `STOP`
fn finish(raw: Option<&str>, has_tool_calls: bool) -> String {
    let normalized = raw.map_or_else(|| finish_reason::STOP.to_owned(), finish_reason::normalize);
    if has_tool_calls && normalized == finish_reason::STOP {
        finish_reason::TOOL_CALLS.to_owned()
    } else {
        normalized
    }
}

impl From<GoogleResponse> for GenerateResponse {
    fn from(response: GoogleResponse) -> Self {
        let mut choices: Vec<Choice> = response
            .candidates
            .into_iter()
            .enumerate()
            .map(|(i, candidate)| {
                let index = candidate_index(&candidate, i);
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                    if let Some(t) = part.text.filter(|_| part.thought != Some(true)) {
                        text.push_str(&t);
                    }
                    if let Some(call) = part.function_call {
                        let position = u32::try_from(tool_calls.len()).unwrap_or(u32::MAX);
                        let id = call.id.unwrap_or_else(|| ToolCall::synthesized_id(index, position));
                        tool_calls.push(ToolCall::from_value(id, call.name, function_args(call.args)));
                    }
                }
                let finish_reason = finish(candidate.finish_reason.as_deref(), !tool_calls.is_empty());
                Choice {
                    index,
                    message: Message::assistant(text).with_tool_calls(tool_calls),
                    finish_reason,
                }
            })
            .collect();

        if choices.is_empty()
            && let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason)
        {
            choices.push(Choice {
                index: 0,
                message: Message::assistant(""),
                finish_reason: reason,
            });
        }

        Self {
            id: response.response_id,
            model: response.model_version.unwrap_or_default(),
            choices,
            usage: response.usage_metadata.map(Into::into),
            fallback: false,
        }
    }
}

/// Parse a canonical `generateContent` body
pub fn parse_canonical(value: &Value) -> Option<GenerateResponse> {
    let candidates = value.get("candidates").is_some_and(Value::is_array);
    let feedback = value.get("promptFeedback").is_some_and(Value::is_object);
    if !candidates && !feedback {
        return None;
    }
    serde_json::from_value::<GoogleResponse>(value.clone())
        .ok()
        .map(Into::into)
}

// -- Streaming --

/// Frame decoder for `streamGenerateContent` chunks
///
/// Each chunk is a full response object; function calls arrive whole.
#[derive(Debug, Default)]
pub struct GoogleStreamDecoder {
    started: bool,
    roles_sent: BTreeSet<u32>,
    tool_counts: BTreeMap<u32, u32>,
}

impl FrameDecoder for GoogleStreamDecoder {
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

        let chunk: GoogleResponse = match serde_json::from_value(value) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unrecognized gemini chunk");
                return Ok(Vec::new());
            }
        };

        let mut deltas = Vec::new();
        if !self.started {
            self.started = true;
            deltas.push(FrameDelta::Start {
                id: chunk.response_id,
                model: chunk.model_version,
            });
        }

        if let Some(usage) = chunk.usage_metadata {
            deltas.push(FrameDelta::Usage(usage.into()));
        }

        if chunk.candidates.is_empty()
            && let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason)
        {
            deltas.push(FrameDelta::Finish { choice: 0, reason });
        }

        for (i, candidate) in chunk.candidates.into_iter().enumerate() {
            let choice = candidate_index(&candidate, i);
            if self.roles_sent.insert(choice) {
                deltas.push(FrameDelta::Role {
                    choice,
                    role: Role::Assistant,
                });
            }

            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                if let Some(text) = part.text.filter(|t| !t.is_empty() && part.thought != Some(true)) {
                    deltas.push(FrameDelta::Text { choice, text });
                }
                if let Some(call) = part.function_call {
                    let count = self.tool_counts.entry(choice).or_default();
                    let position = *count;
                    *count += 1;
                    deltas.push(FrameDelta::ToolStart {
                        choice,
                        position,
                        id: Some(call.id.unwrap_or_else(|| ToolCall::synthesized_id(choice, position))),
                        name: Some(call.name),
                    });
                    deltas.push(FrameDelta::ToolArguments {
                        choice,
                        position,
                        fragment: function_args(call.args).to_string(),
                    });
                }
            }

            if let Some(reason) = candidate.finish_reason {
                let has_tools = self.tool_counts.get(&choice).is_some_and(|n| *n > 0);
                deltas.push(FrameDelta::Finish {
                    choice,
                    reason: finish(Some(&reason), has_tools),
                });
            }
        }

        Ok(deltas)
    }
}
