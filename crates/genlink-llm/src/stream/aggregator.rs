use std::collections::BTreeMap;

use super::FrameDelta;
use crate::types::{Choice, GenerateResponse, Message, Role, ToolCall, Usage};

#[derive(Debug, Default)]
struct ToolAggregate {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolAggregate {
    /// A call whose name never arrived keeps an empty name
    fn to_call(&self, choice: u32, position: u32) -> ToolCall {
        let id = self
            .id
            .clone()
            .unwrap_or_else(|| ToolCall::synthesized_id(choice, position));
        ToolCall::from_raw(id, self.name.clone().unwrap_or_default(), self.arguments.clone())
    }
}

#[derive(Debug, Default)]
struct ChoiceAggregate {
    role: Option<Role>,
    text: String,
    tools: BTreeMap<u32, ToolAggregate>,
}

impl ChoiceAggregate {
    fn finalize(&self, index: u32, finish_reason: String) -> Choice {
        for (position, tool) in self.tools.iter().filter(|(_, tool)| tool.name.is_none()) {
            tracing::warn!(choice = index, position, id = ?tool.id, "tool call finished without a name");
        }
        let mut choice = self.snapshot(index);
        choice.finish_reason = finish_reason;
        choice
    }

    fn snapshot(&self, index: u32) -> Choice {
        let tool_calls = self
            .tools
            .iter()
            .map(|(position, tool)| tool.to_call(index, *position))
            .collect();

        let mut message = Message::assistant(self.text.clone()).with_tool_calls(tool_calls);
        message.role = self.role.unwrap_or(Role::Assistant);

        Choice {
            index,
            message,
            finish_reason: String::new(),
        }
    }
}

/// Rebuilds choices from frame deltas
///
/// Text and tool argument fragments are appended verbatim per choice. A
/// choice is emitted once, on its finish delta, and its state is dropped;
/// later fragments for the same index start a fresh aggregate. Usage is
/// latest-wins and stays pending until the caller takes it.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    id: Option<String>,
    model: Option<String>,
    choices: BTreeMap<u32, ChoiceAggregate>,
    usage: Option<Usage>,
    finished: Vec<Choice>,
    done: bool,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta, returning a response when a choice finished
    pub fn apply(&mut self, delta: FrameDelta) -> Option<GenerateResponse> {
        match delta {
            FrameDelta::Start { id, model } => {
                if self.id.is_none() {
                    self.id = id;
                }
                if self.model.is_none() {
                    self.model = model;
                }
            }
            FrameDelta::Role { choice, role } => {
                self.choices.entry(choice).or_default().role = Some(role);
            }
            FrameDelta::Text { choice, text } => {
                self.choices.entry(choice).or_default().text.push_str(&text);
            }
            FrameDelta::ToolStart {
                choice,
                position,
                id,
                name,
            } => {
                let tool = self
                    .choices
                    .entry(choice)
                    .or_default()
                    .tools
                    .entry(position)
                    .or_default();
                if tool.id.is_none() {
                    tool.id = id.filter(|id| !id.is_empty());
                }
                if tool.name.is_none() {
                    tool.name = name.filter(|name| !name.is_empty());
                }
            }
            FrameDelta::ToolArguments {
                choice,
                position,
                fragment,
            } => {
                self.choices
                    .entry(choice)
                    .or_default()
                    .tools
                    .entry(position)
                    .or_default()
                    .arguments
                    .push_str(&fragment);
            }
            FrameDelta::Finish { choice, reason } => {
                let aggregate = self.choices.remove(&choice).unwrap_or_default();
                let finalized = aggregate.finalize(choice, reason);
                self.finished.push(finalized.clone());
                return Some(self.response(vec![finalized]));
            }
            FrameDelta::Usage(usage) => {
                self.usage.get_or_insert_with(Usage::default).merge_latest(usage);
            }
            FrameDelta::Done => self.done = true,
        }
        None
    }

    /// Whether the end-of-stream sentinel was seen
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Latest usage, if any was reported
    pub const fn usage(&self) -> Option<Usage> {
        self.usage
    }

    /// Provider response id
    pub fn response_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Whether any choice has been finalized
    pub fn has_finished(&self) -> bool {
        !self.finished.is_empty()
    }

    /// Everything seen so far: finalized choices plus open aggregates
    ///
    /// Open choices carry an empty finish reason.
    pub fn partial(&self) -> GenerateResponse {
        let mut choices = self.finished.clone();
        choices.extend(self.choices.iter().map(|(index, aggregate)| aggregate.snapshot(*index)));
        choices.sort_by_key(|c| c.index);

        let mut response = self.response(choices);
        response.usage = self.usage;
        response
    }

    /// Finalized choices as one response, usage attached
    ///
    /// Used when a whole body is replayed and the caller wants a single
    /// response rather than per-choice events.
    pub fn into_response(mut self) -> GenerateResponse {
        let mut choices = std::mem::take(&mut self.finished);
        choices.sort_by_key(|c| c.index);

        let mut response = self.response(choices);
        response.usage = self.usage;
        response
    }

    fn response(&self, choices: Vec<Choice>) -> GenerateResponse {
        GenerateResponse {
            id: self.id.clone(),
            model: self.model.clone().unwrap_or_default(),
            choices,
            usage: None,
            fallback: false,
        }
    }
}
