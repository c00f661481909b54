//! Model-facing conversation format.
//!
//! UI messages carry parts in every lifecycle state; the model only accepts a
//! flat history of text, tool calls, and tool results. [`to_model_messages`]
//! is the single conversion between the two.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, Part, Role, ToolPart};
use crate::state::{ToolPartState, ToolPhase};

/// Definition of a tool that can be called by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (function name).
    pub name: String,
    /// A description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call (used to match results).
    pub id: String,
    /// The name of the tool being called.
    pub name: String,
    /// The arguments to pass to the tool, as parsed JSON.
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of a tool call execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the tool call this result is for.
    pub tool_call_id: String,
    pub tool_name: String,
    pub content: Value,
    /// Whether the tool execution resulted in an error.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content,
            is_error: false,
        }
    }

    pub fn error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: Value::String(error.into()),
            is_error: true,
        }
    }
}

/// One entry of the history handed to the model.
///
/// This is a real sum type (not a `Role` tag + "sometimes-meaningful" fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelMessage {
    System(String),
    User(String),
    Assistant(String),
    ToolUse(ToolCall),
    ToolResult(ToolResult),
}

impl ModelMessage {
    #[must_use]
    pub fn role_str(&self) -> &'static str {
        match self {
            ModelMessage::System(_) => "system",
            ModelMessage::User(_) | ModelMessage::ToolResult(_) => "user",
            ModelMessage::Assistant(_) | ModelMessage::ToolUse(_) => "assistant",
        }
    }

    fn text(role: Role, content: String) -> Self {
        match role {
            Role::System => ModelMessage::System(content),
            Role::User => ModelMessage::User(content),
            Role::Assistant => ModelMessage::Assistant(content),
        }
    }
}

/// Flatten UI messages into model history, preserving order.
///
/// - consecutive text parts of one message merge into a single text entry
/// - `input-streaming` tool parts are skipped
/// - a tool part with arguments yields a [`ModelMessage::ToolUse`]; a terminal
///   one is followed by its [`ModelMessage::ToolResult`]
/// - approval sentinels are decisions, not results, and are never forwarded
#[must_use]
pub fn to_model_messages(messages: &[Message]) -> Vec<ModelMessage> {
    let mut out = Vec::new();
    for message in messages {
        let mut text = String::new();
        for part in message.parts() {
            match part {
                Part::Text(part) => text.push_str(&part.text),
                Part::Tool(part) => {
                    if part.state() == ToolPartState::InputStreaming {
                        continue;
                    }
                    if !text.is_empty() {
                        out.push(ModelMessage::text(message.role(), std::mem::take(&mut text)));
                    }
                    push_tool_part(&mut out, part);
                }
                Part::Other(_) => {}
            }
        }
        if !text.is_empty() {
            out.push(ModelMessage::text(message.role(), text));
        }
    }
    out
}

fn push_tool_part(out: &mut Vec<ModelMessage>, part: &ToolPart) {
    let id = part.tool_call_id().as_str();
    let name = part.name().as_str();
    let arguments = part.input().cloned().unwrap_or(Value::Null);
    out.push(ModelMessage::ToolUse(ToolCall::new(id, name, arguments)));

    match part.state() {
        ToolPartState::InputStreaming | ToolPartState::InputAvailable => {}
        ToolPartState::OutputAvailable => {
            if part.phase() == ToolPhase::Approved {
                return;
            }
            let content = part.output().cloned().unwrap_or(Value::Null);
            out.push(ModelMessage::ToolResult(ToolResult::success(id, name, content)));
        }
        ToolPartState::OutputError => {
            let error = part.error_text().unwrap_or_default();
            out.push(ModelMessage::ToolResult(ToolResult::error(id, name, error)));
        }
    }
}
