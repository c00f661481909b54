//! Accumulation of one streamed model response.

use assent_types::{ToolCall, ToolResult};
use serde_json::{Map, Value};

use crate::model::StreamEvent;

pub(crate) const STREAM_EVENT_CHANNEL_CAPACITY: usize = 1024;
pub(crate) const DEFAULT_MAX_TOOL_ARGS_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFinishReason {
    Done,
    Error(String),
}

#[derive(Debug, Clone)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments_json: String,
    args_exceeded: bool,
}

/// Tool calls of a finished response.
///
/// Calls whose arguments could not be used still appear in `calls` (with
/// empty arguments) and get a matching error in `pre_resolved`.
#[derive(Debug, Default)]
pub struct ParsedToolCalls {
    pub calls: Vec<ToolCall>,
    pub pre_resolved: Vec<ToolResult>,
}

/// An in-flight streaming response.
///
/// Tool call arguments arrive as JSON string fragments and are parsed only
/// when the stream completes.
#[derive(Debug)]
pub struct StreamingMessage {
    content: String,
    tool_calls: Vec<ToolCallAccumulator>,
    max_tool_args_bytes: usize,
}

impl Default for StreamingMessage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOOL_ARGS_BYTES)
    }
}

impl StreamingMessage {
    #[must_use]
    pub fn new(max_tool_args_bytes: usize) -> Self {
        Self {
            content: String::new(),
            tool_calls: Vec::new(),
            max_tool_args_bytes,
        }
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn apply_event(&mut self, event: StreamEvent) -> Option<StreamFinishReason> {
        match event {
            StreamEvent::TextDelta(text) => {
                self.content.push_str(&text);
                None
            }
            StreamEvent::ToolCallStart { id, name } => {
                self.tool_calls.push(ToolCallAccumulator {
                    id,
                    name,
                    arguments_json: String::new(),
                    args_exceeded: false,
                });
                None
            }
            StreamEvent::ToolCallDelta { id, arguments } => {
                if let Some(acc) = self.tool_calls.iter_mut().find(|t| t.id == id) {
                    if acc.args_exceeded {
                        return None;
                    }
                    let new_len = acc.arguments_json.len().saturating_add(arguments.len());
                    if new_len > self.max_tool_args_bytes {
                        acc.args_exceeded = true;
                        return None;
                    }
                    acc.arguments_json.push_str(&arguments);
                } else {
                    tracing::warn!(tool_call_id = %id, "Arguments for unknown tool call");
                }
                None
            }
            StreamEvent::Done => Some(StreamFinishReason::Done),
            StreamEvent::Error(err) => Some(StreamFinishReason::Error(err)),
        }
    }

    pub fn take_tool_calls(&mut self) -> ParsedToolCalls {
        let mut parsed = ParsedToolCalls::default();
        let empty_args = || Value::Object(Map::new());

        for acc in self.tool_calls.drain(..) {
            if acc.args_exceeded {
                parsed.pre_resolved.push(ToolResult::error(
                    acc.id.clone(),
                    acc.name.clone(),
                    "Tool arguments exceeded maximum size",
                ));
                parsed.calls.push(ToolCall::new(acc.id, acc.name, empty_args()));
                continue;
            }

            if acc.arguments_json.trim().is_empty() {
                parsed.calls.push(ToolCall::new(acc.id, acc.name, empty_args()));
                continue;
            }

            match serde_json::from_str(&acc.arguments_json) {
                Ok(arguments) => parsed.calls.push(ToolCall::new(acc.id, acc.name, arguments)),
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse tool call arguments for '{}': {}",
                        acc.name,
                        e
                    );
                    parsed.pre_resolved.push(ToolResult::error(
                        acc.id.clone(),
                        acc.name.clone(),
                        "Invalid tool arguments JSON",
                    ));
                    parsed.calls.push(ToolCall::new(acc.id, acc.name, empty_args()));
                }
            }
        }

        parsed
    }
}
