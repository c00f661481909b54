//! Message cleanup before a conversation is handed to the model.
//!
//! The model rejects histories holding tool calls without a terminal result.
//! Cleanup works at message granularity: a message with one dangling tool
//! part is dropped whole, parts are never edited.

use crate::message::{Message, ToolPart};
use crate::state::{ToolPartState, is_continue_interruption};

/// Whether the part would leave the model with a call it cannot answer.
///
/// Dangling means one of:
/// - still `input-streaming`
/// - `input-available` with neither `output` nor `errorText`
/// - a continue-interruption part
fn is_dangling(part: &ToolPart) -> bool {
    match part.state() {
        ToolPartState::InputStreaming => true,
        ToolPartState::InputAvailable => part.is_unresolved(),
        ToolPartState::OutputAvailable => part.output().is_some_and(is_continue_interruption),
        ToolPartState::OutputError => false,
    }
}

/// Whether any tool part of `message` is dangling.
#[must_use]
pub fn has_incomplete_tool_call(message: &Message) -> bool {
    message.tool_parts().any(is_dangling)
}

/// Drop every message holding a dangling tool part, preserving order.
#[must_use]
pub fn cleanup_messages(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .filter(|message| !has_incomplete_tool_call(message))
        .cloned()
        .collect()
}
