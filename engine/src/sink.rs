//! Side channel for tool results produced outside the model stream.

use std::sync::Mutex;

use assent_types::ToolCallId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::turn::TurnEvent;

/// A result the engine produced for one tool call.
///
/// Serializes as the client data part
/// `{"type":"data-tool-result","data":{"toolCallId":..,"result":..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ToolResultNotice {
    #[serde(rename = "data-tool-result", rename_all = "camelCase")]
    ToolResult {
        tool_call_id: ToolCallId,
        result: Value,
    },
}

impl ToolResultNotice {
    #[must_use]
    pub fn new(tool_call_id: ToolCallId, result: Value) -> Self {
        ToolResultNotice::ToolResult {
            tool_call_id,
            result,
        }
    }

    #[must_use]
    pub fn tool_call_id(&self) -> &ToolCallId {
        match self {
            ToolResultNotice::ToolResult { tool_call_id, .. } => tool_call_id,
        }
    }

    #[must_use]
    pub fn result(&self) -> &Value {
        match self {
            ToolResultNotice::ToolResult { result, .. } => result,
        }
    }
}

/// Receiver of [`ToolResultNotice`]s.
///
/// Writes never fail: a consumer that went away simply misses the notice.
pub trait ResultSink: Send + Sync {
    fn write(&self, notice: ToolResultNotice);
}

/// In-memory sink keeping notices in write order.
#[derive(Debug, Default)]
pub struct NoticeLog {
    notices: Mutex<Vec<ToolResultNotice>>,
}

impl NoticeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn notices(&self) -> Vec<ToolResultNotice> {
        self.notices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl ResultSink for NoticeLog {
    fn write(&self, notice: ToolResultNotice) {
        self.notices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(notice);
    }
}

impl ResultSink for UnboundedSender<TurnEvent> {
    fn write(&self, notice: ToolResultNotice) {
        if self.send(TurnEvent::ToolResult(notice)).is_err() {
            tracing::debug!("Turn stream closed; dropping tool result notice");
        }
    }
}
