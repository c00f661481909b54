//! Tool-call reconciliation.
//!
//! Every tool part of every message is advanced as far as the information in
//! the conversation allows:
//!
//! | Phase | Confirmable tool | Other tool |
//! |-------|------------------|------------|
//! | `Reopening` | reopened to `input-available` | reopened to `input-available` |
//! | `Approved` | execution runs, output recorded | unchanged |
//! | `Denied` | denial result recorded | unchanged |
//! | anything else | unchanged | unchanged |
//!
//! Reopened parts are never executed in the same pass. Every recorded result
//! is written to the [`ResultSink`] before the part is rebuilt.

use std::sync::Arc;

use assent_tools::{ExecutionContext, ToolError, ToolRegistry};
use assent_types::{
    DENIED_RESULT, MISSING_EXECUTION_RESULT, Message, ModelMessage, Part, ToolCallId, ToolPart,
    ToolPhase, to_model_messages,
};
use futures_util::future::try_join_all;
use serde_json::{Map, Value};

use crate::sink::{ResultSink, ToolResultNotice};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// An approved tool's execution failed. Nothing from the pass is kept.
    #[error("approved tool {tool_name} ({tool_call_id}) failed: {source}")]
    Execution {
        tool_name: String,
        tool_call_id: ToolCallId,
        #[source]
        source: ToolError,
    },
}

/// Reconcile the whole conversation.
///
/// Returns a new list with the same messages in the same order, each with its
/// parts in the same order; only tool part state, output and error fields
/// change. All executions run concurrently and the first failure aborts the
/// pass.
pub async fn reconcile(
    messages: &[Message],
    registry: &ToolRegistry,
    sink: &dyn ResultSink,
) -> Result<Vec<Message>, ReconcileError> {
    let history: Arc<[ModelMessage]> = to_model_messages(messages).into();
    let history = &history;

    try_join_all(messages.iter().map(|message| async move {
        let parts = try_join_all(
            message
                .parts()
                .iter()
                .map(|part| reconcile_part(part, registry, sink, history)),
        )
        .await?;
        Ok::<_, ReconcileError>(message.with_parts(parts))
    }))
    .await
}

async fn reconcile_part(
    part: &Part,
    registry: &ToolRegistry,
    sink: &dyn ResultSink,
    history: &Arc<[ModelMessage]>,
) -> Result<Part, ReconcileError> {
    let Part::Tool(tool) = part else {
        return Ok(part.clone());
    };
    let name = tool.name().as_str();
    let phase = tool.phase();

    if phase == ToolPhase::Reopening {
        tracing::debug!(tool = name, tool_call_id = %tool.tool_call_id(), "Reopening interrupted tool call");
        return Ok(Part::Tool(tool.reopened()));
    }
    if !registry.is_confirmable(name) {
        return Ok(part.clone());
    }

    let result = match phase {
        ToolPhase::Approved => execute_approved(tool, registry, history).await?,
        ToolPhase::Denied => {
            tracing::info!(tool = name, tool_call_id = %tool.tool_call_id(), "Tool call denied by user");
            Value::String(DENIED_RESULT.as_str().to_string())
        }
        ToolPhase::Streaming
        | ToolPhase::AwaitingDecision
        | ToolPhase::Reopening
        | ToolPhase::Completed => return Ok(part.clone()),
    };

    sink.write(ToolResultNotice::new(tool.tool_call_id().clone(), result.clone()));
    tracing::debug!(tool = name, tool_call_id = %tool.tool_call_id(), "Recorded tool result");
    Ok(Part::Tool(tool.completed(result)))
}

async fn execute_approved(
    tool: &ToolPart,
    registry: &ToolRegistry,
    history: &Arc<[ModelMessage]>,
) -> Result<Value, ReconcileError> {
    let name = tool.name().as_str();
    let Some(execution) = registry.execution(name) else {
        tracing::warn!(tool = name, "Confirmable tool has no registered execution");
        return Ok(Value::String(MISSING_EXECUTION_RESULT.as_str().to_string()));
    };

    tracing::info!(tool = name, tool_call_id = %tool.tool_call_id(), "Executing approved tool call");
    let input = tool
        .input()
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let ctx = ExecutionContext {
        conversation_history: Arc::clone(history),
        tool_call_id: tool.tool_call_id().clone(),
    };
    execution
        .execute(input, ctx)
        .await
        .map_err(|source| ReconcileError::Execution {
            tool_name: name.to_string(),
            tool_call_id: tool.tool_call_id().clone(),
            source,
        })
}
