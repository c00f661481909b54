use assent_tools::ToolError;
use assent_types::ToolCallId;

use crate::reconcile::ReconcileError;
use crate::resume::ResumeError;

/// Why a turn stopped before finishing.
///
/// The client only ever sees a generic message; this carries the real cause
/// for the logs.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("tool {tool_name} ({tool_call_id}) failed: {source}")]
    Tool {
        tool_name: String,
        tool_call_id: ToolCallId,
        #[source]
        source: ToolError,
    },
    #[error("model call failed: {0:#}")]
    Model(anyhow::Error),
    #[error("model stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Resume(#[from] ResumeError),
    #[error("scheduled task {id} has an invalid payload")]
    InvalidTask { id: String },
}
