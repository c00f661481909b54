//! Tool call lifecycle.
//!
//! Parts carry a raw wire [`ToolPartState`], and some sub-states are only
//! visible in the shape of `output` (approval sentinels, the
//! continue-interruption marker). [`ToolPhase`] is the closed decoding of
//! both, produced once at the boundary so callers match on it instead of
//! re-sniffing payloads.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output field that marks a finished out-of-band authorization.
pub const CONTINUE_INTERRUPTION_KEY: &str = "continueInterruption";

/// Wire state of a tool part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolPartState {
    /// Arguments are still being produced by the model.
    InputStreaming,
    /// Arguments are final and there is no result yet.
    InputAvailable,
    /// A result, or a decision echoed as output, is present.
    OutputAvailable,
    /// The tool failed; `errorText` carries the reason.
    OutputError,
}

impl ToolPartState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolPartState::InputStreaming => "input-streaming",
            ToolPartState::InputAvailable => "input-available",
            ToolPartState::OutputAvailable => "output-available",
            ToolPartState::OutputError => "output-error",
        }
    }
}

/// Decoded lifecycle phase of a tool part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolPhase {
    /// Model is still emitting arguments. Never executable.
    Streaming,
    /// Arguments are final; waiting for a human decision or auto execution.
    AwaitingDecision,
    /// The user approved, execution has not happened yet.
    Approved,
    /// The user denied, the denial has not been recorded as a result yet.
    Denied,
    /// Authorization finished out of band; the call must be retried.
    Reopening,
    /// Terminal result (or failure) present.
    Completed,
}

impl ToolPhase {
    /// Whether a model call would reject a conversation holding this part.
    #[must_use]
    pub const fn is_dangling(self) -> bool {
        matches!(self, ToolPhase::Streaming | ToolPhase::Reopening)
    }
}

/// Whether `output` is the continue-interruption marker.
///
/// Only a JSON object whose `continueInterruption` field is boolean `true`
/// qualifies; any other shape is a normal result.
#[must_use]
pub fn is_continue_interruption(output: &Value) -> bool {
    output
        .as_object()
        .and_then(|map| map.get(CONTINUE_INTERRUPTION_KEY))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

/// Build the continue-interruption marker.
#[must_use]
pub fn continue_interruption_output() -> Value {
    let mut map = Map::new();
    map.insert(CONTINUE_INTERRUPTION_KEY.to_string(), Value::Bool(true));
    Value::Object(map)
}
