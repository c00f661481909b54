//! Approval ledger: the closed vocabulary the UI writes into a tool part's
//! `output` to record a human decision before the tool runs.
//!
//! The wire values are shared byte-for-byte with the client, so they are a
//! closed enum rather than free text. Anything else found in `output` is a
//! final result, not a decision.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proofs::NonEmptyStaticStr;

/// Result written for a tool call the user rejected.
pub const DENIED_RESULT: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Error: User denied access to tool execution");

/// Result written when a confirmable tool has no registered execution.
pub const MISSING_EXECUTION_RESULT: NonEmptyStaticStr =
    NonEmptyStaticStr::new("Error: No execute function found on tool");

/// Human decision for a confirmable tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Approval {
    #[serde(rename = "Yes, confirmed.")]
    Yes,
    #[serde(rename = "No, denied.")]
    No,
}

impl Approval {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Approval::Yes => "Yes, confirmed.",
            Approval::No => "No, denied.",
        }
    }

    /// Read a decision from a tool part output. Exact match only.
    #[must_use]
    pub fn from_output(output: &Value) -> Option<Self> {
        match output.as_str()? {
            s if s == Approval::Yes.as_str() => Some(Approval::Yes),
            s if s == Approval::No.as_str() => Some(Approval::No),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_output(self) -> Value {
        Value::String(self.as_str().to_string())
    }
}
