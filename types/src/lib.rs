//! Core conversation types for Assent.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.
//!
//! A conversation is a list of [`Message`]s. Tool parts inside them carry a raw
//! wire [`ToolPartState`]; [`ToolPart::phase`] decodes it, together with the
//! [`Approval`] ledger and the continue-interruption marker, into a closed
//! [`ToolPhase`].

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod approval;
mod ids;
mod message;
mod model;
mod proofs;
mod sanitize;
mod state;

pub use approval::{Approval, DENIED_RESULT, MISSING_EXECUTION_RESULT};
pub use ids::{MessageId, ToolCallId};
pub use message::{Message, Part, Role, TextPart, ToolPart};
pub use model::{ModelMessage, ToolCall, ToolDefinition, ToolResult, to_model_messages};
pub use proofs::{NonEmptyStaticStr, ToolName, ToolNameError};
pub use sanitize::{cleanup_messages, has_incomplete_tool_call};
pub use state::{
    CONTINUE_INTERRUPTION_KEY, ToolPartState, ToolPhase, continue_interruption_output,
    is_continue_interruption,
};
