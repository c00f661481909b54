//! Core engine for Assent - reconciliation and turn orchestration.
//!
//! This crate advances tool calls across a conversation: approved
//! confirmable calls run, denied ones get their denial result, interrupted
//! ones are reopened and re-invoked. The language model and every capability
//! are injected; nothing here owns a transport.

mod config;
mod error;
mod model;
mod reconcile;
mod resume;
mod sink;
mod streaming;
mod turn;

pub use config::{
    AgentConfig, AssentConfig, ConfigError, DEFAULT_MODEL, config_path, expand_env_vars,
};
pub use error::TurnError;
pub use model::{ModelClient, ModelFut, ModelRequest, StreamEvent};
pub use reconcile::{ReconcileError, reconcile};
pub use resume::{
    AsyncConfirmationResumer, AuthorizationCheck, CHECK_AUTHORIZATION_CALLBACK, ResumeError,
    ResumeOutcome, continue_interruption, interrupted_part, record_interrupt, recorded_interrupt,
};
pub use sink::{NoticeLog, ResultSink, ToolResultNotice};
pub use streaming::{ParsedToolCalls, StreamFinishReason, StreamingMessage};
pub use turn::{Chat, SCHEDULED_TASK_PREFIX, TURN_FAILED_MESSAGE, TurnEvent};

// Re-export from crates for public API
pub use assent_tools::{self, ToolRegistry, ToolServices, UserContext, builtin_registry};
pub use assent_types::{self, Approval, Message, cleanup_messages};
