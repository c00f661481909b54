//! Language model boundary.
//!
//! The engine never talks to a provider directly. A [`ModelClient`] receives
//! the sanitized history and tool manifest and pushes [`StreamEvent`]s into a
//! channel until it is done.

use std::future::Future;
use std::pin::Pin;

use assent_types::{ModelMessage, ToolDefinition};
use tokio::sync::mpsc;

pub type ModelFut<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub system_prompt: String,
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// Incremental output of one model call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolCallStart { id: String, name: String },
    /// A fragment of the JSON arguments of a started call.
    ToolCallDelta { id: String, arguments: String },
    Done,
    Error(String),
}

pub trait ModelClient: Send + Sync {
    /// Run one model call. Returning early closes the stream.
    fn stream<'a>(&'a self, request: ModelRequest, tx: mpsc::Sender<StreamEvent>) -> ModelFut<'a>;
}
