//! Shared test utilities and fixtures
//!
//! A scripted model client plus a chat wired to in-memory capabilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assent_engine::assent_tools::{
    AuthorizationConfig, MemoryGate, MemoryScheduler, MemoryStore, ToolsConfig,
};
use assent_engine::assent_types::{Approval, Message, Part, ToolPart};
use assent_engine::{
    AssentConfig, Chat, ModelClient, ModelFut, ModelRequest, StreamEvent, ToolRegistry,
    ToolServices, TurnError, TurnEvent, UserContext, builtin_registry,
};
use serde_json::Value;
use tokio::sync::mpsc;

/// Model client that replays one scripted response per call.
///
/// Calls past the end of the script answer with an empty response.
#[derive(Default)]
pub struct ScriptedModel {
    scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(scripts: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn stream<'a>(&'a self, request: ModelRequest, tx: mpsc::Sender<StreamEvent>) -> ModelFut<'a> {
        Box::pin(async move {
            self.requests.lock().unwrap().push(request);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| vec![StreamEvent::Done]);
            for event in script {
                tx.send(event).await?;
            }
            Ok(())
        })
    }
}

pub fn text(content: &str) -> Vec<StreamEvent> {
    vec![StreamEvent::TextDelta(content.to_string()), StreamEvent::Done]
}

pub fn tool_call(id: &str, name: &str, arguments: &Value) -> Vec<StreamEvent> {
    vec![
        StreamEvent::ToolCallStart {
            id: id.to_string(),
            name: name.to_string(),
        },
        StreamEvent::ToolCallDelta {
            id: id.to_string(),
            arguments: arguments.to_string(),
        },
        StreamEvent::Done,
    ]
}

pub struct Harness {
    pub chat: Chat,
    pub model: Arc<ScriptedModel>,
    pub gate: Arc<MemoryGate>,
    pub scheduler: Arc<MemoryScheduler>,
    pub store: Arc<MemoryStore>,
}

pub fn config() -> AssentConfig {
    AssentConfig {
        tools: ToolsConfig {
            weather_delay_ms: 0,
            ..ToolsConfig::default()
        },
        ..AssentConfig::default()
    }
}

pub fn harness(scripts: Vec<Vec<StreamEvent>>) -> Harness {
    let config = config();
    let registry = builtin_registry(&config.tools, &AuthorizationConfig::default()).unwrap();
    harness_with(registry, &config, scripts)
}

pub fn harness_with(
    registry: ToolRegistry,
    config: &AssentConfig,
    scripts: Vec<Vec<StreamEvent>>,
) -> Harness {
    let model = ScriptedModel::new(scripts);
    let gate = Arc::new(MemoryGate::new());
    let scheduler = Arc::new(MemoryScheduler::new());
    let store = Arc::new(MemoryStore::new());
    let services = ToolServices::new(
        UserContext::new("user-1").with_name("Ada"),
        scheduler.clone(),
        store.clone(),
        gate.clone(),
    );
    Harness {
        chat: Chat::new(model.clone(), registry, services, config),
        model,
        gate,
        scheduler,
        store,
    }
}

/// Run one turn and collect everything it emitted.
pub async fn run_turn(chat: &mut Chat) -> (Result<(), TurnError>, Vec<TurnEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let result = chat.on_chat_message(&tx).await;
    drop(tx);
    (result, drain(rx))
}

pub fn drain(mut rx: mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn find_tool<'a>(messages: &'a [Message], tool_call_id: &str) -> &'a ToolPart {
    messages
        .iter()
        .flat_map(Message::tool_parts)
        .find(|part| part.tool_call_id().as_str() == tool_call_id)
        .unwrap_or_else(|| panic!("no tool call {tool_call_id}"))
}

/// The client recording a decision on one tool call.
pub fn decide(messages: &[Message], tool_call_id: &str, approval: Approval) -> Vec<Message> {
    messages
        .iter()
        .map(|message| {
            let parts = message
                .parts()
                .iter()
                .map(|part| match part.as_tool() {
                    Some(tool) if tool.tool_call_id().as_str() == tool_call_id => {
                        Part::Tool(tool.clone().with_approval(approval))
                    }
                    _ => part.clone(),
                })
                .collect();
            message.with_parts(parts)
        })
        .collect()
}
