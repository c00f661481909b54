//! Turn runner.
//!
//! A turn reconciles the canonical conversation, re-invokes reopened auto
//! tools, then alternates model calls and auto tool execution until the model
//! stops asking for tools, a confirmable tool needs a human decision, a tool
//! is interrupted, or the step budget runs out.

use std::sync::Arc;

use assent_tools::builtins::EXECUTE_TASK_CALLBACK;
use assent_tools::{Interrupt, ScheduledTask, ToolCtx, ToolError, ToolRegistry, ToolServices};
use assent_types::{
    Message, MessageId, Part, Role, ToolCall, ToolCallId, ToolName, ToolPart, ToolPartState,
    ToolPhase, cleanup_messages, to_model_messages,
};
use futures_util::future::try_join_all;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::config::{AgentConfig, AssentConfig};
use crate::error::TurnError;
use crate::model::{ModelClient, ModelRequest, StreamEvent};
use crate::reconcile::reconcile;
use crate::resume::{
    AsyncConfirmationResumer, AuthorizationCheck, CHECK_AUTHORIZATION_CALLBACK, ResumeOutcome,
    interrupted_part,
};
use crate::sink::{ResultSink, ToolResultNotice};
use crate::streaming::{STREAM_EVENT_CHANNEL_CAPACITY, StreamFinishReason, StreamingMessage};

/// Text shown to the client when a turn fails. The cause only goes to the log.
pub const TURN_FAILED_MESSAGE: &str =
    "Something went wrong while processing your request. Please try again.";

/// Prefix of the user message a fired scheduled task appends.
pub const SCHEDULED_TASK_PREFIX: &str = "Running scheduled task: ";

/// What the client sees while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    TextDelta(String),
    /// An auto tool call is about to run.
    ToolInputAvailable {
        tool_call_id: ToolCallId,
        tool_name: String,
        input: Value,
    },
    ToolResult(ToolResultNotice),
    /// A confirmable tool call waits for the user's decision.
    ApprovalRequested {
        tool_call_id: ToolCallId,
        tool_name: String,
        input: Value,
    },
    Interrupted {
        tool_call_id: ToolCallId,
        interrupt: Interrupt,
    },
    Error {
        message: String,
    },
    Finish,
}

fn emit(events: &UnboundedSender<TurnEvent>, event: TurnEvent) {
    if events.send(event).is_err() {
        tracing::debug!("Turn stream closed; dropping event");
    }
}

fn new_message_id() -> MessageId {
    MessageId::new(uuid::Uuid::new_v4().to_string())
}

/// How one auto tool call ended.
enum AutoOutcome {
    Done(ToolPart),
    Interrupted(ToolPart),
}

impl AutoOutcome {
    fn into_part(self) -> ToolPart {
        match self {
            AutoOutcome::Done(part) | AutoOutcome::Interrupted(part) => part,
        }
    }
}

/// One conversation: canonical message list plus the capabilities it runs with.
pub struct Chat {
    messages: Vec<Message>,
    registry: ToolRegistry,
    services: ToolServices,
    model: Arc<dyn ModelClient>,
    agent: AgentConfig,
    resumer: AsyncConfirmationResumer,
}

impl Chat {
    #[must_use]
    pub fn new(
        model: Arc<dyn ModelClient>,
        registry: ToolRegistry,
        services: ToolServices,
        config: &AssentConfig,
    ) -> Self {
        let resumer =
            AsyncConfirmationResumer::new(services.clone(), config.authorization.poll_interval_secs);
        Self {
            messages: Vec::new(),
            registry,
            services,
            model,
            agent: config.agent.clone(),
            resumer,
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the conversation with the client's copy (approvals included).
    pub fn set_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn push_user_text(&mut self, text: impl Into<String>) {
        self.messages
            .push(Message::user_text(new_message_id(), text));
    }

    #[must_use]
    pub fn system_prompt(&self) -> String {
        if let Some(prompt) = &self.agent.system_prompt {
            return prompt.clone();
        }
        let name = self
            .services
            .user
            .name
            .as_deref()
            .or(self.agent.user_name.as_deref())
            .unwrap_or("unknown");
        format!(
            "You are a helpful assistant that can do various tasks...\n\n\
             If the user asks to schedule a task, use the schedule tool to schedule the task.\n\n\
             The name of the user is {name}."
        )
    }

    /// Run one turn over the current conversation.
    ///
    /// On failure the conversation is left as it was before the turn's
    /// failing step, the cause is logged and the client gets
    /// [`TURN_FAILED_MESSAGE`].
    pub async fn on_chat_message(
        &mut self,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<(), TurnError> {
        match self.run_turn(events).await {
            Ok(()) => {
                emit(events, TurnEvent::Finish);
                Ok(())
            }
            Err(err) => {
                tracing::error!("Turn failed: {err}");
                emit(
                    events,
                    TurnEvent::Error {
                        message: TURN_FAILED_MESSAGE.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Scheduled task callback: post the task as a user message and run a turn.
    pub async fn execute_task(
        &mut self,
        description: &str,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<(), TurnError> {
        tracing::info!(description, "Running scheduled task");
        self.push_user_text(format!("{SCHEDULED_TASK_PREFIX}{description}"));
        self.on_chat_message(events).await
    }

    /// Dispatch a fired scheduler task to its callback.
    pub async fn on_scheduled_task(
        &mut self,
        task: &ScheduledTask,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<(), TurnError> {
        match task.callback.as_str() {
            EXECUTE_TASK_CALLBACK => {
                let Some(description) = task.payload.as_str() else {
                    return Err(TurnError::InvalidTask {
                        id: task.id.clone(),
                    });
                };
                self.execute_task(description, events).await
            }
            CHECK_AUTHORIZATION_CALLBACK => {
                let check = AuthorizationCheck::from_task(task)?;
                match self.resumer.check(&self.messages, &check).await? {
                    ResumeOutcome::Pending => Ok(()),
                    ResumeOutcome::Resumed(messages) => {
                        self.messages = messages;
                        self.on_chat_message(events).await
                    }
                    ResumeOutcome::Denied(messages) => {
                        self.messages = messages;
                        if let Some(output) = self
                            .messages
                            .iter()
                            .flat_map(Message::tool_parts)
                            .find(|part| part.tool_call_id() == &check.tool_call_id)
                            .and_then(ToolPart::output)
                        {
                            events.write(ToolResultNotice::new(
                                check.tool_call_id.clone(),
                                output.clone(),
                            ));
                        }
                        self.on_chat_message(events).await
                    }
                }
            }
            other => {
                tracing::warn!(callback = other, task = %task.id, "Ignoring task with unknown callback");
                Ok(())
            }
        }
    }

    async fn run_turn(&mut self, events: &UnboundedSender<TurnEvent>) -> Result<(), TurnError> {
        let reconciled = reconcile(&self.messages, &self.registry, events).await?;
        self.messages = self.invoke_pending_tools(reconciled, events).await?;

        for step in 0..self.agent.max_steps {
            let request = ModelRequest {
                model: self.agent.model.clone(),
                system_prompt: self.system_prompt(),
                messages: to_model_messages(&cleanup_messages(&self.messages)),
                tools: self.registry.definitions(),
            };
            tracing::debug!(step, messages = request.messages.len(), "Calling model");

            let mut stream = self.stream_step(request, events).await?;
            let calls = stream.take_tool_calls();
            let mut parts = Vec::new();
            if !stream.content().is_empty() {
                parts.push(Part::text(stream.content()));
            }

            let mut stop = calls.calls.is_empty();
            let mut pending = Vec::new();
            for call in calls.calls {
                let pre_resolved = calls
                    .pre_resolved
                    .iter()
                    .find(|result| result.tool_call_id == call.id);
                match self.start_tool_call(call, pre_resolved.map(|r| &r.content), events) {
                    Some(StartedCall::Waiting(part)) => {
                        stop = true;
                        parts.push(Part::Tool(part));
                    }
                    Some(StartedCall::Resolved(part)) => parts.push(Part::Tool(part)),
                    Some(StartedCall::Auto(part)) => {
                        pending.push((parts.len(), part.clone()));
                        parts.push(Part::Tool(part));
                    }
                    None => {}
                }
            }

            let this = &*self;
            let finished =
                try_join_all(pending.iter().map(|(_, part)| this.run_auto_tool(part, events)))
                    .await?;
            for ((index, _), outcome) in pending.into_iter().zip(finished) {
                stop |= matches!(outcome, AutoOutcome::Interrupted(_));
                parts[index] = Part::Tool(outcome.into_part());
            }

            if !parts.is_empty() {
                self.messages
                    .push(Message::new(new_message_id(), Role::Assistant, parts));
            }
            if stop {
                return Ok(());
            }
        }

        tracing::info!(max_steps = self.agent.max_steps, "Step budget exhausted");
        Ok(())
    }

    /// Turn a model tool call into a part and announce it.
    fn start_tool_call(
        &self,
        call: ToolCall,
        pre_resolved: Option<&Value>,
        events: &UnboundedSender<TurnEvent>,
    ) -> Option<StartedCall> {
        let name = match ToolName::new(call.name.clone()) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(tool_call_id = %call.id, "Dropping tool call with invalid name: {e}");
                return None;
            }
        };
        let tool_call_id = ToolCallId::new(call.id);
        let part = ToolPart::new(name, tool_call_id.clone(), ToolPartState::InputAvailable)
            .with_input(call.arguments.clone());

        if let Some(error) = pre_resolved {
            let text = error
                .as_str()
                .map_or_else(|| error.to_string(), str::to_string);
            return Some(StartedCall::Resolved(part.failed(text)));
        }
        if self.registry.is_confirmable(&call.name) {
            tracing::info!(tool = %call.name, %tool_call_id, "Tool call awaits approval");
            emit(
                events,
                TurnEvent::ApprovalRequested {
                    tool_call_id,
                    tool_name: call.name,
                    input: call.arguments,
                },
            );
            return Some(StartedCall::Waiting(part));
        }
        emit(
            events,
            TurnEvent::ToolInputAvailable {
                tool_call_id,
                tool_name: call.name,
                input: call.arguments,
            },
        );
        Some(StartedCall::Auto(part))
    }

    /// Re-run auto tool calls that were reopened after an interruption.
    async fn invoke_pending_tools(
        &self,
        messages: Vec<Message>,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<Vec<Message>, TurnError> {
        try_join_all(messages.iter().map(|message| async move {
            let reopened = message.tool_parts().any(|part| {
                part.phase() == ToolPhase::AwaitingDecision
                    && self.registry.is_auto(part.name().as_str())
            });
            if !reopened {
                return Ok::<_, TurnError>(message.clone());
            }
            let parts = try_join_all(message.parts().iter().map(|part| async move {
                match part {
                    Part::Tool(tool)
                        if tool.phase() == ToolPhase::AwaitingDecision
                            && self.registry.is_auto(tool.name().as_str()) =>
                    {
                        tracing::debug!(tool = %tool.name(), tool_call_id = %tool.tool_call_id(), "Re-invoking reopened tool call");
                        let outcome = self.run_auto_tool(tool, events).await?;
                        Ok::<_, TurnError>(Part::Tool(outcome.into_part()))
                    }
                    _ => Ok(part.clone()),
                }
            }))
            .await?;
            Ok(message.with_parts(parts))
        }))
        .await
    }

    async fn run_auto_tool(
        &self,
        part: &ToolPart,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<AutoOutcome, TurnError> {
        let name = part.name().as_str();
        let ctx = ToolCtx::new(part.tool_call_id().clone(), self.services.clone());
        let input = part
            .input()
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        match self.registry.invoke(name, input, &ctx).await {
            Ok(result) => {
                events.write(ToolResultNotice::new(
                    part.tool_call_id().clone(),
                    result.clone(),
                ));
                Ok(AutoOutcome::Done(part.completed(result)))
            }
            Err(ToolError::Interrupted(interrupt)) => {
                tracing::info!(tool = name, tool_call_id = %part.tool_call_id(), code = interrupt.code(), "Tool call interrupted");
                if let Interrupt::AuthorizationPending { request_id, .. } = &interrupt {
                    self.resumer
                        .schedule_check(&AuthorizationCheck {
                            tool_call_id: part.tool_call_id().clone(),
                            request_id: request_id.clone(),
                        })
                        .await?;
                }
                let failed = interrupted_part(part, &interrupt);
                emit(
                    events,
                    TurnEvent::Interrupted {
                        tool_call_id: part.tool_call_id().clone(),
                        interrupt,
                    },
                );
                Ok(AutoOutcome::Interrupted(failed))
            }
            Err(err @ (ToolError::BadArgs { .. } | ToolError::UnknownTool { .. })) => {
                tracing::warn!(tool = name, tool_call_id = %part.tool_call_id(), "Rejected tool call: {err}");
                Ok(AutoOutcome::Done(part.failed(err.to_string())))
            }
            Err(source) => Err(TurnError::Tool {
                tool_name: name.to_string(),
                tool_call_id: part.tool_call_id().clone(),
                source,
            }),
        }
    }

    async fn stream_step(
        &self,
        request: ModelRequest,
        events: &UnboundedSender<TurnEvent>,
    ) -> Result<StreamingMessage, TurnError> {
        let (tx, mut rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let call = self.model.stream(request, tx);
        let consume = async move {
            let mut message = StreamingMessage::default();
            let mut finish = None;
            while let Some(event) = rx.recv().await {
                if let StreamEvent::TextDelta(text) = &event {
                    emit(events, TurnEvent::TextDelta(text.clone()));
                }
                if let Some(reason) = message.apply_event(event) {
                    finish = Some(reason);
                    break;
                }
            }
            (message, finish)
        };

        let (result, (message, finish)) = tokio::join!(call, consume);
        result.map_err(TurnError::Model)?;
        match finish {
            Some(StreamFinishReason::Error(err)) => Err(TurnError::Stream(err)),
            Some(StreamFinishReason::Done) | None => Ok(message),
        }
    }
}

enum StartedCall {
    /// Confirmable call left for the user.
    Waiting(ToolPart),
    /// Call that already has its terminal state.
    Resolved(ToolPart),
    /// Auto call still to run.
    Auto(ToolPart),
}

impl std::fmt::Debug for Chat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chat")
            .field("messages", &self.messages.len())
            .field("registry", &self.registry)
            .field("services", &self.services)
            .field("agent", &self.agent)
            .finish_non_exhaustive()
    }
}
