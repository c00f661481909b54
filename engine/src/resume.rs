//! Interruption resume.
//!
//! An auto tool that cannot finish without an out-of-band authorization
//! raises an [`Interrupt`]. The interrupt is recorded on the tool part as an
//! `output-error` whose `errorText` is the serialized interrupt. Once the
//! authorization completes, the part is rewritten to the continue-interruption
//! marker; the next reconciliation pass reopens it and the turn re-invokes
//! the tool.

use assent_tools::{
    ACCESS_DENIED_RESULT, AuthorizationError, AuthorizationStatus, Interrupt, Schedule,
    ScheduleError, ScheduledTask, StoreError, ToolServices, granted_token_key,
    pending_request_key,
};
use assent_types::{
    Message, Part, ToolCallId, ToolPart, ToolPartState, continue_interruption_output,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scheduler callback that re-checks a pending asynchronous authorization.
pub const CHECK_AUTHORIZATION_CALLBACK: &str = "checkAsyncAuthorization";

#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("no tool call {0} in the conversation")]
    UnknownToolCall(ToolCallId),
    #[error("invalid authorization check payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

fn map_tool_part(
    messages: &[Message],
    tool_call_id: &ToolCallId,
    f: impl FnOnce(&ToolPart) -> ToolPart,
) -> Result<Vec<Message>, ResumeError> {
    let mut f = Some(f);
    let out: Vec<Message> = messages
        .iter()
        .map(|message| {
            if !message
                .tool_parts()
                .any(|part| part.tool_call_id() == tool_call_id)
            {
                return message.clone();
            }
            let parts = message
                .parts()
                .iter()
                .map(|part| match part {
                    Part::Tool(tool) if tool.tool_call_id() == tool_call_id => match f.take() {
                        Some(f) => Part::Tool(f(tool)),
                        None => part.clone(),
                    },
                    _ => part.clone(),
                })
                .collect();
            message.with_parts(parts)
        })
        .collect();
    if f.is_some() {
        return Err(ResumeError::UnknownToolCall(tool_call_id.clone()));
    }
    Ok(out)
}

/// Terminal `output-error` copy of `part` carrying the serialized interrupt.
#[must_use]
pub fn interrupted_part(part: &ToolPart, interrupt: &Interrupt) -> ToolPart {
    part.failed(interrupt.to_value().to_string())
}

/// Mark a tool call as interrupted.
pub fn record_interrupt(
    messages: &[Message],
    tool_call_id: &ToolCallId,
    interrupt: &Interrupt,
) -> Result<Vec<Message>, ResumeError> {
    map_tool_part(messages, tool_call_id, |part| {
        interrupted_part(part, interrupt)
    })
}

/// The interrupt recorded on a part, if any.
#[must_use]
pub fn recorded_interrupt(part: &ToolPart) -> Option<Interrupt> {
    if part.state() != ToolPartState::OutputError {
        return None;
    }
    serde_json::from_str(part.error_text()?).ok()
}

/// Signal that the authorization behind an interrupted call completed.
pub fn continue_interruption(
    messages: &[Message],
    tool_call_id: &ToolCallId,
) -> Result<Vec<Message>, ResumeError> {
    map_tool_part(messages, tool_call_id, |part| {
        part.completed(continue_interruption_output())
    })
}

/// Payload of a [`CHECK_AUTHORIZATION_CALLBACK`] task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCheck {
    pub tool_call_id: ToolCallId,
    pub request_id: String,
}

impl AuthorizationCheck {
    pub fn from_task(task: &ScheduledTask) -> Result<Self, ResumeError> {
        Ok(serde_json::from_value(task.payload.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Authorization granted; the part now carries the continue marker.
    Resumed(Vec<Message>),
    /// The user refused; the part now carries the denial result.
    Denied(Vec<Message>),
    /// Still unanswered; another check was scheduled.
    Pending,
}

/// Polls pending asynchronous authorizations on a schedule.
#[derive(Debug, Clone)]
pub struct AsyncConfirmationResumer {
    services: ToolServices,
    poll_interval_secs: u64,
}

impl AsyncConfirmationResumer {
    #[must_use]
    pub fn new(services: ToolServices, poll_interval_secs: u64) -> Self {
        Self {
            services,
            poll_interval_secs,
        }
    }

    pub async fn schedule_check(
        &self,
        check: &AuthorizationCheck,
    ) -> Result<ScheduledTask, ResumeError> {
        let task = self
            .services
            .scheduler
            .schedule(
                Schedule::Delayed {
                    delay_in_seconds: self.poll_interval_secs,
                },
                CHECK_AUTHORIZATION_CALLBACK,
                serde_json::to_value(check)?,
            )
            .await?;
        tracing::debug!(
            tool_call_id = %check.tool_call_id,
            request_id = %check.request_id,
            task = %task.id,
            "Scheduled authorization check"
        );
        Ok(task)
    }

    pub async fn check(
        &self,
        messages: &[Message],
        check: &AuthorizationCheck,
    ) -> Result<ResumeOutcome, ResumeError> {
        let call_id = check.tool_call_id.as_str();
        match self.services.authorization.poll(&check.request_id).await? {
            AuthorizationStatus::Approved { access_token } => {
                let resumed = continue_interruption(messages, &check.tool_call_id)?;
                self.services
                    .store
                    .put(&granted_token_key(call_id), access_token)
                    .await?;
                tracing::info!(tool_call_id = call_id, "Asynchronous authorization granted");
                Ok(ResumeOutcome::Resumed(resumed))
            }
            AuthorizationStatus::Denied => {
                let denied = map_tool_part(messages, &check.tool_call_id, |part| {
                    part.completed(Value::String(ACCESS_DENIED_RESULT.to_string()))
                })?;
                self.services
                    .store
                    .delete(&pending_request_key(call_id))
                    .await?;
                tracing::info!(tool_call_id = call_id, "Asynchronous authorization denied");
                Ok(ResumeOutcome::Denied(denied))
            }
            AuthorizationStatus::Pending => {
                self.schedule_check(check).await?;
                Ok(ResumeOutcome::Pending)
            }
        }
    }
}
