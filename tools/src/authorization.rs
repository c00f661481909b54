//! Out-of-band authorization for auto tools.
//!
//! Some tools may only run with a credential the user grants outside the chat:
//! an asynchronous confirmation on another device ([`AsyncAuthorized`]) or a
//! third-party connection token ([`FederatedConnection`]). When the credential
//! is missing the tool does not fail; it raises an [`Interrupt`] that the turn
//! records on the tool part and the client renders as a prompt.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::AuthorizationConfig;
use crate::{ToolCtx, ToolError, ToolExecutor, ToolFut};

/// Result written when the user rejects an asynchronous authorization.
pub const ACCESS_DENIED_RESULT: &str = "The user has denied the request";

/// Why a tool call is waiting on the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "code", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Interrupt {
    /// A confirmation request was sent and has not been answered yet.
    #[error("Authorization pending: waiting for the user to confirm the request")]
    AuthorizationPending {
        request_id: String,
        expires_in: u64,
        interval: u64,
    },
    /// A previously sent request is still unanswered.
    #[error("Authorization polling: request {request_id} is still unanswered")]
    AuthorizationPolling { request_id: String },
    #[error("The user has denied the request")]
    AccessDenied,
    /// A third-party connection must be authorized first.
    #[error("Authorization required to access the Federated Connection")]
    TokenVault {
        connection: String,
        scopes: Vec<String>,
    },
}

impl Interrupt {
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Interrupt::AuthorizationPending { .. } => "authorization_pending",
            Interrupt::AuthorizationPolling { .. } => "authorization_polling",
            Interrupt::AccessDenied => "access_denied",
            Interrupt::TokenVault { .. } => "token_vault",
        }
    }

    /// The outstanding request, for interrupts that have one.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Interrupt::AuthorizationPending { request_id, .. }
            | Interrupt::AuthorizationPolling { request_id } => Some(request_id),
            Interrupt::AccessDenied | Interrupt::TokenVault { .. } => None,
        }
    }

    /// Wire form recorded on the tool part and sent to the client.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("message".to_string(), Value::String(self.message()));
        }
        value
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub audience: String,
    pub binding_message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationTicket {
    pub request_id: String,
    /// Seconds until the request lapses.
    pub expires_in: u64,
    /// Minimum seconds between two polls.
    pub interval: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationStatus {
    Approved { access_token: String },
    Pending,
    Denied,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorizationError {
    #[error("unknown authorization request: {0}")]
    UnknownRequest(String),
    #[error("authorization request failed: {0}")]
    Request(String),
}

pub type AuthFut<'a, T> = Pin<Box<dyn Future<Output = Result<T, AuthorizationError>> + Send + 'a>>;

/// Asynchronous user confirmation service.
pub trait AuthorizationGate: Send + Sync {
    fn request(&self, request: AuthorizationRequest) -> AuthFut<'_, AuthorizationTicket>;
    fn poll<'a>(&'a self, request_id: &'a str) -> AuthFut<'a, AuthorizationStatus>;
}

/// In-process gate. Requests stay pending until [`MemoryGate::resolve`].
#[derive(Debug)]
pub struct MemoryGate {
    requests: Mutex<HashMap<String, (AuthorizationRequest, AuthorizationStatus)>>,
    expires_in: u64,
    interval: u64,
}

impl Default for MemoryGate {
    fn default() -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            expires_in: 300,
            interval: 5,
        }
    }
}

impl MemoryGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(
        &self,
        request_id: &str,
        status: AuthorizationStatus,
    ) -> Result<(), AuthorizationError> {
        let mut requests = self.requests.lock().await;
        let entry = requests
            .get_mut(request_id)
            .ok_or_else(|| AuthorizationError::UnknownRequest(request_id.to_string()))?;
        entry.1 = status;
        Ok(())
    }

    /// Outstanding and answered requests, keyed by request id.
    pub async fn requests(&self) -> Vec<(String, AuthorizationRequest)> {
        let requests = self.requests.lock().await;
        let mut out: Vec<_> = requests
            .iter()
            .map(|(id, (request, _))| (id.clone(), request.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

impl AuthorizationGate for MemoryGate {
    fn request(&self, request: AuthorizationRequest) -> AuthFut<'_, AuthorizationTicket> {
        Box::pin(async move {
            let request_id = uuid::Uuid::new_v4().to_string();
            self.requests
                .lock()
                .await
                .insert(request_id.clone(), (request, AuthorizationStatus::Pending));
            Ok(AuthorizationTicket {
                request_id,
                expires_in: self.expires_in,
                interval: self.interval,
            })
        })
    }

    fn poll<'a>(&'a self, request_id: &'a str) -> AuthFut<'a, AuthorizationStatus> {
        Box::pin(async move {
            self.requests
                .lock()
                .await
                .get(request_id)
                .map(|(_, status)| status.clone())
                .ok_or_else(|| AuthorizationError::UnknownRequest(request_id.to_string()))
        })
    }
}

/// Store key of the token granted to one tool call.
#[must_use]
pub fn granted_token_key(tool_call_id: &str) -> String {
    format!("async-authorization/{tool_call_id}/token")
}

/// Store key of the outstanding request id for one tool call.
#[must_use]
pub fn pending_request_key(tool_call_id: &str) -> String {
    format!("async-authorization/{tool_call_id}/request")
}

/// Store key of a user's token for a third-party connection.
#[must_use]
pub fn connection_token_key(connection: &str, user_id: &str) -> String {
    format!("token-vault/{connection}/{user_id}")
}

enum Grant {
    Token(String),
    Denied,
}

/// Runs the wrapped tool only after the user confirmed it on another device.
///
/// Per tool call, in order: a cached token runs the tool; an outstanding
/// request is polled; otherwise a new request is sent and the call is
/// interrupted. The token is consumed by the run it authorizes.
pub struct AsyncAuthorized<E> {
    inner: E,
    settings: AuthorizationConfig,
}

impl<E: ToolExecutor> AsyncAuthorized<E> {
    pub fn new(inner: E, settings: AuthorizationConfig) -> Self {
        Self { inner, settings }
    }

    async fn authorize(&self, ctx: &ToolCtx) -> Result<Grant, ToolError> {
        let store = &ctx.services.store;
        let gate = &ctx.services.authorization;
        let call_id = ctx.tool_call_id.as_str();

        if let Some(token) = store.get(&granted_token_key(call_id)).await? {
            return Ok(Grant::Token(token));
        }

        let request_key = pending_request_key(call_id);
        if let Some(request_id) = store.get(&request_key).await? {
            return match gate.poll(&request_id).await? {
                AuthorizationStatus::Approved { access_token } => Ok(Grant::Token(access_token)),
                AuthorizationStatus::Pending => Err(ToolError::Interrupted(
                    Interrupt::AuthorizationPolling { request_id },
                )),
                AuthorizationStatus::Denied => {
                    store.delete(&request_key).await?;
                    Ok(Grant::Denied)
                }
            };
        }

        let user_id = ctx.services.user.id.clone();
        if user_id.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool: self.inner.name().to_string(),
                message: "No owner found".to_string(),
            });
        }
        let ticket = gate
            .request(AuthorizationRequest {
                user_id,
                scopes: self.settings.scopes.clone(),
                audience: self.settings.audience.clone(),
                binding_message: self.settings.binding_message.clone(),
            })
            .await?;
        store.put(&request_key, ticket.request_id.clone()).await?;
        tracing::info!(
            tool = self.inner.name(),
            tool_call_id = call_id,
            request_id = %ticket.request_id,
            "Requested asynchronous authorization"
        );
        Err(ToolError::Interrupted(Interrupt::AuthorizationPending {
            request_id: ticket.request_id,
            expires_in: ticket.expires_in,
            interval: ticket.interval,
        }))
    }
}

impl<E: ToolExecutor> ToolExecutor for AsyncAuthorized<E> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn schema(&self) -> Value {
        self.inner.schema()
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let token = match self.authorize(ctx).await? {
                Grant::Token(token) => token,
                Grant::Denied => {
                    tracing::info!(tool = self.inner.name(), "Authorization denied by user");
                    return Ok(Value::String(ACCESS_DENIED_RESULT.to_string()));
                }
            };
            let scoped = ctx.with_access_token(token);
            let result = self.inner.execute(args, &scoped).await;

            let call_id = ctx.tool_call_id.as_str();
            ctx.services.store.delete(&granted_token_key(call_id)).await?;
            ctx.services.store.delete(&pending_request_key(call_id)).await?;
            result
        })
    }
}

/// Runs the wrapped tool with the user's token for a third-party connection.
pub struct FederatedConnection<E> {
    inner: E,
    connection: String,
    scopes: Vec<String>,
}

impl<E: ToolExecutor> FederatedConnection<E> {
    pub fn new(inner: E, connection: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            inner,
            connection: connection.into(),
            scopes,
        }
    }

    fn interrupt(&self) -> ToolError {
        ToolError::Interrupted(Interrupt::TokenVault {
            connection: self.connection.clone(),
            scopes: self.scopes.clone(),
        })
    }
}

impl<E: ToolExecutor> ToolExecutor for FederatedConnection<E> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn schema(&self) -> Value {
        self.inner.schema()
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let key = connection_token_key(&self.connection, &ctx.services.user.id);
            let Some(token) = ctx.services.store.get(&key).await? else {
                return Err(self.interrupt());
            };
            let scoped = ctx.with_access_token(token);
            match self.inner.execute(args, &scoped).await {
                Err(ToolError::Unauthorized { message }) => {
                    tracing::warn!(
                        tool = self.inner.name(),
                        connection = %self.connection,
                        "Connection token rejected: {message}"
                    );
                    ctx.services.store.delete(&key).await?;
                    Err(self.interrupt())
                }
                other => other,
            }
        })
    }
}
