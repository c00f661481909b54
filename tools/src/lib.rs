//! Tool Executor Framework - registry split, execution contexts, capabilities,
//! and built-in tool implementations.
//!
//! Two kinds of tools share one [`ToolRegistry`]:
//! - auto tools ([`ToolExecutor`]) run as soon as the model asks for them;
//! - confirmable tools have no model-visible execute path. Their body is a
//!   [`ConfirmableExecution`] that only the reconciliation step invokes, after
//!   a human approved the call.

pub mod authorization;
pub mod builtins;
pub mod config;
pub mod schedule;
pub mod store;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use assent_types::{ModelMessage, ToolCallId, ToolDefinition};
use serde_json::Value;

pub use authorization::{
    ACCESS_DENIED_RESULT, AsyncAuthorized, AuthorizationError, AuthorizationGate,
    AuthorizationRequest, AuthorizationStatus, AuthorizationTicket, FederatedConnection,
    Interrupt, MemoryGate, connection_token_key, granted_token_key, pending_request_key,
};
pub use builtins::builtin_registry;
pub use config::{AuthorizationConfig, ToolsConfig};
pub use schedule::{MemoryScheduler, Schedule, ScheduleError, ScheduledTask, Scheduler};
pub use store::{KeyValueStore, MemoryStore, StoreError};

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// Error types for tool execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("Tool execution failed: {tool}: {message}")]
    ExecutionFailed { tool: String, message: String },
    /// The upstream service rejected the credential the tool ran with.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },
    /// The call cannot finish until an out-of-band authorization completes.
    #[error("Tool interrupted: {0}")]
    Interrupted(Interrupt),
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
}

impl ToolError {
    /// The interrupt carried by this error, if any.
    #[must_use]
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            ToolError::Interrupted(interrupt) => Some(interrupt),
            _ => None,
        }
    }
}

/// Identity of the user a conversation belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserContext {
    pub id: String,
    pub name: Option<String>,
}

impl UserContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Capabilities injected into tools for one conversation.
#[derive(Clone)]
pub struct ToolServices {
    pub user: UserContext,
    pub scheduler: Arc<dyn Scheduler>,
    pub store: Arc<dyn KeyValueStore>,
    pub authorization: Arc<dyn AuthorizationGate>,
    pub http: reqwest::Client,
}

impl ToolServices {
    pub fn new(
        user: UserContext,
        scheduler: Arc<dyn Scheduler>,
        store: Arc<dyn KeyValueStore>,
        authorization: Arc<dyn AuthorizationGate>,
    ) -> Self {
        Self {
            user,
            scheduler,
            store,
            authorization,
            http: reqwest::Client::new(),
        }
    }

    /// Services backed entirely by the in-memory capability implementations.
    #[must_use]
    pub fn in_memory(user: UserContext) -> Self {
        Self::new(
            user,
            Arc::new(MemoryScheduler::new()),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryGate::new()),
        )
    }
}

impl fmt::Debug for ToolServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolServices")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Per-call context for auto tools.
#[derive(Clone)]
pub struct ToolCtx {
    pub tool_call_id: ToolCallId,
    pub services: ToolServices,
    access_token: Option<String>,
}

impl ToolCtx {
    #[must_use]
    pub fn new(tool_call_id: ToolCallId, services: ToolServices) -> Self {
        Self {
            tool_call_id,
            services,
            access_token: None,
        }
    }

    /// Copy of this context carrying a credential for the wrapped tool.
    #[must_use]
    pub fn with_access_token(&self, token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

// Manual Debug impl to prevent leaking access tokens in logs.
impl fmt::Debug for ToolCtx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.access_token.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ToolCtx")
            .field("tool_call_id", &self.tool_call_id)
            .field("services", &self.services)
            .field("access_token", &token)
            .finish()
    }
}

/// Context handed to a confirmable execution.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The whole conversation in model wire format.
    pub conversation_history: Arc<[ModelMessage]>,
    pub tool_call_id: ToolCallId,
}

/// A tool the model may run without asking anyone.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;
    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a>;
}

/// Body of a confirmable tool, run only after approval.
pub trait ConfirmableExecution: Send + Sync {
    fn execute(&self, input: Value, ctx: ExecutionContext) -> ToolFut<'_>;
}

/// Adapter turning an async closure into a [`ConfirmableExecution`].
pub struct FnExecution<F>(F);

impl<F, Fut> ConfirmableExecution for FnExecution<F>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn execute(&self, input: Value, ctx: ExecutionContext) -> ToolFut<'_> {
        Box::pin((self.0)(input, ctx))
    }
}

pub fn execution_fn<F, Fut>(f: F) -> Arc<dyn ConfirmableExecution>
where
    F: Fn(Value, ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    Arc::new(FnExecution(f))
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

#[derive(Clone)]
struct ConfirmableTool {
    definition: ToolDefinition,
    execution: Option<Arc<dyn ConfirmableExecution>>,
}

/// Tool registry: auto executors plus the confirmable-execution map.
///
/// A name lives in at most one of the two. Schema-only registrations are
/// keyed in the confirmable map without an execution; reconciliation answers
/// them with a fixed error result instead of running anything.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
    confirmable: HashMap<String, ConfirmableTool>,
}

impl ToolRegistry {
    fn ensure_unregistered(&self, name: &str) -> Result<(), ToolError> {
        if self.executors.contains_key(name) || self.confirmable.contains_key(name) {
            return Err(ToolError::DuplicateTool {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn register_auto(&mut self, executor: Arc<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name();
        self.ensure_unregistered(name)?;
        self.executors.insert(name.to_string(), executor);
        Ok(())
    }

    pub fn register_confirmable(
        &mut self,
        definition: ToolDefinition,
        execution: Arc<dyn ConfirmableExecution>,
    ) -> Result<(), ToolError> {
        self.ensure_unregistered(&definition.name)?;
        self.confirmable.insert(
            definition.name.clone(),
            ConfirmableTool {
                definition,
                execution: Some(execution),
            },
        );
        Ok(())
    }

    /// Register a schema-only tool definition (no execution).
    ///
    /// The tool appears in the model's tool manifest and counts as
    /// confirmable, but approving it yields an error result.
    pub fn register_schema(&mut self, definition: ToolDefinition) -> Result<(), ToolError> {
        self.ensure_unregistered(&definition.name)?;
        self.confirmable.insert(
            definition.name.clone(),
            ConfirmableTool {
                definition,
                execution: None,
            },
        );
        Ok(())
    }

    /// Membership test against the confirmable-execution map keys.
    #[must_use]
    pub fn is_confirmable(&self, name: &str) -> bool {
        self.confirmable.contains_key(name)
    }

    #[must_use]
    pub fn is_auto(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    #[must_use]
    pub fn execution(&self, name: &str) -> Option<&dyn ConfirmableExecution> {
        self.confirmable
            .get(name)
            .and_then(|tool| tool.execution.as_deref())
    }

    pub fn executor(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|exec| ToolDefinition::new(exec.name(), exec.description(), exec.schema()))
            .chain(self.confirmable.values().map(|tool| tool.definition.clone()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Validate `args` against the tool's schema, then run it.
    pub async fn invoke(&self, name: &str, args: Value, ctx: &ToolCtx) -> Result<Value, ToolError> {
        let executor = self.executor(name)?;
        validate_args(&executor.schema(), &args)?;
        tracing::debug!(tool = name, tool_call_id = %ctx.tool_call_id, "Invoking tool");
        executor.execute(args, ctx).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut auto: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        let mut confirmable: Vec<&str> = self.confirmable.keys().map(String::as_str).collect();
        auto.sort_unstable();
        confirmable.sort_unstable();
        f.debug_struct("ToolRegistry")
            .field("auto", &auto)
            .field("confirmable", &confirmable)
            .finish()
    }
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid tool schema: {e}"),
    })?;
    let result = validator.validate(args);
    if let Err(err) = result {
        return Err(ToolError::BadArgs {
            message: err.to_string(),
        });
    }
    Ok(())
}
