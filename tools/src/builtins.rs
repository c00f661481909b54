//! Built-in tools.

use std::sync::Arc;
use std::time::Duration;

use assent_types::ToolDefinition;
use chrono::{DateTime, Offset, SecondsFormat, TimeDelta, Utc};
use chrono_tz::Tz;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    ConfirmableExecution, ExecutionContext, ToolCtx, ToolError, ToolExecutor, ToolFut,
    ToolRegistry, parse_args,
};
use crate::authorization::{AsyncAuthorized, FederatedConnection};
use crate::config::{AuthorizationConfig, ToolsConfig};
use crate::schedule::Schedule;

/// Callback name scheduled tasks fire; the turn runner handles it.
pub const EXECUTE_TASK_CALLBACK: &str = "executeTask";

pub const GOOGLE_CONNECTION: &str = "google-oauth2";
pub const CALENDAR_FREEBUSY_SCOPE: &str = "https://www.googleapis.com/auth/calendar.freebusy";

pub const WEATHER_TOOL: &str = "getWeatherInformation";

/// Model-visible definition of the confirmable weather tool.
#[must_use]
pub fn weather_definition() -> ToolDefinition {
    ToolDefinition::new(
        WEATHER_TOOL,
        "show the weather in a given city to the user",
        json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }),
    )
}

#[derive(Debug, Deserialize)]
struct WeatherArgs {
    city: String,
}

/// Body of the weather tool. Runs only once the user approved it.
#[derive(Debug, Clone)]
pub struct WeatherExecution {
    delay: Duration,
}

impl WeatherExecution {
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl ConfirmableExecution for WeatherExecution {
    fn execute(&self, input: Value, _ctx: ExecutionContext) -> ToolFut<'_> {
        Box::pin(async move {
            let args: WeatherArgs = parse_args(&input)?;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(Value::String(format!(
                "The weather in {} is sunny and 72°F with light clouds.",
                args.city
            )))
        })
    }
}

#[derive(Debug, Default)]
pub struct LocalTimeTool;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalTimeArgs {
    time_zone: String,
}

/// `yyyy-MM-dd HH:mm:ssXXX`: a zero offset renders as `Z`.
fn format_local_time(now: DateTime<Utc>, tz: Tz) -> String {
    let local = now.with_timezone(&tz);
    if local.offset().fix().local_minus_utc() == 0 {
        local.format("%Y-%m-%d %H:%M:%SZ").to_string()
    } else {
        local.format("%Y-%m-%d %H:%M:%S%:z").to_string()
    }
}

impl ToolExecutor for LocalTimeTool {
    fn name(&self) -> &'static str {
        "getLocalTime"
    }

    fn description(&self) -> &'static str {
        "get the local time for a specified location"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timeZone": {"type": "string", "description": "IANA time zone name"}
            },
            "required": ["timeZone"]
        })
    }

    fn execute<'a>(&'a self, args: Value, _ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: LocalTimeArgs = parse_args(&args)?;
            let tz: Tz = typed.time_zone.parse().map_err(|_| ToolError::BadArgs {
                message: format!("unknown time zone '{}'", typed.time_zone),
            })?;
            Ok(Value::String(format_local_time(Utc::now(), tz)))
        })
    }
}

#[derive(Debug, Default)]
pub struct ScheduleTaskTool;

#[derive(Debug, Deserialize)]
struct ScheduleTaskArgs {
    description: String,
    when: WhenArgs,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhenArgs {
    #[serde(rename = "type")]
    kind: WhenKind,
    date: Option<DateTime<Utc>>,
    delay_in_seconds: Option<u64>,
    cron: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum WhenKind {
    Scheduled,
    Delayed,
    Cron,
    NoSchedule,
}

impl WhenKind {
    fn as_str(self) -> &'static str {
        match self {
            WhenKind::Scheduled => "scheduled",
            WhenKind::Delayed => "delayed",
            WhenKind::Cron => "cron",
            WhenKind::NoSchedule => "no-schedule",
        }
    }
}

impl WhenArgs {
    /// The schedule plus the input echoed back to the model.
    fn schedule(self) -> Result<(Schedule, String), String> {
        match self.kind {
            WhenKind::Scheduled => self
                .date
                .map(|date| {
                    let shown = date.to_rfc3339_opts(SecondsFormat::Secs, true);
                    (Schedule::Scheduled { date }, shown)
                })
                .ok_or_else(|| "missing date".to_string()),
            WhenKind::Delayed => self
                .delay_in_seconds
                .map(|secs| (Schedule::Delayed { delay_in_seconds: secs }, secs.to_string()))
                .ok_or_else(|| "missing delayInSeconds".to_string()),
            WhenKind::Cron => self
                .cron
                .map(|cron| (Schedule::Cron { cron: cron.clone() }, cron))
                .ok_or_else(|| "missing cron".to_string()),
            WhenKind::NoSchedule => Err("not a valid schedule input".to_string()),
        }
    }
}

impl ToolExecutor for ScheduleTaskTool {
    fn name(&self) -> &'static str {
        "scheduleTask"
    }

    fn description(&self) -> &'static str {
        "A tool to schedule a task to be executed at a later time"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {"type": "string"},
                "when": {
                    "type": "object",
                    "properties": {
                        "type": {
                            "type": "string",
                            "enum": ["scheduled", "delayed", "cron", "no-schedule"]
                        },
                        "date": {"type": "string", "description": "ISO 8601 date for scheduled tasks"},
                        "delayInSeconds": {"type": "integer", "minimum": 0},
                        "cron": {"type": "string", "description": "cron expression for recurring tasks"}
                    },
                    "required": ["type"]
                }
            },
            "required": ["description", "when"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: ScheduleTaskArgs = parse_args(&args)?;
            let kind = typed.when.kind;
            if matches!(kind, WhenKind::NoSchedule) {
                return Ok(Value::String("Not a valid schedule input".to_string()));
            }
            let outcome = match typed.when.schedule() {
                Ok((when, shown)) => ctx
                    .services
                    .scheduler
                    .schedule(when, EXECUTE_TASK_CALLBACK, Value::String(typed.description))
                    .await
                    .map(|_| shown)
                    .map_err(|e| e.to_string()),
                Err(message) => Err(message),
            };
            let text = match outcome {
                Ok(shown) => format!("Task scheduled for type \"{}\" : {shown}", kind.as_str()),
                Err(message) => {
                    tracing::warn!("Error scheduling task: {message}");
                    format!("Error scheduling task: {message}")
                }
            };
            Ok(Value::String(text))
        })
    }
}

#[derive(Debug, Default)]
pub struct GetScheduledTasksTool;

impl ToolExecutor for GetScheduledTasksTool {
    fn name(&self) -> &'static str {
        "getScheduledTasks"
    }

    fn description(&self) -> &'static str {
        "List all tasks that have been scheduled"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    fn execute<'a>(&'a self, _args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let listed = ctx
                .services
                .scheduler
                .list()
                .await
                .map_err(|e| e.to_string())
                .and_then(|tasks| serde_json::to_value(tasks).map_err(|e| e.to_string()));
            Ok(match listed {
                Ok(Value::Array(tasks)) if tasks.is_empty() => {
                    Value::String("No scheduled tasks found.".to_string())
                }
                Ok(tasks) => tasks,
                Err(message) => {
                    tracing::warn!("Error listing scheduled tasks: {message}");
                    Value::String(format!("Error listing scheduled tasks: {message}"))
                }
            })
        })
    }
}

#[derive(Debug, Default)]
pub struct CancelScheduledTaskTool;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelArgs {
    task_id: String,
}

impl ToolExecutor for CancelScheduledTaskTool {
    fn name(&self) -> &'static str {
        "cancelScheduledTask"
    }

    fn description(&self) -> &'static str {
        "Cancel a scheduled task using its ID"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "taskId": {"type": "string", "description": "The ID of the task to cancel"}
            },
            "required": ["taskId"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: CancelArgs = parse_args(&args)?;
            let text = match ctx.services.scheduler.cancel(&typed.task_id).await {
                Ok(()) => format!("Task {} has been successfully canceled.", typed.task_id),
                Err(e) => {
                    tracing::warn!(task = %typed.task_id, "Error canceling scheduled task: {e}");
                    format!("Error canceling task {}: {e}", typed.task_id)
                }
            };
            Ok(Value::String(text))
        })
    }
}

/// Free/busy lookup against the user's primary calendar.
///
/// Needs an access token in its context; wrap it in [`FederatedConnection`].
#[derive(Debug, Clone)]
pub struct CalendarTool {
    api_url: Url,
}

impl CalendarTool {
    #[must_use]
    pub fn new(api_url: Url) -> Self {
        Self { api_url }
    }
}

#[derive(Debug, Deserialize)]
struct CalendarArgs {
    date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    calendars: FreeBusyCalendars,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendars {
    primary: FreeBusyCalendar,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<Value>,
}

impl ToolExecutor for CalendarTool {
    fn name(&self) -> &'static str {
        "checkUsersCalendar"
    }

    fn description(&self) -> &'static str {
        "Check user availability on a given date time on their calendar"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "date": {"type": "string", "description": "ISO 8601 date time"}
            },
            "required": ["date"]
        })
    }

    fn execute<'a>(&'a self, args: Value, ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: CalendarArgs = parse_args(&args)?;
            let token = ctx.access_token().ok_or_else(|| ToolError::Unauthorized {
                message: "no access token for the calendar connection".to_string(),
            })?;
            let failed = |message: String| ToolError::ExecutionFailed {
                tool: self.name().to_string(),
                message,
            };

            let body = json!({
                "timeMin": typed.date.to_rfc3339_opts(SecondsFormat::Millis, true),
                "timeMax": (typed.date + TimeDelta::hours(1)).to_rfc3339_opts(SecondsFormat::Millis, true),
                "timeZone": "UTC",
                "items": [{"id": "primary"}]
            });
            let response = ctx
                .services
                .http
                .post(self.api_url.clone())
                .bearer_auth(token)
                .json(&body)
                .send()
                .await
                .map_err(|e| failed(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED {
                return Err(ToolError::Unauthorized {
                    message: "Authorization required to access the Federated Connection"
                        .to_string(),
                });
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(failed(format!(
                    "Invalid response from Google Calendar API: {} - {text}",
                    status.as_u16()
                )));
            }

            let busy: FreeBusyResponse = response
                .json()
                .await
                .map_err(|e| failed(e.to_string()))?;
            Ok(json!({"available": busy.calendars.primary.busy.is_empty()}))
        })
    }
}

#[derive(Debug, Default)]
pub struct BuyStockTool;

const fn default_quantity() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct BuyStockArgs {
    ticker: String,
    #[serde(default = "default_quantity")]
    quantity: f64,
    price: Option<f64>,
}

impl ToolExecutor for BuyStockTool {
    fn name(&self) -> &'static str {
        "buyStock"
    }

    fn description(&self) -> &'static str {
        "Allow the user to buy a stock"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ticker": {"type": "string", "description": "The stock ticker symbol"},
                "quantity": {"type": "number", "description": "The number of shares to buy"},
                "price": {
                    "type": "number",
                    "description": "The price at which to buy the stock. Defaults to market price"
                }
            },
            "required": ["ticker"]
        })
    }

    fn execute<'a>(&'a self, args: Value, _ctx: &'a ToolCtx) -> ToolFut<'a> {
        Box::pin(async move {
            let typed: BuyStockArgs = parse_args(&args)?;
            let price = typed
                .price
                .map_or_else(|| "market price $25".to_string(), |p| p.to_string());
            Ok(Value::String(format!(
                "Purchased {} shares of {} at {price}",
                typed.quantity, typed.ticker
            )))
        })
    }
}

/// Registry holding every built-in tool.
pub fn builtin_registry(
    tools: &ToolsConfig,
    authorization: &AuthorizationConfig,
) -> Result<ToolRegistry, ToolError> {
    let calendar_url = Url::parse(&tools.calendar_api_url).map_err(|e| ToolError::BadArgs {
        message: format!("Invalid calendar_api_url '{}': {e}", tools.calendar_api_url),
    })?;

    let mut registry = ToolRegistry::default();
    registry.register_confirmable(
        weather_definition(),
        Arc::new(WeatherExecution::new(Duration::from_millis(
            tools.weather_delay_ms,
        ))),
    )?;
    registry.register_auto(Arc::new(LocalTimeTool))?;
    registry.register_auto(Arc::new(ScheduleTaskTool))?;
    registry.register_auto(Arc::new(GetScheduledTasksTool))?;
    registry.register_auto(Arc::new(CancelScheduledTaskTool))?;
    registry.register_auto(Arc::new(FederatedConnection::new(
        CalendarTool::new(calendar_url),
        GOOGLE_CONNECTION,
        vec![CALENDAR_FREEBUSY_SCOPE.to_string()],
    )))?;
    registry.register_auto(Arc::new(AsyncAuthorized::new(
        BuyStockTool,
        authorization.clone(),
    )))?;
    Ok(registry)
}
