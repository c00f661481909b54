//! Configuration types used by tool executors.
//!
//! They live here so the engine's config can embed them without the tools
//! crate depending on the engine.

use serde::Deserialize;

pub const DEFAULT_CALENDAR_API_URL: &str = "https://www.googleapis.com/calendar/v3/freeBusy";

/// Built-in tool settings.
///
/// ```toml
/// [tools]
/// weather_delay_ms = 500
/// calendar_api_url = "https://www.googleapis.com/calendar/v3/freeBusy"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    /// Simulated latency of the weather lookup.
    pub weather_delay_ms: u64,
    /// Free/busy endpoint queried by the calendar tool.
    pub calendar_api_url: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            weather_delay_ms: 500,
            calendar_api_url: DEFAULT_CALENDAR_API_URL.to_string(),
        }
    }
}

/// Asynchronous user authorization for sensitive tools.
///
/// ```toml
/// [authorization]
/// audience = "https://api.mystocks.example"
/// scopes = ["stock:buy"]
/// binding_message = "Please confirm the operation."
/// poll_interval_secs = 5
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AuthorizationConfig {
    pub audience: String,
    pub scopes: Vec<String>,
    /// Text shown to the user on the device that approves the request.
    pub binding_message: String,
    /// Delay between two checks of a pending authorization.
    pub poll_interval_secs: u64,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            audience: "https://api.mystocks.example".to_string(),
            scopes: vec!["stock:buy".to_string()],
            binding_message: "Please confirm the operation.".to_string(),
            poll_interval_secs: 5,
        }
    }
}
