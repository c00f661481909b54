use std::path::{Path, PathBuf};
use std::{env, fs};

use assent_tools::{AuthorizationConfig, ToolsConfig};
use serde::Deserialize;

pub(crate) const fn default_max_steps() -> u32 {
    10
}

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Contents of `~/.assent/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssentConfig {
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
    pub authorization: AuthorizationConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    /// The user's name, given to the model in the system prompt.
    pub user_name: Option<String>,
    /// Model calls allowed in one turn.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    /// Replaces the built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            user_name: None,
            max_steps: default_max_steps(),
            system_prompt: None,
        }
    }
}

/// Replace `${VAR}` with the environment value. Unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl AssentConfig {
    /// Load the user config. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => Ok(config.expanded()),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    fn expanded(mut self) -> Self {
        self.agent.user_name = self.agent.user_name.as_deref().map(expand_env_vars);
        self.tools.calendar_api_url = expand_env_vars(&self.tools.calendar_api_url);
        self.authorization.audience = expand_env_vars(&self.authorization.audience);
        self
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".assent").join("config.toml"))
}
