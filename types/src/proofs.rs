//! Core proof types for validated content.
//!
//! These types enforce invariants at construction time. Once you hold a value,
//! you know it satisfies all required constraints.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bare name of a tool, as keyed in the tool registry.
///
/// # Invariants
///
/// - Never empty
/// - Never carries the `tool-` part-type prefix
///
/// # Serde
///
/// Serializes as a plain JSON string. Deserialization validates non-emptiness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolName(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolNameError {
    #[error("tool name must not be empty")]
    Empty,
    #[error("part type '{0}' is not a tool part")]
    NotToolPart(String),
}

impl ToolName {
    /// Prefix shared by every tool part type tag (`tool-<name>`).
    pub const PART_PREFIX: &'static str = "tool-";

    pub fn new(name: impl Into<String>) -> Result<Self, ToolNameError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ToolNameError::Empty);
        }
        Ok(Self(name))
    }

    /// Extract the bare tool name from a tagged part type (`tool-<name>` → `<name>`).
    pub fn from_part_type(part_type: &str) -> Result<Self, ToolNameError> {
        let name = part_type
            .strip_prefix(Self::PART_PREFIX)
            .ok_or_else(|| ToolNameError::NotToolPart(part_type.to_string()))?;
        Self::new(name)
    }

    /// The tagged part type for this tool (`<name>` → `tool-<name>`).
    #[must_use]
    pub fn part_type(&self) -> String {
        format!("{}{}", Self::PART_PREFIX, self.0)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ToolName {
    type Error = ToolNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for ToolName {
    type Error = ToolNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ToolName> for String {
    fn from(value: ToolName) -> Self {
        value.0
    }
}

impl AsRef<str> for ToolName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compile-time checked non-empty static string. Validates non-emptiness at
/// compile time via `const` assertion. Does not trim whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NonEmptyStaticStr(&'static str);

impl NonEmptyStaticStr {
    #[must_use]
    pub const fn new(value: &'static str) -> Self {
        assert!(!value.is_empty(), "NonEmptyStaticStr must not be empty");
        Self(value)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for NonEmptyStaticStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}
