//! Conversation message model.
//!
//! A conversation is an ordered list of [`Message`]s, each holding an ordered
//! list of [`Part`]s. Messages are values: `id` and `role` never change, and
//! `parts` is only ever replaced wholesale through [`Message::with_parts`].

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::approval::Approval;
use crate::ids::{MessageId, ToolCallId};
use crate::proofs::{ToolName, ToolNameError};
use crate::state::{ToolPartState, ToolPhase, is_continue_interruption};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    role: Role,
    #[serde(default)]
    parts: Vec<Part>,
    /// Fields this crate does not interpret (`createdAt`, `metadata`, ...).
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Message {
    #[must_use]
    pub fn new(id: MessageId, role: Role, parts: Vec<Part>) -> Self {
        Self {
            id,
            role,
            parts,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn user_text(id: MessageId, text: impl Into<String>) -> Self {
        Self::new(id, Role::User, vec![Part::text(text)])
    }

    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(Part::as_tool)
    }

    /// Same message with its parts replaced.
    #[must_use]
    pub fn with_parts(&self, parts: Vec<Part>) -> Self {
        Self {
            id: self.id.clone(),
            role: self.role,
            parts,
            extra: self.extra.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextPart {
    pub text: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// One element of a message.
///
/// Part kinds this crate does not model (`step-start`, `reasoning`, sources,
/// files, data parts) are kept verbatim in [`Part::Other`].
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(TextPart),
    Tool(ToolPart),
    Other(Value),
}

impl Part {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart {
            text: text.into(),
            extra: Map::new(),
        })
    }

    #[must_use]
    pub fn as_tool(&self) -> Option<&ToolPart> {
        match self {
            Part::Tool(part) => Some(part),
            Part::Text(_) | Part::Other(_) => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(part) => Some(&part.text),
            Part::Tool(_) | Part::Other(_) => None,
        }
    }
}

impl Serialize for Part {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Part::Text(part) => TextWire {
                part_type: TextWire::TYPE,
                text: &part.text,
                extra: &part.extra,
            }
            .serialize(serializer),
            Part::Tool(part) => part.serialize(serializer),
            Part::Other(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Part {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let part_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("type"))?;
        let is_text = part_type == TextWire::TYPE;
        let is_tool = part_type.starts_with(ToolName::PART_PREFIX);

        if is_text {
            if let Some(map) = value.as_object_mut() {
                map.remove("type");
            }
            let part: TextPart = serde_json::from_value(value).map_err(D::Error::custom)?;
            return Ok(Part::Text(part));
        }
        if is_tool {
            let part: ToolPart = serde_json::from_value(value).map_err(D::Error::custom)?;
            return Ok(Part::Tool(part));
        }
        Ok(Part::Other(value))
    }
}

#[derive(Serialize)]
struct TextWire<'a> {
    #[serde(rename = "type")]
    part_type: &'static str,
    text: &'a str,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

impl TextWire<'_> {
    const TYPE: &'static str = "text";
}

/// One invocation of a named tool inside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToolPartWire", into = "ToolPartWire")]
pub struct ToolPart {
    name: ToolName,
    tool_call_id: ToolCallId,
    state: ToolPartState,
    input: Option<Value>,
    output: Option<Value>,
    error_text: Option<String>,
    provider_executed: Option<bool>,
    call_provider_metadata: Option<Value>,
    extra: Map<String, Value>,
}

impl ToolPart {
    #[must_use]
    pub fn new(name: ToolName, tool_call_id: ToolCallId, state: ToolPartState) -> Self {
        Self {
            name,
            tool_call_id,
            state,
            input: None,
            output: None,
            error_text: None,
            provider_executed: None,
            call_provider_metadata: None,
            extra: Map::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    #[must_use]
    pub fn with_error_text(mut self, error_text: impl Into<String>) -> Self {
        self.error_text = Some(error_text.into());
        self
    }

    #[must_use]
    pub fn with_provider_executed(mut self, provider_executed: bool) -> Self {
        self.provider_executed = Some(provider_executed);
        self
    }

    /// Record a human decision the way the client does.
    #[must_use]
    pub fn with_approval(self, approval: Approval) -> Self {
        self.with_output(approval.to_output())
    }

    #[must_use]
    pub fn name(&self) -> &ToolName {
        &self.name
    }

    #[must_use]
    pub fn tool_call_id(&self) -> &ToolCallId {
        &self.tool_call_id
    }

    #[must_use]
    pub fn state(&self) -> ToolPartState {
        self.state
    }

    #[must_use]
    pub fn input(&self) -> Option<&Value> {
        self.input.as_ref()
    }

    #[must_use]
    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    #[must_use]
    pub fn provider_executed(&self) -> Option<bool> {
        self.provider_executed
    }

    #[must_use]
    pub fn call_provider_metadata(&self) -> Option<&Value> {
        self.call_provider_metadata.as_ref()
    }

    /// Decode the lifecycle phase from the wire state and output shape.
    #[must_use]
    pub fn phase(&self) -> ToolPhase {
        let approval = self.output.as_ref().and_then(Approval::from_output);
        match self.state {
            ToolPartState::InputStreaming => ToolPhase::Streaming,
            ToolPartState::OutputAvailable
                if self.output.as_ref().is_some_and(is_continue_interruption) =>
            {
                ToolPhase::Reopening
            }
            ToolPartState::InputAvailable => match approval {
                Some(Approval::Yes) => ToolPhase::Approved,
                Some(Approval::No) => ToolPhase::Denied,
                None => ToolPhase::AwaitingDecision,
            },
            ToolPartState::OutputAvailable => match approval {
                Some(Approval::Yes) => ToolPhase::Approved,
                Some(Approval::No) | None => ToolPhase::Completed,
            },
            ToolPartState::OutputError => ToolPhase::Completed,
        }
    }

    /// Whether the part has neither a result nor an error recorded.
    ///
    /// Blank values (`null`, `false`, `0`, `""`) count as nothing recorded.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.output.as_ref().is_none_or(is_blank)
            && self.error_text.as_deref().is_none_or(str::is_empty)
    }

    /// Fresh `input-available` copy for a forced retry.
    ///
    /// Clears everything that would stop the call from being re-invoked.
    #[must_use]
    pub fn reopened(&self) -> Self {
        Self {
            state: ToolPartState::InputAvailable,
            output: None,
            error_text: None,
            provider_executed: None,
            call_provider_metadata: None,
            ..self.clone()
        }
    }

    /// Terminal `output-available` copy carrying `output`.
    #[must_use]
    pub fn completed(&self, output: Value) -> Self {
        Self {
            state: ToolPartState::OutputAvailable,
            output: Some(output),
            error_text: None,
            ..self.clone()
        }
    }

    /// Terminal `output-error` copy carrying `error_text`.
    #[must_use]
    pub fn failed(&self, error_text: impl Into<String>) -> Self {
        Self {
            state: ToolPartState::OutputError,
            output: None,
            error_text: Some(error_text.into()),
            ..self.clone()
        }
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Keeps an explicit `null` as `Some(Value::Null)`; only a missing key is `None`.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolPartWire {
    #[serde(rename = "type")]
    part_type: String,
    tool_call_id: ToolCallId,
    state: ToolPartState,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_executed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    call_provider_metadata: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl TryFrom<ToolPartWire> for ToolPart {
    type Error = ToolNameError;

    fn try_from(wire: ToolPartWire) -> Result<Self, Self::Error> {
        Ok(Self {
            name: ToolName::from_part_type(&wire.part_type)?,
            tool_call_id: wire.tool_call_id,
            state: wire.state,
            input: wire.input,
            output: wire.output,
            error_text: wire.error_text,
            provider_executed: wire.provider_executed,
            call_provider_metadata: wire.call_provider_metadata,
            extra: wire.extra,
        })
    }
}

impl From<ToolPart> for ToolPartWire {
    fn from(part: ToolPart) -> Self {
        Self {
            part_type: part.name.part_type(),
            tool_call_id: part.tool_call_id,
            state: part.state,
            input: part.input,
            output: part.output,
            error_text: part.error_text,
            provider_executed: part.provider_executed,
            call_provider_metadata: part.call_provider_metadata,
            extra: part.extra,
        }
    }
}
