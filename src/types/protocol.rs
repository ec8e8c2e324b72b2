use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One line of the agent's JSON event stream.
///
/// Payloads whose shape depends on the outer tag (`message`, `args`,
/// `result`, ...) stay as raw documents and are decoded on demand by the
/// display converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Session {
        #[serde(default)]
        id: String,
        #[serde(default)]
        timestamp: String,
        #[serde(default)]
        cwd: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
    },
    AgentStart,
    TurnStart,
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    MessageUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assistant_message_event: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
    },
    MessageEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ToolExecutionStart {
        #[serde(default)]
        tool_call_id: String,
        #[serde(default)]
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ToolExecutionUpdate {
        #[serde(default)]
        tool_call_id: String,
        #[serde(default)]
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partial_result: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    ToolExecutionEnd {
        #[serde(default)]
        tool_call_id: String,
        #[serde(default)]
        tool_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    TurnEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<Value>,
    },
    AgentEnd {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        messages: Option<Value>,
    },
    /// Iteration boundary injected by the runner, never sent by an agent.
    Iteration { iteration: u32 },
    /// JSON object outside the typed protocol.
    Untyped(UntypedEvent),
    /// A line that is not a JSON object.
    RawLine { line: String },
}

impl AgentEvent {
    pub fn type_name(&self) -> &str {
        match self {
            AgentEvent::Session { .. } => "session",
            AgentEvent::AgentStart => "agent_start",
            AgentEvent::TurnStart => "turn_start",
            AgentEvent::MessageStart { .. } => "message_start",
            AgentEvent::MessageUpdate { .. } => "message_update",
            AgentEvent::MessageEnd { .. } => "message_end",
            AgentEvent::ToolExecutionStart { .. } => "tool_execution_start",
            AgentEvent::ToolExecutionUpdate { .. } => "tool_execution_update",
            AgentEvent::ToolExecutionEnd { .. } => "tool_execution_end",
            AgentEvent::TurnEnd { .. } => "turn_end",
            AgentEvent::AgentEnd { .. } => "agent_end",
            AgentEvent::Iteration { .. } => "iteration",
            AgentEvent::Untyped(untyped) => untyped.kind.as_str(),
            AgentEvent::RawLine { .. } => "raw_line",
        }
    }
}

/// Best-effort projection of an arbitrary JSON object.
///
/// Candidate keys are checked in a fixed order and the first string value
/// wins:
///
/// * kind: `type`, `event`, `kind` (falls back to `json_event`)
/// * role: `role`
/// * content: `content`, `text`, `message`
/// * tool: `tool`, `tool_name`, `toolName`, `name`, then `tool.name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UntypedEvent {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

pub const UNTYPED_KIND_KEYS: [&str; 3] = ["type", "event", "kind"];
pub const UNTYPED_ROLE_KEYS: [&str; 1] = ["role"];
pub const UNTYPED_CONTENT_KEYS: [&str; 3] = ["content", "text", "message"];
pub const UNTYPED_TOOL_KEYS: [&str; 4] = ["tool", "tool_name", "toolName", "name"];

impl UntypedEvent {
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let kind =
            first_string(object, &UNTYPED_KIND_KEYS).unwrap_or_else(|| "json_event".to_string());
        let tool = first_string(object, &UNTYPED_TOOL_KEYS).or_else(|| {
            object
                .get("tool")
                .and_then(Value::as_object)
                .and_then(|nested| first_string(nested, &["name"]))
        });

        Self {
            kind,
            role: first_string(object, &UNTYPED_ROLE_KEYS),
            content: first_string(object, &UNTYPED_CONTENT_KEYS),
            tool,
            raw: Value::Object(object.clone()),
        }
    }
}

fn first_string(object: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find_map(|value| value.as_str().map(str::to_string))
}

/// Payload of `message_start`, `message_end` and `turn_end`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

impl MessageEnvelope {
    pub fn parse(message: Option<&Value>) -> Self {
        message
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    /// Plain text of the message, from either a block array or a bare string.
    pub fn text(&self) -> Option<String> {
        self.content.as_ref().and_then(extract_text)
    }
}

/// Content block inside a message or a tool result.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Joins the text parts of a block array, or returns a bare string.
pub fn extract_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Array(_) => {
            let blocks: Vec<ContentBlock> = serde_json::from_value(content.clone()).ok()?;
            let parts: Vec<String> = blocks
                .into_iter()
                .filter_map(|block| block.text)
                .filter(|text| !text.is_empty())
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join("\n"))
            }
        }
        _ => None,
    }
}

/// Nested delta carried by `message_update`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantDelta {
    TextDelta {
        #[serde(default)]
        delta: String,
    },
    ThinkingStart,
    ThinkingDelta {
        #[serde(default)]
        delta: String,
    },
    ThinkingEnd {
        #[serde(default)]
        content: String,
    },
    #[serde(other)]
    Other,
}

impl AssistantDelta {
    pub fn parse(value: Option<&Value>) -> Option<Self> {
        value.and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}
