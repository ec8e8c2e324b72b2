use chrono::{DateTime, Local};
use serde_json::Value;

use super::tool_args::{format_tool_args, tool_result_text};
use crate::types::{AgentEvent, AssistantDelta, MessageEnvelope, UntypedEvent};
use crate::util::truncate_chars;

const SESSION_ID_CHARS: usize = 12;
const SUMMARY_ARGS_CHARS: usize = 60;
const RAW_SUMMARY_CHARS: usize = 100;
const THINKING_SUMMARY_THRESHOLD: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayKind {
    Session,
    UserMessage,
    AssistantText,
    Thinking,
    ToolStart,
    ToolEnd,
    TurnEnd,
    AgentEnd,
    Iteration,
    Info,
    Raw,
}

impl DisplayKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayKind::Session => "session",
            DisplayKind::UserMessage => "user_msg",
            DisplayKind::AssistantText => "assistant_text",
            DisplayKind::Thinking => "thinking",
            DisplayKind::ToolStart => "tool_start",
            DisplayKind::ToolEnd => "tool_end",
            DisplayKind::TurnEnd => "turn_end",
            DisplayKind::AgentEnd => "agent_end",
            DisplayKind::Iteration => "iteration",
            DisplayKind::Info => "info",
            DisplayKind::Raw => "raw",
        }
    }
}

/// Tool call data carried by `ToolStart` and `ToolEnd` events.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInfo {
    pub call_id: String,
    pub name: String,
    pub args: Option<Value>,
    pub result_text: String,
    pub is_error: bool,
}

/// UI projection of one or more protocol events.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayEvent {
    pub kind: DisplayKind,
    /// One line for the stream list.
    pub summary: String,
    /// Full text for the detail pane.
    pub detail: String,
    pub timestamp: DateTime<Local>,
    pub iteration: u32,
    pub tool: Option<ToolInfo>,
}

impl DisplayEvent {
    pub fn new(
        kind: DisplayKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
        iteration: u32,
    ) -> Self {
        Self {
            kind,
            summary: summary.into(),
            detail: detail.into(),
            timestamp: Local::now(),
            iteration,
            tool: None,
        }
    }

    pub fn iteration_boundary(iteration: u32) -> Self {
        Self::new(
            DisplayKind::Iteration,
            format!("═══ Iteration {iteration} ═══"),
            format!("Starting iteration {iteration}"),
            iteration,
        )
    }

    pub fn info(text: impl Into<String>, iteration: u32) -> Self {
        let text = text.into();
        Self::new(DisplayKind::Info, text.clone(), text, iteration)
    }

    pub fn is_tool_error(&self) -> bool {
        self.tool.as_ref().is_some_and(|tool| tool.is_error)
    }
}

/// Appends `event`, or merges it into the last entry when both are
/// assistant text of the same iteration. Returns `true` when a new entry
/// was appended.
pub fn merge_display_event(events: &mut Vec<DisplayEvent>, event: DisplayEvent) -> bool {
    if event.kind == DisplayKind::AssistantText {
        if let Some(last) = events.last_mut() {
            if last.kind == DisplayKind::AssistantText && last.iteration == event.iteration {
                last.summary = event.summary;
                last.detail = event.detail;
                last.timestamp = event.timestamp;
                return false;
            }
        }
    }
    events.push(event);
    true
}

/// Turns protocol events into display events, accumulating streamed text.
#[derive(Debug, Default)]
pub struct EventConverter {
    iteration: u32,
    assistant_text: String,
    thinking_text: String,
    current_model: String,
    in_assistant: bool,
    in_thinking: bool,
}

impl EventConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn set_iteration(&mut self, iteration: u32) {
        self.iteration = iteration;
    }

    pub fn current_model(&self) -> Option<&str> {
        (!self.current_model.is_empty()).then_some(self.current_model.as_str())
    }

    pub fn convert(&mut self, event: &AgentEvent) -> Vec<DisplayEvent> {
        match event {
            AgentEvent::Session { id, timestamp, cwd, .. } => {
                let short: String = id.chars().take(SESSION_ID_CHARS).collect();
                vec![self.event(
                    DisplayKind::Session,
                    format!("📡 Session {short}"),
                    format!("Session ID: {id}\nTimestamp: {timestamp}\nCWD: {cwd}"),
                )]
            }
            AgentEvent::MessageStart { message } => self.message_start(message.as_ref()),
            AgentEvent::MessageUpdate {
                assistant_message_event,
                ..
            } => match AssistantDelta::parse(assistant_message_event.as_ref()) {
                Some(delta) => self.assistant_delta(delta),
                None => Vec::new(),
            },
            AgentEvent::MessageEnd { .. } => self.message_end(),
            AgentEvent::ToolExecutionStart {
                tool_call_id,
                tool_name,
                args,
            } => {
                let formatted = format_tool_args(tool_name, args.as_ref());
                let summary = if formatted.is_empty() {
                    format!("⚙ {tool_name}")
                } else {
                    format!(
                        "⚙ {tool_name}: {}",
                        truncate_chars(&formatted, SUMMARY_ARGS_CHARS)
                    )
                };
                let mut detail = format!("Tool: {tool_name}\nCall ID: {tool_call_id}");
                if !formatted.is_empty() {
                    detail.push_str(&format!("\nArgs: {formatted}"));
                }
                let mut display = self.event(DisplayKind::ToolStart, summary, detail);
                display.tool = Some(ToolInfo {
                    call_id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    args: args.clone(),
                    result_text: String::new(),
                    is_error: false,
                });
                vec![display]
            }
            AgentEvent::ToolExecutionEnd {
                tool_call_id,
                tool_name,
                result,
                is_error,
            } => {
                let is_error = is_error.unwrap_or(false);
                let summary = if is_error {
                    format!("✗ {tool_name} error")
                } else {
                    format!("✓ {tool_name} done")
                };
                let result_text = result.as_ref().map(tool_result_text).unwrap_or_default();
                let mut detail =
                    format!("Tool: {tool_name}\nCall ID: {tool_call_id}\nError: {is_error}");
                if result.is_some() {
                    detail.push_str(&format!("\nResult:\n{result_text}"));
                }
                let mut display = self.event(DisplayKind::ToolEnd, summary, detail);
                display.tool = Some(ToolInfo {
                    call_id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    args: None,
                    result_text,
                    is_error,
                });
                vec![display]
            }
            AgentEvent::TurnEnd { .. } => vec![self.event(
                DisplayKind::TurnEnd,
                "── turn end ──",
                "Turn completed.",
            )],
            AgentEvent::AgentEnd { .. } => vec![self.event(
                DisplayKind::AgentEnd,
                "── agent end ──",
                "Agent process ended.",
            )],
            AgentEvent::Iteration { iteration } => {
                self.iteration = *iteration;
                self.in_assistant = false;
                self.in_thinking = false;
                self.assistant_text.clear();
                self.thinking_text.clear();
                vec![DisplayEvent::iteration_boundary(*iteration)]
            }
            AgentEvent::Untyped(untyped) => vec![self.untyped(untyped)],
            AgentEvent::RawLine { line } => vec![self.event(
                DisplayKind::Raw,
                format!("· {}", truncate_chars(line, RAW_SUMMARY_CHARS)),
                line.clone(),
            )],
            AgentEvent::AgentStart
            | AgentEvent::TurnStart
            | AgentEvent::ToolExecutionUpdate { .. } => Vec::new(),
        }
    }

    fn message_start(&mut self, message: Option<&Value>) -> Vec<DisplayEvent> {
        let envelope = MessageEnvelope::parse(message);
        match envelope.role.as_str() {
            "user" => {
                let detail = envelope.text().unwrap_or_else(|| "User message".to_string());
                vec![self.event(DisplayKind::UserMessage, "→ User message", detail)]
            }
            "assistant" => {
                self.current_model = envelope
                    .model
                    .filter(|model| !model.is_empty())
                    .unwrap_or_else(|| "unknown".to_string());
                self.assistant_text.clear();
                self.in_assistant = true;
                vec![self.event(
                    DisplayKind::AssistantText,
                    format!("← Assistant ({})", self.current_model),
                    "",
                )]
            }
            _ => Vec::new(),
        }
    }

    fn assistant_delta(&mut self, delta: AssistantDelta) -> Vec<DisplayEvent> {
        match delta {
            AssistantDelta::TextDelta { delta } => {
                self.assistant_text.push_str(&delta);
                let chars = self.assistant_text.chars().count();
                vec![self.event(
                    DisplayKind::AssistantText,
                    format!("← Assistant ({}) [{chars} chars]", self.model_label()),
                    self.assistant_text.clone(),
                )]
            }
            AssistantDelta::ThinkingStart => {
                self.thinking_text.clear();
                self.in_thinking = true;
                Vec::new()
            }
            AssistantDelta::ThinkingDelta { delta } => {
                self.thinking_text.push_str(&delta);
                self.in_thinking = true;
                Vec::new()
            }
            AssistantDelta::ThinkingEnd { content } => {
                if !self.in_thinking {
                    return Vec::new();
                }
                self.in_thinking = false;
                let mut text = std::mem::take(&mut self.thinking_text);
                if text.is_empty() {
                    text = content;
                }
                let chars = text.chars().count();
                let summary = if chars > THINKING_SUMMARY_THRESHOLD {
                    format!("💭 Thinking ({chars} chars)")
                } else {
                    "💭 Thinking".to_string()
                };
                vec![self.event(DisplayKind::Thinking, summary, text)]
            }
            AssistantDelta::Other => Vec::new(),
        }
    }

    fn message_end(&mut self) -> Vec<DisplayEvent> {
        if !self.in_assistant {
            return Vec::new();
        }
        self.in_assistant = false;
        if self.assistant_text.is_empty() {
            return Vec::new();
        }
        let chars = self.assistant_text.chars().count();
        vec![self.event(
            DisplayKind::AssistantText,
            format!("✓ Assistant text ({chars} chars)"),
            self.assistant_text.clone(),
        )]
    }

    fn untyped(&self, untyped: &UntypedEvent) -> DisplayEvent {
        let mut summary = format!("· {}", untyped.kind);
        if let Some(role) = &untyped.role {
            summary.push_str(&format!(" [{role}]"));
        }
        if let Some(tool) = &untyped.tool {
            summary.push_str(&format!(" ⚙ {tool}"));
        }
        if let Some(content) = &untyped.content {
            summary.push_str(&format!(": {content}"));
        }
        let detail = serde_json::to_string_pretty(&untyped.raw)
            .unwrap_or_else(|_| untyped.raw.to_string());
        self.event(
            DisplayKind::Raw,
            truncate_chars(&summary, RAW_SUMMARY_CHARS),
            detail,
        )
    }

    fn model_label(&self) -> &str {
        self.current_model().unwrap_or("unknown")
    }

    fn event(
        &self,
        kind: DisplayKind,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> DisplayEvent {
        DisplayEvent::new(kind, summary, detail, self.iteration)
    }
}
