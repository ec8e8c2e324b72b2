use serde::{Deserialize, Serialize};

use super::display::{DisplayEvent, DisplayKind};
use super::tool_args::format_tool_args;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Pending,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallBlock {
    pub iteration: u32,
    pub call_id: String,
    pub name: String,
    /// Formatted arguments, see [`format_tool_args`].
    pub args: String,
    pub result: String,
    pub status: ToolStatus,
}

/// Renderable unit of the main pane.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Iteration { iteration: u32 },
    AssistantText { iteration: u32, text: String },
    Thinking { iteration: u32, chars: usize },
    ToolCall(ToolCallBlock),
    Info { text: String },
}

/// Builds main-pane blocks from display events.
///
/// Tool calls are assumed not to overlap within one assistant turn, so a
/// single "active" slot tracks the pending call that shows the spinner.
#[derive(Debug, Default)]
pub struct BlockBuilder {
    blocks: Vec<Block>,
    active_tool: Option<usize>,
    open_text: Option<usize>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Index of the tool call still running in the current iteration.
    pub fn active_tool_index(&self) -> Option<usize> {
        self.active_tool
            .filter(|idx| matches!(self.blocks.get(*idx), Some(Block::ToolCall(_))))
    }

    pub fn apply(&mut self, event: &DisplayEvent) {
        match event.kind {
            DisplayKind::Iteration => {
                self.open_text = None;
                self.active_tool = None;
                self.blocks.push(Block::Iteration {
                    iteration: event.iteration,
                });
            }
            DisplayKind::AssistantText => self.apply_text(event),
            DisplayKind::Thinking => {
                self.open_text = None;
                self.blocks.push(Block::Thinking {
                    iteration: event.iteration,
                    chars: event.detail.chars().count(),
                });
            }
            DisplayKind::ToolStart => {
                let Some(tool) = &event.tool else {
                    return;
                };
                self.open_text = None;
                self.blocks.push(Block::ToolCall(ToolCallBlock {
                    iteration: event.iteration,
                    call_id: tool.call_id.clone(),
                    name: tool.name.clone(),
                    args: format_tool_args(&tool.name, tool.args.as_ref()),
                    result: String::new(),
                    status: ToolStatus::Pending,
                }));
                self.active_tool = Some(self.blocks.len() - 1);
            }
            DisplayKind::ToolEnd => {
                if let Some(tool) = &event.tool {
                    self.finish_tool(&tool.call_id, &tool.result_text, tool.is_error);
                }
            }
            DisplayKind::Info | DisplayKind::Raw => {
                self.open_text = None;
                self.blocks.push(Block::Info {
                    text: event.summary.clone(),
                });
            }
            DisplayKind::Session
            | DisplayKind::UserMessage
            | DisplayKind::TurnEnd
            | DisplayKind::AgentEnd => {}
        }
    }

    fn apply_text(&mut self, event: &DisplayEvent) {
        // An empty text event marks the start of a new assistant message.
        if event.detail.is_empty() {
            self.open_text = None;
            return;
        }

        if let Some(Block::AssistantText { text, .. }) =
            self.open_text.and_then(|idx| self.blocks.get_mut(idx))
        {
            text.clone_from(&event.detail);
            return;
        }

        self.blocks.push(Block::AssistantText {
            iteration: event.iteration,
            text: event.detail.clone(),
        });
        self.open_text = Some(self.blocks.len() - 1);
    }

    /// Completes the most recent pending call with `call_id`. Unknown ids
    /// are ignored.
    fn finish_tool(&mut self, call_id: &str, result: &str, is_error: bool) {
        let found = self.blocks.iter_mut().enumerate().rev().find_map(|(idx, block)| {
            match block {
                Block::ToolCall(tool)
                    if tool.call_id == call_id && tool.status == ToolStatus::Pending =>
                {
                    Some((idx, tool))
                }
                _ => None,
            }
        });

        let Some((idx, tool)) = found else {
            tracing::debug!(call_id, "tool end without a pending call");
            return;
        };
        tool.status = if is_error {
            ToolStatus::Error
        } else {
            ToolStatus::Done
        };
        tool.result = result.to_string();
        if self.active_tool == Some(idx) {
            self.active_tool = None;
        }
    }
}
