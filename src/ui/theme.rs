use crate::state::DisplayKind;
use ratatui::style::{Color, Modifier, Style};

pub const TEXT: Color = Color::White;
pub const TEXT_MUTED: Color = Color::Gray;
pub const TEXT_DIM: Color = Color::DarkGray;
pub const ACCENT: Color = Color::Cyan;
pub const SUCCESS: Color = Color::Green;
pub const WARNING: Color = Color::Yellow;
pub const ERROR: Color = Color::Red;
pub const THINKING: Color = Color::Magenta;
pub const CODE: Color = Color::LightGreen;
pub const SELECTED_BG: Color = Color::Rgb(40, 40, 48);
pub const HEADER_BG: Color = Color::Rgb(24, 24, 24);

/// Severity of the status line message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum StatusLevel {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

pub fn status_style(level: StatusLevel) -> Style {
    let color = match level {
        StatusLevel::Info => TEXT_MUTED,
        StatusLevel::Success => SUCCESS,
        StatusLevel::Warning => WARNING,
        StatusLevel::Error => ERROR,
    };
    Style::default().fg(color)
}

pub fn event_style(kind: DisplayKind, is_error: bool) -> Style {
    if is_error {
        return Style::default().fg(ERROR);
    }
    match kind {
        DisplayKind::Session => Style::default().fg(ACCENT),
        DisplayKind::UserMessage => Style::default().fg(Color::LightBlue),
        DisplayKind::AssistantText => Style::default().fg(TEXT),
        DisplayKind::Thinking => Style::default().fg(THINKING),
        DisplayKind::ToolStart => Style::default().fg(WARNING),
        DisplayKind::ToolEnd => Style::default().fg(SUCCESS),
        DisplayKind::TurnEnd | DisplayKind::AgentEnd => Style::default().fg(TEXT_DIM),
        DisplayKind::Iteration => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        DisplayKind::Info | DisplayKind::Raw => Style::default().fg(TEXT_MUTED),
    }
}

pub fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(ACCENT)
    } else {
        Style::default().fg(TEXT_DIM)
    }
}
