use crate::runner::RunStatus;
use crate::state::{Block, DisplayEvent, DisplayKind, ToolCallBlock, ToolStatus};
use crate::ui::input_metrics::{display_width, pad_to_width, truncate_with_ellipsis, wrap_text};
use crate::ui::markdown::MarkdownRenderer;
use crate::ui::theme::{self, StatusLevel};
use crate::util::format_elapsed;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block as Pane, Borders, Paragraph},
    Frame,
};
use std::time::Duration;

pub const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const ABANDONED_TOOL_ICON: &str = "○";
pub const MAX_TOOL_RESULT_LINES: usize = 6;

pub fn spinner_frame(tick: usize) -> &'static str {
    SPINNER_FRAMES[tick % SPINNER_FRAMES.len()]
}

/// Keeps a scroll offset inside `[0, content - visible]`.
pub fn clamp_scroll(offset: usize, content: usize, visible: usize) -> usize {
    offset.min(content.saturating_sub(visible))
}

pub fn run_status_level(status: RunStatus) -> StatusLevel {
    match status {
        RunStatus::Running => StatusLevel::Info,
        RunStatus::Completed => StatusLevel::Success,
        RunStatus::MaxIterationsReached | RunStatus::Interrupted => StatusLevel::Warning,
        RunStatus::Failed => StatusLevel::Error,
    }
}

pub struct HeaderView<'a> {
    pub title: String,
    pub spinner: Option<&'static str>,
    pub iteration: u32,
    pub model: Option<&'a str>,
    pub elapsed: Duration,
    pub status: RunStatus,
}

pub fn render_header(frame: &mut Frame<'_>, area: Rect, header: &HeaderView<'_>) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let sep = Span::styled(" │ ", Style::default().fg(theme::TEXT_DIM));
    let mut spans = vec![Span::styled(
        header.title.clone(),
        Style::default()
            .fg(theme::ACCENT)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(spinner) = header.spinner {
        spans.push(Span::styled(
            format!(" {spinner}"),
            Style::default().fg(theme::ACCENT),
        ));
    }
    spans.push(sep.clone());
    spans.push(Span::raw(format!("iteration {}", header.iteration)));
    if let Some(model) = header.model {
        spans.push(sep.clone());
        spans.push(Span::styled(
            model.to_string(),
            Style::default().fg(theme::TEXT_MUTED),
        ));
    }
    spans.push(sep.clone());
    spans.push(Span::raw(format_elapsed(header.elapsed)));
    spans.push(sep);
    spans.push(Span::styled(
        header.status.as_str().to_string(),
        theme::status_style(run_status_level(header.status)).add_modifier(Modifier::BOLD),
    ));

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(theme::HEADER_BG)),
        area,
    );
}

/// One line per visible event, the selected one marked and highlighted.
pub fn stream_lines(
    events: &[DisplayEvent],
    cursor: usize,
    scroll: usize,
    visible: usize,
    width: usize,
) -> Vec<Line<'static>> {
    let text_width = width.saturating_sub(2);
    events
        .iter()
        .enumerate()
        .skip(scroll)
        .take(visible)
        .map(|(idx, event)| {
            let selected = idx == cursor;
            let summary = pad_to_width(&truncate_with_ellipsis(&event.summary, text_width), text_width);
            let mut style = theme::event_style(event.kind, event.is_tool_error());
            if selected {
                style = style.bg(theme::SELECTED_BG).add_modifier(Modifier::BOLD);
            }
            let marker = if selected { "▌ " } else { "  " };
            Line::from(vec![
                Span::styled(marker, Style::default().fg(theme::ACCENT)),
                Span::styled(summary, style),
            ])
        })
        .collect()
}

/// Content of the detail pane for the selected event.
///
/// Raw mode shows the payload verbatim under a small header. Rendered mode
/// runs message and thinking text through markdown; tool output stays
/// verbatim either way.
pub fn detail_lines(
    event: Option<&DisplayEvent>,
    raw: bool,
    renderer: &mut MarkdownRenderer,
    width: usize,
) -> Vec<Line<'static>> {
    let Some(event) = event else {
        return vec![Line::styled(
            "No events yet.",
            Style::default().fg(theme::TEXT_DIM),
        )];
    };
    let dim = Style::default().fg(theme::TEXT_DIM);

    if raw {
        let mut lines = vec![
            Line::styled(format!("Type: {}", event.kind.as_str()), dim),
            Line::styled(
                format!("Time: {}", event.timestamp.format("%H:%M:%S")),
                dim,
            ),
            Line::styled(format!("Iteration: {}", event.iteration), dim),
            Line::default(),
        ];
        lines.extend(verbatim_lines(&event.detail, width));
        return lines;
    }

    match event.kind {
        DisplayKind::AssistantText | DisplayKind::UserMessage | DisplayKind::Thinking
            if !event.detail.is_empty() =>
        {
            renderer.render(&event.detail, width)
        }
        _ => verbatim_lines(&event.detail, width),
    }
}

fn verbatim_lines(text: &str, width: usize) -> Vec<Line<'static>> {
    wrap_text(text, width.max(1))
        .into_iter()
        .map(|line| Line::styled(line, Style::default().fg(theme::TEXT)))
        .collect()
}

/// Content of the main pane: the run as a sequence of blocks.
pub fn block_lines(
    blocks: &[Block],
    active_tool: Option<usize>,
    spinner: &str,
    renderer: &mut MarkdownRenderer,
    width: usize,
) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for (idx, block) in blocks.iter().enumerate() {
        match block {
            Block::Iteration { iteration } => {
                if !lines.is_empty() {
                    lines.push(Line::default());
                }
                let label = format!("━━━ Iteration {iteration} ");
                let fill = width.saturating_sub(display_width(&label));
                lines.push(Line::styled(
                    truncate_with_ellipsis(&format!("{label}{}", "━".repeat(fill)), width),
                    Style::default()
                        .fg(theme::ACCENT)
                        .add_modifier(Modifier::BOLD),
                ));
            }
            Block::AssistantText { text, .. } => {
                lines.extend(renderer.render(text, width));
                lines.push(Line::default());
            }
            Block::Thinking { chars, .. } => {
                lines.push(Line::styled(
                    format!("💭 thinking ({chars} chars)"),
                    Style::default()
                        .fg(theme::THINKING)
                        .add_modifier(Modifier::ITALIC),
                ));
            }
            Block::ToolCall(tool) => {
                let spinner = (active_tool == Some(idx)).then_some(spinner);
                lines.extend(tool_lines(tool, spinner, width));
            }
            Block::Info { text } => {
                lines.extend(
                    wrap_text(text, width)
                        .into_iter()
                        .map(|line| Line::styled(line, Style::default().fg(theme::TEXT_MUTED))),
                );
            }
        }
    }
    lines
}

/// Pending calls that are not the active one never finished.
fn tool_lines(tool: &ToolCallBlock, spinner: Option<&str>, width: usize) -> Vec<Line<'static>> {
    let (icon, color) = match tool.status {
        ToolStatus::Pending => (
            spinner.unwrap_or(ABANDONED_TOOL_ICON).to_string(),
            theme::WARNING,
        ),
        ToolStatus::Done => ("✓".to_string(), theme::SUCCESS),
        ToolStatus::Error => ("✗".to_string(), theme::ERROR),
    };
    let border = Style::default().fg(color);
    let mut header = format!("┌ {icon} {}", tool.name);
    if !tool.args.is_empty() {
        header.push(' ');
        header.push_str(&tool.args);
    }

    let mut lines = vec![Line::styled(truncate_with_ellipsis(&header, width), border)];
    let result_lines: Vec<&str> = tool.result.lines().collect();
    let inner_width = width.saturating_sub(2);
    for line in result_lines.iter().take(MAX_TOOL_RESULT_LINES) {
        lines.push(Line::from(vec![
            Span::styled("│ ", border),
            Span::styled(
                truncate_with_ellipsis(line, inner_width),
                Style::default().fg(theme::TEXT_MUTED),
            ),
        ]));
    }
    if result_lines.len() > MAX_TOOL_RESULT_LINES {
        lines.push(Line::from(vec![
            Span::styled("│ ", border),
            Span::styled(
                format!("… ({} more lines)", result_lines.len() - MAX_TOOL_RESULT_LINES),
                Style::default().fg(theme::TEXT_DIM),
            ),
        ]));
    }
    lines.push(Line::styled("└─", border));
    lines
}

/// Bordered pane showing `lines` from `scroll` on.
pub fn render_pane(
    frame: &mut Frame<'_>,
    area: Rect,
    title: String,
    lines: Vec<Line<'static>>,
    scroll: usize,
    focused: bool,
) {
    if area.height == 0 || area.width == 0 {
        return;
    }
    let pane = Pane::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(theme::border_style(focused));
    let visible = usize::from(area.height.saturating_sub(2));
    let body: Vec<Line<'static>> = lines.into_iter().skip(scroll).take(visible).collect();
    frame.render_widget(Paragraph::new(body).block(pane), area);
}

pub fn render_status_line(frame: &mut Frame<'_>, area: Rect, status: &str, level: StatusLevel) {
    if area.height == 0 || area.width == 0 {
        return;
    }

    let text = truncate_with_ellipsis(status, area.width as usize);
    frame.render_widget(
        Paragraph::new(text).style(theme::status_style(level)),
        area,
    );
}
