use crate::ui::input_metrics::{char_display_width, display_width};
use crate::ui::theme;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use std::collections::HashMap;

const MIN_RENDER_WIDTH: usize = 10;
const MAX_CACHED_DOCUMENTS: usize = 64;

/// Markdown renderer bound to the width it last rendered at.
///
/// Rendered documents are cached per text; a width change drops the cache.
#[derive(Debug, Default)]
pub struct MarkdownRenderer {
    width: usize,
    cache: HashMap<String, Vec<Line<'static>>>,
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn render(&mut self, text: &str, width: usize) -> Vec<Line<'static>> {
        if width != self.width {
            self.cache.clear();
            self.width = width;
        }
        if let Some(lines) = self.cache.get(text) {
            return lines.clone();
        }
        let lines = render_markdown(text, width);
        if self.cache.len() >= MAX_CACHED_DOCUMENTS {
            self.cache.clear();
        }
        self.cache.insert(text.to_string(), lines.clone());
        lines
    }
}

struct StyleStack {
    styles: Vec<Style>,
}

impl StyleStack {
    fn new() -> Self {
        Self {
            styles: vec![Style::default().fg(theme::TEXT)],
        }
    }

    fn push(&mut self, patch: Style) {
        let next = self.current().patch(patch);
        self.styles.push(next);
    }

    fn pop(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn current(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }
}

/// Renders markdown into styled lines wrapped to `width` display columns.
pub fn render_markdown(text: &str, width: usize) -> Vec<Line<'static>> {
    let width = width.max(MIN_RENDER_WIDTH);
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut styles = StyleStack::new();
    let mut list_stack: Vec<Option<u64>> = Vec::new();
    let mut quote_depth = 0usize;
    let mut in_code_block = false;
    let mut code_lines: Vec<String> = Vec::new();
    let mut table_rows: Vec<Vec<String>> = Vec::new();
    let mut table_row: Vec<String> = Vec::new();
    let mut table_cell = String::new();
    let mut in_table = false;

    for event in Parser::new_ext(text, options) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    flush(&mut lines, &mut current, width);
                    styles.push(heading_style(level));
                }
                Tag::Paragraph => {
                    flush(&mut lines, &mut current, width);
                    if quote_depth > 0 {
                        current.push(quote_prefix(quote_depth));
                    }
                }
                Tag::BlockQuote(_) => {
                    flush(&mut lines, &mut current, width);
                    quote_depth += 1;
                    styles.push(Style::default().add_modifier(Modifier::ITALIC));
                }
                Tag::CodeBlock(kind) => {
                    flush(&mut lines, &mut current, width);
                    in_code_block = true;
                    if let CodeBlockKind::Fenced(lang) = kind {
                        if !lang.is_empty() {
                            lines.push(Line::from(Span::styled(
                                format!("  {lang}"),
                                Style::default().fg(theme::TEXT_DIM),
                            )));
                        }
                    }
                }
                Tag::List(start) => {
                    flush(&mut lines, &mut current, width);
                    list_stack.push(start);
                }
                Tag::Item => {
                    flush(&mut lines, &mut current, width);
                    let depth = list_stack.len().saturating_sub(1);
                    let marker = match list_stack.last_mut() {
                        Some(Some(number)) => {
                            let marker = format!("{number}. ");
                            *number += 1;
                            marker
                        }
                        _ => "• ".to_string(),
                    };
                    current.push(Span::styled(
                        format!("{}{marker}", "  ".repeat(depth)),
                        Style::default().fg(theme::ACCENT),
                    ));
                }
                Tag::Emphasis => styles.push(Style::default().add_modifier(Modifier::ITALIC)),
                Tag::Strong => styles.push(Style::default().add_modifier(Modifier::BOLD)),
                Tag::Strikethrough => {
                    styles.push(Style::default().add_modifier(Modifier::CROSSED_OUT))
                }
                Tag::Link { .. } => styles.push(
                    Style::default()
                        .fg(theme::ACCENT)
                        .add_modifier(Modifier::UNDERLINED),
                ),
                Tag::Table(_) => {
                    flush(&mut lines, &mut current, width);
                    in_table = true;
                    table_rows.clear();
                }
                _ => {}
            },
            Event::End(tag) => match tag {
                TagEnd::Heading(_) => {
                    styles.pop();
                    flush(&mut lines, &mut current, width);
                    lines.push(Line::default());
                }
                TagEnd::Paragraph => {
                    flush(&mut lines, &mut current, width);
                    if list_stack.is_empty() {
                        lines.push(Line::default());
                    }
                }
                TagEnd::BlockQuote(_) => {
                    flush(&mut lines, &mut current, width);
                    quote_depth = quote_depth.saturating_sub(1);
                    styles.pop();
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    for code in code_lines.drain(..) {
                        let spans = vec![Span::styled(
                            format!("  {code}"),
                            Style::default().fg(theme::CODE),
                        )];
                        lines.extend(wrap_spans(spans, width));
                    }
                    lines.push(Line::default());
                }
                TagEnd::List(_) => {
                    flush(&mut lines, &mut current, width);
                    list_stack.pop();
                    if list_stack.is_empty() {
                        lines.push(Line::default());
                    }
                }
                TagEnd::Item => flush(&mut lines, &mut current, width),
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                    styles.pop()
                }
                TagEnd::TableCell => {
                    table_row.push(table_cell.trim().to_string());
                    table_cell.clear();
                }
                TagEnd::TableHead | TagEnd::TableRow => {
                    if !table_row.is_empty() {
                        table_rows.push(std::mem::take(&mut table_row));
                    }
                }
                TagEnd::Table => {
                    in_table = false;
                    lines.extend(render_table(&table_rows, width));
                    lines.push(Line::default());
                    table_rows.clear();
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    code_lines.extend(text.lines().map(str::to_string));
                } else if in_table {
                    table_cell.push_str(&text);
                } else {
                    current.push(Span::styled(text.to_string(), styles.current()));
                }
            }
            Event::Code(code) => {
                if in_table {
                    table_cell.push_str(&code);
                } else {
                    current.push(Span::styled(
                        code.to_string(),
                        Style::default().fg(theme::CODE),
                    ));
                }
            }
            Event::SoftBreak => {
                if !in_table {
                    current.push(Span::styled(" ".to_string(), styles.current()));
                }
            }
            Event::HardBreak => {
                flush(&mut lines, &mut current, width);
                if quote_depth > 0 {
                    current.push(quote_prefix(quote_depth));
                }
            }
            Event::Rule => {
                flush(&mut lines, &mut current, width);
                lines.push(Line::from(Span::styled(
                    "─".repeat(width.min(40)),
                    Style::default().fg(theme::TEXT_DIM),
                )));
                lines.push(Line::default());
            }
            Event::TaskListMarker(checked) => {
                let mark = if checked { "[x] " } else { "[ ] " };
                current.push(Span::styled(
                    mark.to_string(),
                    Style::default().fg(theme::ACCENT),
                ));
            }
            Event::Html(html) | Event::InlineHtml(html) => {
                current.push(Span::styled(
                    html.trim_end().to_string(),
                    Style::default().fg(theme::TEXT_DIM),
                ));
            }
            _ => {}
        }
    }

    flush(&mut lines, &mut current, width);
    while lines.last().is_some_and(|line| line.width() == 0) {
        lines.pop();
    }
    lines
}

fn heading_style(level: HeadingLevel) -> Style {
    let style = Style::default().add_modifier(Modifier::BOLD);
    match level {
        HeadingLevel::H1 => style.fg(theme::ACCENT).add_modifier(Modifier::UNDERLINED),
        HeadingLevel::H2 => style.fg(theme::ACCENT),
        _ => style,
    }
}

fn quote_prefix(depth: usize) -> Span<'static> {
    Span::styled("│ ".repeat(depth), Style::default().fg(theme::TEXT_DIM))
}

fn flush(lines: &mut Vec<Line<'static>>, current: &mut Vec<Span<'static>>, width: usize) {
    if current.is_empty() {
        return;
    }
    lines.extend(wrap_spans(std::mem::take(current), width));
}

fn render_table(rows: &[Vec<String>], width: usize) -> Vec<Line<'static>> {
    let border = Style::default().fg(theme::TEXT_DIM);
    let mut out = Vec::new();
    for (row_idx, row) in rows.iter().enumerate() {
        let cell_style = if row_idx == 0 {
            Style::default().fg(theme::TEXT).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme::TEXT)
        };
        let mut spans = Vec::new();
        for (col, cell) in row.iter().enumerate() {
            if col > 0 {
                spans.push(Span::styled(" │ ".to_string(), border));
            }
            spans.push(Span::styled(cell.clone(), cell_style));
        }
        out.extend(wrap_spans(spans, width));
        if row_idx == 0 {
            let rule_width = display_width(&row.join(" │ ")).clamp(1, width);
            out.push(Line::from(Span::styled("─".repeat(rule_width), border)));
        }
    }
    out
}

/// Word-wraps styled spans to `width` display columns, hard-breaking words
/// longer than a full line. Leading whitespace of the first line is kept.
pub fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut current_width = 0usize;

    for span in spans {
        let style = span.style;
        for piece in split_words(&span.content) {
            if piece == " " {
                if current_width == 0 && !lines.is_empty() {
                    continue;
                }
                if current_width + 1 > width {
                    lines.push(Line::from(std::mem::take(&mut current)));
                    current_width = 0;
                    continue;
                }
                push_text(&mut current, " ", style);
                current_width += 1;
                continue;
            }

            let piece_width = display_width(piece);
            if piece_width > width {
                for ch in piece.chars() {
                    let ch_width = char_display_width(ch);
                    if current_width + ch_width > width && current_width > 0 {
                        lines.push(Line::from(std::mem::take(&mut current)));
                        current_width = 0;
                    }
                    let mut buf = [0u8; 4];
                    push_text(&mut current, ch.encode_utf8(&mut buf), style);
                    current_width += ch_width;
                }
                continue;
            }

            if current_width + piece_width > width && current_width > 0 {
                lines.push(Line::from(std::mem::take(&mut current)));
                current_width = 0;
            }
            push_text(&mut current, piece, style);
            current_width += piece_width;
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(Line::from(current));
    }
    lines
}

fn push_text(spans: &mut Vec<Span<'static>>, text: &str, style: Style) {
    if let Some(last) = spans.last_mut() {
        if last.style == style {
            last.content.to_mut().push_str(text);
            return;
        }
    }
    spans.push(Span::styled(text.to_string(), style));
}

/// Splits into runs of non-space characters and single spaces.
fn split_words(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch == ' ' {
            if let Some(begin) = start.take() {
                pieces.push(&text[begin..idx]);
            }
            pieces.push(&text[idx..idx + 1]);
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        pieces.push(&text[begin..]);
    }
    pieces
}
