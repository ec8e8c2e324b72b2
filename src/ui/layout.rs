use ratatui::layout::{Constraint, Direction, Layout, Rect};

const STREAM_WIDTH_PERCENT: u16 = 38;
const MAIN_HEIGHT_PERCENT: u16 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DashboardLayout {
    pub header: Rect,
    pub stream: Rect,
    pub main: Rect,
    pub detail: Rect,
    pub status: Rect,
}

/// Header row, stream list on the left, main over detail on the right,
/// status line at the bottom.
pub fn split_dashboard(area: Rect) -> DashboardLayout {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(STREAM_WIDTH_PERCENT),
            Constraint::Percentage(100 - STREAM_WIDTH_PERCENT),
        ])
        .split(rows[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(MAIN_HEIGHT_PERCENT),
            Constraint::Percentage(100 - MAIN_HEIGHT_PERCENT),
        ])
        .split(columns[1]);

    DashboardLayout {
        header: rows[0],
        stream: columns[0],
        main: right[0],
        detail: right[1],
        status: rows[2],
    }
}

/// Rows available inside a bordered pane.
pub fn inner_height(pane: Rect) -> usize {
    usize::from(pane.height.saturating_sub(2))
}

/// Columns available inside a bordered pane.
pub fn inner_width(pane: Rect) -> usize {
    usize::from(pane.width.saturating_sub(2))
}
