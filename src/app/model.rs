use crate::runner::RunStatus;
use crate::runtime::event::RuntimeEvent;
use crate::runtime::frontend::{map_key, QuitKey, ScrollAction, UserInputEvent};
use crate::state::{merge_display_event, Block, BlockBuilder, DisplayEvent, EventConverter};
use crate::store::RunMeta;
use crate::types::AgentEvent;
use crate::ui::layout::{inner_height, inner_width, split_dashboard};
use crate::ui::markdown::MarkdownRenderer;
use crate::ui::render::{
    block_lines, clamp_scroll, detail_lines, render_header, render_pane, render_status_line,
    run_status_level, spinner_frame, stream_lines, HeaderView,
};
use crate::ui::theme::StatusLevel;
use crate::util::short_id;
use crossterm::event::{KeyEvent, KeyEventKind};
use ratatui::{layout::Rect, Frame};
use std::time::{Duration, Instant};

const LIVE_HELP: &str = "tab focus · j/k move · g/G ends · ^d/^u page · r raw · i interrupt · q quit";
const VIEWER_HELP: &str = "tab focus · j/k move · g/G ends · ^d/^u page · r raw · q quit";
const DECISION_PROMPT: &str = "Iteration interrupted. Continue? [y/n]";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Focus {
    Stream,
    Main,
    Detail,
}

impl Focus {
    fn next(self) -> Self {
        match self {
            Focus::Stream => Focus::Main,
            Focus::Main => Focus::Detail,
            Focus::Detail => Focus::Stream,
        }
    }

    fn prev(self) -> Self {
        match self {
            Focus::Stream => Focus::Detail,
            Focus::Main => Focus::Stream,
            Focus::Detail => Focus::Main,
        }
    }
}

#[derive(Debug)]
pub enum DashboardMsg {
    Resize { width: u16, height: u16 },
    Key(KeyEvent),
    Tick,
    Run(RuntimeEvent),
}

impl From<RuntimeEvent> for DashboardMsg {
    fn from(event: RuntimeEvent) -> Self {
        DashboardMsg::Run(event)
    }
}

/// Side effect requested by a transition, executed by the event loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DashboardCommand {
    Quit,
    RequestInterrupt,
    Decide(bool),
}

/// Dashboard state. Every change goes through [`DashboardModel::update`];
/// [`DashboardModel::view`] only clamps scroll offsets to what it drew.
#[derive(Debug)]
pub struct DashboardModel {
    title: String,
    viewer: bool,
    events: Vec<DisplayEvent>,
    converter: EventConverter,
    blocks: BlockBuilder,
    cursor: usize,
    auto_follow: bool,
    stream_scroll: usize,
    main_scroll: usize,
    main_follow: bool,
    detail_scroll: usize,
    focus: Focus,
    raw_mode: bool,
    confirm_quit: Option<QuitKey>,
    awaiting_decision: bool,
    running: bool,
    run_status: RunStatus,
    iteration: u32,
    iterations_completed: u32,
    status: String,
    status_level: StatusLevel,
    width: u16,
    height: u16,
    spinner: usize,
    started_at: Instant,
    finished_after: Option<Duration>,
    main_renderer: MarkdownRenderer,
    detail_renderer: MarkdownRenderer,
}

impl DashboardModel {
    pub fn live(run_id: &str, agent: &str) -> Self {
        let mut model = Self::new(format!("ralfinho {} · {agent}", short_id(run_id)), false);
        model.running = true;
        model.status = format!("running {agent}");
        model
    }

    /// Read-only dashboard over a persisted run.
    pub fn viewer(meta: &RunMeta) -> Self {
        let mut model = Self::new(
            format!("ralfinho view {} · {}", short_id(&meta.run_id), meta.agent),
            true,
        );
        model.run_status = meta.status;
        model.iterations_completed = meta.iterations_completed;
        model.finished_after = Some(
            meta.ended_at
                .and_then(|ended| (ended - meta.started_at).to_std().ok())
                .unwrap_or_default(),
        );
        model.status = format!(
            "{} · {} iteration(s) · started {}",
            meta.status,
            meta.iterations_completed,
            meta.started_local().format("%Y-%m-%d %H:%M:%S")
        );
        model.status_level = run_status_level(meta.status);
        model
    }

    fn new(title: String, viewer: bool) -> Self {
        Self {
            title,
            viewer,
            events: Vec::new(),
            converter: EventConverter::new(),
            blocks: BlockBuilder::new(),
            cursor: 0,
            auto_follow: true,
            stream_scroll: 0,
            main_scroll: 0,
            main_follow: true,
            detail_scroll: 0,
            focus: Focus::Stream,
            raw_mode: false,
            confirm_quit: None,
            awaiting_decision: false,
            running: false,
            run_status: RunStatus::Running,
            iteration: 0,
            iterations_completed: 0,
            status: String::new(),
            status_level: StatusLevel::Info,
            width: 80,
            height: 24,
            spinner: 0,
            started_at: Instant::now(),
            finished_after: None,
            main_renderer: MarkdownRenderer::new(),
            detail_renderer: MarkdownRenderer::new(),
        }
    }

    pub fn update(mut self, msg: DashboardMsg) -> (Self, Option<DashboardCommand>) {
        let command = match msg {
            DashboardMsg::Resize { width, height } => {
                self.width = width;
                self.height = height;
                None
            }
            DashboardMsg::Key(key) => self.on_key(key),
            DashboardMsg::Tick => {
                if self.running {
                    self.spinner = self.spinner.wrapping_add(1);
                }
                None
            }
            DashboardMsg::Run(event) => {
                self.on_runtime_event(event);
                None
            }
        };
        (self, command)
    }

    pub fn events(&self) -> &[DisplayEvent] {
        &self.events
    }

    pub fn blocks(&self) -> &[Block] {
        self.blocks.blocks()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected(&self) -> Option<&DisplayEvent> {
        self.events.get(self.cursor)
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn raw_mode(&self) -> bool {
        self.raw_mode
    }

    pub fn detail_scroll(&self) -> usize {
        self.detail_scroll
    }

    pub fn main_scroll(&self) -> usize {
        self.main_scroll
    }

    pub fn confirm_quit(&self) -> Option<QuitKey> {
        self.confirm_quit
    }

    pub fn awaiting_decision(&self) -> bool {
        self.awaiting_decision
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn run_status(&self) -> RunStatus {
        self.run_status
    }

    pub fn iteration(&self) -> u32 {
        self.iteration
    }

    pub fn iterations_completed(&self) -> u32 {
        self.iterations_completed
    }

    pub fn status(&self) -> (&str, StatusLevel) {
        (&self.status, self.status_level)
    }

    fn set_status(&mut self, text: impl Into<String>, level: StatusLevel) {
        self.status = text.into();
        self.status_level = level;
    }

    fn on_runtime_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Agent(event) => self.apply_agent_event(&event),
            RuntimeEvent::Display(display) => self.push_display(display),
            RuntimeEvent::IterationFinished {
                iteration,
                interrupted,
                error,
            } => {
                if interrupted {
                    self.set_status(
                        format!("iteration {iteration} interrupted"),
                        StatusLevel::Warning,
                    );
                } else if let Some(error) = error {
                    self.set_status(
                        format!("iteration {iteration} failed: {error}"),
                        StatusLevel::Error,
                    );
                } else {
                    self.set_status(format!("iteration {iteration} finished"), StatusLevel::Info);
                }
            }
            RuntimeEvent::ContinuePrompt => {
                self.awaiting_decision = true;
                self.confirm_quit = None;
            }
            RuntimeEvent::RunFinished {
                status,
                iterations,
                error,
            } => {
                self.running = false;
                self.awaiting_decision = false;
                self.run_status = status;
                self.iterations_completed = iterations;
                self.finished_after = Some(self.started_at.elapsed());
                let mut text = format!("run {status} after {iterations} iteration(s)");
                if let Some(error) = error {
                    text.push_str(&format!(": {error}"));
                }
                self.set_status(text, run_status_level(status));
            }
        }
    }

    fn apply_agent_event(&mut self, event: &AgentEvent) {
        if let AgentEvent::Iteration { iteration } = event {
            self.iteration = *iteration;
        }
        for display in self.converter.convert(event) {
            self.push_display(display);
        }
    }

    fn push_display(&mut self, display: DisplayEvent) {
        self.blocks.apply(&display);
        let appended = merge_display_event(&mut self.events, display);
        if self.auto_follow {
            self.cursor = self.events.len().saturating_sub(1);
            if appended {
                self.detail_scroll = 0;
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Option<DashboardCommand> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        let input = map_key(key);

        if self.awaiting_decision {
            let UserInputEvent::Decision(resume) = input else {
                return None;
            };
            self.awaiting_decision = false;
            let text = if resume {
                "continuing: retrying the interrupted iteration"
            } else {
                "stopping after interrupt"
            };
            self.set_status(text, StatusLevel::Warning);
            return Some(DashboardCommand::Decide(resume));
        }

        if let UserInputEvent::Quit(quit_key) = input {
            if self.confirm_quit == Some(quit_key) {
                return Some(DashboardCommand::Quit);
            }
            self.confirm_quit = Some(quit_key);
            return None;
        }
        self.confirm_quit = None;

        match input {
            UserInputEvent::FocusNext => self.focus = self.focus.next(),
            UserInputEvent::FocusPrev => self.focus = self.focus.prev(),
            UserInputEvent::Scroll(action) => self.scroll(action),
            UserInputEvent::ToggleRaw => {
                self.raw_mode = !self.raw_mode;
                self.detail_scroll = 0;
            }
            UserInputEvent::Interrupt if self.running && !self.viewer => {
                self.set_status("interrupt requested", StatusLevel::Warning);
                return Some(DashboardCommand::RequestInterrupt);
            }
            UserInputEvent::Interrupt
            | UserInputEvent::Decision(_)
            | UserInputEvent::Quit(_)
            | UserInputEvent::Ignored => {}
        }
        None
    }

    fn scroll(&mut self, action: ScrollAction) {
        let half = (self.pane_height(self.focus) / 2).max(1);
        match self.focus {
            Focus::Stream => {
                let Some(last) = self.events.len().checked_sub(1) else {
                    return;
                };
                let target = match action {
                    ScrollAction::LineUp => self.cursor.saturating_sub(1),
                    ScrollAction::LineDown => self.cursor.saturating_add(1).min(last),
                    ScrollAction::HalfPageUp => self.cursor.saturating_sub(half),
                    ScrollAction::HalfPageDown => self.cursor.saturating_add(half).min(last),
                    ScrollAction::Top => 0,
                    ScrollAction::Bottom => last,
                };
                self.select(target, last);
            }
            Focus::Main => {
                self.main_scroll = scroll_offset(self.main_scroll, action, half);
                self.main_follow = action == ScrollAction::Bottom;
            }
            Focus::Detail => {
                self.detail_scroll = scroll_offset(self.detail_scroll, action, half);
            }
        }
    }

    fn select(&mut self, target: usize, last: usize) {
        if target != self.cursor {
            self.detail_scroll = 0;
        }
        self.cursor = target;
        self.auto_follow = target == last;
    }

    fn pane_height(&self, focus: Focus) -> usize {
        let layout = split_dashboard(Rect::new(0, 0, self.width, self.height));
        let pane = match focus {
            Focus::Stream => layout.stream,
            Focus::Main => layout.main,
            Focus::Detail => layout.detail,
        };
        inner_height(pane)
    }

    fn elapsed(&self) -> Duration {
        self.finished_after
            .unwrap_or_else(|| self.started_at.elapsed())
    }

    fn status_line(&self) -> (String, StatusLevel) {
        if let Some(key) = self.confirm_quit {
            return (
                format!("press {} again to quit", key.label()),
                StatusLevel::Warning,
            );
        }
        if self.awaiting_decision {
            return (DECISION_PROMPT.to_string(), StatusLevel::Warning);
        }
        let help = if self.viewer { VIEWER_HELP } else { LIVE_HELP };
        if self.status.is_empty() {
            (help.to_string(), self.status_level)
        } else {
            (format!("{} │ {help}", self.status), self.status_level)
        }
    }

    pub fn view(&mut self, frame: &mut Frame<'_>) {
        let area = frame.area();
        self.width = area.width;
        self.height = area.height;
        let layout = split_dashboard(area);
        let spinner = spinner_frame(self.spinner);

        let header = HeaderView {
            title: self.title.clone(),
            spinner: self.running.then_some(spinner),
            iteration: self.iteration,
            model: self.converter.current_model(),
            elapsed: self.elapsed(),
            status: self.run_status,
        };
        render_header(frame, layout.header, &header);

        let visible = inner_height(layout.stream);
        self.stream_scroll = keep_visible(self.stream_scroll, self.cursor, visible);
        self.stream_scroll = clamp_scroll(self.stream_scroll, self.events.len(), visible);
        let lines = stream_lines(
            &self.events,
            self.cursor,
            self.stream_scroll,
            visible,
            inner_width(layout.stream),
        );
        render_pane(
            frame,
            layout.stream,
            format!(" Events ({}) ", self.events.len()),
            lines,
            0,
            self.focus == Focus::Stream,
        );

        let lines = block_lines(
            self.blocks.blocks(),
            self.blocks.active_tool_index().filter(|_| self.running),
            spinner,
            &mut self.main_renderer,
            inner_width(layout.main),
        );
        let max_scroll = lines.len().saturating_sub(inner_height(layout.main));
        if self.main_follow {
            self.main_scroll = max_scroll;
        } else {
            self.main_scroll = self.main_scroll.min(max_scroll);
            self.main_follow = self.main_scroll == max_scroll;
        }
        render_pane(
            frame,
            layout.main,
            " Output ".to_string(),
            lines,
            self.main_scroll,
            self.focus == Focus::Main,
        );

        let lines = detail_lines(
            self.events.get(self.cursor),
            self.raw_mode,
            &mut self.detail_renderer,
            inner_width(layout.detail),
        );
        self.detail_scroll =
            clamp_scroll(self.detail_scroll, lines.len(), inner_height(layout.detail));
        let mut title = if self.events.is_empty() {
            " Detail ".to_string()
        } else {
            format!(" Detail [{}/{}] ", self.cursor + 1, self.events.len())
        };
        if self.raw_mode {
            title.push_str("raw ");
        }
        render_pane(
            frame,
            layout.detail,
            title,
            lines,
            self.detail_scroll,
            self.focus == Focus::Detail,
        );

        let (text, level) = self.status_line();
        render_status_line(frame, layout.status, &text, level);
    }
}

fn scroll_offset(offset: usize, action: ScrollAction, half: usize) -> usize {
    match action {
        ScrollAction::LineUp => offset.saturating_sub(1),
        ScrollAction::LineDown => offset.saturating_add(1),
        ScrollAction::HalfPageUp => offset.saturating_sub(half),
        ScrollAction::HalfPageDown => offset.saturating_add(half),
        ScrollAction::Top => 0,
        ScrollAction::Bottom => usize::MAX,
    }
}

/// Moves the list window so the cursor row is inside it.
fn keep_visible(scroll: usize, cursor: usize, visible: usize) -> usize {
    if visible == 0 || cursor < scroll {
        return cursor;
    }
    if cursor >= scroll + visible {
        return cursor + 1 - visible;
    }
    scroll
}
