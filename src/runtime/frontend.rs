use crate::app::DashboardModel;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{backend::Backend, Terminal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAction {
    LineUp,
    LineDown,
    HalfPageUp,
    HalfPageDown,
    Top,
    Bottom,
}

/// Key that armed the quit confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuitKey {
    Q,
    CtrlC,
}

impl QuitKey {
    pub fn label(self) -> &'static str {
        match self {
            QuitKey::Q => "q",
            QuitKey::CtrlC => "ctrl+c",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UserInputEvent {
    FocusNext,
    FocusPrev,
    Scroll(ScrollAction),
    ToggleRaw,
    Interrupt,
    Quit(QuitKey),
    Decision(bool),
    Ignored,
}

pub fn map_key(key: KeyEvent) -> UserInputEvent {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Char('c') if ctrl => UserInputEvent::Quit(QuitKey::CtrlC),
        KeyCode::Char('d') if ctrl => UserInputEvent::Scroll(ScrollAction::HalfPageDown),
        KeyCode::Char('u') if ctrl => UserInputEvent::Scroll(ScrollAction::HalfPageUp),
        _ if ctrl => UserInputEvent::Ignored,
        KeyCode::Tab => UserInputEvent::FocusNext,
        KeyCode::BackTab => UserInputEvent::FocusPrev,
        KeyCode::Char('j') | KeyCode::Down => UserInputEvent::Scroll(ScrollAction::LineDown),
        KeyCode::Char('k') | KeyCode::Up => UserInputEvent::Scroll(ScrollAction::LineUp),
        KeyCode::Char('g') | KeyCode::Home => UserInputEvent::Scroll(ScrollAction::Top),
        KeyCode::Char('G') | KeyCode::End => UserInputEvent::Scroll(ScrollAction::Bottom),
        KeyCode::PageDown => UserInputEvent::Scroll(ScrollAction::HalfPageDown),
        KeyCode::PageUp => UserInputEvent::Scroll(ScrollAction::HalfPageUp),
        KeyCode::Char('r') => UserInputEvent::ToggleRaw,
        KeyCode::Char('i') => UserInputEvent::Interrupt,
        KeyCode::Char('q') => UserInputEvent::Quit(QuitKey::Q),
        KeyCode::Char('y') | KeyCode::Char('Y') => UserInputEvent::Decision(true),
        KeyCode::Char('n') | KeyCode::Char('N') => UserInputEvent::Decision(false),
        _ => UserInputEvent::Ignored,
    }
}

/// Surface the dashboard is drawn on.
pub trait FrontendAdapter {
    fn size(&self) -> Result<(u16, u16)>;
    fn draw(&mut self, model: &mut DashboardModel) -> Result<()>;
}

impl<B: Backend> FrontendAdapter for Terminal<B> {
    fn size(&self) -> Result<(u16, u16)> {
        let size = Terminal::size(self)?;
        Ok((size.width, size.height))
    }

    fn draw(&mut self, model: &mut DashboardModel) -> Result<()> {
        Terminal::draw(self, |frame| model.view(frame))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_navigation_keys() {
        assert_eq!(map_key(key(KeyCode::Tab)), UserInputEvent::FocusNext);
        assert_eq!(
            map_key(key(KeyCode::Char('j'))),
            UserInputEvent::Scroll(ScrollAction::LineDown)
        );
        assert_eq!(
            map_key(key(KeyCode::Up)),
            UserInputEvent::Scroll(ScrollAction::LineUp)
        );
        assert_eq!(
            map_key(key(KeyCode::Char('G'))),
            UserInputEvent::Scroll(ScrollAction::Bottom)
        );
        assert_eq!(
            map_key(ctrl('d')),
            UserInputEvent::Scroll(ScrollAction::HalfPageDown)
        );
        assert_eq!(
            map_key(key(KeyCode::PageUp)),
            UserInputEvent::Scroll(ScrollAction::HalfPageUp)
        );
    }

    #[test]
    fn test_quit_and_decision_keys() {
        assert_eq!(map_key(ctrl('c')), UserInputEvent::Quit(QuitKey::CtrlC));
        assert_eq!(
            map_key(key(KeyCode::Char('q'))),
            UserInputEvent::Quit(QuitKey::Q)
        );
        assert_eq!(
            map_key(key(KeyCode::Char('Y'))),
            UserInputEvent::Decision(true)
        );
        assert_eq!(
            map_key(key(KeyCode::Char('n'))),
            UserInputEvent::Decision(false)
        );
    }

    #[test]
    fn test_unbound_control_chords_are_ignored() {
        assert_eq!(map_key(ctrl('r')), UserInputEvent::Ignored);
        assert_eq!(map_key(key(KeyCode::Char('x'))), UserInputEvent::Ignored);
    }
}
