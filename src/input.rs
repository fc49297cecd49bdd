//! Keyboard input handling.
//!
//! Maps terminal key events to [`App`] mutations, or to an [`Action`] that
//! needs the async side of the program (a refresh, opening a link).

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::app::App;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Refresh,
    Open(String),
}

/// Process a single key event.
///
/// Only key presses count; releases and repeats are ignored.
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> Option<Action> {
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit = true,
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
        KeyCode::Home | KeyCode::Char('g') => app.select_first(),
        KeyCode::End | KeyCode::Char('G') => app.select_last(),
        KeyCode::Char('r') => return Some(Action::Refresh),
        KeyCode::Enter | KeyCode::Char('o') => {
            return app.selected().map(|f| Action::Open(f.link.clone()));
        }
        _ => {}
    }
    None
}
