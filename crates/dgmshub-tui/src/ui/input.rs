//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes.

use crossterm::event::{KeyCode, KeyEvent};

use crate::app::{App, AppState};

/// Handle keyboard input. Returns true if the app should quit.
pub fn handle_input(app: &mut App, key: KeyEvent) -> bool {
    match app.state {
        AppState::ShowingHelp => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                app.state = AppState::Normal;
            }
            false
        }
        AppState::ShowingDiagnostics => {
            match key.code {
                KeyCode::Esc | KeyCode::Char('i') | KeyCode::Char('q') => {
                    app.diagnostics = None;
                    app.state = AppState::Normal;
                }
                KeyCode::Char('+') | KeyCode::Char('=') => app.step_sync_interval(true),
                KeyCode::Char('-') => app.step_sync_interval(false),
                _ => {}
            }
            false
        }
        AppState::ConfirmingClearCache => {
            match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => app.clear_cache(),
                KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                    app.state = AppState::Normal;
                }
                _ => {}
            }
            false
        }
        AppState::Browsing => {
            if matches!(key.code, KeyCode::Esc | KeyCode::Backspace | KeyCode::Char('q')) {
                app.close_browser();
            }
            false
        }
        AppState::Searching => {
            handle_search_input(app, key);
            false
        }
        AppState::Normal => handle_normal_input(app, key),
        AppState::Quitting => true,
    }
}

fn handle_search_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.clear_search();
            app.state = AppState::Normal;
        }
        KeyCode::Enter => app.state = AppState::Normal,
        KeyCode::Backspace => app.pop_search_char(),
        KeyCode::Char(c) => app.push_search_char(c),
        _ => {}
    }
}

fn handle_normal_input(app: &mut App, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') => {
            app.state = AppState::Quitting;
            return true;
        }
        KeyCode::Char('?') => app.state = AppState::ShowingHelp,
        KeyCode::Char('/') => app.state = AppState::Searching,
        KeyCode::Esc => {
            if !app.view.search().is_empty() {
                app.clear_search();
            }
        }
        KeyCode::Char('c') => app.cycle_category(true),
        KeyCode::Char('C') => app.cycle_category(false),
        KeyCode::Char('r') => app.refresh(true),
        KeyCode::Char('i') => app.show_diagnostics(),
        KeyCode::Char('x') => app.state = AppState::ConfirmingClearCache,
        KeyCode::Enter => app.open_selected(),
        KeyCode::Left | KeyCode::Char('h') => app.move_selection(-1),
        KeyCode::Right | KeyCode::Char('l') => app.move_selection(1),
        KeyCode::Up | KeyCode::Char('k') => app.move_row(false),
        KeyCode::Down | KeyCode::Char('j') => app.move_row(true),
        KeyCode::Home => app.selection = 0,
        KeyCode::End => app.move_selection(isize::MAX / 2),
        _ => {}
    }
    false
}
