// Key bindings for both screens
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::commands::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserAction {
    Up,
    Down,
    PageUp,
    PageDown,
    Enter,
    Parent,
    Quit,
}

/// Progress screen: function keys first, then the vi/arrow extras
pub fn progress_command(key: &KeyEvent) -> Option<Command> {
    if key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) {
        return None;
    }
    let command = match key.code {
        KeyCode::F(2) => Command::TempoUp,
        KeyCode::F(3) => Command::SeekBackCoarse,
        KeyCode::F(4) => Command::Pause,
        KeyCode::F(5) => Command::TempoReset,
        KeyCode::F(6) => Command::SeekForwardCoarse,
        KeyCode::F(7) => Command::SeekBackFine,
        KeyCode::F(8) => Command::Resume,
        KeyCode::F(9) => Command::QuickBack,
        KeyCode::F(11) => Command::TempoDown,
        KeyCode::Char('k') | KeyCode::Up => Command::VolumeUp,
        KeyCode::Char('j') | KeyCode::Down => Command::VolumeDown,
        KeyCode::Char(' ') | KeyCode::Char('p') => Command::TogglePlayPause,
        KeyCode::Char('l') | KeyCode::Right => Command::NudgeForward,
        KeyCode::Char('h') | KeyCode::Left => Command::NudgeBack,
        KeyCode::Char('q') | KeyCode::Char('s') => Command::Stop,
        _ => return None,
    };
    Some(command)
}

pub fn browser_action(key: &KeyEvent) -> Option<BrowserAction> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(BrowserAction::Quit);
    }
    let action = match key.code {
        KeyCode::Char('k') | KeyCode::Up => BrowserAction::Up,
        KeyCode::Char('j') | KeyCode::Down => BrowserAction::Down,
        KeyCode::PageUp => BrowserAction::PageUp,
        KeyCode::PageDown => BrowserAction::PageDown,
        KeyCode::Enter => BrowserAction::Enter,
        KeyCode::Char('h') | KeyCode::Backspace => BrowserAction::Parent,
        KeyCode::Char('q') => BrowserAction::Quit,
        _ => return None,
    };
    Some(action)
}

/// One-line key help for the progress screen
pub const PROGRESS_HELP: &str =
    "F2/F11 tempo  F3/F6 -10/+10s  F7 -2s  F4 pause  F8 resume  F9 back 4s  F5 reset  j/k vol  h/l -3/+3s  q stop";

pub const BROWSER_HELP: &str = "j/k move  PgUp/PgDn page  Enter open  h parent  q quit";
