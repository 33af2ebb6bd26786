use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;

/// Playback commands the keyboard can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TogglePlay,
    Restart,
    Previous,
    Next,
    Quit,
}

/// Drains every pending terminal event, waiting at most `timeout` for the first one,
/// and resolves the key presses into commands.
pub fn poll_input(timeout: Duration) -> anyhow::Result<Vec<Command>> {
    let mut commands = Vec::new();
    let mut wait = timeout;

    while event::poll(wait)? {
        if let Event::Key(key) = event::read()? {
            commands.extend(handle_key(key));
        }
        wait = Duration::ZERO;
    }

    Ok(commands)
}

pub fn handle_key(key: KeyEvent) -> Option<Command> {
    // terminals that report releases would otherwise toggle twice
    if key.kind != KeyEventKind::Press {
        return None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Command::Quit),
        KeyCode::Char(' ') => Some(Command::TogglePlay),
        KeyCode::Char('r' | 'R') => Some(Command::Restart),
        KeyCode::Left => Some(Command::Previous),
        KeyCode::Right => Some(Command::Next),
        KeyCode::Char('q' | 'Q') => Some(Command::Quit),
        _ => None,
    }
}
