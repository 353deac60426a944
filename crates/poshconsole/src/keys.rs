use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use poshconsole_types::{ControlKeyState, KeyInfo, virtual_key};

/// What a key press means to the console front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// An ordinary key, for the line editor or a pending read.
    Key(KeyInfo),
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D
    EndOfInput,
    /// Ctrl+L
    ClearScreen,
    HistoryPrevious,
    HistoryNext,
    Ignore,
}

fn control_state(modifiers: KeyModifiers) -> ControlKeyState {
    let mut state = ControlKeyState::NONE;
    if modifiers.contains(KeyModifiers::CONTROL) {
        state = state | ControlKeyState::LEFT_CTRL_PRESSED;
    }
    if modifiers.contains(KeyModifiers::ALT) {
        state = state | ControlKeyState::LEFT_ALT_PRESSED;
    }
    if modifiers.contains(KeyModifiers::SHIFT) {
        state = state | ControlKeyState::SHIFT_PRESSED;
    }
    state
}

/// The console key record for a terminal key event, if it has one.
pub fn to_key_info(key: KeyEvent) -> Option<KeyInfo> {
    let state = control_state(key.modifiers);
    let info = match key.code {
        KeyCode::Char(c) if state.ctrl() || state.alt() => {
            KeyInfo::new(c.to_ascii_uppercase() as i32, c, state)
        }
        KeyCode::Char(c) => KeyInfo::from_char(c),
        KeyCode::Enter => KeyInfo::enter(),
        KeyCode::Backspace => KeyInfo::backspace(),
        KeyCode::Esc => KeyInfo::escape(),
        KeyCode::Tab => KeyInfo::new(virtual_key::TAB, '\t', state),
        KeyCode::Left => KeyInfo::new(virtual_key::LEFT, '\0', state),
        KeyCode::Right => KeyInfo::new(virtual_key::RIGHT, '\0', state),
        KeyCode::Up => KeyInfo::new(virtual_key::UP, '\0', state),
        KeyCode::Down => KeyInfo::new(virtual_key::DOWN, '\0', state),
        KeyCode::Delete => KeyInfo::new(virtual_key::DELETE, '\0', state),
        _ => return None,
    };
    Some(info)
}

pub fn key_to_action(key: KeyEvent) -> KeyAction {
    // Windows reports releases too
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('c') => return KeyAction::Interrupt,
            KeyCode::Char('d') => return KeyAction::EndOfInput,
            KeyCode::Char('l') => return KeyAction::ClearScreen,
            _ => {}
        }
    }
    match key.code {
        KeyCode::Up => KeyAction::HistoryPrevious,
        KeyCode::Down => KeyAction::HistoryNext,
        _ => to_key_info(key).map_or(KeyAction::Ignore, KeyAction::Key),
    }
}
