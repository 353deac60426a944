/// Modifier state reported with a key, using the console's bit layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ControlKeyState(pub u32);

impl ControlKeyState {
    pub const NONE: Self = Self(0);
    pub const RIGHT_ALT_PRESSED: Self = Self(0x0001);
    pub const LEFT_ALT_PRESSED: Self = Self(0x0002);
    pub const RIGHT_CTRL_PRESSED: Self = Self(0x0004);
    pub const LEFT_CTRL_PRESSED: Self = Self(0x0008);
    pub const SHIFT_PRESSED: Self = Self(0x0010);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn ctrl(self) -> bool {
        self.0 & (Self::LEFT_CTRL_PRESSED.0 | Self::RIGHT_CTRL_PRESSED.0) != 0
    }

    pub fn alt(self) -> bool {
        self.0 & (Self::LEFT_ALT_PRESSED.0 | Self::RIGHT_ALT_PRESSED.0) != 0
    }
}

impl std::ops::BitOr for ControlKeyState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

pub mod virtual_key {
    pub const BACK: i32 = 0x08;
    pub const TAB: i32 = 0x09;
    pub const RETURN: i32 = 0x0D;
    pub const ESCAPE: i32 = 0x1B;
    pub const SPACE: i32 = 0x20;
    pub const LEFT: i32 = 0x25;
    pub const UP: i32 = 0x26;
    pub const RIGHT: i32 = 0x27;
    pub const DOWN: i32 = 0x28;
    pub const DELETE: i32 = 0x2E;
}

/// A single keystroke as delivered by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyInfo {
    pub virtual_key_code: i32,
    pub character: char,
    pub control_key_state: ControlKeyState,
    pub key_down: bool,
}

impl KeyInfo {
    pub fn new(virtual_key_code: i32, character: char, control_key_state: ControlKeyState) -> Self {
        Self {
            virtual_key_code,
            character,
            control_key_state,
            key_down: true,
        }
    }

    /// A printable character key. Letters map to their upper-case virtual key.
    pub fn from_char(c: char) -> Self {
        let vk = if c.is_ascii_alphanumeric() {
            c.to_ascii_uppercase() as i32
        } else if c == ' ' {
            virtual_key::SPACE
        } else {
            0
        };
        let state = if c.is_ascii_uppercase() {
            ControlKeyState::SHIFT_PRESSED
        } else {
            ControlKeyState::NONE
        };
        Self::new(vk, c, state)
    }

    pub fn enter() -> Self {
        Self::new(virtual_key::RETURN, '\r', ControlKeyState::NONE)
    }

    pub fn backspace() -> Self {
        Self::new(virtual_key::BACK, '\u{8}', ControlKeyState::NONE)
    }

    pub fn escape() -> Self {
        Self::new(virtual_key::ESCAPE, '\u{1b}', ControlKeyState::NONE)
    }

    /// Ctrl+C as a console reports it when read as input.
    pub fn ctrl_c() -> Self {
        Self::new('C' as i32, '\u{3}', ControlKeyState::LEFT_CTRL_PRESSED)
    }

    pub fn is_enter(&self) -> bool {
        self.virtual_key_code == virtual_key::RETURN
    }

    pub fn is_backspace(&self) -> bool {
        self.virtual_key_code == virtual_key::BACK
    }

    pub fn is_escape(&self) -> bool {
        self.virtual_key_code == virtual_key::ESCAPE
    }

    /// True for keys that contribute a character to a line being typed.
    pub fn is_printable(&self) -> bool {
        !self.character.is_control() && !self.control_key_state.ctrl()
    }
}
