use std::str::FromStr;

use crate::TypesError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleColor {
    Black = 0,
    DarkBlue = 1,
    DarkGreen = 2,
    DarkCyan = 3,
    DarkRed = 4,
    DarkMagenta = 5,
    DarkYellow = 6,
    Gray = 7,
    DarkGray = 8,
    Blue = 9,
    Green = 10,
    Cyan = 11,
    Red = 12,
    Magenta = 13,
    Yellow = 14,
    White = 15,
}

impl ConsoleColor {
    pub const ALL: [Self; 16] = [
        Self::Black,
        Self::DarkBlue,
        Self::DarkGreen,
        Self::DarkCyan,
        Self::DarkRed,
        Self::DarkMagenta,
        Self::DarkYellow,
        Self::Gray,
        Self::DarkGray,
        Self::Blue,
        Self::Green,
        Self::Cyan,
        Self::Red,
        Self::Magenta,
        Self::Yellow,
        Self::White,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Black => "Black",
            Self::DarkBlue => "DarkBlue",
            Self::DarkGreen => "DarkGreen",
            Self::DarkCyan => "DarkCyan",
            Self::DarkRed => "DarkRed",
            Self::DarkMagenta => "DarkMagenta",
            Self::DarkYellow => "DarkYellow",
            Self::Gray => "Gray",
            Self::DarkGray => "DarkGray",
            Self::Blue => "Blue",
            Self::Green => "Green",
            Self::Cyan => "Cyan",
            Self::Red => "Red",
            Self::Magenta => "Magenta",
            Self::Yellow => "Yellow",
            Self::White => "White",
        }
    }
}

impl FromStr for ConsoleColor {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(n) = s.trim().parse::<usize>() {
            return Self::ALL
                .get(n)
                .copied()
                .ok_or_else(|| TypesError::UnknownColor(s.to_string()));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| TypesError::UnknownColor(s.to_string()))
    }
}

/// Colour hint attached to a write. `None` means the host's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Style {
    pub foreground: Option<ConsoleColor>,
    pub background: Option<ConsoleColor>,
}

impl Style {
    pub const DEFAULT: Self = Self {
        foreground: None,
        background: None,
    };

    pub fn fg(color: ConsoleColor) -> Self {
        Self {
            foreground: Some(color),
            background: None,
        }
    }

    pub fn with_background(mut self, color: ConsoleColor) -> Self {
        self.background = Some(color);
        self
    }
}
