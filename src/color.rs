//! ANSI escape helpers.
//!
//! Every style has three forms: [`wrap`] surrounds text with the style
//! prefix and the reset suffix, [`start`] only prepends the prefix and
//! [`stop`] only appends the reset. Styles are addressed either by name
//! (`"red"`, `"on_blue"`, `"bright"`) or through the typed [`Style`] enum.

use std::{fmt, str::FromStr};

use crate::diagnostics::{BouquetError, Result};

/// Escape that restores the terminal defaults.
pub const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    Default,
}

impl Color {
    pub const ALL: [Color; 9] = [
        Color::Black,
        Color::Red,
        Color::Green,
        Color::Yellow,
        Color::Blue,
        Color::Magenta,
        Color::Cyan,
        Color::White,
        Color::Default,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Color::Black => "black",
            Color::Red => "red",
            Color::Green => "green",
            Color::Yellow => "yellow",
            Color::Blue => "blue",
            Color::Magenta => "magenta",
            Color::Cyan => "cyan",
            Color::White => "white",
            Color::Default => "default",
        }
    }

    fn offset(self) -> u8 {
        match self {
            Color::Black => 0,
            Color::Red => 1,
            Color::Green => 2,
            Color::Yellow => 3,
            Color::Blue => 4,
            Color::Magenta => 5,
            Color::Cyan => 6,
            Color::White => 7,
            Color::Default => 9,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|color| color.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Bright,
    Dim,
    Underline,
    Reverse,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Bright,
        Attribute::Dim,
        Attribute::Underline,
        Attribute::Reverse,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Attribute::Bright => "bright",
            Attribute::Dim => "dim",
            Attribute::Underline => "underline",
            Attribute::Reverse => "reverse",
        }
    }

    fn code(self) -> u8 {
        match self {
            Attribute::Bright => 1,
            Attribute::Dim => 2,
            Attribute::Underline => 4,
            Attribute::Reverse => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    Foreground(Color),
    Background(Color),
    Attribute(Attribute),
}

impl Style {
    pub fn code(self) -> u8 {
        match self {
            Style::Foreground(color) => 30 + color.offset(),
            Style::Background(color) => 40 + color.offset(),
            Style::Attribute(attribute) => attribute.code(),
        }
    }

    pub fn prefix(self) -> String {
        format!("\x1b[{}m", self.code())
    }

    pub fn wrap(self, text: &str) -> String {
        format!("{}{text}{RESET}", self.prefix())
    }

    pub fn start(self, text: &str) -> String {
        format!("{}{text}", self.prefix())
    }

    pub fn stop(self, text: &str) -> String {
        format!("{text}{RESET}")
    }

    /// All 22 named styles, foregrounds first.
    pub fn all() -> impl Iterator<Item = Style> {
        Color::ALL
            .into_iter()
            .map(Style::Foreground)
            .chain(Color::ALL.into_iter().map(Style::Background))
            .chain(Attribute::ALL.into_iter().map(Style::Attribute))
    }
}

impl FromStr for Style {
    type Err = BouquetError;

    fn from_str(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        if let Some(color) = lowered.strip_prefix("on_").and_then(Color::from_name) {
            return Ok(Style::Background(color));
        }
        if let Some(color) = Color::from_name(&lowered) {
            return Ok(Style::Foreground(color));
        }
        Attribute::ALL
            .into_iter()
            .find(|attribute| attribute.name() == lowered)
            .map(Style::Attribute)
            .ok_or_else(|| BouquetError::UnknownColorOrAttribute(name.to_string()))
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Style::Foreground(color) => write!(f, "{}", color.name()),
            Style::Background(color) => write!(f, "on_{}", color.name()),
            Style::Attribute(attribute) => write!(f, "{}", attribute.name()),
        }
    }
}

pub fn wrap(style: &str, text: &str) -> Result<String> {
    Ok(style.parse::<Style>()?.wrap(text))
}

pub fn start(style: &str, text: &str) -> Result<String> {
    Ok(style.parse::<Style>()?.start(text))
}

pub fn stop(style: &str, text: &str) -> Result<String> {
    Ok(style.parse::<Style>()?.stop(text))
}

/// Applies `style` only when `enabled`, for callers that toggle color output.
pub fn paint(style: Style, text: &str, enabled: bool) -> String {
    if enabled {
        style.wrap(text)
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_sgr_layout() {
        assert_eq!(Style::Foreground(Color::Red).code(), 31);
        assert_eq!(Style::Background(Color::Default).code(), 49);
        assert_eq!(Style::Attribute(Attribute::Underline).code(), 4);
        assert_eq!(Style::all().count(), 22);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for style in Style::all() {
            assert_eq!(style.to_string().parse::<Style>().ok(), Some(style));
        }
    }
}
