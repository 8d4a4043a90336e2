//! Character-grid display capability and the screen layout drawn on it.
//!
//! The core never talks to a panel directly. Every component draws through
//! the [`Display`] trait and requests a [`Display::flush`] only when something
//! visible changed; the firmware and emulator decide how a frame reaches the
//! user.

pub mod grid;
pub mod layout;

pub use grid::{Cell, GridBuffer};
pub use layout::{GRID_COLUMNS, GRID_ROWS};

/// Foreground colours used by the screen layout.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum Color {
    #[default]
    Black,
    White,
    SkyBlue,
    Green,
    Orange,
    Red,
}

/// Rectangle of grid cells.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Region {
    pub column: u8,
    pub row: u8,
    pub width: u8,
    pub height: u8,
}

impl Region {
    #[must_use]
    pub const fn new(column: u8, row: u8, width: u8, height: u8) -> Self {
        Self {
            column,
            row,
            width,
            height,
        }
    }

    /// Whole rows starting at `row`.
    #[must_use]
    pub const fn rows(row: u8, height: u8) -> Self {
        Self::new(0, row, GRID_COLUMNS, height)
    }

    /// The entire screen.
    #[must_use]
    pub const fn full() -> Self {
        Self::rows(0, GRID_ROWS)
    }
}

/// Drawing surface provided by the host platform.
pub trait Display {
    /// Draws `text` starting at the given cell. Text past the right edge is clipped.
    fn draw_text(&mut self, column: u8, row: u8, text: &str, color: Color);

    /// Blanks every cell in `region`.
    fn clear_region(&mut self, region: Region);

    /// Sets the backlight level.
    fn set_brightness(&mut self, level: u8);

    /// Pushes pending changes to the user.
    fn flush(&mut self);
}

/// Number of grid cells a glyph occupies (CJK and other wide glyphs take two).
#[must_use]
pub fn glyph_width(ch: char) -> u8 {
    if ch.is_ascii() { 1 } else { 2 }
}

/// Number of grid cells `text` occupies.
#[must_use]
pub fn text_width(text: &str) -> u8 {
    text.chars()
        .map(glyph_width)
        .fold(0u8, u8::saturating_add)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_glyphs_take_two_cells() {
        assert_eq!(text_width("bat."), 4);
        assert_eq!(text_width("電池"), 4);
        assert_eq!(text_width("日本語"), 6);
    }
}
