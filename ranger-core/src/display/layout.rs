//! Fixed screen layout.
//!
//! ```text
//!     012345678901234567890123456789
//! L0: - HC-SR04 Sensor -    bat.---%
//! L1:   (settings status line)
//! L3:             123.4              (rows 3-5, centred)
//! L7:   Distance             cm
//! ```

use core::fmt::Write;

use heapless::String;

use super::{Color, Display, Region, text_width};
use crate::settings::Language;

pub const GRID_COLUMNS: u8 = 30;
pub const GRID_ROWS: u8 = 8;

pub const TITLE: &str = "- HC-SR04 Sensor -";
pub const TITLE_ROW: u8 = 0;

pub const BATTERY_LABEL_COLUMN: u8 = 22;
pub const BATTERY_LABEL_WIDTH: u8 = 4;
pub const BATTERY_VALUE_COLUMN: u8 = 26;
pub const BATTERY_VALUE_WIDTH: u8 = 3;
pub const BATTERY_PERCENT_COLUMN: u8 = 29;
pub const BATTERY_PLACEHOLDER: &str = "---";

pub const STATUS_ROW: u8 = 1;
pub const STATUS_COLUMN: u8 = 2;

pub const DISTANCE_ROW: u8 = 3;
pub const DISTANCE_HEIGHT: u8 = 3;
pub const DISTANCE_PLACEHOLDER: &str = "---.-";

pub const MEASURE_ROW: u8 = 7;
pub const MEASURE_LABEL_COLUMN: u8 = 2;
pub const UNIT_COLUMN: u8 = 23;
pub const UNIT: &str = "cm";

pub const LOW_BATTERY_WARNING: &str = "Low Battery !!";

/// Longest status line the layout accepts.
pub const STATUS_CAPACITY: usize = 64;

/// Status line text.
pub type StatusLine = String<STATUS_CAPACITY>;

/// Localized label next to the battery percentage.
#[must_use]
pub const fn battery_label(language: Language) -> &'static str {
    match language {
        Language::English => "bat.",
        Language::Japanese => "電池",
    }
}

/// Localized label under the distance reading.
#[must_use]
pub const fn measure_label(language: Language) -> &'static str {
    match language {
        Language::English => "Distance",
        Language::Japanese => "距離",
    }
}

/// Column that centres `text` on the grid.
#[must_use]
pub fn centered_column(text: &str) -> u8 {
    GRID_COLUMNS.saturating_sub(text_width(text)) / 2
}

/// Clears the screen and draws every static element.
pub fn draw_initial_screen<D: Display + ?Sized>(display: &mut D, language: Language) {
    display.clear_region(Region::full());
    display.draw_text(0, TITLE_ROW, TITLE, Color::SkyBlue);

    draw_battery_label(display, language);
    display.draw_text(BATTERY_VALUE_COLUMN, TITLE_ROW, BATTERY_PLACEHOLDER, Color::White);
    display.draw_text(BATTERY_PERCENT_COLUMN, TITLE_ROW, "%", Color::White);

    display.draw_text(UNIT_COLUMN, MEASURE_ROW, UNIT, Color::Green);
    draw_measure_label(display, language);
}

pub fn draw_battery_label<D: Display + ?Sized>(display: &mut D, language: Language) {
    display.clear_region(Region::new(
        BATTERY_LABEL_COLUMN,
        TITLE_ROW,
        BATTERY_LABEL_WIDTH,
        1,
    ));
    display.draw_text(
        BATTERY_LABEL_COLUMN,
        TITLE_ROW,
        battery_label(language),
        Color::White,
    );
}

pub fn draw_measure_label<D: Display + ?Sized>(display: &mut D, language: Language) {
    let width = Language::ALL
        .iter()
        .map(|&lang| text_width(measure_label(lang)))
        .max()
        .unwrap_or(0);
    display.clear_region(Region::new(MEASURE_LABEL_COLUMN, MEASURE_ROW, width, 1));
    display.draw_text(
        MEASURE_LABEL_COLUMN,
        MEASURE_ROW,
        measure_label(language),
        Color::Orange,
    );
}

/// Replaces the distance area with `text`, centred.
pub fn draw_distance<D: Display + ?Sized>(display: &mut D, text: &str) {
    display.clear_region(Region::rows(DISTANCE_ROW, DISTANCE_HEIGHT));
    display.draw_text(centered_column(text), DISTANCE_ROW, text, Color::White);
}

/// Replaces the battery percentage with a right-aligned three digit value.
pub fn draw_battery_level<D: Display + ?Sized>(display: &mut D, level: u8) {
    let mut text: String<4> = String::new();
    // Three digits always fit.
    let _ = write!(text, "{level:>3}");

    display.clear_region(Region::new(
        BATTERY_VALUE_COLUMN,
        TITLE_ROW,
        BATTERY_VALUE_WIDTH,
        1,
    ));
    display.draw_text(BATTERY_VALUE_COLUMN, TITLE_ROW, &text, Color::White);
}

pub fn draw_status_line<D: Display + ?Sized>(display: &mut D, text: &str) {
    clear_status_line(display);
    display.draw_text(STATUS_COLUMN, STATUS_ROW, text, Color::White);
}

pub fn clear_status_line<D: Display + ?Sized>(display: &mut D) {
    display.clear_region(Region::rows(STATUS_ROW, 1));
}

/// Full-screen warning shown right before power-off.
pub fn draw_low_battery_warning<D: Display + ?Sized>(display: &mut D) {
    display.clear_region(Region::full());
    display.draw_text(
        centered_column(LOW_BATTERY_WARNING),
        DISTANCE_ROW,
        LOW_BATTERY_WARNING,
        Color::Red,
    );
}
