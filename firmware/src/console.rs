//! Serial console front panel.
//!
//! The ranger's screen is a 30x8 character grid mirrored to an ANSI terminal
//! on the console UART. Every flush repaints the whole grid, so a dropped
//! frame is healed by the next one. Key presses arrive on the same UART as
//! bytes and are decoded into [`Key`]s, including the terminal's arrow keys.

use core::fmt::Write as _;

use heapless::{String, Vec};
use ranger_core::display::{Cell, Color, Display, GRID_COLUMNS, GRID_ROWS, GridBuffer, Region};
use ranger_core::input::Key;

/// Upper bound for one rendered frame: every cell with its own colour change.
pub const FRAME_CAPACITY: usize = 4_096;

pub type ConsoleFrame = Vec<u8, FRAME_CAPACITY>;

/// Receives rendered frames on every flush.
pub trait FrameSink {
    fn send_frame(&mut self, frame: ConsoleFrame);
}

/// Backlight level control, `0..=255`.
pub trait Backlight {
    fn set_level(&mut self, level: u8);
}

const fn sgr_foreground(color: Color) -> &'static str {
    match color {
        Color::Black => "30",
        Color::White => "97",
        Color::SkyBlue => "96",
        Color::Green => "92",
        Color::Orange => "38;5;208",
        Color::Red => "91",
    }
}

/// Renders `grid` as a full-screen ANSI repaint.
///
/// Returns `None` if the frame does not fit in [`FRAME_CAPACITY`].
#[must_use]
pub fn render_frame(grid: &GridBuffer) -> Option<ConsoleFrame> {
    let mut out: String<FRAME_CAPACITY> = String::new();
    write_frame(grid, &mut out).ok()?;
    Some(out.into_bytes())
}

fn write_frame<W: core::fmt::Write>(grid: &GridBuffer, out: &mut W) -> core::fmt::Result {
    out.write_str("\x1b[?25l\x1b[40m")?;
    for row in 0..GRID_ROWS {
        write!(out, "\x1b[{};1H", row + 1)?;
        let mut current: Option<Color> = None;
        for cell in grid.row_cells(row) {
            if cell.glyph == Cell::CONTINUATION {
                continue;
            }
            if current != Some(cell.color) {
                write!(out, "\x1b[{}m", sgr_foreground(cell.color))?;
                current = Some(cell.color);
            }
            out.write_char(cell.glyph)?;
        }
    }
    write!(out, "\x1b[0m\x1b[{};1H", GRID_ROWS + 1)
}

/// Grid-backed [`Display`] that pushes a repaint to `sink` on every flush.
pub struct ConsoleDisplay<S, L> {
    grid: GridBuffer,
    sink: S,
    backlight: L,
    dropped_frames: u32,
}

impl<S, L> ConsoleDisplay<S, L>
where
    S: FrameSink,
    L: Backlight,
{
    pub const fn new(sink: S, backlight: L) -> Self {
        Self {
            grid: GridBuffer::new(),
            sink,
            backlight,
            dropped_frames: 0,
        }
    }

    pub fn grid(&self) -> &GridBuffer {
        &self.grid
    }

    /// Frames that overflowed [`FRAME_CAPACITY`] and were not sent.
    pub fn dropped_frames(&self) -> u32 {
        self.dropped_frames
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn backlight(&self) -> &L {
        &self.backlight
    }
}

impl<S, L> Display for ConsoleDisplay<S, L>
where
    S: FrameSink,
    L: Backlight,
{
    fn draw_text(&mut self, column: u8, row: u8, text: &str, color: Color) {
        self.grid.draw_text(column, row, text, color);
    }

    fn clear_region(&mut self, region: Region) {
        self.grid.clear_region(region);
    }

    fn set_brightness(&mut self, level: u8) {
        self.grid.set_brightness(level);
        self.backlight.set_level(level);
    }

    fn flush(&mut self) {
        self.grid.flush();
        match render_frame(&self.grid) {
            Some(frame) => self.sink.send_frame(frame),
            None => self.dropped_frames = self.dropped_frames.wrapping_add(1),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
enum DecodeState {
    #[default]
    Ground,
    Escape,
    Csi,
}

/// Turns console bytes into key presses.
///
/// Printable keys follow the device keyboard layout. Arrow keys sent as
/// `ESC [ A..D` map onto the directional keys.
#[derive(Clone, Debug, Default)]
pub struct KeyDecoder {
    state: DecodeState,
}

impl KeyDecoder {
    pub const fn new() -> Self {
        Self {
            state: DecodeState::Ground,
        }
    }

    pub fn push(&mut self, byte: u8) -> Option<Key> {
        match (self.state, byte) {
            (DecodeState::Ground, 0x1b) => {
                self.state = DecodeState::Escape;
                None
            }
            (DecodeState::Ground, _) => Key::from_char(char::from(byte)),
            (DecodeState::Escape, b'[') => {
                self.state = DecodeState::Csi;
                None
            }
            (DecodeState::Escape, _) => {
                self.state = DecodeState::Ground;
                None
            }
            (DecodeState::Csi, b'0'..=b'9' | b';') => None,
            (DecodeState::Csi, final_byte) => {
                self.state = DecodeState::Ground;
                match final_byte {
                    b'A' => Some(Key::UP),
                    b'B' => Some(Key::DOWN),
                    b'C' => Some(Key::RIGHT),
                    b'D' => Some(Key::LEFT),
                    _ => None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Frames {
        sent: usize,
        last: Option<ConsoleFrame>,
    }

    impl FrameSink for Frames {
        fn send_frame(&mut self, frame: ConsoleFrame) {
            self.sent += 1;
            self.last = Some(frame);
        }
    }

    #[derive(Default)]
    struct Level(u8);

    impl Backlight for Level {
        fn set_level(&mut self, level: u8) {
            self.0 = level;
        }
    }

    fn frame_text(frame: &ConsoleFrame) -> &str {
        core::str::from_utf8(frame).expect("frames are UTF-8")
    }

    #[test]
    fn flush_sends_a_full_repaint() {
        let mut display = ConsoleDisplay::new(Frames::default(), Level::default());
        display.draw_text(2, 3, "17.2", Color::White);
        display.draw_text(23, 7, "cm", Color::Green);

        display.flush();

        assert_eq!(display.sink().sent, 1);
        let frame = display.sink().last.as_ref().expect("frame sent");
        let text = frame_text(frame);
        assert!(text.contains("\x1b[4;1H"));
        assert!(text.contains("\x1b[97m17.2"));
        assert!(text.contains("\x1b[92mcm"));
        assert_eq!(display.dropped_frames(), 0);
    }

    #[test]
    fn wide_glyphs_are_written_once() {
        let mut grid = GridBuffer::new();
        grid.draw_text(0, 0, "距離", Color::Orange);

        let frame = render_frame(&grid).expect("fits");
        let text = frame_text(&frame);
        assert!(text.contains("\x1b[38;5;208m距離"));
        assert!(!text.contains('\0'));
    }

    #[test]
    fn densest_grid_fits_the_frame_capacity() {
        let mut grid = GridBuffer::new();
        let colors = [Color::Orange, Color::SkyBlue];
        for row in 0..GRID_ROWS {
            for column in 0..GRID_COLUMNS {
                let color = colors[usize::from(column % 2)];
                grid.draw_text(column, row, "#", color);
            }
        }
        assert!(render_frame(&grid).is_some());
    }

    #[test]
    fn brightness_reaches_the_backlight() {
        let mut display = ConsoleDisplay::new(Frames::default(), Level::default());
        display.set_brightness(140);
        assert_eq!(display.backlight().0, 140);
        assert_eq!(display.grid().brightness(), 140);
        assert_eq!(display.sink().sent, 0);
    }

    #[test]
    fn decoder_maps_layout_and_arrow_keys() {
        let mut decoder = KeyDecoder::new();
        let mut keys: Vec<Key, 8> = Vec::new();
        for &byte in b"1;\x1b[A\x1b[1;5C`x\x1b[D" {
            if let Some(key) = decoder.push(byte) {
                keys.push(key).expect("room");
            }
        }
        assert_eq!(
            keys.as_slice(),
            &[
                Key::SelectBrightness,
                Key::UP,
                Key::UP,
                Key::RIGHT,
                Key::Escape,
                Key::LEFT
            ]
        );
    }
}
