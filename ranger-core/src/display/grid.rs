//! In-memory character grid.
//!
//! [`GridBuffer`] implements [`Display`] by writing into a fixed array of
//! cells. The emulator renders it to a terminal, the firmware console
//! serialises it as ANSI frames, and the tests inspect it directly.

use super::{Color, Display, GRID_COLUMNS, GRID_ROWS, Region, glyph_width};

/// One grid cell. A `'\0'` glyph marks the right half of a wide glyph.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Cell {
    pub glyph: char,
    pub color: Color,
}

impl Cell {
    pub const BLANK: Self = Self {
        glyph: ' ',
        color: Color::Black,
    };

    pub const CONTINUATION: char = '\0';
}

const COLUMNS: usize = GRID_COLUMNS as usize;
const ROWS: usize = GRID_ROWS as usize;

/// Shadow copy of the screen.
#[derive(Clone, Debug)]
pub struct GridBuffer {
    cells: [[Cell; COLUMNS]; ROWS],
    brightness: u8,
    draws: u32,
    flushes: u32,
}

impl GridBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cells: [[Cell::BLANK; COLUMNS]; ROWS],
            brightness: 0,
            draws: 0,
            flushes: 0,
        }
    }

    /// Returns the cell at the given position, if it is on screen.
    #[must_use]
    pub fn cell(&self, column: u8, row: u8) -> Option<Cell> {
        self.cells
            .get(usize::from(row))
            .and_then(|cells| cells.get(usize::from(column)))
            .copied()
    }

    /// Cells of one row, left to right.
    #[must_use]
    pub fn row_cells(&self, row: u8) -> &[Cell] {
        match self.cells.get(usize::from(row)) {
            Some(cells) => cells,
            None => &[],
        }
    }

    /// Writes the visible glyphs of `row` into `out`, skipping wide-glyph halves.
    #[must_use = "a row wider than `out` is reported as an error"]
    pub fn write_row<W: core::fmt::Write>(&self, row: u8, out: &mut W) -> core::fmt::Result {
        for cell in self.row_cells(row) {
            if cell.glyph != Cell::CONTINUATION {
                out.write_char(cell.glyph)?;
            }
        }
        Ok(())
    }

    /// Returns `true` when `text` appears anywhere in `row`.
    #[must_use]
    pub fn row_contains(&self, row: u8, text: &str) -> bool {
        let mut line: heapless::String<{ COLUMNS * 4 }> = heapless::String::new();
        if self.write_row(row, &mut line).is_err() {
            return false;
        }
        line.contains(text)
    }

    /// Returns `true` when every cell of `row` is blank.
    #[must_use]
    pub fn row_is_blank(&self, row: u8) -> bool {
        self.row_cells(row).iter().all(|cell| cell.glyph == ' ')
    }

    #[must_use]
    pub const fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Number of `draw_text`/`clear_region` calls so far.
    #[must_use]
    pub const fn draw_count(&self) -> u32 {
        self.draws
    }

    /// Number of `flush` calls so far.
    #[must_use]
    pub const fn flush_count(&self) -> u32 {
        self.flushes
    }
}

impl Default for GridBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GridBuffer {
    fn draw_text(&mut self, column: u8, row: u8, text: &str, color: Color) {
        self.draws = self.draws.wrapping_add(1);
        let Some(cells) = self.cells.get_mut(usize::from(row)) else {
            return;
        };

        let mut column = usize::from(column);
        for glyph in text.chars() {
            let width = usize::from(glyph_width(glyph));
            if column + width > COLUMNS {
                break;
            }
            cells[column] = Cell { glyph, color };
            if width == 2 {
                cells[column + 1] = Cell {
                    glyph: Cell::CONTINUATION,
                    color,
                };
            }
            column += width;
        }
    }

    fn clear_region(&mut self, region: Region) {
        self.draws = self.draws.wrapping_add(1);
        let first_row = usize::from(region.row);
        let last_row = (first_row + usize::from(region.height)).min(ROWS);
        let first_column = usize::from(region.column).min(COLUMNS);
        let last_column = (first_column + usize::from(region.width)).min(COLUMNS);

        for cells in self.cells.iter_mut().take(last_row).skip(first_row) {
            for cell in &mut cells[first_column..last_column] {
                *cell = Cell::BLANK;
            }
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level;
    }

    fn flush(&mut self) {
        self.flushes = self.flushes.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_clipped_at_the_right_edge() {
        let mut grid = GridBuffer::new();
        grid.draw_text(27, 0, "abcdef", Color::White);

        assert_eq!(grid.cell(27, 0).map(|c| c.glyph), Some('a'));
        assert_eq!(grid.cell(29, 0).map(|c| c.glyph), Some('c'));
        assert_eq!(grid.cell(30, 0), None);
    }

    #[test]
    fn wide_glyph_does_not_straddle_the_edge() {
        let mut grid = GridBuffer::new();
        grid.draw_text(29, 2, "距", Color::Orange);
        assert_eq!(grid.cell(29, 2), Some(Cell::BLANK));

        grid.draw_text(2, 2, "距離", Color::Orange);
        assert!(grid.row_contains(2, "距離"));
        assert_eq!(grid.cell(3, 2).map(|c| c.glyph), Some(Cell::CONTINUATION));
    }

    #[test]
    fn clear_region_blanks_only_the_region() {
        let mut grid = GridBuffer::new();
        grid.draw_text(0, 1, "status line text", Color::White);
        grid.draw_text(0, 2, "keep", Color::White);

        grid.clear_region(Region::rows(1, 1));

        assert!(grid.row_is_blank(1));
        assert!(grid.row_contains(2, "keep"));
        assert_eq!(grid.draw_count(), 3);
        assert_eq!(grid.flush_count(), 0);
    }
}
