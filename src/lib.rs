#![no_std]
//! Driver for HD44780-family character LCDs wired behind a PCA8574 I2C port
//! expander, like the common 20x4 "I2C backpack" modules. It requires an I2C
//! instance implementing [`embedded_hal::i2c::I2c`] and an instance to delay
//! execution with [`embedded_hal::delay::DelayNs`].
//!
//! The expander only carries four data lines plus register-select, read/write,
//! enable and backlight, so every controller byte goes out as two 4-bit
//! transfers with an enable pulse each. This crate layers three APIs on top of
//! that wiring:
//!
//! - [`sync_lcd::Lcd`]: the display session. Cursor addressing across the
//!   wrapped 4-line memory layout, composite display/entry mode state,
//!   printing, scrolling and custom characters.
//! - [`buffer::ScrollBuffer`]: an editable list of lines mapped onto the
//!   display through a sliding viewport with per-line truncation and scroll
//!   indicator markers. Every mutation redraws the viewport before returning.
//! - [`async_lcd::Lcd`] (feature `async`): the session API on
//!   `embedded_hal_async` traits.
//!
//! Usage:
//! ```no_run
//! # fn run(mut i2c: impl embedded_hal::i2c::I2c, mut delay: impl embedded_hal::delay::DelayNs) {
//! use lcd_hd44780_pca8574::{sync_lcd::Lcd, Geometry};
//!
//! let mut lcd = Lcd::new(&mut i2c, &mut delay)
//!     .with_address(0x20)
//!     .with_geometry(Geometry::new(20, 4))
//!     .init()
//!     .unwrap();
//! lcd.print_at(0, 0, "Hello").unwrap();
//! # }
//! ```

pub mod buffer;
pub mod sync_lcd;

#[cfg(feature = "async")]
pub mod async_lcd;

/// Errors raised by the driver.
///
/// Coordinate and argument validation happens before any bus traffic, so a
/// validation error leaves the controller untouched. A bus error aborts the
/// enclosing operation mid-sequence; the controller may be left between the
/// two nibbles of a byte and needs re-initialization to be trusted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// Error from the underlying I2C implementation.
    I2c(E),
    /// Row is outside the display.
    RowOutOfRange,
    /// Column is outside the display.
    ColumnOutOfRange,
    /// Buffer line index is out of range.
    LineOutOfRange,
    /// The line buffer is at capacity.
    BufferFull,
    /// Custom character slot outside 0..=7.
    GlyphSlotOutOfRange,
    /// Custom character bitmap is not 8 rows.
    GlyphBitmapLength,
    /// Display height is not 1, 2 or 4.
    UnsupportedHeight,
    /// The requested mode is not implemented.
    NotImplemented,
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for Error<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::I2c(_) => defmt::write!(fmt, "i2c error"),
            Error::RowOutOfRange => defmt::write!(fmt, "row out of range"),
            Error::ColumnOutOfRange => defmt::write!(fmt, "column out of range"),
            Error::LineOutOfRange => defmt::write!(fmt, "line index out of range"),
            Error::BufferFull => defmt::write!(fmt, "line buffer full"),
            Error::GlyphSlotOutOfRange => defmt::write!(fmt, "glyph slot out of range"),
            Error::GlyphBitmapLength => defmt::write!(fmt, "glyph bitmap is not 8 rows"),
            Error::UnsupportedHeight => defmt::write!(fmt, "unsupported display height"),
            Error::NotImplemented => defmt::write!(fmt, "not implemented"),
        }
    }
}

/// Character dimensions of the attached display.
///
/// Heights of 1, 2 and 4 are supported; the controller treats a 4-row display
/// as two logical 40-character rows, so other heights have no well-defined
/// wrap behavior and are rejected at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u8,
    pub height: u8,
}

/// DDRAM base address of each visible row. Row 2 continues row 0 in
/// controller memory and row 3 continues row 1, which is why text written
/// past the end of row 0 reappears on row 2.
const ROW_ADDRESSES: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

impl Geometry {
    pub const fn new(width: u8, height: u8) -> Self {
        Self { width, height }
    }

    /// DDRAM address of `(row, col)`. Callers validate the coordinates.
    pub(crate) fn ddram_address(&self, row: u8, col: u8) -> u8 {
        ROW_ADDRESSES[row as usize] + col
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(20, 4)
    }
}

/// Controller register addressed by a transfer, selected via the RS line.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Instruction = 0x00,
    Data = 0x01,
}

/// Cursor appearance at the current write position.
///
/// The controller supports underline and blink independently (including both
/// at once); this API restricts to the three useful combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorStyle {
    /// No visible cursor.
    None,
    /// Underline at the next position to be written.
    Underscore,
    /// Flash the character cell at the next position to be written.
    Blink,
}

/// How [`buffer::ScrollBuffer`] fits a line into the visible width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncateMode {
    /// Drop everything past the visible width.
    Truncate,
    /// Keep the head and end the line with `..`.
    EllipsisEnd,
    /// Keep head and tail around a `..` in the middle.
    EllipsisMiddle,
    /// Reserved: marquee-scroll long lines. Fails with
    /// [`Error::NotImplemented`] when a redraw needs it.
    Scroll,
}

// Expander pin mapping to the controller's control lines. P0 carries register
// select, P1 read/write, P2 enable, P3 the backlight, P4-P7 the data nibble.
pub(crate) const READ: u8 = 0b0000_0010;
pub(crate) const WRITE: u8 = 0b0000_0000;
pub(crate) const ENABLE: u8 = 0b0000_0100;
pub(crate) const BACKLIGHT: u8 = 0b0000_1000;

/// Command bytes. Most carry a "set" bit plus parameter flags below it.
#[repr(u8)]
#[derive(Copy, Clone)]
pub(crate) enum Commands {
    ClearDisplay = 0b0000_0001,
    ReturnHome = 0b0000_0010,
    SetEntryMode = 0b0000_0100,
    SetDisplayMode = 0b0000_1000,
    SetShiftMode = 0b0001_0000,
    SetFunction = 0b0010_0000,
    SetCgramAddress = 0b0100_0000,
    SetDdramAddress = 0b1000_0000,
}

// Entry mode flags.
pub(crate) const ENTRY_INCREMENT: u8 = 0b0000_0010;
pub(crate) const ENTRY_SCROLL_ON: u8 = 0b0000_0001;

// Display mode flags.
pub(crate) const DISPLAY_ON: u8 = 0b0000_0100;
pub(crate) const CURSOR_ON: u8 = 0b0000_0010;
pub(crate) const BLINK_ON: u8 = 0b0000_0001;

// Shift mode flags: move the whole display (rather than the cursor) without
// inserting characters.
pub(crate) const DISPLAY_MOVE: u8 = 0b0000_1000;
pub(crate) const MOVE_RIGHT: u8 = 0b0000_0100;
pub(crate) const MOVE_LEFT: u8 = 0b0000_0000;

// Function set flags. The interface width is fixed at 4 bits by the wiring
// and the font at 5x8 by this driver.
pub(crate) const FUNCTION_4BIT: u8 = 0b0000_0000;
pub(crate) const FUNCTION_2LINE: u8 = 0b0000_1000;
pub(crate) const FUNCTION_1LINE: u8 = 0b0000_0000;
pub(crate) const FUNCTION_5X8: u8 = 0b0000_0000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_bases_follow_the_wrapped_layout() {
        let g = Geometry::new(20, 4);
        assert_eq!(g.ddram_address(0, 0), 0x00);
        assert_eq!(g.ddram_address(1, 0), 0x40);
        assert_eq!(g.ddram_address(2, 0), 0x14);
        assert_eq!(g.ddram_address(3, 0), 0x54);
        // Row 2 starts right after the 20th cell of row 0.
        assert_eq!(g.ddram_address(2, 0), g.ddram_address(0, 19) + 1);
        assert_eq!(g.ddram_address(3, 0), g.ddram_address(1, 19) + 1);
    }

    #[test]
    fn column_offsets_add_to_the_row_base() {
        let g = Geometry::new(16, 2);
        assert_eq!(g.ddram_address(0, 7), 0x07);
        assert_eq!(g.ddram_address(1, 15), 0x4f);
    }
}
