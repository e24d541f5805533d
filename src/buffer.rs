//! Scrollable line buffer over a display session.
//!
//! [`ScrollBuffer`] keeps an editable list of text lines and maps a sliding
//! viewport of them onto the physical rows. The buffer is the subject and the
//! display the sole observer: every mutation funnels through
//! [`ScrollBuffer::changed`], which redraws the whole viewport before the
//! call returns, so there is never a dirty-but-unrendered state and no
//! separate refresh step.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use heapless::{String, Vec};

use crate::sync_lcd::Lcd;
use crate::{Error, Geometry, TruncateMode};

/// Marker shown in the indicator column when earlier lines exist.
const UP_MARKER: char = '^';
/// Marker shown when more lines follow the viewport.
const DOWN_MARKER: char = 'v';
const BLANK_MARKER: char = ' ';

/// Two-character marker standing in for elided text.
const ELLIPSIS: &str = "..";

/// One rendered display row. Sized for the longest DDRAM row with headroom
/// for multi-byte characters.
pub(crate) type Row = String<80>;

/// The scroll truncation mode has no rendering yet.
pub(crate) struct ScrollModeUnimplemented;

/// An editable list of lines kept in sync with the display.
///
/// `LINE` is the per-line character capacity (stored lines are silently cut
/// to it; the display truncation below is a separate, rendering-time step)
/// and `CAP` the maximum number of lines.
pub struct ScrollBuffer<'a, I, D, const LINE: usize = 40, const CAP: usize = 16>
where
    I: I2c,
    D: DelayNs,
{
    lcd: Lcd<'a, I, D>,
    lines: Vec<String<LINE>, CAP>,
    viewport_start: i16,
    truncate: TruncateMode,
    redraws: u32,
}

impl<'a, I, D, const LINE: usize, const CAP: usize> ScrollBuffer<'a, I, D, LINE, CAP>
where
    I: I2c,
    D: DelayNs,
{
    /// Wrap an initialized session. Nothing is drawn until the first
    /// mutation or [`show`](Self::show).
    pub fn new(lcd: Lcd<'a, I, D>) -> Self {
        Self {
            lcd,
            lines: Vec::new(),
            viewport_start: 0,
            truncate: TruncateMode::Truncate,
            redraws: 0,
        }
    }

    pub fn with_truncate_mode(mut self, mode: TruncateMode) -> Self {
        self.truncate = mode;
        self
    }

    /// Direct access to the underlying session, bypassing the buffer. The
    /// next redraw overwrites whatever was printed this way.
    pub fn lcd(&mut self) -> &mut Lcd<'a, I, D> {
        &mut self.lcd
    }

    /// Release the underlying session.
    pub fn into_lcd(self) -> Lcd<'a, I, D> {
        self.lcd
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(|l| l.as_str())
    }

    /// First buffer index mapped onto row 0.
    pub fn viewport_start(&self) -> i16 {
        self.viewport_start
    }

    pub fn truncate_mode(&self) -> TruncateMode {
        self.truncate
    }

    /// Number of completed redraws; a cheap way to observe the change
    /// notifications without touching the bus.
    pub fn redraws(&self) -> u32 {
        self.redraws
    }

    /// Append a line at the end.
    pub fn push(&mut self, text: &str) -> Result<(), Error<I::Error>> {
        self.lines.push(stored(text)).map_err(|_| Error::BufferFull)?;
        self.changed()
    }

    /// Insert a line before `index`.
    pub fn insert(&mut self, index: usize, text: &str) -> Result<(), Error<I::Error>> {
        if index > self.lines.len() {
            return Err(Error::LineOutOfRange);
        }
        self.lines
            .insert(index, stored(text))
            .map_err(|_| Error::BufferFull)?;
        self.changed()
    }

    /// Remove and return the line at `index`.
    pub fn remove(&mut self, index: usize) -> Result<String<LINE>, Error<I::Error>> {
        if index >= self.lines.len() {
            return Err(Error::LineOutOfRange);
        }
        let line = self.lines.remove(index);
        self.changed()?;
        Ok(line)
    }

    /// Remove and return the last line, if any. An empty buffer is left
    /// untouched and triggers no redraw.
    pub fn pop(&mut self) -> Result<Option<String<LINE>>, Error<I::Error>> {
        match self.lines.pop() {
            Some(line) => {
                self.changed()?;
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    /// Replace the line at `index`.
    pub fn set_line(&mut self, index: usize, text: &str) -> Result<(), Error<I::Error>> {
        if index >= self.lines.len() {
            return Err(Error::LineOutOfRange);
        }
        self.lines[index] = stored(text);
        self.changed()
    }

    /// Replace the whole buffer content in one step (single redraw).
    pub fn set_lines(&mut self, lines: &[&str]) -> Result<(), Error<I::Error>> {
        self.lines.clear();
        for text in lines {
            self.lines.push(stored(text)).map_err(|_| Error::BufferFull)?;
        }
        self.changed()
    }

    /// Drop every line past `len`. A no-op when nothing is removed.
    pub fn truncate(&mut self, len: usize) -> Result<(), Error<I::Error>> {
        if len >= self.lines.len() {
            return Ok(());
        }
        self.lines.truncate(len);
        self.changed()
    }

    /// Empty the buffer, blanking the viewport.
    pub fn clear(&mut self) -> Result<(), Error<I::Error>> {
        self.lines.clear();
        self.changed()
    }

    /// Sort the lines lexicographically.
    pub fn sort(&mut self) -> Result<(), Error<I::Error>> {
        self.lines.sort_unstable();
        self.changed()
    }

    /// Reverse the line order.
    pub fn reverse(&mut self) -> Result<(), Error<I::Error>> {
        self.lines.reverse();
        self.changed()
    }

    /// Select the truncation policy for subsequent renders (redraws
    /// immediately; [`TruncateMode::Scroll`] fails here).
    pub fn set_truncate_mode(&mut self, mode: TruncateMode) -> Result<(), Error<I::Error>> {
        self.truncate = mode;
        self.changed()
    }

    /// Move the viewport so `start` lands on row 0. Out-of-range starts,
    /// negative included, render blank rows. Showing the current start again
    /// is a no-op and issues no hardware writes.
    pub fn show(&mut self, start: i16) -> Result<(), Error<I::Error>> {
        if start == self.viewport_start {
            return Ok(());
        }
        self.viewport_start = start;
        self.changed()
    }

    /// Slide the viewport one line towards the start of the buffer.
    pub fn scroll_up(&mut self) -> Result<(), Error<I::Error>> {
        self.show(self.viewport_start - 1)
    }

    /// Slide the viewport one line towards the end of the buffer.
    pub fn scroll_down(&mut self) -> Result<(), Error<I::Error>> {
        self.show(self.viewport_start + 1)
    }

    /// Change notification: the display redraws synchronously on every
    /// mutation before control returns to the caller.
    fn changed(&mut self) -> Result<(), Error<I::Error>> {
        self.redraw()
    }

    fn redraw(&mut self) -> Result<(), Error<I::Error>> {
        let geometry = self.lcd.geometry();
        for row in 0..geometry.height {
            let line = format_row(&self.lines, self.viewport_start, row, geometry, self.truncate)
                .map_err(|_| Error::NotImplemented)?;
            self.lcd.move_to(row, 0)?;
            self.lcd.print(&line)?;
        }
        self.redraws = self.redraws.wrapping_add(1);
        Ok(())
    }
}

/// Copy `text` into a stored line, cutting it at the line capacity.
fn stored<const LINE: usize>(text: &str) -> String<LINE> {
    let mut line = String::new();
    for c in text.chars() {
        if line.push(c).is_err() {
            break;
        }
    }
    line
}

/// Render one physical row to exactly `geometry.width` characters.
///
/// When the buffer holds more lines than the display has rows, the first
/// column becomes an indicator: `^` on row 0 when earlier lines exist, `v` on
/// the last row when more follow, blank otherwise. The indicator costs one
/// column of text width. Rows mapping outside the buffer render as spaces.
pub(crate) fn format_row<const LINE: usize>(
    lines: &[String<LINE>],
    viewport_start: i16,
    row: u8,
    geometry: Geometry,
    mode: TruncateMode,
) -> Result<Row, ScrollModeUnimplemented> {
    let index = viewport_start + row as i16;
    let text = if index >= 0 {
        lines.get(index as usize).map(|l| l.as_str()).unwrap_or("")
    } else {
        ""
    };

    if lines.len() <= geometry.height as usize {
        return fit_line(text, geometry.width as usize, mode);
    }

    let more_above = viewport_start > 0;
    let more_below = viewport_start + (geometry.height as i16) < lines.len() as i16;
    let marker = if row == 0 && more_above {
        UP_MARKER
    } else if row == geometry.height - 1 && more_below {
        DOWN_MARKER
    } else {
        BLANK_MARKER
    };

    let mut out = Row::new();
    let _ = out.push(marker);
    let rest = fit_line(text, geometry.width as usize - 1, mode)?;
    let _ = out.push_str(&rest);
    Ok(out)
}

/// Fit `text` into exactly `width` characters under the given policy.
/// Shorter text is right-padded with spaces so a redraw never leaves stale
/// characters behind. Ellipsis policies degenerate to hard truncation when
/// the marker itself would not fit.
pub(crate) fn fit_line(
    text: &str,
    width: usize,
    mode: TruncateMode,
) -> Result<Row, ScrollModeUnimplemented> {
    if mode == TruncateMode::Scroll {
        return Err(ScrollModeUnimplemented);
    }

    let mut out = Row::new();
    let len = text.chars().count();
    if len <= width {
        let _ = out.push_str(text);
        for _ in len..width {
            let _ = out.push(' ');
        }
        return Ok(out);
    }

    match mode {
        TruncateMode::EllipsisEnd if width > ELLIPSIS.len() => {
            for c in text.chars().take(width - ELLIPSIS.len()) {
                let _ = out.push(c);
            }
            let _ = out.push_str(ELLIPSIS);
        }
        TruncateMode::EllipsisMiddle if width > ELLIPSIS.len() => {
            // The head gets the extra character on an odd budget.
            let budget = width - ELLIPSIS.len();
            let head = budget - budget / 2;
            let tail = budget / 2;
            for c in text.chars().take(head) {
                let _ = out.push(c);
            }
            let _ = out.push_str(ELLIPSIS);
            for c in text.chars().skip(len - tail) {
                let _ = out.push(c);
            }
        }
        _ => {
            for c in text.chars().take(width) {
                let _ = out.push(c);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec;
    use std::vec::Vec as StdVec;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    use super::*;
    use crate::{Register, BACKLIGHT, ENABLE};

    #[test]
    fn short_lines_are_padded_to_width() {
        assert_eq!(
            fit_line("hello", 8, TruncateMode::Truncate).ok().unwrap().as_str(),
            "hello   "
        );
        assert_eq!(
            fit_line("12345678", 8, TruncateMode::Truncate).ok().unwrap().as_str(),
            "12345678"
        );
        assert_eq!(fit_line("", 4, TruncateMode::EllipsisEnd).ok().unwrap().as_str(), "    ");
    }

    #[test]
    fn hard_truncation_keeps_the_head() {
        assert_eq!(
            fit_line("abcdefghij", 8, TruncateMode::Truncate).ok().unwrap().as_str(),
            "abcdefgh"
        );
    }

    #[test]
    fn end_ellipsis_replaces_the_tail() {
        assert_eq!(
            fit_line("abcdefghij", 8, TruncateMode::EllipsisEnd).ok().unwrap().as_str(),
            "abcdef.."
        );
    }

    #[test]
    fn middle_ellipsis_splits_head_heavy() {
        assert_eq!(
            fit_line("abcdefghij", 8, TruncateMode::EllipsisMiddle)
                .ok()
                .unwrap()
                .as_str(),
            "abc..hij"
        );
        // Odd budget: the head gets the extra character.
        assert_eq!(
            fit_line("abcdefghij", 7, TruncateMode::EllipsisMiddle)
                .ok()
                .unwrap()
                .as_str(),
            "abc..ij"
        );
    }

    #[test]
    fn ellipsis_degenerates_when_the_marker_cannot_fit() {
        assert_eq!(
            fit_line("abcdef", 2, TruncateMode::EllipsisEnd).ok().unwrap().as_str(),
            "ab"
        );
        assert_eq!(
            fit_line("abcdef", 2, TruncateMode::EllipsisMiddle).ok().unwrap().as_str(),
            "ab"
        );
    }

    #[test]
    fn scroll_mode_is_not_implemented() {
        assert!(fit_line("abc", 8, TruncateMode::Scroll).is_err());
    }

    fn sample_lines(items: &[&str]) -> StdVec<String<40>> {
        items.iter().map(|s| stored(s)).collect()
    }

    #[test]
    fn viewport_at_start_marks_only_downwards() {
        // Six lines on a 20x4 display; line 3 is empty.
        let lines = sample_lines(&["line-0", "line-1", "line-2", "", "line-4", "line-5"]);
        let g = Geometry::new(20, 4);
        let rows: StdVec<Row> = (0..4)
            .map(|r| format_row(&lines, 0, r, g, TruncateMode::Truncate).ok().unwrap())
            .collect();
        assert_eq!(rows[0].as_str(), " line-0             ");
        assert_eq!(rows[1].as_str(), " line-1             ");
        assert_eq!(rows[2].as_str(), " line-2             ");
        // The empty line renders as spaces behind the down indicator.
        assert_eq!(rows[3].as_str(), "v                   ");
    }

    #[test]
    fn viewport_at_end_marks_only_upwards() {
        let lines = sample_lines(&["line-0", "line-1", "line-2", "", "line-4", "line-5"]);
        let g = Geometry::new(20, 4);
        let rows: StdVec<Row> = (0..4)
            .map(|r| format_row(&lines, 2, r, g, TruncateMode::Truncate).ok().unwrap())
            .collect();
        assert_eq!(rows[0].as_str(), "^line-2             ");
        assert_eq!(rows[1].as_str(), "                    ");
        assert_eq!(rows[2].as_str(), " line-4             ");
        assert_eq!(rows[3].as_str(), " line-5             ");
    }

    #[test]
    fn out_of_range_viewports_render_blank_rows() {
        let lines = sample_lines(&["line-0", "line-1", "line-2", "", "line-4", "line-5"]);
        let g = Geometry::new(20, 4);
        // Negative start: nothing above, content below.
        let top = format_row(&lines, -2, 0, g, TruncateMode::Truncate).ok().unwrap();
        let bottom = format_row(&lines, -2, 3, g, TruncateMode::Truncate).ok().unwrap();
        assert_eq!(top.as_str(), "                    ");
        assert_eq!(bottom.as_str(), "vline-1             ");
        // Start past the end: content above, nothing below.
        let top = format_row(&lines, 10, 0, g, TruncateMode::Truncate).ok().unwrap();
        let bottom = format_row(&lines, 10, 3, g, TruncateMode::Truncate).ok().unwrap();
        assert_eq!(top.as_str(), "^                   ");
        assert_eq!(bottom.as_str(), "                    ");
    }

    #[test]
    fn fitting_buffers_use_the_full_width() {
        let lines = sample_lines(&["abc", "def"]);
        let g = Geometry::new(20, 4);
        let row = format_row(&lines, 0, 0, g, TruncateMode::Truncate).ok().unwrap();
        assert_eq!(row.as_str(), "abc                 ");
        let blank = format_row(&lines, 0, 3, g, TruncateMode::Truncate).ok().unwrap();
        assert_eq!(blank.as_str(), "                    ");
    }

    //
    // Mock-backed tests of the redraw contract.
    //

    const ADDR: u8 = 0x20;

    fn push_nibble(t: &mut StdVec<I2cTransaction>, register: Register, nibble: u8) {
        let byte = nibble | register as u8 | BACKLIGHT;
        t.push(I2cTransaction::write(ADDR, vec![byte | ENABLE]));
        t.push(I2cTransaction::write(ADDR, vec![byte]));
    }

    fn push_byte(t: &mut StdVec<I2cTransaction>, register: Register, byte: u8) {
        push_nibble(t, register, byte & 0xf0);
        push_nibble(t, register, (byte << 4) & 0xf0);
    }

    fn init_transactions() -> StdVec<I2cTransaction> {
        let mut t = StdVec::new();
        push_nibble(&mut t, Register::Instruction, 0x20);
        push_byte(&mut t, Register::Instruction, 0x28);
        push_byte(&mut t, Register::Instruction, 0x0c);
        push_byte(&mut t, Register::Instruction, 0x06);
        t
    }

    /// One full redraw on a 6x2 display.
    fn push_redraw(t: &mut StdVec<I2cTransaction>, rows: [&str; 2]) {
        for (row, text) in rows.iter().enumerate() {
            push_byte(t, Register::Instruction, 0x80 | (row as u8 * 0x40));
            for c in text.bytes() {
                push_byte(t, Register::Data, c);
            }
        }
    }

    #[test]
    fn mutations_redraw_and_repeated_show_does_not() {
        let mut t = init_transactions();
        push_redraw(&mut t, ["abcdef", "x     "]);
        push_redraw(&mut t, ["x     ", "      "]);
        let mut i2c = I2cMock::new(&t);
        let mut delay = NoopDelay::new();
        let lcd = Lcd::new(&mut i2c, &mut delay)
            .with_geometry(Geometry::new(6, 2))
            .init()
            .unwrap();
        let mut buffer: ScrollBuffer<_, _> = ScrollBuffer::new(lcd);

        buffer.set_lines(&["abcdef", "x"]).unwrap();
        buffer.show(1).unwrap();
        // Same start again: no hardware writes, no redraw.
        buffer.show(1).unwrap();
        assert_eq!(buffer.redraws(), 2);

        drop(buffer);
        i2c.done();
    }

    #[test]
    fn selecting_scroll_truncation_fails_at_use() {
        let mut t = init_transactions();
        push_redraw(&mut t, ["hello ", "      "]);
        let mut i2c = I2cMock::new(&t);
        let mut delay = NoopDelay::new();
        let lcd = Lcd::new(&mut i2c, &mut delay)
            .with_geometry(Geometry::new(6, 2))
            .init()
            .unwrap();
        let mut buffer: ScrollBuffer<_, _> = ScrollBuffer::new(lcd);
        buffer.push("hello").unwrap();
        assert_eq!(
            buffer.set_truncate_mode(TruncateMode::Scroll),
            Err(Error::NotImplemented)
        );
        // The failed redraw issued no traffic and did not count.
        assert_eq!(buffer.redraws(), 1);
        drop(buffer);
        i2c.done();
    }

    #[test]
    fn structural_edits_notify_synchronously() {
        let mut t = init_transactions();
        push_redraw(&mut t, ["bb    ", "      "]); // push "bb"
        push_redraw(&mut t, ["aa    ", "bb    "]); // insert "aa" at 0
        push_redraw(&mut t, ["aa    ", "cc    "]); // set_line(1, "cc")
        push_redraw(&mut t, ["aa    ", "      "]); // pop
        push_redraw(&mut t, ["      ", "      "]); // clear
        let mut i2c = I2cMock::new(&t);
        let mut delay = NoopDelay::new();
        let lcd = Lcd::new(&mut i2c, &mut delay)
            .with_geometry(Geometry::new(6, 2))
            .init()
            .unwrap();
        let mut buffer: ScrollBuffer<_, _> = ScrollBuffer::new(lcd);

        buffer.push("bb").unwrap();
        buffer.insert(0, "aa").unwrap();
        buffer.set_line(1, "cc").unwrap();
        assert_eq!(buffer.pop().unwrap().as_deref(), Some("cc"));
        buffer.clear().unwrap();
        assert_eq!(buffer.redraws(), 5);

        // Index validation fails fast, no redraw.
        assert_eq!(buffer.set_line(0, "zz"), Err(Error::LineOutOfRange));
        assert_eq!(buffer.insert(1, "zz"), Err(Error::LineOutOfRange));
        assert_eq!(buffer.redraws(), 5);

        drop(buffer);
        i2c.done();
    }
}
