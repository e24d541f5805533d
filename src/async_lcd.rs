//! Async variant of the display session on [`embedded_hal_async`] traits.
//!
//! Mirrors [`crate::sync_lcd::Lcd`] operation for operation; the scrollable
//! line buffer stays on the blocking session.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::{
    Commands, CursorStyle, Error, Geometry, Register, BACKLIGHT, BLINK_ON, CURSOR_ON, DISPLAY_MOVE,
    DISPLAY_ON, ENABLE, ENTRY_INCREMENT, ENTRY_SCROLL_ON, FUNCTION_1LINE, FUNCTION_2LINE,
    FUNCTION_4BIT, FUNCTION_5X8, MOVE_LEFT, MOVE_RIGHT, READ, WRITE,
};

/// A session with the LCD controller.
pub struct Lcd<'a, I, D>
where
    I: I2c,
    D: DelayNs,
{
    i2c: &'a mut I,
    address: u8,
    geometry: Geometry,
    delay: &'a mut D,
    backlight: bool,
    display_on: bool,
    cursor_on: bool,
    blink_on: bool,
    scroll_mode: bool,
    left_to_right: bool,
    clamp_to_line: bool,
    cursor_row: u8,
    cursor_col: i16,
}

impl<'a, I, D> Lcd<'a, I, D>
where
    I: I2c,
    D: DelayNs,
{
    /// Create a new instance with the default 20x4 geometry on address 0x20.
    pub fn new(i2c: &'a mut I, delay: &'a mut D) -> Self {
        Self {
            i2c,
            delay,
            address: 0x20,
            geometry: Geometry::default(),
            backlight: true,
            display_on: true,
            cursor_on: false,
            blink_on: false,
            scroll_mode: false,
            left_to_right: true,
            clamp_to_line: true,
            cursor_row: 0,
            cursor_col: 0,
        }
    }

    /// Set the I2C address of the expander.
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Set the display dimensions.
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_backlight(mut self, on: bool) -> Self {
        self.backlight = on;
        self
    }

    pub fn with_cursor_style(mut self, style: CursorStyle) -> Self {
        self.apply_cursor_style(style);
        self
    }

    /// Whether [`print`](Self::print) stops emitting once the tracked column
    /// leaves the line.
    pub fn with_clamp_to_line(mut self, clamp: bool) -> Self {
        self.clamp_to_line = clamp;
        self
    }

    /// Initializes the controller. See [`crate::sync_lcd::Lcd::init`] for the
    /// reset procedure this follows.
    pub async fn init(mut self) -> Result<Self, Error<I::Error>> {
        match self.geometry.height {
            1 | 2 | 4 => {}
            _ => return Err(Error::UnsupportedHeight),
        }

        self.delay.delay_ms(40).await;

        self.write_nibble(Register::Instruction, Commands::SetFunction as u8)
            .await?;

        let lines = if self.geometry.height == 1 {
            FUNCTION_1LINE
        } else {
            FUNCTION_2LINE
        };
        self.command(Commands::SetFunction as u8 | FUNCTION_4BIT | FUNCTION_5X8 | lines)
            .await?;
        self.update_display_mode().await?;
        self.update_entry_mode().await?;
        Ok(self)
    }

    /// Display dimensions this session was configured with.
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Tracked cursor position as `(row, column)`.
    pub fn position(&self) -> (u8, i16) {
        (self.cursor_row, self.cursor_col)
    }

    async fn write_nibble(&mut self, register: Register, nibble: u8) -> Result<(), Error<I::Error>> {
        let byte = nibble | register as u8 | WRITE | self.backlight_bit();
        self.i2c
            .write(self.address, &[byte | ENABLE])
            .await
            .map_err(Error::I2c)?;
        self.i2c
            .write(self.address, &[byte])
            .await
            .map_err(Error::I2c)
    }

    async fn write_register(&mut self, register: Register, byte: u8) -> Result<(), Error<I::Error>> {
        self.write_nibble(register, byte & 0xf0).await?;
        self.write_nibble(register, (byte << 4) & 0xf0).await
    }

    async fn command(&mut self, bits: u8) -> Result<(), Error<I::Error>> {
        self.write_register(Register::Instruction, bits).await
    }

    async fn write_data(&mut self, data: u8) -> Result<(), Error<I::Error>> {
        self.write_register(Register::Data, data).await
    }

    fn backlight_bit(&self) -> u8 {
        if self.backlight {
            BACKLIGHT
        } else {
            0
        }
    }

    async fn read_nibble(&mut self, register: Register) -> Result<u8, Error<I::Error>> {
        let control = register as u8 | READ | self.backlight_bit();
        self.i2c
            .write(self.address, &[control | ENABLE])
            .await
            .map_err(Error::I2c)?;
        self.i2c
            .write(self.address, &[control])
            .await
            .map_err(Error::I2c)?;
        let mut buf = [0u8; 1];
        self.i2c
            .read(self.address, &mut buf)
            .await
            .map_err(Error::I2c)?;
        Ok(buf[0] & 0xf0)
    }

    /// Read a byte back from the controller. Experimental, see
    /// [`crate::sync_lcd::Lcd::read_byte`].
    pub async fn read_byte(&mut self, register: Register) -> Result<u8, Error<I::Error>> {
        let hi = self.read_nibble(register).await?;
        let lo = self.read_nibble(register).await?;
        Ok(hi | (lo >> 4))
    }

    async fn update_display_mode(&mut self) -> Result<(), Error<I::Error>> {
        let mut mode = Commands::SetDisplayMode as u8;
        if self.display_on {
            mode |= DISPLAY_ON;
        }
        if self.cursor_on {
            mode |= CURSOR_ON;
        }
        if self.blink_on {
            mode |= BLINK_ON;
        }
        self.command(mode).await
    }

    async fn update_entry_mode(&mut self) -> Result<(), Error<I::Error>> {
        let mut mode = Commands::SetEntryMode as u8;
        if self.left_to_right {
            mode |= ENTRY_INCREMENT;
        }
        if self.scroll_mode {
            mode |= ENTRY_SCROLL_ON;
        }
        self.command(mode).await
    }

    fn apply_cursor_style(&mut self, style: CursorStyle) {
        match style {
            CursorStyle::None => {
                self.cursor_on = false;
                self.blink_on = false;
            }
            CursorStyle::Underscore => {
                self.cursor_on = true;
                self.blink_on = false;
            }
            CursorStyle::Blink => {
                self.cursor_on = false;
                self.blink_on = true;
            }
        }
    }

    /// Turn the display on or off. Content is preserved while off.
    pub async fn display(&mut self, on: bool) -> Result<(), Error<I::Error>> {
        self.display_on = on;
        self.update_display_mode().await
    }

    /// Select the cursor appearance.
    pub async fn set_cursor_style(&mut self, style: CursorStyle) -> Result<(), Error<I::Error>> {
        self.apply_cursor_style(style);
        self.update_display_mode().await
    }

    /// Turn the backlight on or off.
    pub async fn backlight(&mut self, on: bool) -> Result<(), Error<I::Error>> {
        self.backlight = on;
        self.command(0).await
    }

    /// Turn entry scroll mode on or off.
    pub async fn scroll_mode(&mut self, on: bool) -> Result<(), Error<I::Error>> {
        self.scroll_mode = on;
        self.update_entry_mode().await
    }

    /// Set the text insertion direction.
    pub async fn left_to_right(&mut self, on: bool) -> Result<(), Error<I::Error>> {
        self.left_to_right = on;
        self.update_entry_mode().await
    }

    /// Shift the display contents `count` places to the left.
    pub async fn scroll_left(&mut self, count: u8) -> Result<(), Error<I::Error>> {
        for _ in 0..count {
            self.command(Commands::SetShiftMode as u8 | DISPLAY_MOVE | MOVE_LEFT)
                .await?;
        }
        Ok(())
    }

    /// Shift the display contents `count` places to the right.
    pub async fn scroll_right(&mut self, count: u8) -> Result<(), Error<I::Error>> {
        for _ in 0..count {
            self.command(Commands::SetShiftMode as u8 | DISPLAY_MOVE | MOVE_RIGHT)
                .await?;
        }
        Ok(())
    }

    /// Clear the display.
    pub async fn clear(&mut self) -> Result<(), Error<I::Error>> {
        self.command(Commands::ClearDisplay as u8).await?;
        self.delay.delay_ms(2).await;
        self.cursor_row = 0;
        self.cursor_col = 0;
        Ok(())
    }

    /// Return the cursor to (0, 0) and undo any display shift.
    pub async fn home(&mut self) -> Result<(), Error<I::Error>> {
        self.command(Commands::ReturnHome as u8).await?;
        self.delay.delay_ms(2).await;
        self.cursor_row = 0;
        self.cursor_col = 0;
        Ok(())
    }

    /// Move the cursor to `(row, col)`, both zero-based.
    pub async fn move_to(&mut self, row: u8, col: u8) -> Result<(), Error<I::Error>> {
        if row >= self.geometry.height {
            return Err(Error::RowOutOfRange);
        }
        if col >= self.geometry.width {
            return Err(Error::ColumnOutOfRange);
        }
        self.command(Commands::SetDdramAddress as u8 | self.geometry.ddram_address(row, col))
            .await?;
        self.cursor_row = row;
        self.cursor_col = col as i16;
        Ok(())
    }

    /// Write text at the current cursor position.
    pub async fn print(&mut self, text: &str) -> Result<(), Error<I::Error>> {
        let width = self.geometry.width as i16;
        for c in text.chars() {
            if self.clamp_to_line && !(0..width).contains(&self.cursor_col) {
                break;
            }
            self.write_data(c as u8).await?;
            if self.left_to_right {
                self.cursor_col += 1;
            } else {
                self.cursor_col -= 1;
            }
        }
        Ok(())
    }

    /// Move to `(row, col)` and print there.
    pub async fn print_at(&mut self, row: u8, col: u8, text: &str) -> Result<(), Error<I::Error>> {
        self.move_to(row, col).await?;
        self.print(text).await
    }

    /// Overwrite the current line with `fill`, then restore the cursor to
    /// the tracked column (clamped into the line).
    pub async fn clear_line(&mut self, fill: char) -> Result<(), Error<I::Error>> {
        let width = self.geometry.width;
        let row = self.cursor_row;
        let col = self.cursor_col.clamp(0, width as i16 - 1) as u8;
        self.move_to(row, 0).await?;
        for _ in 0..width {
            self.write_data(fill as u8).await?;
        }
        self.move_to(row, col).await
    }

    /// Store a custom character bitmap in one of the controller's eight
    /// generator slots.
    pub async fn create_char(&mut self, slot: u8, bitmap: &[u8]) -> Result<(), Error<I::Error>> {
        if slot > 7 {
            return Err(Error::GlyphSlotOutOfRange);
        }
        if bitmap.len() != 8 {
            return Err(Error::GlyphBitmapLength);
        }
        for (row, bits) in bitmap.iter().enumerate() {
            self.command(Commands::SetCgramAddress as u8 | (slot << 3) | row as u8)
                .await?;
            self.write_data(*bits).await?;
        }
        Ok(())
    }
}
