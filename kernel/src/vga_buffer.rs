//! VGA Buffer - text mode console
//!
//! 80x25 characters at the identity-mapped text buffer. Writes are volatile,
//! the screen scrolls when the last row fills, and the hardware cursor
//! follows the write position.

use core::fmt;

use lazy_static::lazy_static;
use spin::Mutex;
use x86_64::instructions::port::Port;

const BUFFER_HEIGHT: usize = 25;
const BUFFER_WIDTH: usize = 80;

pub const VGA_BUFFER_ADDRESS: usize = 0xB8000;

/// Shown in place of bytes the code page cannot display
const UNPRINTABLE: u8 = 0xFE;

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct ColorCode(u8);

impl ColorCode {
    const fn new(foreground: Color, background: Color) -> ColorCode {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct ScreenChar {
    ascii_character: u8,
    color_code: ColorCode,
}

#[repr(transparent)]
struct Buffer {
    chars: [[ScreenChar; BUFFER_WIDTH]; BUFFER_HEIGHT],
}

pub struct Writer {
    column_position: usize,
    row_position: usize,
    color_code: ColorCode,
    buffer: *mut Buffer,
    /// Drive the CRTC cursor registers (off for off-screen buffers)
    hardware_cursor: bool,
}

// The buffer pointer is only dereferenced under the WRITER lock
unsafe impl Send for Writer {}

lazy_static! {
    pub static ref WRITER: Mutex<Writer> = Mutex::new(Writer {
        column_position: 0,
        row_position: 0,
        color_code: ColorCode::new(Color::LightCyan, Color::Black),
        buffer: VGA_BUFFER_ADDRESS as *mut Buffer,
        hardware_cursor: true,
    });
}

impl Writer {
    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            byte => {
                if self.column_position >= BUFFER_WIDTH {
                    self.new_line();
                }
                let (row, col) = (self.row_position, self.column_position);
                self.put(row, col, ScreenChar {
                    ascii_character: byte,
                    color_code: self.color_code,
                });
                self.column_position += 1;
                self.update_cursor();
            }
        }
    }

    pub fn write_string(&mut self, s: &str) {
        for byte in s.bytes() {
            match byte {
                0x20..=0x7e | b'\n' => self.write_byte(byte),
                _ => self.write_byte(UNPRINTABLE),
            }
        }
    }

    pub fn set_color(&mut self, foreground: Color, background: Color) {
        self.color_code = ColorCode::new(foreground, background);
    }

    pub fn clear_screen(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.column_position = 0;
        self.row_position = 0;
        self.update_cursor();
    }

    fn new_line(&mut self) {
        self.column_position = 0;

        if self.row_position < BUFFER_HEIGHT - 1 {
            self.row_position += 1;
        } else {
            for row in 1..BUFFER_HEIGHT {
                for col in 0..BUFFER_WIDTH {
                    let character = self.get(row, col);
                    self.put(row - 1, col, character);
                }
            }
            self.clear_row(BUFFER_HEIGHT - 1);
        }

        self.update_cursor();
    }

    fn clear_row(&mut self, row: usize) {
        let blank = ScreenChar {
            ascii_character: b' ',
            color_code: self.color_code,
        };
        for col in 0..BUFFER_WIDTH {
            self.put(row, col, blank);
        }
    }

    fn put(&mut self, row: usize, col: usize, character: ScreenChar) {
        // SAFETY: `buffer` points at a live Buffer for the writer's lifetime
        // and row/col are bounded by the loops and `new_line`
        unsafe {
            let cell = core::ptr::addr_of_mut!((*self.buffer).chars[row][col]);
            core::ptr::write_volatile(cell, character);
        }
    }

    fn get(&self, row: usize, col: usize) -> ScreenChar {
        // SAFETY: as in `put`
        unsafe {
            let cell = core::ptr::addr_of!((*self.buffer).chars[row][col]);
            core::ptr::read_volatile(cell)
        }
    }

    fn update_cursor(&self) {
        if !self.hardware_cursor {
            return;
        }

        let pos = (self.row_position * BUFFER_WIDTH + self.column_position) as u16;
        let mut index: Port<u8> = Port::new(0x3D4);
        let mut data: Port<u8> = Port::new(0x3D5);

        // SAFETY: CRTC registers 14/15 hold the cursor location
        unsafe {
            index.write(0x0E);
            data.write((pos >> 8) as u8);
            index.write(0x0F);
            data.write((pos & 0xFF) as u8);
        }
    }
}

impl fmt::Write for Writer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_string(s);
        Ok(())
    }
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::vga_buffer::_print(format_args!($($arg)*)));
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = WRITER.lock().write_fmt(args);
}
