//! Serial Port Driver (UART 16550)
//!
//! COM1 at 115200 baud, 8N1, used as a mirror of every console line so a
//! headless run still leaves a log.

use core::fmt;

use spin::Mutex;
use x86_64::instructions::port::Port;

/// COM1 base port
const COM1: u16 = 0x3F8;

// Register offsets from the base port
const DATA: u16 = 0;
const INT_ENABLE: u16 = 1;
const FIFO_CTRL: u16 = 2;
const LINE_CTRL: u16 = 3;
const MODEM_CTRL: u16 = 4;
const LINE_STATUS: u16 = 5;

/// Line status: transmit holding register empty
const TX_EMPTY: u8 = 0x20;
/// Line control: divisor latch access
const DLAB: u8 = 0x80;

pub struct SerialPort {
    base: u16,
    initialized: bool,
}

impl SerialPort {
    const fn new(base: u16) -> Self {
        Self {
            base,
            initialized: false,
        }
    }

    fn port(&self, offset: u16) -> Port<u8> {
        Port::new(self.base + offset)
    }

    /// Program 115200 baud 8N1 with FIFOs enabled
    ///
    /// # Safety
    /// Port I/O; the caller must own the UART at `base`.
    pub unsafe fn init(&mut self) {
        self.port(INT_ENABLE).write(0x00);

        // Divisor 1 => 115200 baud, LSB at DATA and MSB at INT_ENABLE while DLAB is set
        self.port(LINE_CTRL).write(DLAB);
        self.port(DATA).write(0x01);
        self.port(INT_ENABLE).write(0x00);

        // 8 data bits, no parity, one stop bit, DLAB off
        self.port(LINE_CTRL).write(0x03);
        // Enable and clear FIFOs, 14-byte threshold
        self.port(FIFO_CTRL).write(0xC7);
        // DTR, RTS, OUT2
        self.port(MODEM_CTRL).write(0x0B);

        self.initialized = true;
    }

    /// # Safety
    /// Port I/O on an initialized UART.
    pub unsafe fn write_byte(&mut self, byte: u8) {
        while self.port(LINE_STATUS).read() & TX_EMPTY == 0 {
            core::hint::spin_loop();
        }
        self.port(DATA).write(byte);
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if !self.initialized {
            return Ok(());
        }
        for byte in s.bytes() {
            // SAFETY: only reachable after `init` claimed the port
            unsafe { self.write_byte(byte) };
        }
        Ok(())
    }
}

static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::new(COM1));

/// Initialize COM1 (call once during boot)
///
/// # Safety
/// Must run on bare metal with the UART present.
pub unsafe fn init() {
    SERIAL1.lock().init();
}

/// Write a string to COM1; dropped until `init` has run
pub fn write_str(s: &str) {
    use core::fmt::Write;
    let _ = SERIAL1.lock().write_str(s);
}

#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::drivers::serial::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => ($crate::serial_print!("{}\n", format_args!($($arg)*)));
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = SERIAL1.lock().write_fmt(args);
}
