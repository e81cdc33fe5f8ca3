/// This module provides printing functionality for formatted output,
/// using [`Arch::console_putchar`](crate::arch::Arch::console_putchar) to
/// output individual bytes. It includes the `color_print!` and
/// `color_println!` macros used by the logger.

use core::fmt::{self, Write};

use crate::arch;

/// A struct implementing `Write` to send bytes to the platform console.
struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let arch = arch::current();
        for byte in s.bytes() {
            arch.console_putchar(byte);
        }
        Ok(())
    }
}

/// Prints formatted output to the console.
pub fn print(args: fmt::Arguments) {
    // Stdout::write_str never fails
    let _ = Stdout.write_fmt(args);
}

/// ANSI color codes for terminal output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(unused)]
pub enum Color {
    Black = 30,
    Red = 31,
    Green = 32,
    Yellow = 33,
    Blue = 34,
    Magenta = 35,
    Cyan = 36,
    White = 37,
    BrightBlack = 90,
    BrightRed = 91,
    BrightGreen = 92,
    BrightYellow = 93,
    BrightBlue = 94,
}

/// Prints `args` wrapped in the escape sequences for `color`.
pub fn color_print(color: Color, args: fmt::Arguments) {
    print(format_args!("\x1B[{}m{}\x1B[0m", color as u8, args));
}

#[macro_export]
macro_rules! color_print {
    ($color:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::io::console::color_print(
            $color,
            format_args!($fmt $(, $($arg)+)?)
        )
    };
}

#[macro_export]
macro_rules! color_println {
    ($color:expr, $fmt:literal $(, $($arg:tt)+)?) => {
        $crate::io::console::color_print(
            $color,
            format_args!(concat!($fmt, "\n") $(, $($arg)+)?)
        )
    };
}
