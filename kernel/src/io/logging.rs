//! A logging module that configures and outputs log messages with color coding.
//!
//! This module provides a custom logger `OSLogger` that prints log messages in different colors
//! based on their severity level (error, warn, info, debug, trace). Each record is prefixed with
//! the executing CPU so interleaved output from several harts stays readable.

use log::{self, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::color_println;
use crate::processor::current_processor_id;

use super::console::Color;

static LOGGER: OSLogger = OSLogger;

/// # Initialization
/// The maximum level is taken from the `LOG` environment variable at compile time:
/// - "ERROR" -> `LevelFilter::Error`
/// - "WARN" -> `LevelFilter::Warn`
/// - "INFO" -> `LevelFilter::Info`
/// - "DEBUG" -> `LevelFilter::Debug`
/// - "TRACE" -> `LevelFilter::Trace`
/// - Any other value -> `LevelFilter::Off`
///
/// A second call keeps the already installed logger and only logs a warning.
pub fn init() {
    if init_with_level(level_from_env()).is_err() {
        log::warn!("logger already installed");
    }
}

/// Installs the console logger with an explicit maximum level.
pub fn init_with_level(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Idempotent initialisation for test cases. Defaults to `Warn` so the test
/// output stays readable unless `LOG` asks for more.
#[cfg(test)]
pub fn init_for_test() {
    let level = match option_env!("LOG") {
        Some(_) => level_from_env(),
        None => LevelFilter::Warn,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn level_from_env() -> LevelFilter {
    match option_env!("LOG") {
        Some("ERROR") => LevelFilter::Error,
        Some("WARN") => LevelFilter::Warn,
        Some("INFO") => LevelFilter::Info,
        Some("DEBUG") => LevelFilter::Debug,
        Some("TRACE") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}

/// A custom logger that prints log messages to the console with color coding.
struct OSLogger;

impl Log for OSLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let cpu: usize = current_processor_id().into();
        color_println!(
            level_to_color(record.level()),
            "[KERNEL][{:>5}][{},{}] {}",
            record.level(),
            cpu,
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Converts a log level to the corresponding ANSI color.
fn level_to_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::BrightYellow,
        Level::Info => Color::Blue,
        Level::Debug => Color::Green,
        Level::Trace => Color::BrightBlack,
    }
}
