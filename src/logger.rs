// Copyright The Rusted Firmware-A Contributors.
//
// SPDX-License-Identifier: BSD-3-Clause

//! Backend for the `log` facade.
//!
//! Log records may only go to a sink which doesn't depend on DRAM while another core is parked by
//! a frequency switch, so the DRAM state machines only log before and after their critical
//! windows.

use core::{
    fmt::{Arguments, Write},
    option_env,
};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::{Once, mutex::SpinMutex};

static LOGGER: Once<Logger> = Once::new();

struct Logger {
    sink: &'static (dyn LogSink + Sync),
}

impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        writeln!(self.sink, "{}: {}", record.level(), record.args());
    }

    fn flush(&self) {
        self.sink.flush();
    }
}

/// Initialises the logger, sending every record to `sink`.
pub fn init(sink: &'static (dyn LogSink + Sync)) -> Result<(), SetLoggerError> {
    let logger = LOGGER.call_once(|| Logger { sink });
    log::set_logger(logger)?;
    log::set_max_level(build_time_log_level());
    Ok(())
}

/// Returns the sink passed to [`init`], if there was one.
pub fn get_log_sink() -> Option<&'static (dyn LogSink + Sync)> {
    LOGGER.get().map(|logger| logger.sink)
}

/// The maximum level to log, from the `LOG_LEVEL` environment variable at build time.
///
/// Recognised values are the lower-case names of the [`LevelFilter`] variants. Anything else falls
/// back to `Debug` in debug builds and `Info` in release builds.
pub const fn build_time_log_level() -> LevelFilter {
    let level = match option_env!("LOG_LEVEL") {
        Some(level) => level,
        None => "",
    };
    parse_log_level(level)
}

const fn parse_log_level(level: &str) -> LevelFilter {
    match level.as_bytes() {
        b"off" => LevelFilter::Off,
        b"error" => LevelFilter::Error,
        b"warn" => LevelFilter::Warn,
        b"info" => LevelFilter::Info,
        b"debug" => LevelFilter::Debug,
        b"trace" => LevelFilter::Trace,
        _ => {
            if cfg!(debug_assertions) {
                LevelFilter::Debug
            } else {
                LevelFilter::Info
            }
        }
    }
}

/// Destination for formatted log records.
///
/// `write_fmt` takes `&self`, since the sink is shared by every core. Implementations do their own
/// locking.
pub trait LogSink {
    /// Writes one formatted fragment.
    fn write_fmt(&self, args: Arguments);

    /// Flushes any buffered output.
    fn flush(&self) {}
}

/// A [`LogSink`] over a `core::fmt::Write`, such as a UART driver.
///
/// The writer sits behind a spin lock held for a whole record, so lines from different cores don't
/// interleave.
pub struct LockedWriter<W: Write> {
    writer: SpinMutex<W>,
}

impl<W: Write> LockedWriter<W> {
    /// Wraps `writer`.
    pub const fn new(writer: W) -> Self {
        Self {
            writer: SpinMutex::new(writer),
        }
    }
}

impl<W: Write> LogSink for LockedWriter<W> {
    fn write_fmt(&self, args: Arguments) {
        // Nowhere to report a failing console.
        let _ = self.writer.lock().write_fmt(args);
    }
}
