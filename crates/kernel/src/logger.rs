//! Console backend for the [`log`] facade.
//!
//! The kernel and allocator crates only emit records through `log`. The
//! boot code installs a [`KernelLogger`] that prefixes each record with a
//! tick timestamp and a colored level tag and hands the line to the console.

use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Writes one formatted line to the console.
pub type ConsoleWrite = fn(fmt::Arguments<'_>);

/// Current time in ticks. Must not take the kernel lock.
pub type Clock = fn() -> u64;

#[derive(Debug)]
pub struct KernelLogger {
    write: ConsoleWrite,
    clock: Clock,
    max_level: LevelFilter,
}

impl KernelLogger {
    #[must_use]
    pub const fn new(write: ConsoleWrite, clock: Clock, max_level: LevelFilter) -> Self {
        Self {
            write,
            clock,
            max_level,
        }
    }

    /// Installs `self` as the global logger.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        (self.write)(format_args!(
            "{}\n",
            RecordFormat {
                ticks: (self.clock)(),
                record,
            }
        ));
    }

    fn flush(&self) {}
}

struct RecordFormat<'a, 'r> {
    ticks: u64,
    record: &'a Record<'r>,
}

impl fmt::Display for RecordFormat<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:>8}] {} {}: {}",
            self.ticks,
            LevelFormat(self.record.level()),
            self.record.target(),
            self.record.args()
        )
    }
}

struct LevelFormat(Level);

impl fmt::Display for LevelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let color = match self.0 {
            Level::Trace => 35,
            Level::Debug => 34,
            Level::Info => 32,
            Level::Warn => 33,
            Level::Error => 31,
        };
        let msg = match self.0 {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => " INFO",
            Level::Warn => " WARN",
            Level::Error => "ERROR",
        };
        write!(f, "\x1B[{color};1m{msg}\x1B[0m")
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    extern crate alloc;

    use alloc::{format, string::String};

    use spin::Mutex;

    use super::*;

    static OUTPUT: Mutex<String> = Mutex::new(String::new());

    fn capture(args: fmt::Arguments<'_>) {
        use core::fmt::Write as _;
        OUTPUT.lock().write_fmt(args).unwrap();
    }

    fn clock() -> u64 {
        42
    }

    #[test]
    fn test_record_format() {
        let record = Record::builder()
            .level(Level::Info)
            .target("kernel::kernel")
            .args(format_args!("created process 3"))
            .build();
        let line = format!(
            "{}",
            RecordFormat {
                ticks: 7,
                record: &record
            }
        );
        assert_eq!(
            line,
            "[       7] \x1B[32;1m INFO\x1B[0m kernel::kernel: created process 3"
        );
    }

    #[test]
    fn test_level_filter() {
        let logger = KernelLogger::new(capture, clock, LevelFilter::Info);
        let debug = Record::builder()
            .level(Level::Debug)
            .args(format_args!("hidden"))
            .build();
        let warn = Record::builder()
            .level(Level::Warn)
            .target("allocator")
            .args(format_args!("double free"))
            .build();
        logger.log(&debug);
        logger.log(&warn);

        let output = OUTPUT.lock();
        assert!(!output.contains("hidden"));
        assert!(output.contains("[      42]"));
        assert!(output.ends_with("allocator: double free\n"));
    }
}
