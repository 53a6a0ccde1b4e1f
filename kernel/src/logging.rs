//! `log` backend that writes records to the kernel console

use log::{LevelFilter, Log, Metadata, Record};

/// Logger implementation for the log crate
pub struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            kprintln!("[{:5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Install the kernel logger and set the maximum level.
///
/// Installing twice is harmless; the second call only adjusts the level.
pub fn init(level: LevelFilter) {
    // set_logger fails once a logger is in place, which is fine here
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
