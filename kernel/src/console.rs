//! Console output
//!
//! The core has no UART of its own. A backend installs a sink at boot and
//! everything printed by the kernel, log records included, goes through it.
//! Until a sink is installed output is counted and dropped.

use core::fmt::{self, Write};
use lazy_static::*;
use spin::Mutex;

/// Function that puts a chunk of text on the backend console
pub type ConsoleSink = fn(&str);

struct Console {
    sink: Option<ConsoleSink>,
    dropped: usize,
}

impl Console {
    fn new() -> Self {
        Self {
            sink: None,
            dropped: 0,
        }
    }
}

impl Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.sink {
            Some(sink) => sink(s),
            None => self.dropped += s.len(),
        }
        Ok(())
    }
}

lazy_static! {
    static ref CONSOLE: Mutex<Console> = Mutex::new(Console::new());
}

/// Install the backend console sink, returning the previous one
pub fn set_sink(sink: ConsoleSink) -> Option<ConsoleSink> {
    CONSOLE.lock().sink.replace(sink)
}

/// Bytes printed while no sink was installed
pub fn dropped_bytes() -> usize {
    CONSOLE.lock().dropped
}

pub fn print(args: fmt::Arguments) {
    // Console::write_str never fails
    let _ = CONSOLE.lock().write_fmt(args);
}

/// Print to console
#[macro_export]
macro_rules! kprint {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

/// Print to console with newline
#[macro_export]
macro_rules! kprintln {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?))
    };
    () => {
        $crate::console::print(format_args!("\n"))
    }
}
