//! Logging macros for ergonomic message formatting.
//!
//! Each macro formats its arguments like `format!` and hands the result to
//! the logger. The named-level macros wrap the corresponding [`Logger`]
//! convenience method; [`log!`] takes an explicit level and is the way to
//! emit on a custom one.
//!
//! [`Logger`]: crate::core::logger::Logger
//!
//! # Examples
//!
//! ```
//! use logflume::prelude::*;
//! use logflume::{info, warning};
//!
//! let logger = Logger::new();
//!
//! info!(logger, "server started");
//!
//! let port = 8080;
//! info!(logger, "listening on port {}", port);
//! warning!(logger, "retry {} of {}", 3, 5);
//! ```

/// Log on an explicit level, with automatic formatting.
///
/// Returns what [`Logger::log`](crate::core::logger::Logger::log) returns,
/// so boundary levels surface as errors.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::log;
/// let audit = Level::custom("AUDIT", 55).unwrap();
/// log!(logger, audit, "payout approved: {}", 1204).unwrap();
/// log!(logger, Level::ERROR, "error code: {}", 500).unwrap();
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log(&$level, format!($($arg)+))
    };
}

/// Log a DEBUG (10) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::debug;
/// debug!(logger, "cache warmed in {}ms", 41);
/// ```
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debug(format!($($arg)+))
    };
}

/// Log an INFO (20) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::info;
/// info!(logger, "processing {} items", 100);
/// ```
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.info(format!($($arg)+))
    };
}

/// Log a NOTE (30) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::note;
/// note!(logger, "config reloaded from {}", "/etc/app.toml");
/// ```
#[macro_export]
macro_rules! note {
    ($logger:expr, $($arg:tt)+) => {
        $logger.note(format!($($arg)+))
    };
}

/// Log a SUCCESS (40) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::success;
/// success!(logger, "migration {} applied", "0042_add_index");
/// ```
#[macro_export]
macro_rules! success {
    ($logger:expr, $($arg:tt)+) => {
        $logger.success(format!($($arg)+))
    };
}

/// Log a WARNING (60) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::warning;
/// warning!(logger, "low disk space: {}% used", 91);
/// ```
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warning(format!($($arg)+))
    };
}

/// Log an ERROR (80) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::error;
/// error!(logger, "database connection failed: {}", "timeout");
/// ```
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.error(format!($($arg)+))
    };
}

/// Log a CRITICAL (90) event.
///
/// # Examples
///
/// ```
/// # use logflume::prelude::*;
/// # let logger = Logger::new();
/// use logflume::critical;
/// critical!(logger, "unable to recover: {}", "disk full");
/// ```
#[macro_export]
macro_rules! critical {
    ($logger:expr, $($arg:tt)+) => {
        $logger.critical(format!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use crate::core::level::Level;
    use crate::core::logger::Logger;
    use crate::core::sink::BuiltSink;
    use crate::sinks::memory::{MemoryBuffer, MemorySink};

    fn captured() -> (Logger, MemoryBuffer) {
        let (sink, buffer) = MemorySink::new();
        let logger = Logger::new()
            .with_sink("memory", BuiltSink::new("memory", Box::new(sink)))
            .unwrap();
        (logger, buffer)
    }

    #[test]
    fn log_macro_formats_and_takes_a_level() {
        let (logger, buffer) = captured();
        log!(logger, Level::INFO, "formatted: {}", 42).unwrap();
        assert_eq!(buffer.messages(), vec!["formatted: 42"]);
    }

    #[test]
    fn log_macro_accepts_custom_levels() {
        let (logger, buffer) = captured();
        let audit = Level::custom("AUDIT", 55).unwrap();
        log!(logger, audit, "checked {} records", 7).unwrap();
        assert_eq!(buffer.snapshot()[0].level_name, "AUDIT");
    }

    #[test]
    fn named_level_macros_carry_their_levels() {
        let (logger, buffer) = captured();

        debug!(logger, "d {}", 1);
        info!(logger, "i");
        note!(logger, "n");
        success!(logger, "s");
        warning!(logger, "w");
        error!(logger, "e");
        critical!(logger, "c");

        let numbers: Vec<u8> = buffer
            .snapshot()
            .iter()
            .map(|event| event.level_number)
            .collect();
        assert_eq!(numbers, vec![10, 20, 30, 40, 60, 80, 90]);
        assert_eq!(buffer.messages()[0], "d 1");
    }

    #[test]
    fn macros_return_the_dispatched_event() {
        let (logger, _buffer) = captured();
        let event = info!(logger, "inspect me").unwrap();
        assert_eq!(event.message, "inspect me");
    }
}
