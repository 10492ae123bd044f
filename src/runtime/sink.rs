//! Log sinks.
//!
//! Everything the scanner and the installed guards have to say goes through a [`LogSink`].
//! The host plugs in its own logger; the crate ships two implementations:
//!
//! - [`LogCrateSink`] forwards to the `log` facade under the `ownerscope` target
//! - [`MemorySink`] keeps every record in a lock-free `boxcar::Vec`, so the background scan
//!   thread and intercepted calls can append concurrently while a reader inspects them

use std::fmt;

use strum::{Display, EnumIter};

/// Severity of a log record, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum Level {
    /// Internal detail
    Debug,
    /// Informational message
    Info,
    /// Player-facing message
    Message,
    /// Something was skipped or partially failed
    Warning,
    /// A violation report or a per-method failure
    Error,
    /// The scan could not run at all
    Fatal,
}

/// Destination for log records.
///
/// Implementations must be `Send + Sync`: the scan thread and intercepted calls on any
/// thread log through the same sink.
pub trait LogSink: Send + Sync {
    /// Record `message` at `level`
    fn log(&self, level: Level, message: &str);

    /// Record a debug message
    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    /// Record an informational message
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    /// Record a player-facing message
    fn message(&self, message: &str) {
        self.log(Level::Message, message);
    }

    /// Record a warning
    fn warning(&self, message: &str) {
        self.log(Level::Warning, message);
    }

    /// Record an error
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    /// Record a fatal error
    fn fatal(&self, message: &str) {
        self.log(Level::Fatal, message);
    }
}

/// Target used by [`LogCrateSink`]
pub const LOG_TARGET: &str = "ownerscope";

/// Forwards records to the `log` facade.
///
/// `Message` maps to `info`, `Fatal` maps to `error` with a `FATAL` prefix since the facade
/// has no level above `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCrateSink;

impl LogSink for LogCrateSink {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::Debug => log::debug!(target: LOG_TARGET, "{message}"),
            Level::Info | Level::Message => log::info!(target: LOG_TARGET, "{message}"),
            Level::Warning => log::warn!(target: LOG_TARGET, "{message}"),
            Level::Error => log::error!(target: LOG_TARGET, "{message}"),
            Level::Fatal => log::error!(target: LOG_TARGET, "FATAL: {message}"),
        }
    }
}

/// A single recorded log entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity
    pub level: Level,
    /// Message text
    pub message: String,
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

/// Thread-safe in-memory sink.
///
/// Uses `boxcar::Vec` internally for lock-free concurrent append operations.
///
/// # Examples
///
/// ```rust
/// use ownerscope::runtime::{Level, LogSink, MemorySink};
///
/// let sink = MemorySink::new();
/// sink.warning("Some types in assembly Game couldn't be loaded");
/// assert_eq!(sink.count_level(Level::Warning), 1);
/// assert!(sink.contains(Level::Warning, "couldn't be loaded"));
/// ```
pub struct MemorySink {
    records: boxcar::Vec<LogRecord>,
}

impl fmt::Debug for MemorySink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySink")
            .field("records", &self.count())
            .finish()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    /// Creates an empty sink
    #[must_use]
    pub fn new() -> Self {
        MemorySink {
            records: boxcar::Vec::new(),
        }
    }

    /// Total number of records
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.count()
    }

    /// Number of records at exactly `level`
    #[must_use]
    pub fn count_level(&self, level: Level) -> usize {
        self.iter().filter(|record| record.level == level).count()
    }

    /// Iterate over all records in insertion order.
    ///
    /// Note: Uses boxcar's iterator which yields `(index, &LogRecord)` tuples.
    pub fn iter(&self) -> impl Iterator<Item = &LogRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    /// Records at exactly `level`
    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<&LogRecord> {
        self.iter().filter(|record| record.level == level).collect()
    }

    /// True if a record at `level` contains `needle`
    #[must_use]
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.iter()
            .any(|record| record.level == level && record.message.contains(needle))
    }

    /// True if any record is at `Error` or `Fatal`
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.iter().any(|record| record.level >= Level::Error)
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        self.records.push(LogRecord {
            level,
            message: message.to_string(),
        });
    }
}
