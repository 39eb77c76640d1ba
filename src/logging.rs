//! Log levels and sinks
//!
//! The adapter reports its own diagnostics (warm-up waits, handle
//! lifecycle) through the [`LogSink`] given in [`ApiConfig`]. Messages
//! emitted by the scanner library itself are filtered by
//! [`set_library_log_level`], then go to the sink registered with
//! [`set_library_sink`], or to `tracing` under the `libinsane` target when
//! none is registered.
//!
//! libinsane keeps a single process-wide callback table, so the level and
//! the sink for its messages are process-wide too. [`Api::safebet`]
//! registers the sink of its configuration.
//!
//! [`Api::safebet`]: crate::Api
//!
//! [`ApiConfig`]: crate::ApiConfig

use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Severity of a log message (`enum lis_log_level`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
}

impl LogLevel {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            i32::MIN..=0 => Self::Debug,
            1 => Self::Info,
            2 => Self::Warning,
            _ => Self::Error,
        }
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        })
    }
}

/// Receiver of the adapter's diagnostic messages.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards messages to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "lisrs", "{message}"),
            LogLevel::Info => tracing::info!(target: "lisrs", "{message}"),
            LogLevel::Warning => tracing::warn!(target: "lisrs", "{message}"),
            LogLevel::Error => tracing::error!(target: "lisrs", "{message}"),
        }
    }
}

static LIBRARY_LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Error as u8);

/// Minimum level of scanner-library messages that reach `tracing`.
pub fn set_library_log_level(level: LogLevel) {
    LIBRARY_LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn library_log_level() -> LogLevel {
    LogLevel::from_raw(i32::from(LIBRARY_LOG_LEVEL.load(Ordering::Relaxed)))
}

static LIBRARY_SINK: RwLock<Option<Arc<dyn LogSink>>> = RwLock::new(None);

/// Receiver of scanner-library messages; `None` sends them to `tracing`.
pub fn set_library_sink(sink: Option<Arc<dyn LogSink>>) {
    if let Ok(mut current) = LIBRARY_SINK.write() {
        *current = sink;
    }
}

fn library_sink() -> Option<Arc<dyn LogSink>> {
    LIBRARY_SINK.read().ok().and_then(|sink| sink.clone())
}

/// Entry point for messages produced by a driver backend.
///
/// Returns whether the message passed the level filter.
pub(crate) fn library_message(level: LogLevel, message: &str) -> bool {
    if level < library_log_level() {
        return false;
    }
    if let Some(sink) = library_sink() {
        sink.log(level, message);
    } else if level >= LogLevel::Error {
        tracing::error!(target: "libinsane", error = message, "libinsane error");
    } else {
        tracing::debug!(target: "libinsane", %level, msg = message, "libinsane log message");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_raw_clamps() {
        assert_eq!(LogLevel::from_raw(-3), LogLevel::Debug);
        assert_eq!(LogLevel::from_raw(2), LogLevel::Warning);
        assert_eq!(LogLevel::from_raw(9), LogLevel::Error);
        assert!(LogLevel::Warning > LogLevel::Info);
    }

    // Level and sink are process-wide, so a single test covers both.
    #[test]
    fn test_library_messages_are_filtered_then_routed_to_sink() {
        // Default threshold is ERROR, as in libinsane's own tools.
        assert!(!library_message(LogLevel::Warning, "lamp warming up"));
        assert!(library_message(LogLevel::Error, "device vanished"));

        let sink = Arc::new(crate::mock::RecordingSink::default());
        set_library_sink(Some(sink.clone()));
        library_message(LogLevel::Info, "not forwarded");
        library_message(LogLevel::Error, "sane: device busy");
        set_library_sink(None);
        library_message(LogLevel::Error, "after unregistering");

        let messages = sink.messages();
        assert!(messages.contains(&(LogLevel::Error, "sane: device busy".to_string())));
        assert!(!messages.iter().any(|(_, msg)| msg == "not forwarded"));
        assert!(!messages.iter().any(|(_, msg)| msg == "after unregistering"));
    }
}
