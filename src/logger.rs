//! Structured console logging for nasbridge
//!
//! Provides tag + level logging with:
//! - Standard log levels (Error/Warning/Info/Debug)
//! - Per-module debug control via --debug-<module> flags
//! - Colored console output with timestamps
//!
//! Errors are always shown. Debug messages only appear when the matching
//! --debug-<module> flag was passed on the command line.

use chrono::Utc;
use colored::*;

use crate::arguments;

/// Log levels ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Module tags for log routing and debug gating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTag {
    System,
    Config,
    Engine,
    Breaker,
    Hub,
    Webserver,
    Poller,
}

impl LogTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Engine => "ENGINE",
            LogTag::Breaker => "BREAKER",
            LogTag::Hub => "HUB",
            LogTag::Webserver => "WEBSERVER",
            LogTag::Poller => "POLLER",
        }
    }

    /// Whether debug logging is enabled for this tag
    fn debug_enabled(&self) -> bool {
        match self {
            LogTag::System | LogTag::Config => arguments::is_any_debug_enabled(),
            LogTag::Engine => arguments::is_debug_engine_enabled(),
            LogTag::Breaker => arguments::is_debug_breaker_enabled(),
            LogTag::Hub | LogTag::Webserver => arguments::is_debug_webserver_enabled(),
            LogTag::Poller => arguments::is_debug_poller_enabled(),
        }
    }
}

/// Initialize the logger system
///
/// Call once at application startup, before any logging occurs.
pub fn init() {
    // Argument storage is lazily initialized; touching it here makes sure the
    // first log call doesn't pay for it.
    let _ = arguments::get_cmd_args();
}

/// Log at ERROR level (always shown)
pub fn error(tag: LogTag, message: &str) {
    write_line(tag, LogLevel::Error, message);
}

/// Log at WARNING level
pub fn warning(tag: LogTag, message: &str) {
    write_line(tag, LogLevel::Warning, message);
}

/// Log at INFO level
pub fn info(tag: LogTag, message: &str) {
    write_line(tag, LogLevel::Info, message);
}

/// Log at DEBUG level (gated by --debug-<module>)
pub fn debug(tag: LogTag, message: &str) {
    if !tag.debug_enabled() {
        return;
    }
    write_line(tag, LogLevel::Debug, message);
}

fn write_line(tag: LogTag, level: LogLevel, message: &str) {
    let timestamp = Utc::now().format("%H:%M:%S%.3f").to_string();
    let tag_str = match level {
        LogLevel::Error => tag.as_str().red().bold(),
        LogLevel::Warning => tag.as_str().yellow().bold(),
        LogLevel::Info => tag.as_str().cyan().bold(),
        LogLevel::Debug => tag.as_str().purple().bold(),
    };
    let body = match level {
        LogLevel::Error => message.red().to_string(),
        LogLevel::Warning => message.yellow().to_string(),
        LogLevel::Debug => message.dimmed().to_string(),
        LogLevel::Info => message.to_string(),
    };
    println!(
        "{} {} {} {}",
        format!("[{}]", timestamp).dimmed(),
        level.as_str().bold(),
        tag_str,
        body
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn test_tag_names() {
        assert_eq!(LogTag::Breaker.as_str(), "BREAKER");
        assert_eq!(LogTag::Webserver.as_str(), "WEBSERVER");
    }
}
