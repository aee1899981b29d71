//! Log Module

use colored::Colorize;
use std::sync::{Once, PoisonError, RwLock};

static INIT: Once = Once::new();
static LOG_LEVEL: RwLock<LogLevel> = RwLock::new(LogLevel::Info);

/// This enum is used to represent the different log levels
#[derive(PartialEq, PartialOrd, Debug, Clone, Copy)]
pub enum LogLevel {
    Debug,
    Info,
    Log,
    Warn,
    Error,
}

impl LogLevel {
    /// Parses a level name as accepted by `LICBUNDLE_LOG_LEVEL`.
    /// Unknown names fall back to `Log`.
    pub fn from_name(name: &str) -> LogLevel {
        match name.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "log" => LogLevel::Log,
            "warn" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Log,
        }
    }
}

/// Initializes the log level, which is called only once when the program starts
fn init_log_level() {
    let level = std::env::var("LICBUNDLE_LOG_LEVEL").unwrap_or_else(|_| "Info".to_string());
    let mut write_lock = LOG_LEVEL.write().unwrap_or_else(PoisonError::into_inner);
    *write_lock = LogLevel::from_name(&level);
}

/// Overrides the threshold, e.g. from a `--verbose` flag.
pub fn set_log_level(level: LogLevel) {
    INIT.call_once(|| {
        init_log_level();
    });
    let mut write_lock = LOG_LEVEL.write().unwrap_or_else(PoisonError::into_inner);
    *write_lock = level;
}

/// This function is used to log messages to the console
/// # Arguments
/// * `level` - The log level of the message
/// * `message` - The message to log
/// # Example
/// ```
/// use licbundle::utils::log::{log, LogLevel};
/// log(LogLevel::Info, "Hello World!");
/// log(LogLevel::Error, &format!("Something went wrong! {}", 42));
/// ```
///
/// # Level setting
/// The log level can be set by setting the environment variable `LICBUNDLE_LOG_LEVEL`
/// to one of the following values:
/// * `Debug`
/// * `Info`
/// * `Log`
/// * `Warn`
/// * `Error`
/// If the environment variable is not set, the default log level is `Info`
pub fn log(level: LogLevel, message: &str) {
    INIT.call_once(|| {
        init_log_level();
    });
    let level_str = match level {
        LogLevel::Debug => "[DEBUG]".purple(),
        LogLevel::Info => "[INFO]".blue(),
        LogLevel::Log => "[LOG]".green(),
        LogLevel::Warn => "[WARN]".yellow(),
        LogLevel::Error => "[ERROR]".red(),
    };
    let threshold = *LOG_LEVEL.read().unwrap_or_else(PoisonError::into_inner);
    if level < threshold {
        return;
    }
    // Diagnostics go to stderr so `list` output stays pipeable
    if level >= LogLevel::Warn {
        eprintln!("{} {}", level_str, message);
    } else {
        println!("{} {}", level_str, message);
    }
}
