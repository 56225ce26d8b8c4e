//! Bridge from the `log` facade to a logger supplied by the host app.

use std::sync::{Arc, OnceLock};

/// Receives the log output of the session core in the host app.
///
/// Exported via `UniFFI` so the app can route records into its own logging.
///
/// # Examples
///
/// ```rust
/// use agrokit_core::logger::{Logger, LogLevel};
///
/// struct ConsoleLogger;
///
/// impl Logger for ConsoleLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
///
/// ## React Native
///
/// ```typescript
/// import { setLogger, type Logger, LogLevel } from "agrokit-core";
///
/// class ConsoleBridge implements Logger {
///   log(level: LogLevel, message: string) {
///     console.log(`[agrokit:${LogLevel[level]}] ${message}`);
///   }
/// }
///
/// setLogger(new ConsoleBridge()); // once, at app start
/// ```
#[uniffi::export(with_foreign)]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    fn log(&self, level: LogLevel, message: String);
}

/// Severity of a forwarded log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum LogLevel {
    /// Very low priority, extremely detailed messages.
    Trace,
    /// Debugging information.
    Debug,
    /// Progress of session operations.
    Info,
    /// Recoverable problems, e.g. a failed best-effort lookup.
    Warn,
    /// Failed backend calls.
    Error,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Self::Error,
            log::Level::Warn => Self::Warn,
            log::Level::Info => Self::Info,
            log::Level::Debug => Self::Debug,
            log::Level::Trace => Self::Trace,
        }
    }
}

/// `log::Log` implementation forwarding to the registered foreign [`Logger`].
struct ForeignLogger;

impl ForeignLogger {
    /// Debug and trace records are only forwarded from our own crates.
    fn should_forward(metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Info || metadata.target().starts_with("agrokit")
    }
}

impl log::Log for ForeignLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        Self::should_forward(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(record.level().into(), format!("{}", record.args()));
        }
    }

    fn flush(&self) {}
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Call once at app start. Later calls are ignored.
#[uniffi::export]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        log::warn!("logger already set, ignoring");
        return;
    }

    static LOGGER: ForeignLogger = ForeignLogger;
    if let Err(e) = log::set_logger(&LOGGER) {
        // Another `log` implementation was installed first (e.g. by a test harness).
        eprintln!("failed to install agrokit logger: {e}");
        return;
    }
    log::set_max_level(log::LevelFilter::Trace);
}
