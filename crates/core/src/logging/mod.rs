mod format;

use std::fs;
use std::io;
use std::path::Path;

use chrono::format::{Item, StrftimeItems};
use tracing::debug;
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

use crate::config::{ConfigurationError, LoggingSettings};
use crate::error::AgentError;

pub use format::LogLineFormat;

/// Severity threshold of the agent's log sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Off,
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  /// Parse a level name, ignoring case.
  ///
  /// # Errors
  /// Returns `ConfigurationError::InvalidLogLevel` for unknown names.
  pub fn parse(name: &str) -> Result<Self, ConfigurationError> {
    match name.to_ascii_lowercase().as_str() {
      "critical" | "fatal" | "error" => Ok(LogLevel::Error),
      "warning" | "warn" => Ok(LogLevel::Warn),
      "info" => Ok(LogLevel::Info),
      "debug" => Ok(LogLevel::Debug),
      "notset" | "trace" => Ok(LogLevel::Trace),
      "off" => Ok(LogLevel::Off),
      _ => Err(ConfigurationError::InvalidLogLevel(name.to_string())),
    }
  }

  fn directive(self) -> &'static str {
    match self {
      LogLevel::Off => "off",
      LogLevel::Error => "error",
      LogLevel::Warn => "warn",
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

/// Reject strftime patterns chrono cannot render.
///
/// # Errors
/// Returns `ConfigurationError::InvalidDateFormat` naming the pattern.
pub fn validate_date_format(pattern: &str) -> Result<(), ConfigurationError> {
  if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
    return Err(ConfigurationError::InvalidDateFormat(pattern.to_string()));
  }
  Ok(())
}

/// Keeps the agent's subscriber installed; dropping it flushes the file sink.
#[must_use = "logging stops when the guard is dropped"]
pub struct LoggingGuard {
  _default: DefaultGuard,
  _worker: WorkerGuard,
}

/// Install the agent's log sinks on the current thread.
///
/// Lines always go to a daily rotating file next to `settings.file()`
/// (`<file>.YYYY-MM-DD`). In the foreground they are mirrored to stderr.
///
/// # Errors
/// `Configuration` for an invalid level or date format, `Logging` when the
/// log directory or file cannot be set up.
pub fn init(settings: &LoggingSettings, detached: bool) -> Result<LoggingGuard, AgentError> {
  let level = LogLevel::parse(settings.level())?;
  validate_date_format(settings.date_format())?;

  let file = settings.file();
  let dir = match file.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent,
    _ => Path::new("."),
  };
  fs::create_dir_all(dir)
    .map_err(|err| AgentError::Logging(format!("create {}: {err}", dir.display())))?;
  let prefix = file
    .file_name()
    .ok_or_else(|| AgentError::Logging(format!("{} has no file name", file.display())))?;

  let appender = RollingFileAppender::builder()
    .rotation(Rotation::DAILY)
    .filename_prefix(prefix.to_string_lossy())
    .build(dir)
    .map_err(|err| AgentError::Logging(err.to_string()))?;
  let (file_writer, worker) = tracing_appender::non_blocking(appender);

  let line_format = LogLineFormat::new(settings.format(), settings.date_format());
  let file_layer = fmt::layer()
    .event_format(line_format.clone())
    .with_ansi(false)
    .with_writer(file_writer);
  let console_layer = (!detached).then(|| {
    fmt::layer()
      .event_format(line_format)
      .with_writer(io::stderr)
  });

  let subscriber = Registry::default()
    .with(EnvFilter::new(level.directive()))
    .with(file_layer)
    .with(console_layer);
  let default = tracing::subscriber::set_default(subscriber);

  debug!(file = %file.display(), ?level, detached, "logging initialized");
  Ok(LoggingGuard {
    _default: default,
    _worker: worker,
  })
}
