use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Logging block of the configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggingSettings {
  level: String,
  file: PathBuf,
  date_format: String,
  format: String,
  #[serde(flatten)]
  extra: Map<String, Value>,
}

impl LoggingSettings {
  /// Severity name as written in the document; validated by the run loop.
  #[must_use]
  pub fn level(&self) -> &str {
    &self.level
  }

  #[must_use]
  pub fn file(&self) -> &Path {
    &self.file
  }

  /// strftime-style pattern for `%(asctime)s`.
  #[must_use]
  pub fn date_format(&self) -> &str {
    &self.date_format
  }

  /// Log line template, e.g. `%(asctime)s - %(levelname)s - %(message)s`.
  #[must_use]
  pub fn format(&self) -> &str {
    &self.format
  }

  #[must_use]
  pub fn extra(&self, key: &str) -> Option<&Value> {
    self.extra.get(key)
  }
}

/// Effective configuration after merging the defaults with the loaded file.
///
/// Keys the agent does not know about are kept and reachable through
/// [`Configuration::extra`] and [`Configuration::tree`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Configuration {
  root: PathBuf,
  pidfile: PathBuf,
  logging: LoggingSettings,
  #[serde(flatten)]
  extra: Map<String, Value>,
  #[serde(skip)]
  tree: Value,
}

impl Configuration {
  /// Build the typed view of a merged tree.
  ///
  /// # Errors
  /// Returns `ConfigurationError::InvalidValue` if a known key holds a value
  /// of the wrong type or a required key is missing.
  pub(crate) fn from_tree(tree: Value, origin: &str) -> Result<Self> {
    let mut cfg: Configuration =
      serde_json::from_value(tree.clone()).map_err(|err| ConfigurationError::InvalidValue {
        origin: origin.to_string(),
        reason: err.to_string(),
      })?;
    cfg.tree = tree;
    Ok(cfg)
  }

  /// Working directory of the agent.
  #[must_use]
  pub fn root(&self) -> &Path {
    &self.root
  }

  #[must_use]
  pub fn pidfile(&self) -> &Path {
    &self.pidfile
  }

  #[must_use]
  pub fn logging(&self) -> &LoggingSettings {
    &self.logging
  }

  /// Top-level key that is not part of the built-in defaults.
  #[must_use]
  pub fn extra(&self, key: &str) -> Option<&Value> {
    self.extra.get(key)
  }

  /// The full merged document.
  #[must_use]
  pub fn tree(&self) -> &Value {
    &self.tree
  }
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
  #[error("io failure: {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("invalid format: {origin}: {reason}")]
  InvalidFormat { origin: String, reason: String },
  #[error("invalid value: {origin}: {reason}")]
  InvalidValue { origin: String, reason: String },
  #[error("invalid log level: {0}")]
  InvalidLogLevel(String),
  #[error("invalid date format: {0}")]
  InvalidDateFormat(String),
  #[error("unable to resolve the home directory of the current user")]
  NoHomeDir,
  #[error("path is not valid UTF-8: {}", .0.display())]
  NonUtf8Path(PathBuf),
}

pub type Result<T> = std::result::Result<T, ConfigurationError>;
