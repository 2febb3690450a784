use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::{PrettyFormatter, Serializer};
use tracing::debug;

use super::defaults::Defaults;
use super::merge::merge;
use super::types::{Configuration, ConfigurationError, Result};

const INLINE_ORIGIN: &str = "<inline>";

/// Loads configuration documents and merges them over a fixed set of defaults.
#[derive(Debug, Clone)]
pub struct ConfigStore {
  defaults: Defaults,
}

impl ConfigStore {
  #[must_use]
  pub fn new(defaults: Defaults) -> Self {
    Self { defaults }
  }

  /// Store backed by the current user's defaults.
  ///
  /// # Errors
  /// Returns `ConfigurationError::NoHomeDir` if no home directory is known.
  pub fn from_env() -> Result<Self> {
    Defaults::from_env().map(Self::new)
  }

  #[must_use]
  pub fn defaults(&self) -> &Defaults {
    &self.defaults
  }

  #[must_use]
  pub fn default_path(&self) -> PathBuf {
    self.defaults.config_path().to_path_buf()
  }

  /// Load the configuration from `path`, or from the default location.
  ///
  /// An explicit path must be readable. A missing file at the default
  /// location yields the defaults alone.
  ///
  /// # Errors
  /// `Io` when the file cannot be read, `InvalidFormat` when it is not a
  /// JSON object, `InvalidValue` when a known key has the wrong type.
  pub fn load(&self, path: Option<&Path>) -> Result<Configuration> {
    let (path, explicit) = match path {
      Some(p) => (p.to_path_buf(), true),
      None => (self.default_path(), false),
    };

    let contents = match fs::read_to_string(&path) {
      Ok(contents) => contents,
      Err(err) if !explicit && err.kind() == io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no configuration file, using defaults");
        return Configuration::from_tree(self.defaults.tree(), &path.display().to_string());
      }
      Err(source) => return Err(ConfigurationError::Io { path, source }),
    };

    debug!(path = %path.display(), "loading configuration");
    self.parse(&contents, &path.display().to_string())
  }

  /// Merge an in-memory JSON document over the defaults.
  ///
  /// # Errors
  /// Same as [`ConfigStore::load`], minus I/O.
  pub fn load_str(&self, document: &str) -> Result<Configuration> {
    self.parse(document, INLINE_ORIGIN)
  }

  fn parse(&self, document: &str, origin: &str) -> Result<Configuration> {
    let overrides: Value =
      serde_json::from_str(document).map_err(|err| ConfigurationError::InvalidFormat {
        origin: origin.to_string(),
        reason: err.to_string(),
      })?;
    if !overrides.is_object() {
      return Err(ConfigurationError::InvalidFormat {
        origin: origin.to_string(),
        reason: "expected a JSON object at the top level".to_string(),
      });
    }
    Configuration::from_tree(merge(&self.defaults.tree(), &overrides), origin)
  }

  /// Write the default settings as a pretty-printed JSON document.
  ///
  /// # Errors
  /// Returns `ConfigurationError::Io` if the file cannot be written.
  pub fn save_defaults(&self, path: &Path) -> Result<()> {
    let io_failure = |source: io::Error| ConfigurationError::Io {
      path: path.to_path_buf(),
      source,
    };

    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    self
      .defaults
      .tree()
      .serialize(&mut ser)
      .map_err(|err| io_failure(err.into()))?;
    buf.push(b'\n');

    fs::write(path, buf).map_err(io_failure)?;
    debug!(path = %path.display(), "wrote default configuration");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn store() -> ConfigStore {
    ConfigStore::new(Defaults::for_home("/home/steve").unwrap())
  }

  #[test]
  fn default_path_is_under_home() {
    assert_eq!(
      store().default_path(),
      PathBuf::from("/home/steve/mcadminpanel/config.json")
    );
  }

  #[test]
  fn empty_document_gives_defaults() {
    let cfg = store().load_str("{}").unwrap();
    assert_eq!(cfg.root(), Path::new("/home/steve/mcadminpanel"));
    assert_eq!(cfg.pidfile(), Path::new("/home/steve/mcadminpanel/agent.pid"));
    assert_eq!(cfg.logging().level(), "warn");
    assert_eq!(cfg.tree(), &store().defaults().tree());
  }

  #[test]
  fn file_values_override_defaults() {
    let cfg = store().load_str(r#"{ "root": "test" }"#).unwrap();
    assert_eq!(cfg.root(), Path::new("test"));
    assert_eq!(cfg.pidfile(), Path::new("/home/steve/mcadminpanel/agent.pid"));
  }

  #[test]
  fn deep_merge_keeps_sibling_defaults() {
    let cfg = store().load_str(r#"{ "logging": { "level": "debug" } }"#).unwrap();
    assert_eq!(cfg.logging().level(), "debug");
    assert_eq!(
      cfg.logging().file(),
      Path::new("/home/steve/mcadminpanel/agent.log")
    );
    assert_eq!(cfg.logging().date_format(), "%m-%d-%Y %H:%M:%S");
  }

  #[test]
  fn unknown_keys_are_preserved() {
    let cfg = store()
      .load_str(r#"{ "test": "value", "key": "value", "logging": { "colour": true } }"#)
      .unwrap();
    assert_eq!(cfg.extra("test"), Some(&json!("value")));
    assert_eq!(cfg.extra("key"), Some(&json!("value")));
    assert_eq!(cfg.logging().extra("colour"), Some(&json!(true)));
    assert_eq!(cfg.tree()["test"], "value");
  }

  #[test]
  fn truncated_json_is_invalid_format() {
    let err = store().load_str("{").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidFormat { .. }), "{err:?}");
    assert!(err.to_string().starts_with("invalid format"));
  }

  #[test]
  fn non_object_document_is_invalid_format() {
    let err = store().load_str("[1, 2]").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidFormat { .. }), "{err:?}");
  }

  #[test]
  fn wrongly_typed_known_key_is_invalid_value() {
    let err = store().load_str(r#"{ "logging": { "level": 5 } }"#).unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }), "{err:?}");
  }
}
