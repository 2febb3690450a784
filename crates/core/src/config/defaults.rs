use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::types::{ConfigurationError, Result};

const APP_DIR: &str = "mcadminpanel";
const CONFIG_FILE: &str = "config.json";
const PID_FILE: &str = "agent.pid";
const LOG_FILE: &str = "agent.log";

pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const DEFAULT_DATE_FORMAT: &str = "%m-%d-%Y %H:%M:%S";
pub const DEFAULT_LOG_FORMAT: &str = "%(asctime)s - %(name)s - %(levelname)s - %(message)s";

/// Built-in settings every configuration is merged over.
///
/// All paths live under `<home>/mcadminpanel`. The value is computed once
/// from a home directory and never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
  root: PathBuf,
  pidfile: PathBuf,
  log_file: PathBuf,
  config_path: PathBuf,
}

impl Defaults {
  /// # Errors
  /// `NonUtf8Path` if `home` can't be written into a JSON configuration.
  pub fn for_home(home: impl AsRef<Path>) -> Result<Self> {
    let home = home.as_ref();
    if home.to_str().is_none() {
      return Err(ConfigurationError::NonUtf8Path(home.to_path_buf()));
    }
    let root = home.join(APP_DIR);
    Ok(Self {
      pidfile: root.join(PID_FILE),
      log_file: root.join(LOG_FILE),
      config_path: root.join(CONFIG_FILE),
      root,
    })
  }

  /// Defaults for the current user's home directory.
  ///
  /// # Errors
  /// `NoHomeDir` if the platform reports no home, `NonUtf8Path` if it is not
  /// valid UTF-8.
  pub fn from_env() -> Result<Self> {
    let home = dirs::home_dir().ok_or(ConfigurationError::NoHomeDir)?;
    Self::for_home(home)
  }

  #[must_use]
  pub fn root(&self) -> &Path {
    &self.root
  }

  #[must_use]
  pub fn pidfile(&self) -> &Path {
    &self.pidfile
  }

  #[must_use]
  pub fn log_file(&self) -> &Path {
    &self.log_file
  }

  /// Location of the configuration file used when none is given explicitly.
  #[must_use]
  pub fn config_path(&self) -> &Path {
    &self.config_path
  }

  /// The default settings as a JSON tree, ready to be merged over.
  #[must_use]
  pub fn tree(&self) -> Value {
    // Lossless: `for_home` only accepts UTF-8 homes.
    json!({
      "root": self.root.to_string_lossy(),
      "pidfile": self.pidfile.to_string_lossy(),
      "logging": {
        "level": DEFAULT_LOG_LEVEL,
        "file": self.log_file.to_string_lossy(),
        "date_format": DEFAULT_DATE_FORMAT,
        "format": DEFAULT_LOG_FORMAT,
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paths_live_under_app_dir() {
    let defaults = Defaults::for_home("/home/steve").unwrap();
    assert_eq!(defaults.root(), Path::new("/home/steve/mcadminpanel"));
    assert_eq!(defaults.pidfile(), Path::new("/home/steve/mcadminpanel/agent.pid"));
    assert_eq!(defaults.log_file(), Path::new("/home/steve/mcadminpanel/agent.log"));
    assert_eq!(
      defaults.config_path(),
      Path::new("/home/steve/mcadminpanel/config.json")
    );
  }

  #[test]
  fn tree_has_documented_shape() {
    let tree = Defaults::for_home("/home/steve").unwrap().tree();
    assert_eq!(tree["root"], "/home/steve/mcadminpanel");
    assert_eq!(tree["pidfile"], "/home/steve/mcadminpanel/agent.pid");
    assert_eq!(tree["logging"]["level"], "warn");
    assert_eq!(tree["logging"]["file"], "/home/steve/mcadminpanel/agent.log");
    assert_eq!(tree["logging"]["date_format"], DEFAULT_DATE_FORMAT);
    assert_eq!(tree["logging"]["format"], DEFAULT_LOG_FORMAT);
    assert_eq!(tree.as_object().map(|m| m.len()), Some(3));
  }

  #[test]
  fn tree_is_fresh_on_every_call() {
    let defaults = Defaults::for_home("/home/steve").unwrap();
    let mut first = defaults.tree();
    first["logging"]["level"] = Value::from("debug");
    assert_eq!(defaults.tree()["logging"]["level"], "warn");
  }

  #[test]
  fn non_utf8_home_is_rejected() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let home = Path::new(OsStr::from_bytes(b"/home/st\xffve"));
    match Defaults::for_home(home) {
      Err(ConfigurationError::NonUtf8Path(path)) => assert_eq!(path, home),
      other => panic!("unexpected result: {other:?}"),
    }
  }
}
