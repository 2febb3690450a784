use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// Temporary home directory for tests.
/// Mirrors the agent's default layout under `<home>/mcadminpanel`.
pub struct TempHome {
  pub root: tempfile::TempDir,
}

impl Default for TempHome {
  fn default() -> Self {
    Self::new()
  }
}

impl TempHome {
  pub fn new() -> Self {
    let root = tempfile::tempdir().expect("tempdir");
    Self { root }
  }

  pub fn path(&self) -> PathBuf {
    self.root.path().to_path_buf()
  }

  /// Create `<home>/mcadminpanel` and return it.
  pub fn app_dir(&self) -> PathBuf {
    let p = self.path().join("mcadminpanel");
    std::fs::create_dir_all(&p).expect("mkdir mcadminpanel");
    p
  }

  pub fn config_path(&self) -> PathBuf {
    self.path().join("mcadminpanel").join("config.json")
  }

  pub fn pidfile(&self) -> PathBuf {
    self.path().join("mcadminpanel").join("agent.pid")
  }

  /// Write `doc` to the default config location.
  pub fn write_config(&self, doc: &serde_json::Value) -> PathBuf {
    self.app_dir();
    let path = self.config_path();
    std::fs::write(&path, serde_json::to_string_pretty(doc).unwrap()).expect("write config");
    path
  }
}

/// Poll a condition repeatedly until it returns true or times out.
/// Returns true if condition met, false on timeout.
pub fn poll_until<F>(timeout: Duration, interval: Duration, mut check: F) -> bool
where
  F: FnMut() -> bool,
{
  let start = Instant::now();
  loop {
    if check() {
      return true;
    }
    if start.elapsed() >= timeout {
      return false;
    }
    thread::sleep(interval);
  }
}

/// First dated log file (`<prefix>.YYYY-MM-DD`) in `dir`, if any.
pub fn find_log_file(dir: &Path, prefix: &str) -> Option<PathBuf> {
  let dated = format!("{prefix}.");
  let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
    .ok()?
    .filter_map(|entry| entry.ok())
    .map(|entry| entry.path())
    .filter(|p| {
      p.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(&dated))
    })
    .collect();
  found.sort();
  found.into_iter().next()
}
