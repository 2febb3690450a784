use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::LifecycleError;

/// Exclusive lock on the agent PID file.
///
/// Holding the value means this process is the running agent and the file
/// contains its PID. Dropping it removes the file and releases the lock.
#[derive(Debug)]
pub struct PidLock {
  path: PathBuf,
  file: File,
  pid: u32,
}

impl PidLock {
  /// Lock `path` and record the current PID in it.
  ///
  /// # Errors
  /// `AlreadyRunning` if another holder has the lock, `PidFileIo` if the file
  /// cannot be opened or written, `Lock` for any other locking failure.
  pub fn acquire(path: &Path) -> Result<Self, LifecycleError> {
    // Never truncate before holding the lock: the current holder's PID must
    // survive a failed attempt.
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(path)
      .map_err(|source| pid_file_io(path, source))?;
    try_lock(&file, path)?;

    let pid = std::process::id();
    file.set_len(0).map_err(|source| pid_file_io(path, source))?;
    file
      .seek(SeekFrom::Start(0))
      .map_err(|source| pid_file_io(path, source))?;
    writeln!(file, "{pid}").map_err(|source| pid_file_io(path, source))?;
    file.sync_all().map_err(|source| pid_file_io(path, source))?;

    debug!(pidfile = %path.display(), pid, "acquired pid file lock");
    Ok(Self {
      path: path.to_path_buf(),
      file,
      pid,
    })
  }

  /// Check that nobody holds the lock on `path` without taking it.
  ///
  /// # Errors
  /// `AlreadyRunning` if the lock is held, `PidFileIo` or `Lock` on failure.
  pub fn ensure_free(path: &Path) -> Result<(), LifecycleError> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
      Ok(file) => file,
      Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
      Err(source) => return Err(pid_file_io(path, source)),
    };
    try_lock(&file, path)?;
    let _ = FileExt::unlock(&file);
    Ok(())
  }

  #[must_use]
  pub fn path(&self) -> &Path {
    &self.path
  }

  #[must_use]
  pub fn pid(&self) -> u32 {
    self.pid
  }
}

impl Drop for PidLock {
  fn drop(&mut self) {
    // Remove while still locked so a new agent never loses its fresh file.
    let _ = fs::remove_file(&self.path);
    let _ = FileExt::unlock(&self.file);
    debug!(pidfile = %self.path.display(), "released pid file lock");
  }
}

/// Read the PID recorded in `path`.
///
/// # Errors
/// `PidFileIo` if the file is missing or unreadable, `InvalidPid` if it does
/// not hold a positive decimal integer.
pub fn read_pid(path: &Path) -> Result<i32, LifecycleError> {
  let content = fs::read_to_string(path).map_err(|source| pid_file_io(path, source))?;
  parse_pid(&content).ok_or_else(|| LifecycleError::InvalidPid {
    path: path.to_path_buf(),
    content: content.trim().to_string(),
  })
}

fn parse_pid(content: &str) -> Option<i32> {
  let pid: i32 = content.trim().parse().ok()?;
  (pid > 0).then_some(pid)
}

fn try_lock(file: &File, path: &Path) -> Result<(), LifecycleError> {
  match file.try_lock_exclusive() {
    Ok(()) => Ok(()),
    Err(err) if is_contended(&err) => Err(LifecycleError::AlreadyRunning {
      pidfile: path.to_path_buf(),
      pid: read_pid(path).ok(),
    }),
    Err(source) => Err(LifecycleError::Lock {
      pidfile: path.to_path_buf(),
      source,
    }),
  }
}

fn is_contended(err: &io::Error) -> bool {
  err.kind() == io::ErrorKind::WouldBlock
    || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn pid_file_io(path: &Path, source: io::Error) -> LifecycleError {
  LifecycleError::PidFileIo {
    path: path.to_path_buf(),
    source,
  }
}
