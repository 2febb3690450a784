use std::cell::RefCell;
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::LifecycleError;
use super::detach::Readiness;
use super::pidfile::PidLock;
use super::signal::TerminationMask;

/// Where the agent's standard streams point while it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdStreams {
  /// Redirected to `/dev/null` by detachment.
  Null,
  /// Still attached to the invoking terminal.
  Inherited,
}

/// The agent's process context: working directory set to the root and the
/// PID file held exclusively. Leaving the scope releases both.
///
/// Termination signals stay blocked on the entering thread until
/// [`release_signals`](Self::release_signals) is called, so they can't kill
/// the agent before its handlers are installed.
#[derive(Debug)]
pub struct DaemonContext {
  detached: bool,
  working_directory: PathBuf,
  previous_directory: Option<PathBuf>,
  lock: PidLock,
  signals: TerminationMask,
  readiness: RefCell<Option<Readiness>>,
}

impl DaemonContext {
  /// On failure the error is also reported through `readiness`.
  pub(super) fn enter(
    detached: bool,
    root: &Path,
    pidfile: &Path,
    readiness: Option<Readiness>,
  ) -> Result<Self, LifecycleError> {
    match Self::try_enter(detached, root, pidfile) {
      Ok(mut context) => {
        context.readiness = RefCell::new(readiness);
        Ok(context)
      }
      Err(err) => {
        if let Some(readiness) = readiness {
          readiness.fail(&err);
        }
        Err(err)
      }
    }
  }

  fn try_enter(detached: bool, root: &Path, pidfile: &Path) -> Result<Self, LifecycleError> {
    // Blocked before the PID is published; a stop can only follow that.
    let signals = TerminationMask::block()?;
    let previous_directory = env::current_dir().ok();
    env::set_current_dir(root).map_err(|source| LifecycleError::WorkingDirectory {
      path: root.to_path_buf(),
      source,
    })?;

    let lock = match PidLock::acquire(pidfile) {
      Ok(lock) => lock,
      Err(err) => {
        if let Some(previous) = &previous_directory {
          let _ = env::set_current_dir(previous);
        }
        return Err(err);
      }
    };
    debug!(root = %root.display(), detached, "entered agent context");

    Ok(Self {
      detached,
      working_directory: root.to_path_buf(),
      previous_directory,
      lock,
      signals,
      readiness: RefCell::new(None),
    })
  }

  /// Deliver termination signals, including any held since entering.
  ///
  /// Call once the handlers for them are registered.
  ///
  /// # Errors
  /// `SignalMask` if the thread's mask cannot be changed.
  pub fn release_signals(&self) -> Result<(), LifecycleError> {
    self.signals.release()
  }

  /// Tell the invoking process that the agent is serving. Only the first
  /// call has an effect; in the foreground it does nothing.
  pub fn notify_ready(&self) {
    if let Some(readiness) = self.readiness.borrow_mut().take() {
      readiness.ready();
    }
  }

  pub(super) fn take_readiness(&self) -> Option<Readiness> {
    self.readiness.borrow_mut().take()
  }

  #[must_use]
  pub fn is_detached(&self) -> bool {
    self.detached
  }

  #[must_use]
  pub fn streams(&self) -> StdStreams {
    if self.detached {
      StdStreams::Null
    } else {
      StdStreams::Inherited
    }
  }

  #[must_use]
  pub fn working_directory(&self) -> &Path {
    &self.working_directory
  }

  #[must_use]
  pub fn pid(&self) -> u32 {
    self.lock.pid()
  }

  #[must_use]
  pub fn pidfile(&self) -> &Path {
    self.lock.path()
  }
}

impl Drop for DaemonContext {
  fn drop(&mut self) {
    if let Some(previous) = &self.previous_directory {
      let _ = env::set_current_dir(previous);
    }
    debug!(pidfile = %self.lock.path().display(), "leaving agent context");
  }
}
