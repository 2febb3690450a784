//! Process lifecycle of the agent itself.
//!
//! `start` optionally detaches into a daemon, takes the PID file lock, and
//! runs the supplied body inside a [`DaemonContext`]. `stop` reads the PID
//! file from another invocation and asks that process to terminate.

mod context;
mod detach;
mod pidfile;
mod signal;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::Configuration;
use crate::error::AgentError;

pub use context::{DaemonContext, StdStreams};
pub use detach::{Detacher, ForkDetacher, Readiness};
pub use pidfile::{PidLock, read_pid};
pub use signal::{NixSignaller, Signaller};

#[derive(Debug, Error)]
pub enum LifecycleError {
  #[error("agent already running (pid file {} is locked{})", pidfile.display(), running_pid(*pid))]
  AlreadyRunning { pidfile: PathBuf, pid: Option<i32> },
  #[error("unable to lock pid file {}: {source}", pidfile.display())]
  Lock {
    pidfile: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("unable to access pid file {}: {source}", path.display())]
  PidFileIo {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("pid file {} does not contain a process id: {content:?}", path.display())]
  InvalidPid { path: PathBuf, content: String },
  #[error("no process with pid {pid}")]
  NoSuchProcess { pid: i32 },
  #[error("unable to signal pid {pid}: {source}")]
  SignalFailed {
    pid: i32,
    #[source]
    source: io::Error,
  },
  #[error("unable to detach from the terminal: {0}")]
  Detach(#[source] io::Error),
  #[error("agent did not start: {reason}")]
  NotReady { reason: String },
  #[error("unable to change the signal mask: {0}")]
  SignalMask(#[source] io::Error),
  #[error("unable to use {} as working directory: {source}", path.display())]
  WorkingDirectory {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("cannot {action} an agent that is {state}")]
  InvalidTransition {
    action: &'static str,
    state: LifecycleState,
  },
}

fn running_pid(pid: Option<i32>) -> String {
  pid.map(|p| format!(" by pid {p}")).unwrap_or_default()
}

/// Where a controller is in the agent's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  NotStarted,
  Detached,
  Foreground,
  Stopped,
}

impl std::fmt::Display for LifecycleState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      LifecycleState::NotStarted => "not started",
      LifecycleState::Detached => "running detached",
      LifecycleState::Foreground => "running in the foreground",
      LifecycleState::Stopped => "stopped",
    };
    f.write_str(name)
  }
}

/// Starts the agent in a daemon context or stops a running agent.
#[derive(Debug)]
pub struct LifecycleController<D = ForkDetacher, S = NixSignaller> {
  root: PathBuf,
  pidfile: PathBuf,
  detacher: D,
  signaller: S,
  state: LifecycleState,
}

impl LifecycleController {
  /// Controller that really forks and really sends signals.
  #[must_use]
  pub fn new(config: &Configuration) -> Self {
    Self::with_collaborators(config, ForkDetacher, NixSignaller)
  }
}

impl<D: Detacher, S: Signaller> LifecycleController<D, S> {
  #[must_use]
  pub fn with_collaborators(config: &Configuration, detacher: D, signaller: S) -> Self {
    let root = config.root().to_path_buf();
    // A relative pid file is relative to the agent's working directory.
    let pidfile = root.join(config.pidfile());
    Self {
      root,
      pidfile,
      detacher,
      signaller,
      state: LifecycleState::NotStarted,
    }
  }

  #[must_use]
  pub fn state(&self) -> LifecycleState {
    self.state
  }

  #[must_use]
  pub fn pidfile(&self) -> &Path {
    &self.pidfile
  }

  /// Enter the daemon context and run `body` inside it.
  ///
  /// The PID file lock is released and the file removed when `body` returns,
  /// fails, or unwinds. `body` must call [`DaemonContext::release_signals`]
  /// once it handles termination, and [`DaemonContext::notify_ready`] to let
  /// a detaching invocation exit. If `body` fails before that, its error is
  /// reported to the invocation instead.
  ///
  /// # Errors
  /// Lifecycle failures before `body` runs, or whatever `body` returns.
  pub fn start<F, T>(&mut self, detach: bool, body: F) -> Result<T, AgentError>
  where
    F: FnOnce(&DaemonContext) -> Result<T, AgentError>,
  {
    if self.state != LifecycleState::NotStarted {
      return Err(
        LifecycleError::InvalidTransition {
          action: "start",
          state: self.state,
        }
        .into(),
      );
    }

    if !self.root.is_dir() {
      return Err(
        LifecycleError::WorkingDirectory {
          path: self.root.clone(),
          source: io::Error::new(io::ErrorKind::NotFound, "not a directory"),
        }
        .into(),
      );
    }
    // Report a running agent here, while the caller still has a terminal.
    PidLock::ensure_free(&self.pidfile)?;

    let readiness = if detach {
      self.detacher.detach()?
    } else {
      None
    };
    let context = DaemonContext::enter(detach, &self.root, &self.pidfile, readiness)?;
    self.state = if detach {
      LifecycleState::Detached
    } else {
      LifecycleState::Foreground
    };

    let result = body(&context);
    let pending = context.take_readiness();
    // The PID file is gone before the invoker hears about a failure.
    drop(context);
    if let (Some(readiness), Err(err)) = (pending, &result) {
      readiness.fail(err);
    }
    self.state = LifecycleState::Stopped;
    result
  }

  /// Ask the agent recorded in the PID file to terminate.
  ///
  /// Returns once the signal is sent; the target may still be running.
  ///
  /// # Errors
  /// `PidFileIo`/`InvalidPid` if the PID file cannot be used, and whatever
  /// the signaller reports (e.g. `NoSuchProcess`).
  pub fn stop(&mut self) -> Result<i32, LifecycleError> {
    let pid = read_pid(&self.pidfile)?;
    self.signaller.terminate(pid)?;
    info!(pid, pidfile = %self.pidfile.display(), "requested agent shutdown");
    self.state = LifecycleState::Stopped;
    Ok(pid)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{ConfigStore, Defaults};
  use serial_test::serial;
  use std::cell::{Cell, RefCell};
  use std::fs;
  use std::rc::Rc;

  #[derive(Default, Clone)]
  struct RecordingDetacher {
    calls: Rc<Cell<usize>>,
  }

  impl Detacher for RecordingDetacher {
    fn detach(&self) -> Result<Option<Readiness>, LifecycleError> {
      self.calls.set(self.calls.get() + 1);
      Ok(None)
    }
  }

  /// Stays in this process but hands out a real readiness pipe.
  struct PipeDetacher {
    wait: RefCell<Option<Box<dyn FnOnce() -> Result<(), LifecycleError>>>>,
  }

  impl PipeDetacher {
    fn new() -> Self {
      Self {
        wait: RefCell::new(None),
      }
    }

    fn invoker_result(&self) -> Result<(), LifecycleError> {
      let wait = self.wait.borrow_mut().take().expect("detach was called");
      wait()
    }
  }

  impl Detacher for PipeDetacher {
    fn detach(&self) -> Result<Option<Readiness>, LifecycleError> {
      let (readiness, wait) = detach::readiness_pair();
      *self.wait.borrow_mut() = Some(Box::new(wait));
      Ok(Some(readiness))
    }
  }

  #[derive(Default, Clone)]
  struct RecordingSignaller {
    sent: Rc<RefCell<Vec<i32>>>,
    missing: bool,
  }

  impl Signaller for RecordingSignaller {
    fn terminate(&self, pid: i32) -> Result<(), LifecycleError> {
      if self.missing {
        return Err(LifecycleError::NoSuchProcess { pid });
      }
      self.sent.borrow_mut().push(pid);
      Ok(())
    }
  }

  fn config_in(root: &Path) -> Configuration {
    let doc = serde_json::json!({ "root": root, "pidfile": "agent.pid" }).to_string();
    ConfigStore::new(Defaults::for_home(root).unwrap())
      .load_str(&doc)
      .unwrap()
  }

  fn controller(
    config: &Configuration,
  ) -> (
    LifecycleController<RecordingDetacher, RecordingSignaller>,
    RecordingDetacher,
    RecordingSignaller,
  ) {
    let detacher = RecordingDetacher::default();
    let signaller = RecordingSignaller::default();
    let ctl = LifecycleController::with_collaborators(config, detacher.clone(), signaller.clone());
    (ctl, detacher, signaller)
  }

  #[test]
  #[serial]
  fn foreground_start_runs_body_in_root_and_cleans_up() {
    let td = tempfile::tempdir().unwrap();
    let root = td.path().canonicalize().unwrap();
    let config = config_in(&root);
    let (mut ctl, detacher, _) = controller(&config);
    let before = std::env::current_dir().unwrap();

    let seen = ctl
      .start(false, |ctx| {
        assert!(!ctx.is_detached());
        assert_eq!(ctx.streams(), StdStreams::Inherited);
        assert_eq!(std::env::current_dir().unwrap(), root);
        assert_eq!(ctx.working_directory(), root.as_path());
        let recorded = read_pid(ctx.pidfile()).unwrap();
        Ok(recorded)
      })
      .unwrap();

    assert_eq!(seen, std::process::id() as i32);
    assert_eq!(detacher.calls.get(), 0);
    assert_eq!(ctl.state(), LifecycleState::Stopped);
    assert!(!root.join("agent.pid").exists());
    assert_eq!(std::env::current_dir().unwrap(), before);
  }

  #[test]
  #[serial]
  fn detached_start_calls_detacher_once() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let (mut ctl, detacher, _) = controller(&config);

    ctl
      .start(true, |ctx| {
        assert!(ctx.is_detached());
        assert_eq!(ctx.streams(), StdStreams::Null);
        Ok(())
      })
      .unwrap();
    assert_eq!(detacher.calls.get(), 1);
  }

  #[test]
  #[serial]
  fn termination_signals_wait_inside_the_body_until_released() {
    use nix::sys::signal::{SigSet, Signal};
    let blocked = || SigSet::thread_get_mask().unwrap().contains(Signal::SIGTERM);

    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let (mut ctl, _, _) = controller(&config);

    ctl
      .start(false, |ctx| {
        assert!(ctx.pidfile().exists());
        assert!(blocked(), "SIGTERM deliverable before handlers exist");
        ctx.release_signals()?;
        assert!(!blocked());
        Ok(())
      })
      .unwrap();
    assert!(!blocked());
  }

  #[test]
  #[serial]
  fn notify_ready_releases_the_invoker() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let mut ctl = LifecycleController::with_collaborators(
      &config,
      PipeDetacher::new(),
      RecordingSignaller::default(),
    );

    ctl
      .start(true, |ctx| {
        ctx.notify_ready();
        ctx.notify_ready();
        Ok(())
      })
      .unwrap();
    ctl.detacher.invoker_result().unwrap();
  }

  #[test]
  #[serial]
  fn body_failure_before_ready_reaches_the_invoker() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let mut ctl = LifecycleController::with_collaborators(
      &config,
      PipeDetacher::new(),
      RecordingSignaller::default(),
    );

    let err = ctl
      .start(true, |_| -> Result<(), AgentError> {
        Err(AgentError::Logging("create /nowhere: permission denied".into()))
      })
      .unwrap_err();
    assert!(matches!(err, AgentError::Logging(_)));
    assert!(!td.path().join("agent.pid").exists());

    match ctl.detacher.invoker_result() {
      Err(LifecycleError::NotReady { reason }) => {
        assert_eq!(reason, "unable to initialize logging: create /nowhere: permission denied");
      }
      other => panic!("unexpected result: {other:?}"),
    }
  }

  #[test]
  #[serial]
  fn lock_failure_after_detaching_reaches_the_invoker() {
    let td = tempfile::tempdir().unwrap();
    let pidfile = td.path().join("agent.pid");
    // Another agent takes the lock after the pre-detach check, before the daemon's acquire.
    let _other = PidLock::acquire(&pidfile).unwrap();
    let detacher = PipeDetacher::new();

    let readiness = detacher.detach().unwrap();
    let err = DaemonContext::enter(true, td.path(), &pidfile, readiness).unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRunning { .. }), "{err:?}");

    let reported = detacher.invoker_result().unwrap_err();
    assert!(reported.to_string().contains("already running"), "{reported}");
  }

  #[test]
  #[serial]
  fn held_lock_fails_before_detaching_or_running_body() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let _held = PidLock::acquire(&td.path().join("agent.pid")).unwrap();
    let (mut ctl, detacher, _) = controller(&config);

    let mut ran = false;
    let err = ctl
      .start(true, |_| {
        ran = true;
        Ok(())
      })
      .unwrap_err();

    assert!(
      matches!(
        err,
        AgentError::Lifecycle(LifecycleError::AlreadyRunning { .. })
      ),
      "{err:?}"
    );
    assert!(!ran);
    assert_eq!(detacher.calls.get(), 0);
    assert_eq!(ctl.state(), LifecycleState::NotStarted);
  }

  #[test]
  #[serial]
  fn body_error_still_removes_pidfile() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let (mut ctl, _, _) = controller(&config);

    let err = ctl
      .start(false, |_| -> Result<(), AgentError> {
        Err(AgentError::Logging("boom".into()))
      })
      .unwrap_err();
    assert!(matches!(err, AgentError::Logging(_)));
    assert!(!td.path().join("agent.pid").exists());
  }

  #[test]
  #[serial]
  fn missing_root_is_working_directory_error() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(&td.path().join("nope"));
    let (mut ctl, _, _) = controller(&config);
    let err = ctl.start(false, |_| Ok(())).unwrap_err();
    assert!(matches!(
      err,
      AgentError::Lifecycle(LifecycleError::WorkingDirectory { .. })
    ));
  }

  #[test]
  #[serial]
  fn second_start_is_invalid_transition() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let (mut ctl, _, _) = controller(&config);
    ctl.start(false, |_| Ok(())).unwrap();

    let err = ctl.start(false, |_| Ok(())).unwrap_err();
    assert!(matches!(
      err,
      AgentError::Lifecycle(LifecycleError::InvalidTransition {
        state: LifecycleState::Stopped,
        ..
      })
    ));
  }

  #[test]
  fn stop_signals_recorded_pid_and_leaves_file() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    fs::write(td.path().join("agent.pid"), "4242\n").unwrap();
    let (mut ctl, _, signaller) = controller(&config);

    assert_eq!(ctl.stop().unwrap(), 4242);
    assert_eq!(*signaller.sent.borrow(), vec![4242]);
    assert!(td.path().join("agent.pid").exists());
  }

  #[test]
  fn stop_without_pidfile_is_pid_file_io() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    let (mut ctl, _, signaller) = controller(&config);
    assert!(matches!(ctl.stop(), Err(LifecycleError::PidFileIo { .. })));
    assert!(signaller.sent.borrow().is_empty());
  }

  #[test]
  fn stop_propagates_no_such_process() {
    let td = tempfile::tempdir().unwrap();
    let config = config_in(td.path());
    fs::write(td.path().join("agent.pid"), "77").unwrap();
    let signaller = RecordingSignaller {
      missing: true,
      ..Default::default()
    };
    let mut ctl =
      LifecycleController::with_collaborators(&config, RecordingDetacher::default(), signaller);
    assert!(matches!(
      ctl.stop(),
      Err(LifecycleError::NoSuchProcess { pid: 77 })
    ));
  }

  #[test]
  fn already_running_message_names_the_pid() {
    let err = LifecycleError::AlreadyRunning {
      pidfile: PathBuf::from("/tmp/agent.pid"),
      pid: Some(12),
    };
    assert_eq!(
      err.to_string(),
      "agent already running (pid file /tmp/agent.pid is locked by pid 12)"
    );
  }
}
