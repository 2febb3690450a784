use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::fd::AsRawFd;

use nix::unistd::{ForkResult, fork, pipe, setsid};

use super::LifecycleError;

const READY: &str = "READY\n";

/// Turns the calling process into a background daemon.
pub trait Detacher {
  /// Returns only in the process that should keep running as the daemon.
  ///
  /// The returned [`Readiness`], if any, must be resolved once the daemon is
  /// serving or has failed to start; the invoking process waits on it.
  ///
  /// # Errors
  /// Returns `LifecycleError::Detach` if any step of the detachment fails.
  fn detach(&self) -> Result<Option<Readiness>, LifecycleError>;
}

/// Daemon end of the pipe the invoking process blocks on.
///
/// Dropping it unresolved tells the invoker the daemon died before it was
/// ready.
#[derive(Debug)]
pub struct Readiness {
  pipe: File,
}

impl Readiness {
  pub(super) fn ready(mut self) {
    let _ = self.pipe.write_all(READY.as_bytes());
  }

  pub(super) fn fail(mut self, reason: &dyn Display) {
    let _ = write!(self.pipe, "{reason}");
  }
}

/// Read the daemon's report until it closes its end of the pipe.
fn wait_until_ready(mut pipe: File) -> Result<(), LifecycleError> {
  let mut report = String::new();
  pipe
    .read_to_string(&mut report)
    .map_err(LifecycleError::Detach)?;
  match report.as_str() {
    READY => Ok(()),
    "" => Err(LifecycleError::NotReady {
      reason: "agent exited before becoming ready".to_string(),
    }),
    reason => Err(LifecycleError::NotReady {
      reason: reason.trim_end().to_string(),
    }),
  }
}

/// Classic double fork: the daemon is not a session leader, has no
/// controlling terminal, and its standard streams point at `/dev/null`.
///
/// The invoking process stays until the daemon reports through the returned
/// [`Readiness`], then exits 0, or returns `NotReady` with the daemon's reason.
#[derive(Debug, Default, Clone, Copy)]
pub struct ForkDetacher;

impl Detacher for ForkDetacher {
  fn detach(&self) -> Result<Option<Readiness>, LifecycleError> {
    let (waiting, reporting) = pipe().map_err(|errno| LifecycleError::Detach(errno.into()))?;

    // Only called before the agent starts any thread.
    match unsafe { fork() }.map_err(|errno| LifecycleError::Detach(errno.into()))? {
      ForkResult::Parent { .. } => {
        drop(reporting);
        wait_until_ready(File::from(waiting))?;
        std::process::exit(0)
      }
      ForkResult::Child => drop(waiting),
    }

    setsid().map_err(|errno| LifecycleError::Detach(errno.into()))?;
    fork_and_exit_parent()?;
    redirect_std_streams()?;
    Ok(Some(Readiness {
      pipe: File::from(reporting),
    }))
  }
}

fn fork_and_exit_parent() -> Result<(), LifecycleError> {
  match unsafe { fork() }.map_err(|errno| LifecycleError::Detach(errno.into()))? {
    ForkResult::Parent { .. } => std::process::exit(0),
    ForkResult::Child => Ok(()),
  }
}

fn redirect_std_streams() -> Result<(), LifecycleError> {
  let null = OpenOptions::new()
    .read(true)
    .write(true)
    .open("/dev/null")
    .map_err(LifecycleError::Detach)?;
  for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
    let rc = unsafe { libc::dup2(null.as_raw_fd(), target) };
    if rc < 0 {
      return Err(LifecycleError::Detach(io::Error::last_os_error()));
    }
  }
  Ok(())
}

/// A readiness pipe whose waiting end stays in the calling process.
#[cfg(test)]
pub(super) fn readiness_pair() -> (Readiness, impl FnOnce() -> Result<(), LifecycleError>) {
  let (waiting, reporting) = pipe().unwrap();
  let readiness = Readiness {
    pipe: File::from(reporting),
  };
  (readiness, move || wait_until_ready(File::from(waiting)))
}
