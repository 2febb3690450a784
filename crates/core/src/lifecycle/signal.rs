use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal, kill};
use nix::unistd::Pid;
use tracing::info;

use super::LifecycleError;

/// Delivers the graceful termination request to a running agent.
pub trait Signaller {
  /// Request termination of `pid` without waiting for it to exit.
  ///
  /// # Errors
  /// `NoSuchProcess` if `pid` does not exist, `SignalFailed` otherwise.
  fn terminate(&self, pid: i32) -> Result<(), LifecycleError>;
}

/// Sends `SIGTERM` through `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NixSignaller;

impl Signaller for NixSignaller {
  fn terminate(&self, pid: i32) -> Result<(), LifecycleError> {
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
      Ok(()) => {
        info!(pid, "sent SIGTERM");
        Ok(())
      }
      Err(Errno::ESRCH) => Err(LifecycleError::NoSuchProcess { pid }),
      Err(errno) => Err(LifecycleError::SignalFailed {
        pid,
        source: errno.into(),
      }),
    }
  }
}

/// Signals that end a running agent.
const TERMINATION_SIGNALS: [Signal; 3] = [Signal::SIGTERM, Signal::SIGINT, Signal::SIGHUP];

fn termination_set() -> SigSet {
  let mut set = SigSet::empty();
  for signal in TERMINATION_SIGNALS {
    set.add(signal);
  }
  set
}

/// Keeps termination signals pending on the current thread.
///
/// Taken before the PID file is written so a `stop` that races startup is
/// held until the agent's handlers exist. Dropping it restores the mask the
/// thread had before.
#[derive(Debug)]
pub(super) struct TerminationMask {
  previous: SigSet,
}

impl TerminationMask {
  pub(super) fn block() -> Result<Self, LifecycleError> {
    let previous = termination_set()
      .thread_swap_mask(SigmaskHow::SIG_BLOCK)
      .map_err(|errno| LifecycleError::SignalMask(errno.into()))?;
    Ok(Self { previous })
  }

  /// Let held and future termination signals through to their handlers.
  pub(super) fn release(&self) -> Result<(), LifecycleError> {
    termination_set()
      .thread_unblock()
      .map_err(|errno| LifecycleError::SignalMask(errno.into()))
  }
}

impl Drop for TerminationMask {
  fn drop(&mut self) {
    let _ = self.previous.thread_set_mask();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::os::unix::process::ExitStatusExt;
  use std::process::Command;

  #[test]
  fn terminates_a_live_process() {
    let mut child = Command::new("sleep").arg("30").spawn().unwrap();
    NixSignaller.terminate(child.id() as i32).unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGTERM));
  }

  #[test]
  fn reaped_process_is_no_such_process() {
    let mut child = Command::new("true").spawn().unwrap();
    let pid = child.id() as i32;
    child.wait().unwrap();
    match NixSignaller.terminate(pid) {
      Err(LifecycleError::NoSuchProcess { pid: got }) => assert_eq!(got, pid),
      other => panic!("unexpected result: {other:?}"),
    }
  }

  fn blocked(signal: Signal) -> bool {
    SigSet::thread_get_mask().unwrap().contains(signal)
  }

  #[test]
  fn mask_holds_termination_signals_until_released() {
    let before = SigSet::thread_get_mask().unwrap();

    let mask = TerminationMask::block().unwrap();
    for signal in TERMINATION_SIGNALS {
      assert!(blocked(signal), "{signal} not blocked");
    }
    mask.release().unwrap();
    assert!(!blocked(Signal::SIGHUP));

    drop(mask);
    assert_eq!(SigSet::thread_get_mask().unwrap(), before);
  }

  #[test]
  fn dropping_the_mask_restores_the_previous_one() {
    let mut usr1 = SigSet::empty();
    usr1.add(Signal::SIGUSR1);
    usr1.thread_block().unwrap();

    drop(TerminationMask::block().unwrap());
    assert!(blocked(Signal::SIGUSR1));
    assert!(!blocked(Signal::SIGTERM));
    usr1.thread_unblock().unwrap();
  }
}
