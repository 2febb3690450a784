use std::path::Path;

use mcadminpanel_core::{ConfigStore, LifecycleController, RunLoop};

use crate::util::errors::CliError;

/// Start the agent and block until it shuts down.
///
/// With `detach` the invoking process waits inside the detacher until the
/// daemon is serving and then exits 0. If the daemon fails first, its error
/// comes back here as `NotReady`.
pub fn run(config_path: Option<&Path>, detach: bool) -> Result<(), CliError> {
  let config = ConfigStore::from_env()?.load(config_path)?;
  // Bad logging settings must surface before the terminal is gone.
  let run_loop = RunLoop::new(&config)?;

  let mut controller = LifecycleController::new(&config);
  controller.start(detach, |context| run_loop.run(context))?;
  Ok(())
}
