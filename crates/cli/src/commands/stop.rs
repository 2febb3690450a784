use std::path::Path;

use mcadminpanel_core::{ConfigStore, LifecycleController};

use crate::util::errors::CliError;

pub fn run(config_path: Option<&Path>) -> Result<(), CliError> {
  let config = ConfigStore::from_env()?.load(config_path)?;
  let pid = LifecycleController::new(&config).stop()?;
  println!("Sent stop signal to agent (pid {pid})");
  Ok(())
}
