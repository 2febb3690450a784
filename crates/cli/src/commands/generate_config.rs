use std::fs;

use mcadminpanel_core::ConfigStore;

use crate::args::GenerateConfigArgs;
use crate::util::errors::CliError;
use crate::util::tty::Tty;

pub fn run(args: &GenerateConfigArgs, tty: &Tty) -> Result<(), CliError> {
  generate(&ConfigStore::from_env()?, args, tty)
}

/// Create the agent directory and write the defaults into the config file.
///
/// Missing flags are asked for interactively. An existing file is only
/// replaced with `--overwrite true` or a confirmed prompt.
pub fn generate(store: &ConfigStore, args: &GenerateConfigArgs, tty: &Tty) -> Result<(), CliError> {
  let dir = match &args.path {
    Some(dir) => dir.clone(),
    None => tty.prompt_path("Directory", store.defaults().root())?,
  };
  let file = match &args.config {
    Some(file) => file.clone(),
    None => tty.prompt_path("Config file", &store.default_path())?,
  };

  fs::create_dir_all(&dir).map_err(|source| CliError::Io {
    path: dir.clone(),
    source,
  })?;

  if file.exists() {
    let overwrite = match args.overwrite {
      Some(overwrite) => overwrite,
      None => tty.confirm(&format!("{} already exists. Overwrite?", file.display()), false)?,
    };
    if !overwrite {
      return Err(CliError::Aborted);
    }
  }

  store.save_defaults(&file)?;
  println!("Wrote default configuration to {}", file.display());
  Ok(())
}
