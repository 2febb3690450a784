pub mod args;
pub mod commands;
pub mod util;

use clap::Parser;
use yansi::Paint;

pub use util::errors::{CliError, render_error};

use args::{Cli, Commands};
use util::tty::Tty;

/// Parse the process arguments and run the selected command.
///
/// # Errors
/// Any failure of the selected command.
pub fn run() -> Result<(), CliError> {
  // Parsing also handles --help/--version and exits on usage errors.
  let cli = Cli::parse();
  let Some(command) = cli.command else {
    Cli::print_help();
    return Ok(());
  };

  match command {
    Commands::Start(start) => commands::start::run(cli.config.as_deref(), start.detach()),
    Commands::Stop => commands::stop::run(cli.config.as_deref()),
    Commands::GenerateConfig(args) => commands::generate_config::run(&args, &Tty::new()),
  }
}

/// Print `err` as an `error: ...` line on stderr, red on a colour terminal.
pub fn report(err: &CliError) {
  yansi::whenever(yansi::Condition::TTY_AND_COLOR);
  eprintln!("{}", format!("error: {}", render_error(err)).red());
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::{CommandFactory, error::ErrorKind};

  #[test]
  fn help_flag_triggers_displayhelp() {
    let err = Cli::try_parse_from(["mcadminpanel-agent", "--help"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayHelp);
  }

  #[test]
  fn version_flag_triggers_displayversion() {
    let err = Cli::try_parse_from(["mcadminpanel-agent", "--version"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DisplayVersion);
  }

  #[test]
  fn unknown_subcommand_is_rejected() {
    let err = Cli::try_parse_from(["mcadminpanel-agent", "restart"]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
  }

  #[test]
  fn command_factory_builds() {
    Cli::command().debug_assert();
  }
}
