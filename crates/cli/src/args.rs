use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args as ClapArgs, CommandFactory, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
  version,
  about = "MCAdminPanel agent: manages the game servers on this node",
  long_about = None,
  bin_name = "mcadminpanel-agent"
)]
pub struct Cli {
  /// Path to a configuration file
  #[arg(long, value_name = "PATH")]
  pub config: Option<PathBuf>,
  #[command(subcommand)]
  pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Start the agent
  Start(StartArgs),
  /// Stop the running agent
  Stop,
  /// Write a configuration file with the default settings
  #[command(alias = "generate_config")]
  GenerateConfig(GenerateConfigArgs),
}

#[derive(Debug, ClapArgs)]
pub struct StartArgs {
  /// Run the agent in the background (default)
  #[arg(long, overrides_with = "no_detach")]
  pub detach: bool,
  /// Keep the agent attached to this terminal
  #[arg(long, overrides_with = "detach")]
  pub no_detach: bool,
}

impl StartArgs {
  #[must_use]
  pub fn detach(&self) -> bool {
    !self.no_detach
  }
}

#[derive(Debug, ClapArgs)]
pub struct GenerateConfigArgs {
  /// Directory to create for the agent
  #[arg(long, value_name = "DIR")]
  pub path: Option<PathBuf>,
  /// Configuration file to write
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
  /// Replace an existing configuration file (true/false) without asking
  #[arg(
    long,
    value_name = "BOOL",
    action = ArgAction::Set,
    value_parser = BoolishValueParser::new()
  )]
  pub overwrite: Option<bool>,
}

impl Cli {
  pub fn print_help() {
    let mut cmd = Cli::command();
    let _ = cmd.print_help();
    println!();
  }
}
