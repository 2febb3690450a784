use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use super::errors::CliError;

/// Prompts on stdin/stdout.
///
/// Answers are read from stdin whether or not it is a terminal, so piped
/// input works. End of input selects the prompt's default.
#[derive(Debug, Clone)]
pub struct Tty {
  is_interactive: bool,
}

impl Tty {
  #[must_use]
  pub fn new() -> Self {
    let stdin_tty = io::stdin().is_terminal();
    let stdout_tty = io::stdout().is_terminal();
    Self {
      is_interactive: stdin_tty && stdout_tty,
    }
  }

  /// Ask for a path, `default` on empty input.
  ///
  /// # Errors
  /// Returns `CliError::Prompt` if reading from stdin fails.
  pub fn prompt_path(&self, prompt: &str, default: &Path) -> Result<PathBuf, CliError> {
    print!("{prompt} [{}]: ", default.display());
    io::stdout().flush().ok();

    let input = self.read_answer()?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
      Ok(default.to_path_buf())
    } else {
      Ok(PathBuf::from(trimmed))
    }
  }

  /// Yes/no question, `default` on empty input or end of input.
  ///
  /// # Errors
  /// Returns `CliError::Prompt` if reading from stdin fails.
  pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool, CliError> {
    let suffix = if default { "[Y/n]" } else { "[y/N]" };
    print!("{prompt} {suffix}: ");
    io::stdout().flush().ok();

    let input = self.read_answer()?;
    Ok(parse_answer(&input, default))
  }

  fn read_answer(&self) -> Result<String, CliError> {
    let input = read_line()?;
    // A terminal echoes the newline; piped input does not.
    if !self.is_interactive {
      println!();
    }
    Ok(input)
  }
}

impl Default for Tty {
  fn default() -> Self {
    Self::new()
  }
}

fn parse_answer(input: &str, default: bool) -> bool {
  match input.trim().chars().next() {
    None => default,
    Some(first) => matches!(first, 'y' | 'Y'),
  }
}

fn read_line() -> Result<String, CliError> {
  let mut line = String::new();
  io::stdin()
    .lock()
    .read_line(&mut line)
    .map_err(CliError::Prompt)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
