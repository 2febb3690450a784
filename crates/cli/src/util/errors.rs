use std::io;
use std::path::PathBuf;

use mcadminpanel_core::{AgentError, ConfigurationError, LifecycleError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
  #[error(transparent)]
  Agent(#[from] AgentError),
  #[error("{}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
  #[error("failed to read from stdin: {0}")]
  Prompt(#[source] io::Error),
  #[error("Aborted!")]
  Aborted,
}

impl From<ConfigurationError> for CliError {
  fn from(err: ConfigurationError) -> Self {
    CliError::Agent(err.into())
  }
}

impl From<LifecycleError> for CliError {
  fn from(err: LifecycleError) -> Self {
    CliError::Agent(err.into())
  }
}

/// One-line message for the operator, with a hint for the usual stop mistakes.
#[must_use]
pub fn render_error(err: &CliError) -> String {
  match err {
    CliError::Agent(AgentError::Lifecycle(LifecycleError::NoSuchProcess { pid })) => {
      format!("{err}; the pid file is stale, agent {pid} is not running")
    }
    CliError::Agent(AgentError::Lifecycle(LifecycleError::PidFileIo { source, .. }))
      if source.kind() == io::ErrorKind::NotFound =>
    {
      format!("{err}; is the agent running?")
    }
    _ => err.to_string(),
  }
}
