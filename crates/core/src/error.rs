use std::io;

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::lifecycle::LifecycleError;

/// Top-level failure of an agent operation.
#[derive(Debug, Error)]
pub enum AgentError {
  #[error(transparent)]
  Configuration(#[from] ConfigurationError),
  #[error(transparent)]
  Lifecycle(#[from] LifecycleError),
  #[error("runtime failure: {0}")]
  Runtime(#[source] io::Error),
  #[error("unable to initialize logging: {0}")]
  Logging(String),
}
