//! The agent's resident loop.
//!
//! Nothing is scheduled on it yet; it idles on a single-threaded tokio
//! runtime until a termination signal or a programmatic stop arrives.

use std::sync::Arc;

use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::config::{Configuration, ConfigurationError, LoggingSettings};
use crate::error::AgentError;
use crate::lifecycle::DaemonContext;
use crate::logging::{self, LogLevel, validate_date_format};

/// What ended a [`RunLoop::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
  /// `SIGTERM`, as sent by `stop`.
  Terminated,
  /// `SIGINT`.
  Interrupted,
  /// `SIGHUP`.
  HungUp,
  /// [`ShutdownHandle::stop`].
  Requested,
}

/// Clonable request to end a running loop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
  trigger: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
  /// Ask the loop to stop. Calling it before `run` makes `run` return at once.
  pub fn stop(&self) {
    self.trigger.send_replace(true);
  }
}

#[derive(Debug)]
pub struct RunLoop {
  logging: LoggingSettings,
  trigger: Arc<watch::Sender<bool>>,
  requested: watch::Receiver<bool>,
}

impl RunLoop {
  /// Validate the logging settings the loop will install.
  ///
  /// Call this before detaching so a bad level is reported to the operator.
  ///
  /// # Errors
  /// `InvalidLogLevel` or `InvalidDateFormat`.
  pub fn new(config: &Configuration) -> Result<Self, ConfigurationError> {
    LogLevel::parse(config.logging().level())?;
    validate_date_format(config.logging().date_format())?;

    let (trigger, requested) = watch::channel(false);
    Ok(Self {
      logging: config.logging().clone(),
      trigger: Arc::new(trigger),
      requested,
    })
  }

  #[must_use]
  pub fn shutdown_handle(&self) -> ShutdownHandle {
    ShutdownHandle {
      trigger: Arc::clone(&self.trigger),
    }
  }

  /// Install logging, then block until shutdown.
  ///
  /// Termination signals held by `context` are let through once the loop's
  /// handlers exist; the invoking process is told the agent is ready then.
  ///
  /// # Errors
  /// `Logging` if the sinks cannot be set up, `Runtime` if the runtime or a
  /// signal handler cannot be created.
  pub fn run(self, context: &DaemonContext) -> Result<ShutdownReason, AgentError> {
    let _logging = logging::init(&self.logging, context.is_detached())?;

    info!("Starting agent process...");
    debug!("Setting up event loop...");
    let runtime = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .map_err(AgentError::Runtime)?;
    let signals = {
      let _entered = runtime.enter();
      ShutdownSignals::register()?
    };

    let stopping = ShutdownLog;
    context.release_signals()?;
    context.notify_ready();
    let reason = runtime.block_on(wait_for_shutdown(signals, self.requested));
    drop(stopping);

    info!(?reason, "Stopped agent process");
    Ok(reason)
  }
}

/// Logs the shutdown line however the loop is left, unwinding included.
struct ShutdownLog;

impl Drop for ShutdownLog {
  fn drop(&mut self) {
    info!("Stopping agent process");
  }
}

struct ShutdownSignals {
  terminate: Signal,
  interrupt: Signal,
  hangup: Signal,
}

impl ShutdownSignals {
  /// Needs to run inside the loop's runtime.
  fn register() -> Result<Self, AgentError> {
    Ok(Self {
      terminate: signal(SignalKind::terminate()).map_err(AgentError::Runtime)?,
      interrupt: signal(SignalKind::interrupt()).map_err(AgentError::Runtime)?,
      hangup: signal(SignalKind::hangup()).map_err(AgentError::Runtime)?,
    })
  }
}

async fn wait_for_shutdown(
  mut signals: ShutdownSignals,
  mut requested: watch::Receiver<bool>,
) -> ShutdownReason {
  debug!("Starting event loop...");
  let reason = tokio::select! {
    _ = signals.terminate.recv() => ShutdownReason::Terminated,
    _ = signals.interrupt.recv() => ShutdownReason::Interrupted,
    _ = signals.hangup.recv() => ShutdownReason::HungUp,
    _ = requested.wait_for(|stop| *stop) => ShutdownReason::Requested,
  };
  debug!(?reason, "shutdown requested");
  reason
}
