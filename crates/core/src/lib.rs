//! Core library for the MCAdminPanel node agent.
//!
//! Provides the layered configuration store, the agent's own process
//! lifecycle (daemonize, PID file lock, stop by signal), the resident run
//! loop, and the logging sinks it writes to.
//!
//! Quick start:
//! - Load settings via `ConfigStore::from_env()?.load(None)`.
//! - Validate them for running with `RunLoop::new(&config)`.
//! - Hand the loop to `LifecycleController::new(&config).start(detach, ...)`.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod runloop;

pub use config::{ConfigStore, Configuration, ConfigurationError, Defaults};
pub use error::AgentError;
pub use lifecycle::{DaemonContext, LifecycleController, LifecycleError, LifecycleState};
pub use runloop::{RunLoop, ShutdownHandle, ShutdownReason};
