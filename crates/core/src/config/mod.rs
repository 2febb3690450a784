//! Layered agent configuration: built-in defaults deep-merged with an
//! optional JSON document.

mod defaults;
mod merge;
mod store;
mod types;

pub use defaults::{DEFAULT_DATE_FORMAT, DEFAULT_LOG_FORMAT, DEFAULT_LOG_LEVEL, Defaults};
pub use merge::merge;
pub use store::ConfigStore;
pub use types::{Configuration, ConfigurationError, LoggingSettings, Result};
