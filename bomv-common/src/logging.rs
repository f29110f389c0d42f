//! Tracing subscriber setup shared by bomv binaries

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Build the log filter: `RUST_LOG` when set, otherwise the configured level
pub fn build_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&logging.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", logging.level, e)))
}

/// Install the global fmt subscriber writing to stderr
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = build_filter(logging)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
}
