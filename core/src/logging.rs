//! Process-wide tracing setup

use crate::{CoreError, Result};
use schema::LogLevel;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter directive for a level; `RUST_LOG` takes precedence when set
pub fn filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Initialize tracing on stderr
pub fn init(level: LogLevel) -> Result<()> {
    fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| CoreError::InitializationError(e.to_string()))?;

    debug!(level = %level, "tracing initialized");
    Ok(())
}
