//! CLI error types

use thiserror::Error;
use up_core::CoreError;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("could not parse command line flags: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Core(#[from] CoreError),

    #[error("up failed: {0}")]
    Failed(String),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI001",
            CliError::Core(err) if err.is_configuration() => "CLI002",
            CliError::Core(_) => "CLI003",
            CliError::Failed(_) => "CLI004",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CliError::InvalidArgument("test".to_string()).code(), "CLI001");
        assert_eq!(
            CliError::from(CoreError::ConfigurationError("x".to_string())).code(),
            "CLI002"
        );
        assert_eq!(
            CliError::from(CoreError::TaskFailed("x".to_string())).code(),
            "CLI003"
        );
        assert_eq!(CliError::Failed("test".to_string()).code(), "CLI004");
    }

    #[test]
    fn test_error_display() {
        let error = CliError::Failed("writer: no requests completed".to_string());
        assert_eq!(error.to_string(), "up failed: writer: no requests completed");
    }
}
