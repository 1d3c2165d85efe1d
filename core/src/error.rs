//! Error type shared by every core layer

use crate::report::VerdictError;
use schema::LabelError;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Verdict: {0}")]
    Verdict(#[from] VerdictError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Metrics registry error: {0}")]
    MetricsError(#[from] prometheus::Error),

    #[error("Invalid labels: {0}")]
    LabelError(#[from] LabelError),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Metrics server error: {0}")]
    ServerError(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::Verdict(_) => "CORE004",
            CoreError::IoError(_) => "CORE005",
            CoreError::SerializationError(_) => "CORE006",
            CoreError::YamlError(_) => "CORE007",
            CoreError::MetricsError(_) => "CORE008",
            CoreError::LabelError(_) => "CORE009",
            CoreError::TaskFailed(_) => "CORE010",
            CoreError::ServerError(_) => "CORE011",
        }
    }

    /// Whether this error was raised before any probe started
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CoreError::ConfigurationError(_)
                | CoreError::ValidationError(_)
                | CoreError::YamlError(_)
                | CoreError::LabelError(_)
        )
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            CoreError::TaskFailed(format!("task panicked: {err}"))
        } else {
            CoreError::TaskFailed(format!("task cancelled: {err}"))
        }
    }
}
