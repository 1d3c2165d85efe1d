//! Query API error types

use crate::transport::TransportError;
use std::fmt;
use thiserror::Error;

/// Classification of a failed query, as reported by or inferred for the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    BadResponse,
    Server,
    Client,
    /// Any other `errorType` reported in an error body (`bad_data`, `timeout`, ...)
    Reported(String),
}

impl ErrorType {
    /// Infer the type from a non-2xx status code
    pub fn for_status(status: u16) -> (Self, String) {
        match status / 100 {
            4 => (ErrorType::Client, format!("client error: {status}")),
            5 => (ErrorType::Server, format!("server error: {status}")),
            _ => (ErrorType::BadResponse, format!("bad response code {status}")),
        }
    }

    /// Parse the `errorType` field of an error body
    pub fn from_reported(raw: &str) -> Self {
        match raw {
            "bad_response" => ErrorType::BadResponse,
            "server_error" => ErrorType::Server,
            "client_error" => ErrorType::Client,
            other => ErrorType::Reported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::BadResponse => "bad_response",
            ErrorType::Server => "server_error",
            ErrorType::Client => "client_error",
            ErrorType::Reported(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    /// No usable response was received
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The API answered with an error
    #[error("{error_type}: {message}")]
    Api {
        error_type: ErrorType,
        message: String,
        detail: Option<String>,
        status: u16,
    },

    /// The response body could not be decoded
    #[error("decode response: {message}")]
    Decode { message: String, status: u16 },
}

impl ApiError {
    /// HTTP status of the response that produced this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Transport(TransportError::Http(err)) => err.status().map(|s| s.as_u16()),
            ApiError::Transport(_) => None,
            ApiError::Api { status, .. } | ApiError::Decode { status, .. } => Some(*status),
        }
    }

    pub fn error_type(&self) -> Option<&ErrorType> {
        match self {
            ApiError::Api { error_type, .. } => Some(error_type),
            _ => None,
        }
    }
}
