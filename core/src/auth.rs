//! Bearer token providers

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Token lookup failures
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("failed to read token file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the bearer token attached to every request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenProvider {
    /// No `Authorization` header
    NoOp,
    /// A fixed token
    Static(String),
    /// A file re-read on every request so rotated tokens are picked up
    File(PathBuf),
}

impl TokenProvider {
    /// Pick a provider from the `--token` and `--token-file` flags
    ///
    /// Setting both is rejected, and the token file must exist up front.
    pub fn from_flags(token: Option<&str>, token_file: Option<&Path>) -> Result<Self, String> {
        let token = token.filter(|t| !t.is_empty());
        let token_file = token_file.filter(|p| !p.as_os_str().is_empty());

        match (token, token_file) {
            (Some(_), Some(_)) => {
                Err("token: --token and --token-file are mutually exclusive".to_string())
            }
            (Some(token), None) => Ok(TokenProvider::Static(token.to_string())),
            (None, Some(path)) => {
                if !path.is_file() {
                    return Err(format!("token-file: {} does not exist", path.display()));
                }
                Ok(TokenProvider::File(path.to_path_buf()))
            }
            (None, None) => Ok(TokenProvider::NoOp),
        }
    }

    /// Current token; empty means no header should be sent
    pub async fn get(&self) -> Result<String, AuthError> {
        match self {
            TokenProvider::NoOp => Ok(String::new()),
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| AuthError::ReadFile {
                        path: path.clone(),
                        source,
                    })?;
                Ok(raw.trim().to_string())
            }
        }
    }
}
