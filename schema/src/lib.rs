//! Schema definitions for up
//!
//! This crate contains the data structures shared by the probe engine and the
//! command line: label sets, endpoint types, TLS file options and the YAML
//! batch-file shapes. All types here implement JSON Schema generation so the
//! batch-file formats can be published alongside the binary.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub mod batch;
pub mod labels;


pub use batch::{LabelSpec, LogsFile, LogsSpec, QueriesFile, QuerySpec, SeriesSpec};
pub use labels::{is_valid_label_name, Label, LabelError, LabelSet, METRIC_NAME_LABEL};

/// Kind of pipeline under test
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EndpointType {
    /// Prometheus remote-write and query API
    #[default]
    Metrics,
    /// Loki push and query API
    Logs,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointType::Metrics => "metrics",
            EndpointType::Logs => "logs",
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndpointType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(EndpointType::Metrics),
            "logs" => Ok(EndpointType::Logs),
            other => Err(format!(
                "unsupported endpoint type {other:?}, expected metrics or logs"
            )),
        }
    }
}

/// Verbosity accepted by `--log.level`
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unexpected log level {other:?}")),
        }
    }
}

/// Client TLS material for https endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TlsOptions {
    /// PEM client certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert: Option<PathBuf>,
    /// PEM private key matching `cert`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<PathBuf>,
    /// PEM CA bundle replacing the built-in roots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,
}

impl TlsOptions {
    /// Whether any TLS file was supplied
    pub fn is_configured(&self) -> bool {
        self.cert.is_some() || self.key.is_some() || self.ca_cert.is_some()
    }
}
