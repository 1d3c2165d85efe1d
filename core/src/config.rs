//! Configuration loading and validation for the probe
//!
//! [`RawOptions`] carries the flag values as the command line produced them.
//! [`Options::from_raw`] turns them into a fully validated [`Options`],
//! loading the YAML batch files and rejecting anything that would only fail
//! once the probes are running. Errors name the offending flag.

use crate::auth::TokenProvider;
use crate::query::Query;
use crate::remote_write::Tenant;
use crate::report::Threshold;
use crate::server::parse_listen_addr;
use crate::{CoreError, Result};
use reqwest::header::HeaderName;
use schema::{EndpointType, Label, LabelSet, LogsFile, QueriesFile, TlsOptions, METRIC_NAME_LABEL};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Flag values before validation
#[derive(Debug, Clone)]
pub struct RawOptions {
    pub endpoint_type: EndpointType,
    pub endpoint_write: Option<String>,
    pub endpoint_read: Option<String>,
    /// Each entry is one `--labels` occurrence
    pub labels: Vec<String>,
    pub listen: String,
    pub logs: Option<String>,
    pub logs_file: Option<PathBuf>,
    pub name: String,
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub queries_file: Option<PathBuf>,
    pub period: Duration,
    pub duration: Duration,
    pub threshold: f64,
    pub latency: Duration,
    pub initial_query_delay: Duration,
    pub step: Duration,
    pub tls: TlsOptions,
    pub tenant_header: String,
    pub tenant: Option<String>,
}

impl Default for RawOptions {
    fn default() -> Self {
        Self {
            endpoint_type: EndpointType::Metrics,
            endpoint_write: None,
            endpoint_read: None,
            labels: Vec::new(),
            listen: ":8080".to_string(),
            logs: None,
            logs_file: None,
            name: "up".to_string(),
            token: None,
            token_file: None,
            queries_file: None,
            period: Duration::from_secs(5),
            duration: Duration::from_secs(5 * 60),
            threshold: 0.9,
            latency: Duration::from_secs(15),
            initial_query_delay: Duration::from_secs(10),
            step: Duration::from_secs(5 * 60),
            tls: TlsOptions::default(),
            tenant_header: "tenant_id".to_string(),
            tenant: None,
        }
    }
}

/// Validated configuration handed to the runner
#[derive(Debug, Clone)]
pub struct Options {
    pub endpoint_type: EndpointType,
    pub write_endpoint: Option<Url>,
    pub read_endpoint: Option<Url>,
    /// Configured labels plus `__name__`, sorted by name
    pub labels: LabelSet,
    pub logs: Vec<Vec<String>>,
    /// `None` disables the metrics server
    pub listen: Option<SocketAddr>,
    pub token: Arc<TokenProvider>,
    pub queries: Vec<Query>,
    pub period: Duration,
    /// `None` runs until signalled
    pub duration: Option<Duration>,
    pub latency: Duration,
    pub initial_query_delay: Duration,
    pub default_step: Duration,
    pub threshold: Threshold,
    pub tls: TlsOptions,
    pub tenant: Option<Tenant>,
}

impl Options {
    /// Validate flag values and load the batch files they point at
    pub fn from_raw(raw: RawOptions) -> Result<Self> {
        let write_endpoint = raw
            .endpoint_write
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_endpoint("--endpoint-write", s))
            .transpose()?;
        let read_endpoint = raw
            .endpoint_read
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| parse_endpoint("--endpoint-read", s))
            .transpose()?;

        if write_endpoint.is_none() {
            info!("no write endpoint specified, no write tests being performed");
        }
        if read_endpoint.is_none() {
            info!("no read endpoint specified, no read tests being performed");
        }

        let queries = match &raw.queries_file {
            Some(path) => {
                if read_endpoint.is_none() {
                    return Err(CoreError::ConfigurationError(
                        "--queries-file requires --endpoint-read".to_string(),
                    ));
                }
                let queries = Query::from_file(&load_queries_file(path)?);
                for query in &queries {
                    query.validate(raw.endpoint_type).map_err(|e| {
                        CoreError::ValidationError(format!("--queries-file: {e}"))
                    })?;
                }
                info!(count = queries.len(), "queries configured to be queried periodically");
                queries
            }
            None => Vec::new(),
        };

        if write_endpoint.is_none() && queries.is_empty() {
            return Err(CoreError::ConfigurationError(
                "nothing to do: set --endpoint-write, or --endpoint-read with --queries-file"
                    .to_string(),
            ));
        }

        if raw.period.is_zero() {
            return Err(CoreError::ValidationError(
                "--period: must be > 0".to_string(),
            ));
        }
        if raw.latency <= raw.period {
            return Err(CoreError::ValidationError(
                "--latency: must be greater than --period".to_string(),
            ));
        }
        if raw.step.is_zero() {
            return Err(CoreError::ValidationError("--step: must be > 0".to_string()));
        }
        let threshold = Threshold::new(raw.threshold)
            .map_err(|e| CoreError::ValidationError(format!("--threshold: {e}")))?;

        let labels = build_labels(&raw.labels, &raw.name)?;

        let mut logs = match &raw.logs {
            Some(flag) if !flag.trim().is_empty() => parse_logs_flag(flag)?,
            _ => Vec::new(),
        };
        if let Some(path) = &raw.logs_file {
            logs = load_logs_file(path)?.spec.logs;
            info!(count = logs.len(), "logs configured to be written periodically");
        }
        if raw.endpoint_type == EndpointType::Logs && write_endpoint.is_some() {
            if logs.is_empty() {
                return Err(CoreError::ValidationError(
                    "--logs: at least one log line is required for the logs endpoint type"
                        .to_string(),
                ));
            }
            if let Some(i) = logs.iter().position(|entry| entry.is_empty()) {
                return Err(CoreError::ValidationError(format!(
                    "--logs[{i}]: entry cannot be empty"
                )));
            }
        }

        let token = TokenProvider::from_flags(
            raw.token.as_deref().filter(|t| !t.is_empty()),
            raw.token_file.as_deref(),
        )
        .map_err(CoreError::ConfigurationError)?;

        validate_tls(&raw.tls, [write_endpoint.as_ref(), read_endpoint.as_ref()])?;

        let tenant = match raw.tenant.as_deref().filter(|t| !t.is_empty()) {
            Some(id) => {
                HeaderName::from_bytes(raw.tenant_header.as_bytes()).map_err(|_| {
                    CoreError::ValidationError(format!(
                        "--tenant-header: {:?} is not a valid header name",
                        raw.tenant_header
                    ))
                })?;
                Some(Tenant {
                    header: raw.tenant_header.clone(),
                    id: id.to_string(),
                })
            }
            None => None,
        };

        let listen = if raw.listen.trim().is_empty() {
            None
        } else {
            Some(parse_listen_addr(raw.listen.trim()).map_err(|e| {
                CoreError::ConfigurationError(format!("--listen: {e}"))
            })?)
        };

        Ok(Self {
            endpoint_type: raw.endpoint_type,
            write_endpoint,
            read_endpoint,
            labels,
            logs,
            listen,
            token: Arc::new(token),
            queries,
            period: raw.period,
            duration: (!raw.duration.is_zero()).then_some(raw.duration),
            latency: raw.latency,
            initial_query_delay: raw.initial_query_delay,
            default_step: raw.step,
            threshold,
            tls: raw.tls,
            tenant,
        })
    }
}

/// Parse an absolute http(s) endpoint URL
pub fn parse_endpoint(flag: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| CoreError::ConfigurationError(format!("{flag} is invalid: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::ConfigurationError(format!(
            "{flag} is invalid: unsupported scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(CoreError::ConfigurationError(format!(
            "{flag} is invalid: missing host"
        )));
    }
    Ok(url)
}

/// Merge every `--labels` occurrence and add the metric name
pub fn build_labels(flags: &[String], name: &str) -> Result<LabelSet> {
    let mut labels = LabelSet::new();
    for flag in flags.iter().filter(|f| !f.trim().is_empty()) {
        labels.extend(LabelSet::parse_flag(flag)?)?;
    }
    if name.is_empty() {
        return Err(CoreError::ValidationError("--name: cannot be empty".to_string()));
    }
    labels.push(Label::new(METRIC_NAME_LABEL, name))?;
    labels.sort();
    Ok(labels)
}

/// Parse `--logs`: `["<ts>","<line>"],["<ts>","<line>"]`
///
/// Falls back to splitting on `],[` and commas when the value is not valid
/// JSON, so unquoted entries keep working.
pub fn parse_logs_flag(raw: &str) -> Result<Vec<Vec<String>>> {
    let trimmed = raw.trim();
    if let Ok(entries) = serde_json::from_str::<Vec<Vec<String>>>(&format!("[{trimmed}]")) {
        return Ok(entries);
    }

    Ok(trimmed
        .split("],[")
        .map(|entry| {
            entry
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|s| s.trim().trim_matches('"').to_string())
                .collect()
        })
        .collect())
}

/// Load a `--queries-file`
pub fn load_queries_file(path: &Path) -> Result<QueriesFile> {
    let data = read_file("--queries-file", path)?;
    if data.trim().is_empty() {
        return Ok(QueriesFile::default());
    }
    serde_yaml::from_str(&data).map_err(|e| {
        CoreError::ConfigurationError(format!("--queries-file content is invalid: {e}"))
    })
}

/// Load a `--logs-file`
pub fn load_logs_file(path: &Path) -> Result<LogsFile> {
    let data = read_file("--logs-file", path)?;
    serde_yaml::from_str(&data)
        .map_err(|e| CoreError::ConfigurationError(format!("--logs-file content is invalid: {e}")))
}

fn read_file(flag: &str, path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| CoreError::ConfigurationError(format!("{flag} {path:?} is invalid: {e}")))
}

fn validate_tls(tls: &TlsOptions, endpoints: [Option<&Url>; 2]) -> Result<()> {
    if tls.cert.is_some() != tls.key.is_some() {
        return Err(CoreError::ConfigurationError(
            "--tls-client-cert-file and --tls-client-private-key-file must be set together"
                .to_string(),
        ));
    }
    if !tls.is_configured() {
        return Ok(());
    }

    for (flag, path) in [
        ("--tls-client-cert-file", &tls.cert),
        ("--tls-client-private-key-file", &tls.key),
        ("--tls-ca-file", &tls.ca_cert),
    ] {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(CoreError::ConfigurationError(format!(
                    "{flag} {path:?} does not exist"
                )));
            }
        }
    }

    if let Some(url) = endpoints.into_iter().flatten().find(|u| u.scheme() != "https") {
        return Err(CoreError::ConfigurationError(format!(
            "TLS files were given but endpoint {url} is not https"
        )));
    }
    Ok(())
}
