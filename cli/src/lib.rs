//! Command-line surface of the `up` probe
//!
//! [`Args`] mirrors the flags one to one; [`Args::into_raw`] hands them to
//! the core for validation and [`execute`] maps the run outcome onto the
//! process result.

pub mod error;

pub use error::{CliError, Result};

use clap::Parser;
use schema::{EndpointType, LogLevel, TlsOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use up_core::{Options, Outcome, RawOptions};

/// Write samples to a remote write endpoint, read them back, and judge the
/// success ratio
#[derive(Parser, Debug, Clone)]
#[command(name = "up")]
#[command(version)]
pub struct Args {
    /// The log filtering level
    #[arg(long = "log.level", value_name = "LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// The endpoint type: metrics or logs
    #[arg(long, value_name = "TYPE", default_value = "metrics")]
    pub endpoint_type: EndpointType,

    /// The endpoint to which to make remote-write requests
    #[arg(long, value_name = "URL")]
    pub endpoint_write: Option<String>,

    /// The endpoint to which to make query requests
    #[arg(long, value_name = "URL")]
    pub endpoint_read: Option<String>,

    /// Labels in addition to '__name__' applied to written samples, e.g. a="b",c="d"
    #[arg(long, value_name = "LABELS")]
    pub labels: Vec<String>,

    /// The address on which the internal server runs; empty disables it
    #[arg(long, default_value = ":8080")]
    pub listen: String,

    /// The log lines to write, e.g. ["<ts>","<line>"],["<ts>","<line>"]
    #[arg(long, value_name = "LOGS")]
    pub logs: Option<String>,

    /// A YAML file containing logs to send to the logs write endpoint
    #[arg(long, value_name = "FILE")]
    pub logs_file: Option<PathBuf>,

    /// The name of the metric to send in remote-write requests
    #[arg(long, default_value = "up")]
    pub name: String,

    /// The bearer token to set in the authorization header on requests
    #[arg(long, conflicts_with = "token_file")]
    pub token: Option<String>,

    /// The file from which to read a bearer token on every request
    #[arg(long, value_name = "FILE")]
    pub token_file: Option<PathBuf>,

    /// A YAML file containing queries to run against the read endpoint
    #[arg(long, value_name = "FILE")]
    pub queries_file: Option<PathBuf>,

    /// The time to wait between requests
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub period: Duration,

    /// How long to run; 0 runs until the process is terminated
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    pub duration: Duration,

    /// The ratio of successful requests needed to succeed overall, 0 to 1
    #[arg(long, default_value_t = 0.9)]
    pub threshold: f64,

    /// The maximum allowable latency between writing and reading
    #[arg(long, default_value = "15s", value_parser = humantime::parse_duration)]
    pub latency: Duration,

    /// The time to wait before executing the first query
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub initial_query_delay: Duration,

    /// Default step for range queries without their own step
    #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
    pub step: Duration,

    /// PEM client certificate for https endpoints
    #[arg(long, value_name = "FILE")]
    pub tls_client_cert_file: Option<PathBuf>,

    /// PEM private key matching --tls-client-cert-file
    #[arg(long, value_name = "FILE")]
    pub tls_client_private_key_file: Option<PathBuf>,

    /// PEM CA bundle used to verify servers instead of the built-in roots
    #[arg(long, value_name = "FILE")]
    pub tls_ca_file: Option<PathBuf>,

    /// Name of the HTTP header carrying the tenant on write requests
    #[arg(long, default_value = "tenant_id")]
    pub tenant_header: String,

    /// Tenant ID sent on write requests
    #[arg(long)]
    pub tenant: Option<String>,
}

impl Args {
    /// Flag values in the shape the core validates
    pub fn into_raw(self) -> RawOptions {
        RawOptions {
            endpoint_type: self.endpoint_type,
            endpoint_write: self.endpoint_write,
            endpoint_read: self.endpoint_read,
            labels: self.labels,
            listen: self.listen,
            logs: self.logs,
            logs_file: self.logs_file,
            name: self.name,
            token: self.token,
            token_file: self.token_file,
            queries_file: self.queries_file,
            period: self.period,
            duration: self.duration,
            threshold: self.threshold,
            latency: self.latency,
            initial_query_delay: self.initial_query_delay,
            step: self.step,
            tls: TlsOptions {
                cert: self.tls_client_cert_file,
                key: self.tls_client_private_key_file,
                ca_cert: self.tls_ca_file,
            },
            tenant_header: self.tenant_header,
            tenant: self.tenant,
        }
    }

    /// Validate into the options the runner consumes
    pub fn into_options(self) -> Result<Options> {
        Ok(Options::from_raw(self.into_raw())?)
    }
}

/// Run the probe and fold the outcome into a single result
pub async fn execute(args: Args) -> Result<()> {
    let options = args.into_options()?;
    info!(
        write = options.write_endpoint.as_ref().map(|u| u.as_str()),
        read = options.read_endpoint.as_ref().map(|u| u.as_str()),
        "type" = %options.endpoint_type,
        "starting up"
    );
    let outcome = up_core::run(options).await?;
    into_result(outcome)
}

fn into_result(outcome: Outcome) -> Result<()> {
    if let Some(err) = outcome.group_error {
        return Err(CliError::Core(err));
    }
    if outcome.verdicts.is_empty() {
        return Ok(());
    }
    let summary = outcome
        .verdicts
        .iter()
        .map(|(component, err)| format!("{component}: {err}"))
        .collect::<Vec<_>>()
        .join("; ");
    Err(CliError::Failed(summary))
}
