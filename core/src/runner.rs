//! Probe orchestration
//!
//! Builds every probe from validated [`Options`] and runs them, together with
//! the signal watcher and the metrics server, as one [`RunGroup`]. Verdict
//! failures are collected from every probe, not only from the one that ended
//! the group.

use crate::api::ApiClient;
use crate::config::Options;
use crate::instr::Metrics;
use crate::logs::LogsClient;
use crate::probe::{
    CustomQueryProbe, ReadBackend, ReadProbe, WriteProbe, QUERY_READER, READER, WRITER,
};
use crate::query::QueryBackend;
use crate::remote_write::RemoteWriter;
use crate::report::VerdictError;
use crate::run_group::RunGroup;
use crate::scheduler::{PeriodicTask, RunContext};
use crate::server::MetricsServer;
use crate::signals;
use crate::transport::AuthClient;
use crate::{CoreError, Result};
use schema::EndpointType;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// What a finished run produced
#[derive(Debug, Default)]
pub struct Outcome {
    /// Error of the actor that ended the group, unless it was a verdict
    pub group_error: Option<CoreError>,
    /// Every binding verdict failure, by component
    pub verdicts: Vec<(&'static str, VerdictError)>,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.group_error.is_none() && self.verdicts.is_empty()
    }
}

type VerdictSender = UnboundedSender<(&'static str, VerdictError)>;

/// Run all configured probes until the duration elapses or a signal arrives
pub async fn run(opts: Options) -> Result<Outcome> {
    let metrics = Metrics::new()?;
    let ctx = RunContext::new(opts.duration);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut group: RunGroup<CoreError> = RunGroup::new();

    let stop = CancellationToken::new();
    let interrupt = stop.clone();
    group.add("signals", signals::watch(stop), move |_| interrupt.cancel());

    if let Some(addr) = opts.listen {
        let server = MetricsServer::bind(addr, metrics.clone())?;
        let shutdown = CancellationToken::new();
        let interrupt = shutdown.clone();
        group.add("http", server.serve(shutdown), move |_| {
            info!(component = "http", "shutting down internal server");
            interrupt.cancel();
        });
    }

    if let Some(write_endpoint) = &opts.write_endpoint {
        let client = auth_client(write_endpoint, &opts)?;
        let writer = RemoteWriter::new(client, write_endpoint.clone(), opts.tenant.clone());
        let probe = WriteProbe::new(
            writer,
            opts.endpoint_type,
            opts.labels.clone(),
            opts.logs.clone(),
            metrics.write_outcomes(),
            metrics.remote_write_duration.clone(),
        );
        let task = PeriodicTask::new(
            Arc::new(probe),
            opts.period,
            Arc::new(metrics.write_outcomes()),
            opts.threshold,
        );

        let run_ctx = ctx.clone();
        let tx = tx.clone();
        group.add(
            WRITER,
            async move {
                info!(component = WRITER, "starting the writer");
                binding(WRITER, task.run(run_ctx).await, &tx)
            },
            cancel_on_interrupt(&ctx),
        );
    }

    if let (Some(read_endpoint), Some(_)) = (&opts.read_endpoint, &opts.write_endpoint) {
        let client = auth_client(read_endpoint, &opts)?;
        let backend = match opts.endpoint_type {
            EndpointType::Metrics => ReadBackend::Metrics(ApiClient::new(client, read_endpoint.clone())),
            EndpointType::Logs => ReadBackend::Logs(LogsClient::new(client, read_endpoint.clone())),
        };
        let probe = ReadProbe::new(
            backend,
            opts.labels.clone(),
            opts.initial_query_delay,
            opts.latency,
            metrics.read_outcomes(),
            metrics.query_duration.clone(),
            metrics.metric_value_difference.clone(),
        );
        let task = PeriodicTask::new(
            Arc::new(probe),
            opts.period,
            Arc::new(metrics.read_outcomes()),
            opts.threshold,
        );

        let run_ctx = ctx.clone();
        let delay = opts.initial_query_delay;
        let endpoint_type = opts.endpoint_type;
        let tx = tx.clone();
        group.add(
            READER,
            async move {
                info!(component = READER, "type" = %endpoint_type, ?delay, "waiting for initial delay before querying");
                if !run_ctx.wait(delay).await {
                    return Ok(());
                }
                info!(component = READER, "type" = %endpoint_type, "start querying");
                binding(READER, task.run(run_ctx).await, &tx)
            },
            cancel_on_interrupt(&ctx),
        );
    }

    if let (Some(read_endpoint), false) = (&opts.read_endpoint, opts.queries.is_empty()) {
        let client = auth_client(read_endpoint, &opts)?;
        let backend = match opts.endpoint_type {
            EndpointType::Metrics => QueryBackend::Metrics(ApiClient::new(client, read_endpoint.clone())),
            EndpointType::Logs => QueryBackend::Logs(LogsClient::new(client, read_endpoint.clone())),
        };
        // Each query gets one period to complete
        let probe = CustomQueryProbe::new(
            opts.queries.clone(),
            backend,
            opts.default_step,
            opts.period,
            metrics.custom_query_outcomes(),
            metrics.custom_query_duration.clone(),
            metrics.custom_query_last_duration.clone(),
        );
        let threshold = opts.threshold;

        // With a write endpoint the write/read counters decide the run
        let is_binding = opts.write_endpoint.is_none();
        let run_ctx = ctx.clone();
        let delay = opts.initial_query_delay;
        let tx = tx.clone();
        group.add(
            QUERY_READER,
            async move {
                info!(component = QUERY_READER, ?delay, "waiting for initial delay before querying specified queries");
                if !run_ctx.wait(delay).await {
                    return Ok(());
                }
                info!(component = QUERY_READER, "start querying for specified queries");
                let verdict = probe.run(run_ctx, threshold).await;
                if is_binding {
                    return binding(QUERY_READER, verdict, &tx);
                }
                if let Err(err) = verdict {
                    warn!(component = QUERY_READER, err = %err, "custom query verdict is informational");
                }
                Ok(())
            },
            cancel_on_interrupt(&ctx),
        );
    }
    drop(tx);

    let group_error = match group.run().await {
        Ok(()) => None,
        Err(CoreError::Verdict(_)) => None,
        Err(err) => {
            info!(err = %err, "run group exited with error");
            Some(err)
        }
    };

    let mut verdicts = Vec::new();
    while let Ok((component, err)) = rx.try_recv() {
        error!(component, err = %err, "probe failed");
        verdicts.push((component, err));
    }

    Ok(Outcome {
        group_error,
        verdicts,
    })
}

fn auth_client(endpoint: &Url, opts: &Options) -> Result<AuthClient> {
    AuthClient::for_endpoint(endpoint, &opts.tls, opts.token.clone())
        .map_err(|e| CoreError::ConfigurationError(format!("{endpoint}: {e}")))
}

fn cancel_on_interrupt(ctx: &RunContext) -> impl FnOnce(Option<&CoreError>) + Send + 'static {
    let ctx = ctx.clone();
    move |_: Option<&CoreError>| ctx.cancel()
}

/// Record a failed verdict and surface it as the actor's error
fn binding(
    component: &'static str,
    verdict: std::result::Result<(), VerdictError>,
    tx: &VerdictSender,
) -> Result<()> {
    if let Err(err) = &verdict {
        // The receiver outlives every actor
        let _ = tx.send((component, err.clone()));
    }
    verdict.map_err(CoreError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawOptions;
    use crate::remote_write::unix_millis;
    use crate::test_support::{json, start_test_server, text, vector_response};
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    fn fresh_vector() -> serde_json::Value {
        vector_response(&[unix_millis(SystemTime::now()) as f64 - 50.0])
    }

    fn raw(write: String, read: String) -> RawOptions {
        RawOptions {
            endpoint_write: Some(write),
            endpoint_read: Some(read),
            listen: String::new(),
            period: Duration::from_millis(100),
            duration: Duration::from_millis(1200),
            latency: Duration::from_secs(5),
            initial_query_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_healthy_pipeline_passes() {
        let (addr, log) = start_test_server(|req| {
            if req.uri.path() == "/api/v1/receive" {
                text(200, "")
            } else {
                json(200, fresh_vector())
            }
        })
        .await;

        let opts = Options::from_raw(raw(
            format!("http://{addr}/api/v1/receive"),
            format!("http://{addr}/api/v1/query"),
        ))
        .unwrap();

        let outcome = run(opts).await.unwrap();
        assert!(outcome.is_success(), "{outcome:?}");

        let log = log.lock().unwrap();
        assert!(log.iter().any(|r| r.uri.path() == "/api/v1/receive"));
        assert!(log.iter().any(|r| r.uri.path() == "/api/v1/query"));
    }

    #[tokio::test]
    async fn test_failing_writes_fail_the_run() {
        let (addr, _) = start_test_server(|req| {
            if req.uri.path() == "/api/v1/receive" {
                text(500, "ingester unavailable")
            } else {
                json(200, fresh_vector())
            }
        })
        .await;

        let opts = Options::from_raw(raw(
            format!("http://{addr}/api/v1/receive"),
            format!("http://{addr}/api/v1/query"),
        ))
        .unwrap();

        let outcome = run(opts).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.group_error.is_none());
        assert!(outcome.verdicts.iter().any(|(c, _)| *c == WRITER));
        assert!(!outcome.verdicts.iter().any(|(c, _)| *c == READER));
    }

    #[tokio::test]
    async fn test_query_only_verdict_is_binding() {
        let (addr, _) = start_test_server(|_| {
            json(
                503,
                serde_json::json!({"status": "error", "errorType": "unavailable", "error": "down"}),
            )
        })
        .await;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"queries:\n  - name: up\n    query: up\n")
            .unwrap();

        let opts = Options::from_raw(RawOptions {
            endpoint_write: None,
            queries_file: Some(file.path().to_path_buf()),
            ..raw(String::new(), format!("http://{addr}/api/v1/query"))
        })
        .unwrap();

        let outcome = run(opts).await.unwrap();
        assert_eq!(outcome.verdicts.len(), 1);
        assert_eq!(outcome.verdicts[0].0, QUERY_READER);
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported_before_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let (addr, _) = start_test_server(|_| text(200, "")).await;

        let opts = Options::from_raw(RawOptions {
            listen: taken.local_addr().unwrap().to_string(),
            ..raw(
                format!("http://{addr}/api/v1/receive"),
                format!("http://{addr}/api/v1/query"),
            )
        })
        .unwrap();

        let err = run(opts).await.unwrap_err();
        assert_eq!(err.code(), "CORE003");
    }
}
