use super::QUERY_READER;
use crate::query::{Query, QueryBackend, QueryError};
use crate::report::{self, status_label, QueryCounter, TallySource, Threshold, VerdictError};
use crate::scheduler::RunContext;
use prometheus::{GaugeVec, HistogramVec};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

const QUERY_PAUSE: Duration = Duration::from_millis(100);

/// Loops over every configured query, one after the other, until the run ends
///
/// Each query carries its own deadline, so a batch that takes longer than one
/// deadline still reaches its last query.
pub struct CustomQueryProbe {
    queries: Vec<Query>,
    backend: QueryBackend,
    default_step: Duration,
    timeout: Duration,
    counter: QueryCounter,
    duration: HistogramVec,
    last_duration: GaugeVec,
    pause: Duration,
}

impl CustomQueryProbe {
    pub fn new(
        queries: Vec<Query>,
        backend: QueryBackend,
        default_step: Duration,
        timeout: Duration,
        counter: QueryCounter,
        duration: HistogramVec,
        last_duration: GaugeVec,
    ) -> Self {
        Self {
            queries,
            backend,
            default_step,
            timeout,
            counter,
            duration,
            last_duration,
            pause: QUERY_PAUSE,
        }
    }

    /// Query until `ctx` ends, then report the category verdict
    ///
    /// A query in flight when `ctx` ends runs on until its own deadline.
    pub async fn run(self, ctx: RunContext, threshold: Threshold) -> Result<(), VerdictError> {
        let mut rounds = 0u64;
        while self.round(&ctx).await {
            rounds += 1;
            if !ctx.wait(self.pause).await {
                break;
            }
        }
        info!(component = QUERY_READER, rounds, "stopped querying");
        report::report(QUERY_READER, self.counter.tally(), threshold)
    }

    /// Run every query once; `false` if `ctx` ended before the round did
    async fn round(&self, ctx: &RunContext) -> bool {
        debug!(component = QUERY_READER, queries = self.queries.len(), "running queries");
        for query in &self.queries {
            if ctx.is_done() {
                return false;
            }
            self.execute(query).await;
            if !ctx.wait(self.pause).await {
                return false;
            }
        }
        true
    }

    async fn execute(&self, query: &Query) {
        let kind = query.kind().as_str();
        let query_string = query.query_string();

        let started = Instant::now();
        let request = query.run(&self.backend, self.default_step);
        let result = match timeout_at(started + self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::DeadlineExceeded(self.timeout)),
        };
        let elapsed = started.elapsed();
        match result {
            Ok(response) => {
                let code = status_label(Some(response.status));
                let labels = [kind, query.name(), code.as_str()];
                self.counter
                    .record(kind, query.name(), Some(response.status), false);
                self.duration
                    .with_label_values(&labels)
                    .observe(elapsed.as_secs_f64());
                self.last_duration
                    .with_label_values(&labels)
                    .set(elapsed.as_secs_f64());
                debug!(
                    component = QUERY_READER,
                    "type" = kind,
                    name = query.name(),
                    query = %query_string,
                    duration = ?elapsed,
                    warnings = ?response.warnings,
                    "successfully executed specified query"
                );
            }
            Err(err) => {
                let status = err.status();
                let code = status_label(status);
                self.counter.record(kind, query.name(), status, true);
                self.duration
                    .with_label_values(&[kind, query.name(), code.as_str()])
                    .observe(elapsed.as_secs_f64());
                warn!(
                    component = QUERY_READER,
                    "type" = kind,
                    name = query.name(),
                    query = %query_string,
                    duration = ?elapsed,
                    err = %err,
                    "failed to execute specified query"
                );
            }
        }
    }
}
