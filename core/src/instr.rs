//! Self-instrumentation
//!
//! All probe metrics live in one registry which the `/metrics` endpoint
//! renders. The outcome counters double as the verdict inputs.

use crate::report::{OutcomeCounter, QueryCounter};
use crate::Result;
use prometheus::{
    linear_buckets, Encoder, GaugeVec, Histogram, HistogramOpts, HistogramVec, IntCounterVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;

const CUSTOM_QUERY_LABELS: &[&str] = &["type", "query", "http_code"];
const OUTCOME_LABELS: &[&str] = &["result", "http_code"];

/// Metrics shared by every probe
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub remote_writes: IntCounterVec,
    pub remote_write_duration: Histogram,
    pub queries: IntCounterVec,
    pub query_duration: Histogram,
    pub metric_value_difference: Histogram,
    pub custom_query_executed: IntCounterVec,
    pub custom_query_errors: IntCounterVec,
    pub custom_query_duration: HistogramVec,
    pub custom_query_last_duration: GaugeVec,
}

impl Metrics {
    /// Create and register every metric in a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let remote_writes = IntCounterVec::new(
            Opts::new("up_remote_writes_total", "Total number of remote write requests."),
            OUTCOME_LABELS,
        )?;
        let remote_write_duration = Histogram::with_opts(HistogramOpts::new(
            "up_remote_writes_duration_seconds",
            "Duration of remote write requests.",
        ))?;
        let queries = IntCounterVec::new(
            Opts::new("up_queries_total", "The total number of queries made."),
            OUTCOME_LABELS,
        )?;
        let query_duration = Histogram::with_opts(HistogramOpts::new(
            "up_queries_duration_seconds",
            "Duration of up queries.",
        ))?;
        let metric_value_difference = Histogram::with_opts(
            HistogramOpts::new(
                "up_metric_value_difference",
                "The time difference between the current timestamp and the timestamp in the metrics value.",
            )
            .buckets(linear_buckets(4.0, 0.25, 16)?),
        )?;
        let custom_query_executed = IntCounterVec::new(
            Opts::new(
                "up_custom_query_executed_total",
                "The total number of custom specified queries executed.",
            ),
            CUSTOM_QUERY_LABELS,
        )?;
        let custom_query_errors = IntCounterVec::new(
            Opts::new(
                "up_custom_query_errors_total",
                "The total number of custom specified queries that failed.",
            ),
            CUSTOM_QUERY_LABELS,
        )?;
        // Wide buckets so heavy queries still land in a finite bucket
        let custom_query_duration = HistogramVec::new(
            HistogramOpts::new(
                "up_custom_query_duration_seconds",
                "Duration of custom specified queries",
            )
            .buckets(vec![
                0.1, 0.25, 0.5, 1.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 100.0, 120.0,
            ]),
            CUSTOM_QUERY_LABELS,
        )?;
        let custom_query_last_duration = GaugeVec::new(
            Opts::new(
                "up_custom_query_last_duration",
                "The duration of the query execution last time the query was executed successfully.",
            ),
            CUSTOM_QUERY_LABELS,
        )?;

        registry.register(Box::new(remote_writes.clone()))?;
        registry.register(Box::new(remote_write_duration.clone()))?;
        registry.register(Box::new(queries.clone()))?;
        registry.register(Box::new(query_duration.clone()))?;
        registry.register(Box::new(metric_value_difference.clone()))?;
        registry.register(Box::new(custom_query_executed.clone()))?;
        registry.register(Box::new(custom_query_errors.clone()))?;
        registry.register(Box::new(custom_query_duration.clone()))?;
        registry.register(Box::new(custom_query_last_duration.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry,
            remote_writes,
            remote_write_duration,
            queries,
            query_duration,
            metric_value_difference,
            custom_query_executed,
            custom_query_errors,
            custom_query_duration,
            custom_query_last_duration,
        })
    }

    /// Outcome counter for the write probe
    pub fn write_outcomes(&self) -> OutcomeCounter {
        OutcomeCounter::new(self.remote_writes.clone())
    }

    /// Outcome counter for the read probe
    pub fn read_outcomes(&self) -> OutcomeCounter {
        OutcomeCounter::new(self.queries.clone())
    }

    /// Execution counters for the custom-query probe
    pub fn custom_query_outcomes(&self) -> QueryCounter {
        QueryCounter::new(
            self.custom_query_executed.clone(),
            self.custom_query_errors.clone(),
        )
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::CoreError::ServerError(format!("metrics are not valid UTF-8: {e}")))
    }
}
