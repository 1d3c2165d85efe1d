use super::{Probe, READER};
use crate::api::{ApiClient, ApiError, Sample, Value};
use crate::logs::{LogsClient, LogsError};
use crate::remote_write::unix_millis;
use crate::report::OutcomeCounter;
use crate::scheduler::TickContext;
use async_trait::async_trait;
use prometheus::Histogram;
use schema::LabelSet;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("query request failed: {0}")]
    Api(#[from] ApiError),

    #[error(transparent)]
    Logs(#[from] LogsError),

    #[error("expected a vector result, got {got}")]
    UnexpectedResult { got: &'static str, status: u16 },

    #[error("expected one metric, got {got}")]
    Cardinality { got: usize, status: u16 },

    #[error("sample value {value} is not a millisecond timestamp")]
    InvalidValue { value: String, status: u16 },

    #[error("metric value is too old: {}s", lag.as_secs_f64())]
    TooOld {
        lag: Duration,
        max: Duration,
        status: u16,
    },
}

impl ReadError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ReadError::Api(err) => err.status(),
            ReadError::Logs(err) => err.status(),
            ReadError::UnexpectedResult { status, .. }
            | ReadError::Cardinality { status, .. }
            | ReadError::InvalidValue { status, .. }
            | ReadError::TooOld { status, .. } => Some(*status),
        }
    }
}

/// Lag between `now_ms` and the write timestamp embedded in the only sample
///
/// Anything but exactly one sample is a failure.
pub fn sample_lag(samples: &[Sample], now_ms: i64, status: u16) -> Result<Duration, ReadError> {
    let [sample] = samples else {
        return Err(ReadError::Cardinality {
            got: samples.len(),
            status,
        });
    };

    let written_ms = sample
        .value
        .value()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ReadError::InvalidValue {
            value: sample.value.1.clone(),
            status,
        })? as i64;

    Ok(Duration::from_millis(now_ms.saturating_sub(written_ms).max(0) as u64))
}

/// Check the read-back sample against the latency bound; returns the lag
pub fn verify_sample_latency(
    samples: &[Sample],
    now_ms: i64,
    latency: Duration,
    status: u16,
) -> Result<Duration, ReadError> {
    let lag = sample_lag(samples, now_ms, status)?;
    if lag > latency {
        return Err(ReadError::TooOld {
            lag,
            max: latency,
            status,
        });
    }
    Ok(lag)
}

/// Where written data is read back from
#[derive(Clone)]
pub enum ReadBackend {
    Metrics(ApiClient),
    Logs(LogsClient),
}

/// Reads the written series back and checks its freshness
pub struct ReadProbe {
    backend: ReadBackend,
    labels: LabelSet,
    selector: String,
    ago: Duration,
    latency: Duration,
    outcomes: OutcomeCounter,
    duration: Histogram,
    value_difference: Histogram,
}

impl ReadProbe {
    /// `ago` shifts the instant-query evaluation time into the past
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        backend: ReadBackend,
        labels: LabelSet,
        ago: Duration,
        latency: Duration,
        outcomes: OutcomeCounter,
        duration: Histogram,
        value_difference: Histogram,
    ) -> Self {
        let selector = labels.selector();
        Self {
            backend,
            labels,
            selector,
            ago,
            latency,
            outcomes,
            duration,
            value_difference,
        }
    }

    async fn read(&self) -> Result<u16, ReadError> {
        match &self.backend {
            ReadBackend::Metrics(api) => {
                let at = SystemTime::now()
                    .checked_sub(self.ago)
                    .unwrap_or(UNIX_EPOCH);
                let response = api.query(&self.selector, Some(at), false).await?;
                let status = response.status;
                let samples = match &response.data {
                    Value::Vector(samples) => samples,
                    other => {
                        return Err(ReadError::UnexpectedResult {
                            got: other.type_name(),
                            status,
                        })
                    }
                };

                let now_ms = unix_millis(SystemTime::now());
                let lag = sample_lag(samples, now_ms, status)?;
                self.value_difference.observe(lag.as_secs_f64());
                if lag > self.latency {
                    return Err(ReadError::TooOld {
                        lag,
                        max: self.latency,
                        status,
                    });
                }
                Ok(status)
            }
            ReadBackend::Logs(logs) => Ok(logs.read(&self.labels).await?),
        }
    }
}

#[async_trait]
impl Probe for ReadProbe {
    fn component(&self) -> &'static str {
        READER
    }

    async fn run_once(&self, tick: &TickContext) {
        let started = Instant::now();
        let result = self.read().await;
        self.duration.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(status) => {
                debug!(component = READER, seq = tick.seq, status, "read back succeeded");
                self.outcomes.success(Some(status));
            }
            Err(err) => {
                error!(component = READER, err = %err, "failed to query");
                self.outcomes.failure(err.status());
            }
        }
    }

    fn abandoned(&self, tick: &TickContext) {
        error!(component = READER, seq = tick.seq, "query did not complete before its deadline");
        self.outcomes.failure(None);
    }
}
