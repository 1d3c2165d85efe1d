use super::{Probe, WRITER};
use crate::logs;
use crate::remote_write::{self, RemoteWriter, WritePayload};
use crate::report::OutcomeCounter;
use crate::scheduler::TickContext;
use async_trait::async_trait;
use prometheus::Histogram;
use schema::{EndpointType, LabelSet};
use std::time::{Instant, SystemTime};
use tracing::{debug, error};

/// Writes one fresh sample (or log batch) per tick
pub struct WriteProbe {
    writer: RemoteWriter,
    endpoint_type: EndpointType,
    labels: LabelSet,
    lines: Vec<Vec<String>>,
    outcomes: OutcomeCounter,
    duration: Histogram,
}

impl WriteProbe {
    pub fn new(
        writer: RemoteWriter,
        endpoint_type: EndpointType,
        labels: LabelSet,
        lines: Vec<Vec<String>>,
        outcomes: OutcomeCounter,
        duration: Histogram,
    ) -> Self {
        Self {
            writer,
            endpoint_type,
            labels,
            lines,
            outcomes,
            duration,
        }
    }

    fn payload(&self, now: SystemTime) -> WritePayload {
        match self.endpoint_type {
            EndpointType::Metrics => WritePayload::Metrics(remote_write::generate(&self.labels, now)),
            EndpointType::Logs => WritePayload::Logs(logs::generate(&self.labels, &self.lines, now)),
        }
    }
}

#[async_trait]
impl Probe for WriteProbe {
    fn component(&self) -> &'static str {
        WRITER
    }

    async fn run_once(&self, tick: &TickContext) {
        let payload = self.payload(SystemTime::now());
        let started = Instant::now();
        let result = self.writer.write(&payload).await;
        self.duration.observe(started.elapsed().as_secs_f64());

        match result {
            Ok(status) => {
                debug!(component = WRITER, seq = tick.seq, status, "write succeeded");
                self.outcomes.success(Some(status));
            }
            Err(err) => {
                error!(component = WRITER, err = %err, "failed to make request");
                self.outcomes.failure(err.status());
            }
        }
    }

    fn abandoned(&self, tick: &TickContext) {
        error!(component = WRITER, seq = tick.seq, "request did not complete before its deadline");
        self.outcomes.failure(None);
    }
}
