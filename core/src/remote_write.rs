//! Remote-write encoding and delivery
//!
//! A metrics write is a single-sample `WriteRequest` protobuf compressed with
//! the Snappy block format. Logs writes reuse the same sender with a Loki JSON
//! push body.

use crate::logs::PushRequest;
use crate::transport::{AuthClient, TransportError};
use prost::Message;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use schema::LabelSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Protocol version header sent with every metrics write
pub const REMOTE_WRITE_VERSION_HEADER: &str = "X-Prometheus-Remote-Write-Version";
pub const REMOTE_WRITE_VERSION: &str = "0.1.0";

/// Remote-write protobuf messages (field numbers of `prompb`)
pub mod prompb {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct WriteRequest {
        #[prost(message, repeated, tag = "1")]
        pub timeseries: Vec<TimeSeries>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct TimeSeries {
        #[prost(message, repeated, tag = "1")]
        pub labels: Vec<Label>,
        #[prost(message, repeated, tag = "2")]
        pub samples: Vec<Sample>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Label {
        #[prost(string, tag = "1")]
        pub name: String,
        #[prost(string, tag = "2")]
        pub value: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Sample {
        #[prost(double, tag = "1")]
        pub value: f64,
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("encode request: {0}")]
    Encode(String),

    #[error("non-200 status {status}: {body}")]
    Status { status: u16, body: String },
}

impl WriteError {
    /// HTTP status of the failed write, if a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            WriteError::Status { status, .. } => Some(*status),
            WriteError::Transport(TransportError::Http(err)) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Header identifying the tenant of every write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub header: String,
    pub id: String,
}

/// Milliseconds since the Unix epoch
pub fn unix_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as i64
}

/// Build the single-sample write request for `labels` at `now`
///
/// Value and timestamp both carry `now` in milliseconds, so a reader can
/// compute end-to-end lag from the value alone. `labels` must already include
/// the metric name and be sorted.
pub fn generate(labels: &LabelSet, now: SystemTime) -> prompb::WriteRequest {
    let ms = unix_millis(now);
    prompb::WriteRequest {
        timeseries: vec![prompb::TimeSeries {
            labels: labels
                .iter()
                .map(|l| prompb::Label {
                    name: l.name.clone(),
                    value: l.value.clone(),
                })
                .collect(),
            samples: vec![prompb::Sample {
                value: ms as f64,
                timestamp: ms,
            }],
        }],
    }
}

/// Protobuf-encode and Snappy-compress a write request
pub fn encode(request: &prompb::WriteRequest) -> Result<Vec<u8>, WriteError> {
    let raw = request.encode_to_vec();
    snap::raw::Encoder::new()
        .compress_vec(&raw)
        .map_err(|e| WriteError::Encode(e.to_string()))
}

/// Body of one write
#[derive(Debug, Clone)]
pub enum WritePayload {
    Metrics(prompb::WriteRequest),
    Logs(PushRequest),
}

/// Sends write payloads to one endpoint
#[derive(Clone)]
pub struct RemoteWriter {
    client: AuthClient,
    endpoint: Url,
    tenant: Option<Tenant>,
}

impl RemoteWriter {
    pub fn new(client: AuthClient, endpoint: Url, tenant: Option<Tenant>) -> Self {
        Self {
            client,
            endpoint,
            tenant,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// POST one payload; anything but 200 is an error
    ///
    /// Returns the response status on success.
    pub async fn write(&self, payload: &WritePayload) -> Result<u16, WriteError> {
        let mut request = self.client.post(self.endpoint.clone());
        request = match payload {
            WritePayload::Metrics(req) => request
                .header(CONTENT_TYPE, "application/x-protobuf")
                .header(CONTENT_ENCODING, "snappy")
                .header(REMOTE_WRITE_VERSION_HEADER, REMOTE_WRITE_VERSION)
                .body(encode(req)?),
            WritePayload::Logs(req) => {
                let body =
                    serde_json::to_vec(req).map_err(|e| WriteError::Encode(e.to_string()))?;
                request.header(CONTENT_TYPE, "application/json").body(body)
            }
        };
        if let Some(tenant) = &self.tenant {
            request = request.header(tenant.header.as_str(), tenant.id.as_str());
        }

        let response = self.client.send(request).await?;
        let status = response.status();
        // Always drain so the connection returns to the pool
        let body = response.bytes().await.unwrap_or_default();

        if status != StatusCode::OK {
            return Err(WriteError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        debug!(endpoint = %self.endpoint, "write accepted");
        Ok(status.as_u16())
    }
}
