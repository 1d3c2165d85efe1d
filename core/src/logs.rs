//! Loki push payloads and log read-back

use crate::api::{api_root, format_step};
use crate::transport::{AuthClient, TransportError};
use reqwest::StatusCode;
use schema::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use url::Url;

const QUERY_RANGE_PATH: &str = "/api/v1/query_range";

/// One labelled stream of `[<ns timestamp>, <line>]` entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub stream: BTreeMap<String, String>,
    pub values: Vec<[String; 2]>,
}

/// Loki push request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<Stream>,
}

#[derive(Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum LogsError {
    #[error("making request: {0}")]
    Transport(#[from] TransportError),

    #[error("non-200 status: {status}")]
    Status { status: u16 },

    #[error("unmarshalling response: {message}")]
    Decode { status: u16, message: String },

    #[error("expected one log entry, got {got}")]
    Cardinality { status: u16, got: usize },

    #[error("expected at least one log entry, got none")]
    Empty { status: u16 },
}

impl LogsError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LogsError::Transport(TransportError::Http(err)) => err.status().map(|s| s.as_u16()),
            LogsError::Transport(_) => None,
            LogsError::Status { status }
            | LogsError::Decode { status, .. }
            | LogsError::Cardinality { status, .. }
            | LogsError::Empty { status } => Some(*status),
        }
    }
}

/// Nanoseconds since the Unix epoch
pub fn unix_nanos(t: SystemTime) -> u128 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos()
}

/// Build a push request carrying every configured line stamped with `now`
///
/// Each configured entry is `[timestamp, line]`; only the line is kept. Reserved
/// `__`-prefixed labels are not valid stream labels and are dropped.
pub fn generate(labels: &LabelSet, lines: &[Vec<String>], now: SystemTime) -> PushRequest {
    let ts = unix_nanos(now).to_string();
    let stream = labels
        .without_reserved()
        .iter()
        .map(|l| (l.name.clone(), l.value.clone()))
        .collect();
    let values = lines
        .iter()
        .filter_map(|entry| entry.last())
        .map(|line| [ts.clone(), line.clone()])
        .collect();

    PushRequest {
        streams: vec![Stream { stream, values }],
    }
}

/// Log query client bound to one read endpoint
#[derive(Clone)]
pub struct LogsClient {
    client: AuthClient,
    endpoint: Url,
    root: Url,
}

impl LogsClient {
    pub fn new(client: AuthClient, endpoint: Url) -> Self {
        let root = api_root(&endpoint);
        Self {
            client,
            endpoint,
            root,
        }
    }

    /// Read back the written stream; exactly one stream must match
    pub async fn read(&self, labels: &LabelSet) -> Result<u16, LogsError> {
        let selector = labels.without_reserved().selector();
        let (status, results) = self
            .get(self.endpoint.clone(), &[("query", selector)])
            .await?;
        if results != 1 {
            return Err(LogsError::Cardinality {
                status,
                got: results,
            });
        }
        Ok(status)
    }

    /// Run a custom instant or range log query; at least one result is required
    pub async fn query(
        &self,
        query: &str,
        range: Option<(Duration, Duration)>,
    ) -> Result<u16, LogsError> {
        let mut params = vec![("query", query.to_string())];
        let url = match range {
            Some((lookback, step)) => {
                let end = SystemTime::now();
                let start = end.checked_sub(lookback).unwrap_or(UNIX_EPOCH);
                params.push(("start", unix_nanos(start).to_string()));
                params.push(("end", unix_nanos(end).to_string()));
                params.push(("step", format_step(step)));
                let mut url = self.root.clone();
                let base = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!("{base}{QUERY_RANGE_PATH}"));
                url
            }
            None => self.endpoint.clone(),
        };

        let (status, results) = self.get(url, &params).await?;
        if results == 0 {
            return Err(LogsError::Empty { status });
        }
        Ok(status)
    }

    async fn get(&self, mut url: Url, params: &[(&str, String)]) -> Result<(u16, usize), LogsError> {
        url.query_pairs_mut()
            .clear()
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));

        let response = self.client.send(self.client.get(url)).await?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| LogsError::Transport(TransportError::Http(e)))?;
        let status_code = status.as_u16();

        if status != StatusCode::OK {
            return Err(LogsError::Status {
                status: status_code,
            });
        }

        let decoded: QueryResponse =
            serde_json::from_slice(&body).map_err(|e| LogsError::Decode {
                status: status_code,
                message: e.to_string(),
            })?;
        Ok((status_code, decoded.data.result.len()))
    }
}
