//! Custom query variants run by the query-reader probe

use crate::api::{ApiClient, ApiError};
use crate::logs::{LogsClient, LogsError};
use promql_parser::parser::{self as promql, Expr};
use schema::{is_valid_label_name, EndpointType, QueriesFile};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Type tag used in logs and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Instant,
    Range,
    Series,
    LabelNames,
    LabelValues,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Instant => "query",
            QueryKind::Range => "query_range",
            QueryKind::Series => "series",
            QueryKind::LabelNames => "label_names",
            QueryKind::LabelValues => "label_values",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named query from the batch file
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    Instant {
        name: String,
        query: String,
        cache: bool,
    },
    Range {
        name: String,
        query: String,
        lookback: Duration,
        step: Option<Duration>,
        cache: bool,
    },
    Series {
        name: String,
        matchers: Vec<String>,
        lookback: Duration,
        cache: bool,
    },
    LabelNames {
        name: String,
        lookback: Duration,
        cache: bool,
    },
    LabelValues {
        name: String,
        label: String,
        lookback: Duration,
        cache: bool,
    },
}

/// Successful query execution
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    pub status: u16,
    pub warnings: Vec<String>,
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("querying: {0}")]
    Api(#[from] ApiError),

    #[error("querying: {0}")]
    Logs(#[from] LogsError),

    #[error("{kind} queries are not supported for logs")]
    Unsupported { kind: QueryKind },

    #[error("query did not complete within {0:?}")]
    DeadlineExceeded(Duration),
}

impl QueryError {
    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Api(err) => err.status(),
            QueryError::Logs(err) => err.status(),
            QueryError::Unsupported { .. } | QueryError::DeadlineExceeded(_) => None,
        }
    }
}

/// Where custom queries are sent
#[derive(Clone)]
pub enum QueryBackend {
    Metrics(ApiClient),
    Logs(LogsClient),
}

impl Query {
    /// Flatten a batch file into queries, in file order per section
    pub fn from_file(file: &QueriesFile) -> Vec<Query> {
        let mut queries = Vec::with_capacity(file.len());

        for q in &file.queries {
            if q.is_range() {
                queries.push(Query::Range {
                    name: q.name.clone(),
                    query: q.query.clone(),
                    lookback: q.duration.unwrap_or_default(),
                    step: q.step.filter(|s| !s.is_zero()),
                    cache: q.cache,
                });
            } else {
                queries.push(Query::Instant {
                    name: q.name.clone(),
                    query: q.query.clone(),
                    cache: q.cache,
                });
            }
        }

        for s in &file.series {
            queries.push(Query::Series {
                name: s.name.clone(),
                matchers: s.matchers.clone(),
                lookback: s.duration.unwrap_or_default(),
                cache: s.cache,
            });
        }

        for l in &file.labels {
            let lookback = l.duration.unwrap_or_default();
            match l.label.as_deref().filter(|label| !label.is_empty()) {
                Some(label) => queries.push(Query::LabelValues {
                    name: l.name.clone(),
                    label: label.to_string(),
                    lookback,
                    cache: l.cache,
                }),
                None => queries.push(Query::LabelNames {
                    name: l.name.clone(),
                    lookback,
                    cache: l.cache,
                }),
            }
        }

        queries
    }

    pub fn name(&self) -> &str {
        match self {
            Query::Instant { name, .. }
            | Query::Range { name, .. }
            | Query::Series { name, .. }
            | Query::LabelNames { name, .. }
            | Query::LabelValues { name, .. } => name,
        }
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            Query::Instant { .. } => QueryKind::Instant,
            Query::Range { .. } => QueryKind::Range,
            Query::Series { .. } => QueryKind::Series,
            Query::LabelNames { .. } => QueryKind::LabelNames,
            Query::LabelValues { .. } => QueryKind::LabelValues,
        }
    }

    /// The PromQL, the joined matchers, or the label name
    pub fn query_string(&self) -> String {
        match self {
            Query::Instant { query, .. } | Query::Range { query, .. } => query.clone(),
            Query::Series { matchers, .. } => matchers.join(", "),
            Query::LabelNames { .. } => String::new(),
            Query::LabelValues { label, .. } => label.clone(),
        }
    }

    fn cache(&self) -> bool {
        match self {
            Query::Instant { cache, .. }
            | Query::Range { cache, .. }
            | Query::Series { cache, .. }
            | Query::LabelNames { cache, .. }
            | Query::LabelValues { cache, .. } => *cache,
        }
    }

    /// Check the query before any probe starts
    pub fn validate(&self, endpoint_type: EndpointType) -> Result<(), String> {
        if endpoint_type == EndpointType::Logs
            && !matches!(self, Query::Instant { .. } | Query::Range { .. })
        {
            return Err(format!(
                "{} query {:?} is not supported for logs",
                self.kind(),
                self.name()
            ));
        }

        match self {
            // LogQL is not PromQL, leave it to the backend
            Query::Instant { .. } | Query::Range { .. } if endpoint_type == EndpointType::Logs => {
                Ok(())
            }
            Query::Instant { name, query, .. } | Query::Range { name, query, .. } => {
                promql::parse(query)
                    .map(|_| ())
                    .map_err(|e| format!("query {name:?} is invalid: {e}"))
            }
            Query::Series { name, matchers, .. } => {
                if matchers.is_empty() {
                    return Err(format!("series query {name:?} matchers cannot be empty"));
                }
                for matcher in matchers {
                    match promql::parse(matcher) {
                        Ok(Expr::VectorSelector(_)) => {}
                        Ok(_) => {
                            return Err(format!(
                                "series query {name:?} matcher {matcher:?} is not a series selector"
                            ))
                        }
                        Err(e) => {
                            return Err(format!(
                                "series query {name:?} matchers are invalid: {e}"
                            ))
                        }
                    }
                }
                Ok(())
            }
            Query::LabelNames { .. } => Ok(()),
            Query::LabelValues { name, label, .. } => {
                if !is_valid_label_name(label) {
                    return Err(format!(
                        "label_values query {name:?} label {label:?} is invalid"
                    ));
                }
                Ok(())
            }
        }
    }

    /// Execute once against `backend`
    pub async fn run(
        &self,
        backend: &QueryBackend,
        default_step: Duration,
    ) -> Result<QueryResponse, QueryError> {
        match backend {
            QueryBackend::Metrics(api) => self.run_metrics(api, default_step).await,
            QueryBackend::Logs(logs) => self.run_logs(logs, default_step).await,
        }
    }

    async fn run_metrics(
        &self,
        api: &ApiClient,
        default_step: Duration,
    ) -> Result<QueryResponse, QueryError> {
        let end = SystemTime::now();
        let start = |lookback: &Duration| end.checked_sub(*lookback).unwrap_or(UNIX_EPOCH);
        let cache = self.cache();

        let (status, warnings) = match self {
            Query::Instant { query, .. } => {
                let r = api.query(query, Some(end), cache).await?;
                (r.status, r.warnings)
            }
            Query::Range {
                query,
                lookback,
                step,
                ..
            } => {
                let step = step.unwrap_or(default_step);
                let r = api
                    .query_range(query, start(lookback), end, step, cache)
                    .await?;
                (r.status, r.warnings)
            }
            Query::Series {
                matchers, lookback, ..
            } => {
                let r = api.series(matchers, start(lookback), end, cache).await?;
                (r.status, r.warnings)
            }
            Query::LabelNames { lookback, .. } => {
                let r = api.label_names(start(lookback), end, cache).await?;
                (r.status, r.warnings)
            }
            Query::LabelValues {
                label, lookback, ..
            } => {
                let r = api
                    .label_values(label, start(lookback), end, cache)
                    .await?;
                (r.status, r.warnings)
            }
        };

        Ok(QueryResponse { status, warnings })
    }

    async fn run_logs(
        &self,
        logs: &LogsClient,
        default_step: Duration,
    ) -> Result<QueryResponse, QueryError> {
        let status = match self {
            Query::Instant { query, .. } => logs.query(query, None).await?,
            Query::Range {
                query,
                lookback,
                step,
                ..
            } => {
                logs.query(query, Some((*lookback, step.unwrap_or(default_step))))
                    .await?
            }
            other => return Err(QueryError::Unsupported { kind: other.kind() }),
        };
        Ok(QueryResponse {
            status,
            warnings: Vec::new(),
        })
    }
}
