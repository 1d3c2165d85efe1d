//! YAML batch-file shapes
//!
//! `--queries-file` holds the custom queries run against the read endpoint and
//! `--logs-file` holds the log lines pushed to a logs write endpoint. Durations
//! are humantime strings (`5m`, `1h`, `1d`).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// An instant or range PromQL query
///
/// A non-zero `duration` makes this a range query over `[now - duration, now]`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QuerySpec {
    /// Display name used in logs and metric labels
    pub name: String,
    /// PromQL expression
    pub query: String,
    /// Lookback for range queries
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub duration: Option<Duration>,
    /// Resolution for range queries; defaults to `--step`
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub step: Option<Duration>,
    /// Allow intermediate caches to answer
    #[serde(default)]
    pub cache: bool,
}

impl QuerySpec {
    /// Whether this spec describes a range query
    pub fn is_range(&self) -> bool {
        self.duration.is_some_and(|d| !d.is_zero())
    }
}

/// A label-names query, or a label-values query when `label` is set
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LabelSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub cache: bool,
}

/// A series query over one or more matchers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SeriesSpec {
    pub name: String,
    pub matchers: Vec<String>,
    #[serde(default, with = "humantime_opt", skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub duration: Option<Duration>,
    #[serde(default)]
    pub cache: bool,
}

/// Contents of `--queries-file`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct QueriesFile {
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
    #[serde(default)]
    pub labels: Vec<LabelSpec>,
    #[serde(default)]
    pub series: Vec<SeriesSpec>,
}

impl QueriesFile {
    /// Total number of queries across every section
    pub fn len(&self) -> usize {
        self.queries.len() + self.labels.len() + self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Log lines as `[timestamp, line]` pairs
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LogsSpec {
    #[serde(default)]
    pub logs: Vec<Vec<String>>,
}

/// Contents of `--logs-file`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct LogsFile {
    pub spec: LogsSpec,
}

/// Serde adapter for optional humantime durations
mod humantime_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => humantime::parse_duration(s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
