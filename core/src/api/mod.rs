//! Prometheus-compatible query API client
//!
//! Requests are sent as form-encoded POSTs. Backends that only accept GET on a
//! path answer `405`, in which case the identical parameters are retried as a
//! GET query string. Responses are classified into typed [`ApiError`]s the
//! same way regardless of which method succeeded.
//!
//! ## Endpoints
//!
//! The configured read endpoint is the instant-query URL. Every other path is
//! resolved against its root, the endpoint with a trailing `/api/v1/query`
//! removed.

pub mod error;
pub mod types;

pub use error::{ApiError, ErrorType};
pub use types::{Sample, SamplePair, SampleStream, Value};

use crate::transport::{AuthClient, TransportError};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::form_urlencoded;
use url::Url;

const QUERY_PATH: &str = "/api/v1/query";
const QUERY_RANGE_PATH: &str = "/api/v1/query_range";
const SERIES_PATH: &str = "/api/v1/series";
const LABELS_PATH: &str = "/api/v1/labels";

/// Status codes Prometheus uses for errors with a JSON body
const STATUS_API_ERROR: u16 = 422;

/// A decoded successful response
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse<T> {
    pub data: T,
    pub status: u16,
    pub warnings: Vec<String>,
}

impl<T> ApiResponse<T> {
    fn map<U>(self, data: U) -> ApiResponse<U> {
        ApiResponse {
            data,
            status: self.status,
            warnings: self.warnings,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Envelope {
    status: String,
    data: serde_json::Value,
    #[serde(rename = "errorType")]
    error_type: String,
    error: String,
    warnings: Vec<String>,
}

fn is_api_error(status: u16) -> bool {
    status == STATUS_API_ERROR || status == StatusCode::BAD_REQUEST.as_u16()
}

/// Classify a raw response into data or a typed error
pub fn classify(status: u16, body: &[u8]) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    if status / 100 != 2 && !is_api_error(status) {
        let (error_type, message) = ErrorType::for_status(status);
        return Err(ApiError::Api {
            error_type,
            message,
            detail: Some(String::from_utf8_lossy(body).into_owned()),
            status,
        });
    }

    let mut envelope = Envelope::default();
    if status != StatusCode::NO_CONTENT.as_u16() {
        envelope = serde_json::from_slice(body).map_err(|e| ApiError::Api {
            error_type: ErrorType::BadResponse,
            message: e.to_string(),
            detail: None,
            status,
        })?;
    }

    if envelope.status == "error" {
        return Err(ApiError::Api {
            error_type: ErrorType::from_reported(&envelope.error_type),
            message: envelope.error,
            detail: None,
            status,
        });
    }

    if is_api_error(status) && envelope.status == "success" {
        return Err(ApiError::Api {
            error_type: ErrorType::BadResponse,
            message: "inconsistent body for response code".to_string(),
            detail: None,
            status,
        });
    }

    Ok(ApiResponse {
        data: envelope.data,
        status,
        warnings: envelope.warnings,
    })
}

/// Decimal seconds with sub-second precision
pub fn format_time(t: SystemTime) -> String {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs_f64();
    format!("{secs}")
}

/// Step as decimal seconds
pub fn format_step(step: Duration) -> String {
    format!("{}", step.as_secs_f64())
}

/// Strip a trailing `/api/v1/query` to get the API root
pub fn api_root(endpoint: &Url) -> Url {
    let mut root = endpoint.clone();
    root.set_query(None);
    root.set_fragment(None);
    let path = endpoint.path().trim_end_matches('/');
    let base = path.strip_suffix(QUERY_PATH).unwrap_or(path).to_string();
    root.set_path(&base);
    root
}

/// Query API client bound to one read endpoint
#[derive(Clone)]
pub struct ApiClient {
    client: AuthClient,
    endpoint: Url,
    root: Url,
}

impl ApiClient {
    pub fn new(client: AuthClient, endpoint: Url) -> Self {
        let root = api_root(&endpoint);
        Self {
            client,
            endpoint,
            root,
        }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn root(&self) -> &Url {
        &self.root
    }

    /// Resolve an API path against the root
    pub fn url(&self, path: &str) -> Url {
        let mut url = self.root.clone();
        let base = url.path().trim_end_matches('/').to_string();
        url.set_path(&format!("{base}{path}"));
        url
    }

    /// Instant query against the read endpoint itself
    pub async fn query(
        &self,
        query: &str,
        time: Option<SystemTime>,
        cache: bool,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let mut params = vec![("query", query.to_string())];
        if let Some(time) = time {
            params.push(("time", format_time(time)));
        }
        let raw = self
            .do_get_fallback(self.endpoint.clone(), &params, cache)
            .await?;
        decode_value(raw)
    }

    pub async fn query_range(
        &self,
        query: &str,
        start: SystemTime,
        end: SystemTime,
        step: Duration,
        cache: bool,
    ) -> Result<ApiResponse<Value>, ApiError> {
        let params = vec![
            ("query", query.to_string()),
            ("start", format_time(start)),
            ("end", format_time(end)),
            ("step", format_step(step)),
        ];
        let raw = self
            .do_get_fallback(self.url(QUERY_RANGE_PATH), &params, cache)
            .await?;
        decode_value(raw)
    }

    pub async fn series(
        &self,
        matchers: &[String],
        start: SystemTime,
        end: SystemTime,
        cache: bool,
    ) -> Result<ApiResponse<Vec<BTreeMap<String, String>>>, ApiError> {
        let mut params: Vec<(&str, String)> =
            matchers.iter().map(|m| ("match[]", m.clone())).collect();
        params.push(("start", format_time(start)));
        params.push(("end", format_time(end)));
        let raw = self
            .do_get_fallback(self.url(SERIES_PATH), &params, cache)
            .await?;
        decode_plain(raw)
    }

    pub async fn label_names(
        &self,
        start: SystemTime,
        end: SystemTime,
        cache: bool,
    ) -> Result<ApiResponse<Vec<String>>, ApiError> {
        let params = vec![("start", format_time(start)), ("end", format_time(end))];
        let raw = self
            .do_get_fallback(self.url(LABELS_PATH), &params, cache)
            .await?;
        decode_plain(raw)
    }

    pub async fn label_values(
        &self,
        label: &str,
        start: SystemTime,
        end: SystemTime,
        cache: bool,
    ) -> Result<ApiResponse<Vec<String>>, ApiError> {
        let params = vec![("start", format_time(start)), ("end", format_time(end))];
        let url = self.url(&format!("/api/v1/label/{label}/values"));
        let raw = self.do_get_fallback(url, &params, cache).await?;
        decode_plain(raw)
    }

    /// POST the form; on 405 retry the same parameters as a GET
    pub async fn do_get_fallback(
        &self,
        url: Url,
        params: &[(&str, String)],
        cache: bool,
    ) -> Result<ApiResponse<serde_json::Value>, ApiError> {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
            .finish();

        let mut post = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encoded.clone());
        if !cache {
            post = post.header(CACHE_CONTROL, "no-store");
        }
        let response = self.client.send(post).await?;

        if response.status() != StatusCode::METHOD_NOT_ALLOWED {
            return interpret(response).await;
        }

        debug!(url = %url, "POST not allowed, retrying as GET");
        // Drain so the connection can be reused
        let _ = response.bytes().await;

        let mut get_url = url;
        get_url.set_query(Some(&encoded));
        let mut get = self.client.get(get_url);
        if !cache {
            get = get.header(CACHE_CONTROL, "no-store");
        }
        let response = self.client.send(get).await?;
        interpret(response).await
    }
}

async fn interpret(response: Response) -> Result<ApiResponse<serde_json::Value>, ApiError> {
    let status = response.status().as_u16();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::Transport(TransportError::Http(e)))?;
    classify(status, &body)
}

fn decode_value(raw: ApiResponse<serde_json::Value>) -> Result<ApiResponse<Value>, ApiError> {
    let value = types::decode_query_data(&raw.data).map_err(|message| ApiError::Decode {
        message,
        status: raw.status,
    })?;
    Ok(raw.map(value))
}

fn decode_plain<T: DeserializeOwned>(
    raw: ApiResponse<serde_json::Value>,
) -> Result<ApiResponse<T>, ApiError> {
    let data = T::deserialize(&raw.data).map_err(|e| ApiError::Decode {
        message: e.to_string(),
        status: raw.status,
    })?;
    Ok(raw.map(data))
}

#[cfg(test)]
mod api_tests;
