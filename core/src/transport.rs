//! HTTP transport: TLS client construction and bearer-token injection

use crate::auth::{AuthError, TokenProvider};
use reqwest::{Certificate, Client, Identity, RequestBuilder, Response};
use schema::TlsOptions;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Response header carrying the backend trace id
pub const TRACE_ID_HEADER: &str = "X-Thanos-Trace-Id";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("tls config: {0}")]
    Tls(String),

    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("get token: {0}")]
    Token(#[from] AuthError),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

/// Build the HTTP client for one endpoint
///
/// TLS files are only honoured for https endpoints. A CA file replaces the
/// built-in roots rather than extending them.
pub fn build_client(endpoint: &Url, tls: &TlsOptions) -> Result<Client, TransportError> {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT);

    if endpoint.scheme() == "https" {
        builder = builder.use_rustls_tls();

        if let Some(ca) = &tls.ca_cert {
            let pem = read_file(ca)?;
            let certs = Certificate::from_pem_bundle(&pem)
                .map_err(|e| TransportError::Tls(format!("parse CA {}: {e}", ca.display())))?;
            if certs.is_empty() {
                return Err(TransportError::Tls(format!(
                    "no certificates found in {}",
                    ca.display()
                )));
            }
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        match (&tls.cert, &tls.key) {
            (Some(cert), Some(key)) => {
                let mut pem = read_file(cert)?;
                pem.push(b'\n');
                pem.extend(read_file(key)?);
                let identity = Identity::from_pem(&pem)
                    .map_err(|e| TransportError::Tls(format!("client identity: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(TransportError::Tls(
                    "client certificate and private key must be given together".to_string(),
                ))
            }
        }
    } else if tls.is_configured() {
        return Err(TransportError::Tls(format!(
            "TLS files given for non-https endpoint {endpoint}"
        )));
    }

    Ok(builder.build()?)
}

fn read_file(path: &Path) -> Result<Vec<u8>, TransportError> {
    std::fs::read(path).map_err(|source| TransportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// HTTP client that authenticates every request with the shared token provider
#[derive(Clone)]
pub struct AuthClient {
    inner: Client,
    token: Arc<TokenProvider>,
}

impl AuthClient {
    pub fn new(inner: Client, token: Arc<TokenProvider>) -> Self {
        Self { inner, token }
    }

    /// Convenience constructor building the transport for `endpoint`
    pub fn for_endpoint(
        endpoint: &Url,
        tls: &TlsOptions,
        token: Arc<TokenProvider>,
    ) -> Result<Self, TransportError> {
        Ok(Self::new(build_client(endpoint, tls)?, token))
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.inner.get(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.inner.post(url)
    }

    /// Attach the bearer token and send
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let token = self.token.get().await?;
        let request = if token.is_empty() {
            request
        } else {
            request.bearer_auth(token)
        };

        let response = request.send().await?;
        if let Some(trace_id) = trace_id(&response) {
            debug!(trace_id, url = %response.url(), "response received");
        }
        Ok(response)
    }
}

/// Backend trace id of a response, if any
pub fn trace_id(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
}
