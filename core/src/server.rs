//! Embedded HTTP server exposing `/metrics`

use crate::instr::Metrics;
use crate::{CoreError, Result};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::{header, Body, Method, Request, Response, Server, StatusCode};
use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long in-flight scrapes may take once shutdown begins
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Resolve a listen address; a bare `:port` binds every interface
pub fn parse_listen_addr(listen: &str) -> std::result::Result<SocketAddr, String> {
    let candidate = match listen.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => listen.to_string(),
    };
    if let Ok(addr) = candidate.parse::<SocketAddr>() {
        return Ok(addr);
    }
    candidate
        .to_socket_addrs()
        .map_err(|e| format!("invalid listen address {listen:?}: {e}"))?
        .next()
        .ok_or_else(|| format!("listen address {listen:?} did not resolve"))
}

/// A bound but not yet serving metrics server
pub struct MetricsServer {
    incoming: AddrIncoming,
    metrics: Metrics,
}

impl MetricsServer {
    pub fn bind(addr: SocketAddr, metrics: Metrics) -> Result<Self> {
        let incoming = AddrIncoming::bind(&addr).map_err(|e| {
            CoreError::InitializationError(format!("failed to listen on {addr}: {e}"))
        })?;
        Ok(Self { incoming, metrics })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.incoming.local_addr()
    }

    /// Serve until `shutdown` is cancelled, then drain for at most
    /// [`SHUTDOWN_GRACE`]
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr();
        let metrics = self.metrics;
        let make_svc = make_service_fn(move |_conn| {
            let metrics = metrics.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let metrics = metrics.clone();
                    async move { Ok::<_, Infallible>(handle(&metrics, req)) }
                }))
            }
        });

        let signal = shutdown.clone();
        let server = Server::builder(self.incoming)
            .serve(make_svc)
            .with_graceful_shutdown(async move { signal.cancelled().await });
        tokio::pin!(server);

        info!(component = "http", %addr, "starting the HTTP server");
        let result = tokio::select! {
            result = &mut server => result,
            _ = shutdown.cancelled() => {
                match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(component = "http", "graceful shutdown timed out");
                        Ok(())
                    }
                }
            }
        };

        result.map_err(|e| CoreError::ServerError(format!("HTTP server failed: {e}")))
    }
}

fn handle(metrics: &Metrics, req: Request<Body>) -> Response<Body> {
    if req.uri().path() != "/metrics" || req.method() != Method::GET {
        return status(StatusCode::NOT_FOUND, "404 page not found\n");
    }

    match metrics.render() {
        Ok(text) => Response::builder()
            .header(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)
            .body(Body::from(text))
            .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR, "")),
        Err(err) => {
            error!(component = "http", err = %err, "failed to render metrics");
            status(StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics\n")
        }
    }
}

fn status(code: StatusCode, body: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = code;
    response
}
