#![allow(unused_crate_dependencies)]
//! Test utilities for CLI crate integration tests.
#![allow(missing_docs)]
#![allow(dead_code)]

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Request counters of a [`FakeBackend`]
#[derive(Default)]
pub struct Hits {
    pub writes: AtomicUsize,
    pub queries: AtomicUsize,
}

/// Remote-write receiver and query API on one port
pub struct FakeBackend {
    pub addr: SocketAddr,
    pub hits: Arc<Hits>,
}

impl FakeBackend {
    /// Start a backend whose writes answer `write_status` and whose queries
    /// return one fresh sample
    pub async fn start(write_status: u16) -> Self {
        let hits = Arc::new(Hits::default());
        let svc_hits = hits.clone();

        let make_svc = make_service_fn(move |_conn| {
            let hits = svc_hits.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                    let hits = hits.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let _ = hyper::body::to_bytes(req.into_body()).await;
                        let response = if path == "/api/v1/receive" {
                            hits.writes.fetch_add(1, Ordering::SeqCst);
                            Response::builder()
                                .status(write_status)
                                .body(Body::empty())
                                .unwrap()
                        } else {
                            hits.queries.fetch_add(1, Ordering::SeqCst);
                            Response::builder()
                                .header("content-type", "application/json")
                                .body(Body::from(fresh_vector().to_string()))
                                .unwrap()
                        };
                        Ok::<_, Infallible>(response)
                    }
                }))
            }
        });

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::from_tcp(listener).unwrap().serve(make_svc);
        tokio::spawn(async move {
            if let Err(e) = server.await {
                eprintln!("Server error: {}", e);
            }
        });

        Self { addr, hits }
    }

    pub fn write_url(&self) -> String {
        format!("http://{}/api/v1/receive", self.addr)
    }

    pub fn read_url(&self) -> String {
        format!("http://{}/api/v1/query", self.addr)
    }
}

fn fresh_vector() -> serde_json::Value {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as f64;
    serde_json::json!({
        "status": "success",
        "data": {
            "resultType": "vector",
            "result": [{
                "metric": {"__name__": "up"},
                "value": [now_ms / 1000.0, (now_ms - 20.0).to_string()]
            }]
        }
    })
}
