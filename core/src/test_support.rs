//! Fake HTTP backends for unit tests

use hyper::body::Bytes;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, HeaderMap, Method, Response, Server, Uri};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A request as seen by the fake backend
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Shared log of every request the backend served
pub type RequestLog = Arc<Mutex<Vec<Recorded>>>;

/// Start a backend answering every request with `handler`
pub async fn start_test_server<F>(handler: F) -> (SocketAddr, RequestLog)
where
    F: Fn(&Recorded) -> Response<Body> + Send + Sync + 'static,
{
    start_delayed_test_server(|_| Duration::ZERO, handler).await
}

/// Like [`start_test_server`], but the n-th request (0-based) is answered
/// only after `delay(n)`; requests are logged on arrival
pub async fn start_delayed_test_server<D, F>(delay: D, handler: F) -> (SocketAddr, RequestLog)
where
    D: Fn(usize) -> Duration + Send + Sync + 'static,
    F: Fn(&Recorded) -> Response<Body> + Send + Sync + 'static,
{
    let delay = Arc::new(delay);
    let handler = Arc::new(handler);
    let log: RequestLog = Arc::new(Mutex::new(Vec::new()));
    let svc_log = log.clone();

    let make_svc = make_service_fn(move |_conn| {
        let delay = delay.clone();
        let handler = handler.clone();
        let log = svc_log.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: hyper::Request<Body>| {
                let delay = delay.clone();
                let handler = handler.clone();
                let log = log.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body = hyper::body::to_bytes(body).await.unwrap_or_default();
                    let recorded = Recorded {
                        method: parts.method,
                        uri: parts.uri,
                        headers: parts.headers,
                        body,
                    };
                    let response = handler(&recorded);
                    let seen = {
                        let mut log = log.lock().unwrap();
                        log.push(recorded);
                        log.len() - 1
                    };
                    tokio::time::sleep(delay(seen)).await;
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr = ([127, 0, 0, 1], 0).into();
    let server = Server::bind(&addr).serve(make_svc);
    let addr = server.local_addr();

    tokio::spawn(async move {
        if let Err(e) = server.await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, log)
}

/// JSON response with the given status
pub fn json(status: u16, body: serde_json::Value) -> Response<Body> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Plain-text response with the given status
pub fn text(status: u16, body: &str) -> Response<Body> {
    Response::builder()
        .status(status)
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Successful instant-vector response carrying one sample with `value`
pub fn vector_response(values: &[f64]) -> serde_json::Value {
    let result: Vec<serde_json::Value> = values
        .iter()
        .map(|v| {
            serde_json::json!({
                "metric": {"__name__": "up"},
                "value": [1600000000.0, v.to_string()]
            })
        })
        .collect();
    serde_json::json!({
        "status": "success",
        "data": {"resultType": "vector", "result": result}
    })
}

/// Decode a form-encoded body or query string into pairs
pub fn form_pairs(raw: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw.as_bytes())
        .into_owned()
        .collect()
}
