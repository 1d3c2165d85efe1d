//! End-to-end run against an in-memory store
//!
//! The fake backend decodes every remote write and serves the last written
//! sample back from its query endpoint, so a passing run proves that the
//! written value survives the whole write and read path.

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prost::Message;
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use up_core::remote_write::prompb::WriteRequest;
use up_core::{Options, RawOptions};

#[derive(Default)]
struct Store {
    series: Option<(BTreeMap<String, String>, f64)>,
    writes: usize,
    tenants: Vec<String>,
    /// Accept writes without persisting them
    frozen: bool,
}

async fn handle(store: Arc<Mutex<Store>>, req: Request<Body>) -> Response<Body> {
    let path = req.uri().path().to_string();
    let tenant = req
        .headers()
        .get("tenant_id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = hyper::body::to_bytes(req.into_body()).await.unwrap_or_default();

    if path == "/api/v1/receive" {
        let raw = match snap::raw::Decoder::new().decompress_vec(&body) {
            Ok(raw) => raw,
            Err(_) => return status(400),
        };
        let write = match WriteRequest::decode(raw.as_slice()) {
            Ok(write) => write,
            Err(_) => return status(400),
        };
        let mut store = store.lock().unwrap();
        store.writes += 1;
        store.tenants.extend(tenant);
        if store.frozen {
            return status(200);
        }
        for ts in write.timeseries {
            let labels = ts
                .labels
                .into_iter()
                .map(|l| (l.name, l.value))
                .collect();
            if let Some(sample) = ts.samples.last() {
                store.series = Some((labels, sample.value));
            }
        }
        return status(200);
    }

    let result = match &store.lock().unwrap().series {
        Some((labels, value)) => serde_json::json!([{
            "metric": labels,
            "value": [0, value.to_string()]
        }]),
        None => serde_json::json!([]),
    };
    let body = serde_json::json!({
        "status": "success",
        "data": {"resultType": "vector", "result": result}
    });
    Response::builder()
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn status(code: u16) -> Response<Body> {
    Response::builder().status(code).body(Body::empty()).unwrap()
}

async fn start_store(frozen: bool) -> (SocketAddr, Arc<Mutex<Store>>) {
    let store = Arc::new(Mutex::new(Store {
        frozen,
        ..Store::default()
    }));
    let svc_store = store.clone();
    let make_svc = make_service_fn(move |_conn| {
        let store = svc_store.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let store = store.clone();
                async move { Ok::<_, Infallible>(handle(store, req).await) }
            }))
        }
    });

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::from_tcp(listener).unwrap().serve(make_svc);
    tokio::spawn(async move {
        let _ = server.await;
    });
    (addr, store)
}

fn raw(addr: SocketAddr) -> RawOptions {
    RawOptions {
        endpoint_write: Some(format!("http://{addr}/api/v1/receive")),
        endpoint_read: Some(format!("http://{addr}/api/v1/query")),
        labels: vec![r#"job="roundtrip",Zone="a""#.to_string()],
        listen: String::new(),
        period: Duration::from_millis(100),
        duration: Duration::from_millis(1500),
        latency: Duration::from_secs(5),
        initial_query_delay: Duration::from_millis(300),
        tenant: Some("team-a".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_written_sample_is_read_back() {
    let (addr, store) = start_store(false).await;
    let opts = Options::from_raw(raw(addr)).unwrap();

    let outcome = up_core::run(opts).await.unwrap();
    assert!(outcome.is_success(), "{outcome:?}");

    let store = store.lock().unwrap();
    assert!(store.writes >= 10, "only {} writes", store.writes);
    assert!(store.tenants.iter().all(|t| t == "team-a"));
    let (labels, _) = store.series.as_ref().unwrap();
    let names: Vec<_> = labels.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Zone", "__name__", "job"]);
    assert_eq!(labels["__name__"], "up");
}

#[tokio::test]
async fn test_lost_writes_fail_the_reader() {
    let (addr, store) = start_store(true).await;
    let opts = Options::from_raw(RawOptions {
        initial_query_delay: Duration::ZERO,
        ..raw(addr)
    })
    .unwrap();

    let outcome = up_core::run(opts).await.unwrap();
    assert!(!outcome.is_success());
    assert!(outcome.group_error.is_none());
    assert!(outcome
        .verdicts
        .iter()
        .any(|(component, _)| *component == "reader"));
    assert!(store.lock().unwrap().writes > 0);
}
