use super::*;
use crate::auth::TokenProvider;
use crate::test_support::{form_pairs, json, start_test_server, text, vector_response};
use hyper::Method;
use serde_json::json as j;
use std::net::SocketAddr;
use std::sync::Arc;

fn client_for(addr: SocketAddr, path: &str, token: TokenProvider) -> ApiClient {
    let endpoint = Url::parse(&format!("http://{addr}{path}")).unwrap();
    let http = crate::transport::build_client(&endpoint, &Default::default()).unwrap();
    ApiClient::new(AuthClient::new(http, Arc::new(token)), endpoint)
}

#[test]
fn test_classify_success() {
    let body = j!({"status": "success", "data": ["a", "b"], "warnings": ["partial"]}).to_string();
    let resp = classify(200, body.as_bytes()).unwrap();
    assert_eq!(resp.data, j!(["a", "b"]));
    assert_eq!(resp.warnings, vec!["partial".to_string()]);
}

#[test]
fn test_classify_status_classes() {
    let err = classify(503, b"backend down").unwrap_err();
    match err {
        ApiError::Api {
            error_type,
            detail,
            status,
            ..
        } => {
            assert_eq!(error_type, ErrorType::Server);
            assert_eq!(detail.as_deref(), Some("backend down"));
            assert_eq!(status, 503);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(
        classify(404, b"").unwrap_err().error_type(),
        Some(&ErrorType::Client)
    );
    assert_eq!(
        classify(301, b"").unwrap_err().error_type(),
        Some(&ErrorType::BadResponse)
    );
}

#[test]
fn test_classify_reported_error() {
    let body = j!({"status": "error", "errorType": "bad_data", "error": "parse error"}).to_string();
    let err = classify(400, body.as_bytes()).unwrap_err();
    assert_eq!(
        err.error_type(),
        Some(&ErrorType::Reported("bad_data".to_string()))
    );
    assert_eq!(err.to_string(), "bad_data: parse error");
}

#[test]
fn test_classify_inconsistent_body() {
    let body = j!({"status": "success", "data": []}).to_string();
    let err = classify(422, body.as_bytes()).unwrap_err();
    assert!(err.to_string().contains("inconsistent body for response code"));
}

#[test]
fn test_classify_undecodable_body() {
    let err = classify(200, b"<html>").unwrap_err();
    assert_eq!(err.error_type(), Some(&ErrorType::BadResponse));
    assert!(classify(204, b"").is_ok());
}

#[test]
fn test_api_root() {
    let url = |s: &str| Url::parse(s).unwrap();
    assert_eq!(
        api_root(&url("http://prom:9090/api/v1/query")).as_str(),
        "http://prom:9090/"
    );
    assert_eq!(
        api_root(&url("https://gw/api/metrics/v1/tenant/api/v1/query")).as_str(),
        "https://gw/api/metrics/v1/tenant"
    );
    assert_eq!(
        api_root(&url("http://loki:3100/loki/api/v1/query")).as_str(),
        "http://loki:3100/loki"
    );
}

#[test]
fn test_format_time() {
    let t = UNIX_EPOCH + Duration::from_millis(1_600_000_000_500);
    assert_eq!(format_time(t), "1600000000.5");
    assert_eq!(format_time(UNIX_EPOCH + Duration::from_secs(10)), "10");
    assert_eq!(format_step(Duration::from_secs(300)), "300");
    assert_eq!(format_step(Duration::from_millis(1500)), "1.5");
}

#[tokio::test]
async fn test_post_not_allowed_falls_back_to_get() {
    let (addr, log) = start_test_server(|req| {
        if req.method == Method::POST {
            text(405, "method not allowed")
        } else {
            json(200, vector_response(&[42.0]))
        }
    })
    .await;

    let client = client_for(addr, "/api/v1/query", TokenProvider::NoOp);
    let resp = client.query("up", Some(SystemTime::now()), false).await.unwrap();
    assert_eq!(resp.status, 200);
    assert_eq!(resp.data.len(), 1);

    let requests = log.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[1].method, Method::GET);

    let posted = form_pairs(std::str::from_utf8(&requests[0].body).unwrap());
    let got = form_pairs(requests[1].uri.query().unwrap_or_default());
    assert_eq!(posted, got);
    assert_eq!(requests[1].header("cache-control"), Some("no-store"));
}

#[tokio::test]
async fn test_post_form_and_bearer_token() {
    let (addr, log) = start_test_server(|_| json(200, vector_response(&[1.0]))).await;

    let client = client_for(addr, "/api/v1/query", TokenProvider::Static("secret".to_string()));
    client.query(r#"{a="b"}"#, None, true).await.unwrap();

    let requests = log.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::POST);
    assert_eq!(req.header("authorization"), Some("Bearer secret"));
    assert_eq!(
        req.header("content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(req.header("cache-control"), None);
    let pairs = form_pairs(std::str::from_utf8(&req.body).unwrap());
    assert_eq!(pairs, vec![("query".to_string(), r#"{a="b"}"#.to_string())]);
}

#[tokio::test]
async fn test_other_errors_do_not_fall_back() {
    let (addr, log) = start_test_server(|_| text(500, "boom")).await;

    let client = client_for(addr, "/api/v1/query", TokenProvider::NoOp);
    let err = client.query("up", None, false).await.unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_custom_endpoints_resolve_against_root() {
    let (addr, log) = start_test_server(|req| match req.uri.path() {
        "/prefix/api/v1/series" => json(200, j!({"status": "success", "data": [{"job": "x"}]})),
        "/prefix/api/v1/labels" => json(200, j!({"status": "success", "data": ["job"]})),
        "/prefix/api/v1/label/job/values" => {
            json(200, j!({"status": "success", "data": ["x", "y"]}))
        }
        "/prefix/api/v1/query_range" => json(
            200,
            j!({"status": "success", "data": {"resultType": "matrix", "result": []}}),
        ),
        _ => text(404, "not found"),
    })
    .await;

    let client = client_for(addr, "/prefix/api/v1/query", TokenProvider::NoOp);
    let now = SystemTime::now();
    let start = now - Duration::from_secs(300);

    let series = client
        .series(&[r#"up{job="x"}"#.to_string()], start, now, false)
        .await
        .unwrap();
    assert_eq!(series.data[0]["job"], "x");

    let names = client.label_names(start, now, false).await.unwrap();
    assert_eq!(names.data, vec!["job".to_string()]);

    let values = client.label_values("job", start, now, false).await.unwrap();
    assert_eq!(values.data.len(), 2);

    let range = client
        .query_range("up", start, now, Duration::from_secs(30), false)
        .await
        .unwrap();
    assert!(range.data.is_empty());

    let requests = log.lock().unwrap().clone();
    let series_req = &requests[0];
    let pairs = form_pairs(std::str::from_utf8(&series_req.body).unwrap());
    assert!(pairs.iter().any(|(k, v)| k == "match[]" && v == r#"up{job="x"}"#));
    let range_pairs = form_pairs(std::str::from_utf8(&requests[3].body).unwrap());
    assert!(range_pairs.contains(&("step".to_string(), "30".to_string())));
}
