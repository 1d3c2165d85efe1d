#![allow(unused_crate_dependencies)]
mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use clap::Parser;
use cli::Args;
use common::{run_with_timeout, FakeBackend};

fn args(backend: &FakeBackend) -> Vec<String> {
    let mut argv = vec![
        "up".to_string(),
        "--endpoint-write".to_string(),
        backend.write_url(),
        "--endpoint-read".to_string(),
        backend.read_url(),
    ];
    argv.extend(
        [
            "--labels",
            r#"job="e2e""#,
            "--listen",
            "",
            "--period",
            "100ms",
            "--duration",
            "1500ms",
            "--latency",
            "5s",
            "--initial-query-delay",
            "0s",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    argv
}

#[tokio::test]
async fn test_healthy_backend_passes() {
    let backend = FakeBackend::start(200).await;
    let args = Args::try_parse_from(args(&backend)).unwrap();

    let result = run_with_timeout(Duration::from_secs(10), cli::execute(args)).await;
    assert!(result.is_ok(), "{result:?}");
    assert!(backend.hits.writes.load(Ordering::SeqCst) >= 10);
    assert!(backend.hits.queries.load(Ordering::SeqCst) >= 10);
}

#[tokio::test]
async fn test_rejected_writes_fail() {
    let backend = FakeBackend::start(503).await;
    let args = Args::try_parse_from(args(&backend)).unwrap();

    let err = run_with_timeout(Duration::from_secs(10), cli::execute(args))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CLI004");
    assert!(err.to_string().contains("writer"));
}

#[tokio::test]
async fn test_strict_threshold_tolerates_nothing() {
    let backend = FakeBackend::start(200).await;
    let mut argv = args(&backend);
    argv.extend(["--threshold".to_string(), "1".to_string()]);
    let args = Args::try_parse_from(argv).unwrap();

    let result = run_with_timeout(Duration::from_secs(10), cli::execute(args)).await;
    assert!(result.is_ok(), "{result:?}");
}
