use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyperjson_client::{
    Client, Transport, TransportError, TransportRequest, TransportResponse, telemetry,
};
use metrics_util::debugging::DebuggingRecorder;
use serial_test::serial;

/// Serves every path with a small JSON body, except `/broken` which fails.
struct PathEcho;

#[async_trait]
impl Transport for PathEcho {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        tokio::task::yield_now().await;
        match request.url.path() {
            "/broken" => Ok(TransportResponse::new(503, "unavailable")),
            path => Ok(TransportResponse::new(200, format!(r#"{{"path": "{path}"}}"#))),
        }
    }
}

async fn wait_idle(client: &Client, hrefs: &[&str]) {
    for _ in 0..100 {
        if hrefs.iter().all(|href| !client.is_pending(href)) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("fetches did not settle");
}

#[tokio::test]
#[serial]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let client = Client::builder("http://api.test/")
        .max_size(1)
        .transport(PathEcho)
        .build()
        .expect("client builds");

    // miss + fetch, then hit
    client.fetch("/a").await.expect("first read");
    client.fetch("/a").await.expect("cached read");

    // joined fetch; settling /b evicts /a
    client.get("/b", |_outcome| {});
    client.get("/b", |_outcome| {});
    wait_idle(&client, &["/b"]).await;
    assert!(!client.cache().contains("http://api.test/a"));

    // failed revalidation
    client.refresh("/broken", None);
    tokio::time::sleep(Duration::from_millis(5)).await;
    wait_idle(&client, &["/broken"]).await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "hyperjson_cache_hit_total",
        "hyperjson_cache_miss_total",
        "hyperjson_cache_evict_total",
        "hyperjson_fetch_total",
        "hyperjson_fetch_joined_total",
        "hyperjson_fetch_ms",
        "hyperjson_bust_failed_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
