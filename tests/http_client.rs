use std::time::Duration;

use httpmock::prelude::*;
use hyperjson_client::transport::HttpTransport;
use hyperjson_client::{Client, ClientError, Submission};
use serde_json::json;
use tokio::sync::oneshot;

fn client_for(server: &MockServer) -> Client {
    Client::builder(server.url("/"))
        .timeout(Duration::from_secs(5))
        .build()
        .expect("client builds")
}

async fn submit(
    client: &Client,
    method: reqwest::Method,
    href: &str,
    body: Option<serde_json::Value>,
) -> Result<Submission, ClientError> {
    let (tx, rx) = oneshot::channel();
    client.submit(method, href, body, move |result| {
        let _ = tx.send(result);
    });
    rx.await.expect("submit callback runs")
}

async fn wait_idle(client: &Client, href: &str) {
    for _ in 0..200 {
        if !client.is_pending(href) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("fetch of {href} did not settle");
}

#[tokio::test]
async fn concurrent_reads_hit_the_server_once() {
    let server = MockServer::start_async().await;
    let item = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/1");
            then.status(200)
                .header("content-type", "application/json")
                .delay(Duration::from_millis(100))
                .body(r#"{"id": 1, "owner": {"href": "/users/7"}}"#);
        })
        .await;
    let client = client_for(&server);

    let (a, b, c) = tokio::join!(
        client.fetch("/items/1"),
        client.fetch("/items/1"),
        client.fetch("/items/1"),
    );

    item.assert_async().await;
    let a = a.expect("first reader");
    let b = b.expect("second reader");
    c.expect("third reader");
    assert!(a.body.ptr_eq(&b.body));
    assert_eq!(
        a.body.value()["owner"]["href"],
        server.url("/users/7").as_str()
    );

    let cached = client.fetch("/items/1").await.expect("cached read");
    assert!(cached.body.ptr_eq(&a.body));
    item.assert_async().await;
}

#[tokio::test]
async fn status_errors_carry_the_server_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/missing");
            then.status(404)
                .body(r#"{"error": {"message": "no such item"}}"#);
        })
        .await;
    let client = client_for(&server);

    let err = client.fetch("/missing").await.expect_err("404");
    assert_eq!(
        err,
        ClientError::Status {
            status: 404,
            message: "no such item".to_string()
        }
    );
    assert!(client.cache().is_empty());
}

#[tokio::test]
async fn credentials_and_link_headers_round_trip() {
    let server = MockServer::start_async().await;
    let root = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/")
                .header("authorization", "Basic YWxpY2U6czNjcmV0");
            then.status(200)
                .header("link", r#"</items>; rel="items", </users>; rel="users""#)
                .body("{}");
        })
        .await;
    let client = client_for(&server);
    client.auth("alice", "s3cret");

    let resource = client.fetch("/").await.expect("root loads");

    root.assert_async().await;
    assert_eq!(resource.links.hrefs("items"), [server.url("/items")]);
    assert_eq!(resource.links.hrefs("users"), [server.url("/users")]);
}

#[tokio::test]
async fn post_seeds_location_and_busts_invalidated_resources() {
    let server = MockServer::start_async().await;
    let create = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/items")
                .json_body(json!({"name": "lamp"}));
            then.status(201)
                .header("content-location", "/items/9")
                .header("link", r#"</lists/all>; rel="invalidates""#)
                .body(r#"{"id": 9, "name": "lamp"}"#);
        })
        .await;
    let list_bust = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/lists/all")
                .header("cache-control", "max-age=0, no-store, no-cache")
                .header("pragma", "no-cache");
            then.status(200).body(r#"{"items": [9]}"#);
        })
        .await;
    let item_bust = server
        .mock_async(|when, then| {
            when.method(GET).path("/items/9").header("pragma", "no-cache");
            then.status(200).body(r#"{"id": 9, "name": "lamp"}"#);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/items");
            then.status(200).body(r#"{"items": []}"#);
        })
        .await;
    let client = client_for(&server);

    let submission = submit(
        &client,
        reqwest::Method::POST,
        "/items",
        Some(json!({"name": "lamp"})),
    )
    .await
    .expect("create succeeds");

    assert_eq!(submission.href, Some(server.url("/items/9")));
    let seeded = client
        .cache()
        .get(&server.url("/items/9"))
        .expect("seeded before revalidation lands");
    assert_eq!(seeded.body.value()["name"], "lamp");

    tokio::time::sleep(Duration::from_millis(50)).await;
    wait_idle(&client, "/lists/all").await;
    wait_idle(&client, "/items/9").await;
    wait_idle(&client, "/items").await;

    create.assert_async().await;
    list_bust.assert_async().await;
    item_bust.assert_async().await;
}

#[tokio::test]
async fn transport_timeouts_are_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/slow");
            then.status(200).delay(Duration::from_secs(2)).body("{}");
        })
        .await;
    let transport =
        HttpTransport::new(Duration::from_millis(100)).expect("transport builds");
    let client = Client::builder(server.url("/"))
        .transport(transport)
        .build()
        .expect("client builds");

    let err = client.fetch("/slow").await.expect_err("times out");
    assert!(err.is_timeout(), "expected timeout, got {err:?}");
}
